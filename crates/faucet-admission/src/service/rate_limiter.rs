//! # Rate Limiter
//!
//! Three tiers over the shared counter store:
//!
//! | Tier | Key | Decision |
//! |------|-----|----------|
//! | Daily quota | `daily:{caller}:{date}` + `cooldown:{caller}` | `used + units <= cap`, cooldown once reached |
//! | Hourly throttle | `throttle:{caller}:{network}:{resource}` + lease | one disbursement per window, one in flight |
//! | Distribution cap | `dist:{network}:{resource}:{window}:{bucket}` | atomic check-and-increment |
//!
//! No limit state lives in the process; every decision is a store call.

use super::calls::store_call;
use crate::algorithms::keys::{self, HOUR_SECS};
use crate::config::RateLimitConfig;
use crate::domain::{
    AdmissionError, Amount, CallerId, DailyQuotaView, DistributionWindow, NetworkId, RateLimit,
    ResourceSymbol, ThrottleView, Timestamp,
};
use crate::ports::outbound::{BoundedIncrement, CounterStore, TimeSource};
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Daily quota state for one caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailyQuota {
    /// Whether `units` more would fit.
    pub allowed: bool,
    /// Units consumed today.
    pub used: u64,
    /// Daily cap.
    pub limit: u64,
    /// Cooldown end, if cooling down.
    pub cooldown_until: Option<Timestamp>,
}

impl DailyQuota {
    /// Caller-facing view.
    pub fn to_view(&self, now: Timestamp) -> DailyQuotaView {
        let in_cooldown = self.cooldown_until.is_some_and(|end| end > now);
        DailyQuotaView {
            total: self.limit,
            used: self.used,
            remaining: if in_cooldown {
                0
            } else {
                self.limit.saturating_sub(self.used)
            },
            cooldown_end: self.cooldown_until,
            in_cooldown,
        }
    }
}

/// In-flight claim on a (caller, network, resource) throttle.
///
/// Must be committed or released; an abandoned lease expires by TTL. The
/// stored value is `token`, so only the holder can release it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleLease {
    /// Caller holding the lease.
    pub caller: CallerId,
    /// Network.
    pub network: NetworkId,
    /// Resource.
    pub resource: ResourceSymbol,
    /// Owner token stored under the lease key.
    pub token: u128,
}

impl ThrottleLease {
    fn key(&self) -> String {
        keys::throttle_lease(&self.caller, &self.network, &self.resource)
    }
}

/// Global distribution caps for one resource in base units. 0 means uncapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistributionCaps {
    /// Hourly cap.
    pub per_hour: Amount,
    /// Daily cap.
    pub per_day: Amount,
}

/// Multi-tier rate limiter.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn TimeSource>,
    limits: RateLimitConfig,
    call_timeout: Duration,
}

impl RateLimiter {
    /// Create a limiter over `store`.
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn TimeSource>,
        limits: RateLimitConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            limits,
            call_timeout,
        }
    }

    /// Configured limits.
    pub fn limits(&self) -> &RateLimitConfig {
        &self.limits
    }

    // =========================================================================
    // DAILY QUOTA
    // =========================================================================

    /// Current daily usage and cooldown. Read-only.
    pub async fn daily_status(&self, caller: &CallerId) -> Result<DailyQuota, AdmissionError> {
        let now = self.clock.now();
        let cooldown_until = store_call(
            self.call_timeout,
            "cooldown read",
            self.store.get(&keys::cooldown(caller)),
        )
        .await?
        .and_then(|end| Timestamp::try_from(end).ok())
        .filter(|end| *end > now);

        let used = store_call(
            self.call_timeout,
            "daily quota read",
            self.store.get(&keys::daily(caller, now)),
        )
        .await?
        .map_or(0, |used| u64::try_from(used).unwrap_or(u64::MAX));

        Ok(DailyQuota {
            allowed: cooldown_until.is_none() && used < self.limits.max_requests_per_day,
            used,
            limit: self.limits.max_requests_per_day,
            cooldown_until,
        })
    }

    /// Whether `units` more requests fit in today's quota.
    pub async fn check_daily(
        &self,
        caller: &CallerId,
        units: u64,
    ) -> Result<DailyQuota, AdmissionError> {
        let now = self.clock.now();
        let mut quota = self.daily_status(caller).await?;
        let limit = quota.limit;

        if let Some(end) = quota.cooldown_until {
            warn!(caller = %caller, "[faucet] Caller in daily cooldown");
            return Err(RateLimit::DailyCooldown {
                limit,
                remaining: Duration::from_secs(end - now),
            }
            .into());
        }

        if quota.used.saturating_add(units) > limit {
            warn!(
                caller = %caller,
                used = quota.used,
                requested = units,
                "[faucet] Daily quota would be exceeded"
            );
            return Err(RateLimit::DailyQuotaExceeded {
                used: quota.used,
                limit,
                requested: units,
                resets_in: Duration::from_secs(keys::until_window_end(
                    DistributionWindow::Day,
                    now,
                )),
            }
            .into());
        }

        quota.allowed = true;
        Ok(quota)
    }

    /// Consume `units` of the daily quota, starting the cooldown once the cap is reached.
    ///
    /// Returns the new daily usage.
    pub async fn commit_daily(&self, caller: &CallerId, units: u64) -> Result<u64, AdmissionError> {
        let now = self.clock.now();
        let ttl = Duration::from_secs(keys::until_window_end(DistributionWindow::Day, now) + HOUR_SECS);
        let used = store_call(
            self.call_timeout,
            "daily quota commit",
            self.store
                .increment_and_get(&keys::daily(caller, now), u128::from(units), ttl),
        )
        .await?;
        let used = u64::try_from(used).unwrap_or(u64::MAX);

        if used >= self.limits.max_requests_per_day {
            let cooldown = self.limits.cooldown_secs;
            store_call(
                self.call_timeout,
                "cooldown start",
                self.store.set_if_absent(
                    &keys::cooldown(caller),
                    u128::from(now + cooldown),
                    Duration::from_secs(cooldown),
                ),
            )
            .await?;
            info!(
                caller = %caller,
                used,
                cooldown_secs = cooldown,
                "[faucet] Daily limit reached, cooldown started"
            );
        }
        Ok(used)
    }

    // =========================================================================
    // HOURLY THROTTLE
    // =========================================================================

    /// Throttle state for one triple. Read-only.
    pub async fn throttle_status(
        &self,
        caller: &CallerId,
        network: &NetworkId,
        resource: &ResourceSymbol,
    ) -> Result<ThrottleView, AdmissionError> {
        let now = self.clock.now();
        let next = self.throttle_marker(caller, network, resource, now).await?;
        Ok(ThrottleView {
            available: next.is_none(),
            next_request_at: next,
        })
    }

    async fn throttle_marker(
        &self,
        caller: &CallerId,
        network: &NetworkId,
        resource: &ResourceSymbol,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, AdmissionError> {
        let marker = store_call(
            self.call_timeout,
            "throttle read",
            self.store.get(&keys::throttle(caller, network, resource)),
        )
        .await?;
        Ok(marker
            .and_then(|next| Timestamp::try_from(next).ok())
            .filter(|next| *next > now))
    }

    /// Claim the throttle for one triple.
    ///
    /// Denied while the hourly marker is set or another request holds the lease.
    pub async fn acquire_throttle(
        &self,
        caller: &CallerId,
        network: &NetworkId,
        resource: &ResourceSymbol,
    ) -> Result<ThrottleLease, AdmissionError> {
        let now = self.clock.now();
        if let Some(next) = self.throttle_marker(caller, network, resource, now).await? {
            warn!(
                caller = %caller,
                network = %network,
                resource = %resource,
                "[faucet] Resource throttled"
            );
            return Err(RateLimit::ResourceThrottled {
                network: network.clone(),
                resource: resource.clone(),
                retry_after: Duration::from_secs(next - now),
            }
            .into());
        }

        let lease = ThrottleLease {
            caller: caller.clone(),
            network: network.clone(),
            resource: resource.clone(),
            token: OsRng.gen(),
        };
        let lease_ttl = self.lease_ttl();
        let acquired = store_call(
            self.call_timeout,
            "throttle lease",
            self.store.set_if_absent(&lease.key(), lease.token, lease_ttl),
        )
        .await?;
        if !acquired {
            warn!(
                caller = %caller,
                network = %network,
                resource = %resource,
                "[faucet] Concurrent request already in flight"
            );
            return Err(RateLimit::ResourceThrottled {
                network: network.clone(),
                resource: resource.clone(),
                retry_after: lease_ttl,
            }
            .into());
        }

        debug!(
            caller = %caller,
            network = %network,
            resource = %resource,
            "[faucet] Throttle lease acquired"
        );
        Ok(lease)
    }

    fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.limits.throttle_lease_secs)
    }

    /// Confirm `lease` still guards its triple right before a transfer.
    ///
    /// An expired lease is re-taken when nobody else holds it and no marker
    /// was committed meanwhile; otherwise the triple is throttled.
    pub async fn hold_throttle(&self, lease: &ThrottleLease) -> Result<(), AdmissionError> {
        let now = self.clock.now();
        let throttled = |retry_after: Duration| -> AdmissionError {
            RateLimit::ResourceThrottled {
                network: lease.network.clone(),
                resource: lease.resource.clone(),
                retry_after,
            }
            .into()
        };

        if let Some(next) = self
            .throttle_marker(&lease.caller, &lease.network, &lease.resource, now)
            .await?
        {
            return Err(throttled(Duration::from_secs(next - now)));
        }

        let key = lease.key();
        let holder = store_call(self.call_timeout, "throttle lease read", self.store.get(&key)).await?;
        let held = match holder {
            Some(token) => token == lease.token,
            None => {
                warn!(
                    caller = %lease.caller,
                    resource = %lease.resource,
                    "[faucet] Throttle lease expired in flight, re-taking"
                );
                store_call(
                    self.call_timeout,
                    "throttle lease",
                    self.store.set_if_absent(&key, lease.token, self.lease_ttl()),
                )
                .await?
            }
        };
        if !held {
            warn!(
                caller = %lease.caller,
                network = %lease.network,
                resource = %lease.resource,
                "[faucet] Throttle lease taken over by another request"
            );
            return Err(throttled(self.lease_ttl()));
        }
        Ok(())
    }

    /// Start the hourly window after a successful disbursement and drop the lease.
    pub async fn commit_throttle(&self, lease: &ThrottleLease) -> Result<(), AdmissionError> {
        let now = self.clock.now();
        let window = self.limits.throttle_secs;
        store_call(
            self.call_timeout,
            "throttle commit",
            self.store.set_if_absent(
                &keys::throttle(&lease.caller, &lease.network, &lease.resource),
                u128::from(now + window),
                Duration::from_secs(window),
            ),
        )
        .await?;
        self.release_throttle(lease).await
    }

    /// Drop the lease without consuming the window.
    ///
    /// Only removes the lease while it still holds this token.
    pub async fn release_throttle(&self, lease: &ThrottleLease) -> Result<(), AdmissionError> {
        let released = store_call(
            self.call_timeout,
            "throttle release",
            self.store.delete_if_equals(&lease.key(), lease.token),
        )
        .await?;
        if !released {
            debug!(
                caller = %lease.caller,
                resource = %lease.resource,
                "[faucet] Throttle lease already expired or re-taken"
            );
        }
        Ok(())
    }

    // =========================================================================
    // GLOBAL DISTRIBUTION
    // =========================================================================

    /// Reserve `amount` against the hourly and daily caps in one atomic step.
    ///
    /// Not refunded if the disbursement later fails.
    pub async fn reserve_distribution(
        &self,
        network: &NetworkId,
        resource: &ResourceSymbol,
        amount: Amount,
        caps: DistributionCaps,
    ) -> Result<(), AdmissionError> {
        let now = self.clock.now();
        let legs: Vec<(DistributionWindow, BoundedIncrement)> = [
            (DistributionWindow::Hour, caps.per_hour),
            (DistributionWindow::Day, caps.per_day),
        ]
        .into_iter()
        .filter(|(_, cap)| *cap > 0)
        .map(|(window, cap)| {
            let increment = BoundedIncrement {
                key: keys::distribution(network, resource, window, now),
                by: amount,
                cap,
                ttl: Duration::from_secs(keys::until_window_end(window, now) + HOUR_SECS),
            };
            (window, increment)
        })
        .collect();

        if legs.is_empty() {
            return Ok(());
        }

        let increments: Vec<BoundedIncrement> = legs.iter().map(|(_, inc)| inc.clone()).collect();
        let applied = store_call(
            self.call_timeout,
            "distribution reservation",
            self.store.increment_within(&increments),
        )
        .await?;
        if applied {
            debug!(
                network = %network,
                resource = %resource,
                amount = %amount,
                "[faucet] Distribution reserved"
            );
            return Ok(());
        }

        let window = self.exhausted_window(&legs).await?;
        warn!(
            network = %network,
            resource = %resource,
            window = %window,
            "[faucet] Global distribution cap reached"
        );
        Err(RateLimit::DistributionCap {
            network: network.clone(),
            resource: resource.clone(),
            window,
            retry_after: Duration::from_secs(keys::until_window_end(window, now)),
        }
        .into())
    }

    async fn exhausted_window(
        &self,
        legs: &[(DistributionWindow, BoundedIncrement)],
    ) -> Result<DistributionWindow, AdmissionError> {
        for (window, inc) in legs {
            let current = store_call(
                self.call_timeout,
                "distribution read",
                self.store.get(&inc.key),
            )
            .await?
            .unwrap_or(0);
            if current.saturating_add(inc.by) > inc.cap {
                return Ok(*window);
            }
        }
        // Counters moved between the reservation and this read; report the tightest window.
        Ok(legs
            .first()
            .map_or(DistributionWindow::Hour, |(window, _)| *window))
    }

    // =========================================================================
    // CHALLENGE ISSUANCE
    // =========================================================================

    /// Deny issuance once the caller used this hour's challenges. Read-only.
    pub async fn check_challenge_issuance(&self, caller: &CallerId) -> Result<u64, AdmissionError> {
        let now = self.clock.now();
        let count = store_call(
            self.call_timeout,
            "challenge rate read",
            self.store.get(&keys::challenge_rate(caller, now)),
        )
        .await?
        .map_or(0, |count| u64::try_from(count).unwrap_or(u64::MAX));

        let limit = self.limits.max_challenges_per_hour;
        if count >= limit {
            warn!(caller = %caller, count, "[faucet] Challenge issuance limit reached");
            return Err(RateLimit::ChallengeIssuance {
                limit,
                retry_after: Duration::from_secs(keys::until_window_end(
                    DistributionWindow::Hour,
                    now,
                )),
            }
            .into());
        }
        Ok(count)
    }

    /// Count a challenge that was stored. Returns this hour's issuance count.
    pub async fn record_challenge_issuance(&self, caller: &CallerId) -> Result<u64, AdmissionError> {
        let now = self.clock.now();
        let until_hour_end = keys::until_window_end(DistributionWindow::Hour, now);
        let count = store_call(
            self.call_timeout,
            "challenge rate",
            self.store.increment_and_get(
                &keys::challenge_rate(caller, now),
                1,
                Duration::from_secs(until_hour_end + 60),
            ),
        )
        .await?;
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}
