//! Faucet configuration with validation.
//!
//! Loaded from JSON, then overridden from `FAUCET_*` environment variables.

use crate::domain::{parse_units, Amount, DeploymentMode, NetworkId, ResourceSymbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Main faucet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Deployment flavour (fixes the PoW bypass)
    pub deployment: DeploymentMode,
    /// Proof-of-work settings
    pub pow: PowConfig,
    /// Rate limiting
    pub rate_limits: RateLimitConfig,
    /// Collaborator and confirmation timeouts
    pub timeouts: TimeoutConfig,
    /// Per-network settings
    pub networks: BTreeMap<NetworkId, NetworkConfig>,
    /// Network used when a request names none
    pub default_network: Option<NetworkId>,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            NetworkId::new("ethereum"),
            NetworkConfig {
                explorer_url: "https://sepolia.etherscan.io".to_string(),
                resources: BTreeMap::from([(
                    ResourceSymbol::new("ETH"),
                    ResourceConfig::new("0.01", 18),
                )]),
                ..NetworkConfig::default()
            },
        );
        networks.insert(
            NetworkId::new("starknet"),
            NetworkConfig {
                explorer_url: "https://sepolia.voyager.online".to_string(),
                resources: BTreeMap::from([
                    (ResourceSymbol::new("ETH"), ResourceConfig::new("0.01", 18)),
                    (ResourceSymbol::new("STRK"), ResourceConfig::new("10", 18)),
                ]),
                ..NetworkConfig::default()
            },
        );
        Self {
            deployment: DeploymentMode::Production,
            pow: PowConfig::default(),
            rate_limits: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            networks,
            default_network: None,
        }
    }
}

impl FaucetConfig {
    /// Parse from JSON. Missing sections take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Load `path` (or defaults when `None`), apply environment overrides and validate.
    pub fn from_env_and_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FAUCET_*` overrides from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `FAUCET_TEST_MODE`: `true`/`1` selects the test deployment
    /// - `FAUCET_POW_DIFFICULTY`: leading zero bits
    /// - `FAUCET_CHALLENGE_TTL_SECS`: challenge lifetime
    /// - `FAUCET_MAX_REQUESTS_PER_DAY`: daily cap per caller
    /// - `FAUCET_MAX_CHALLENGES_PER_HOUR`: issuance cap per caller
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FAUCET_TEST_MODE") {
            let enabled = value.eq_ignore_ascii_case("true") || value == "1";
            self.deployment = if enabled {
                DeploymentMode::Test
            } else {
                DeploymentMode::Production
            };
        }
        if let Some(value) = lookup("FAUCET_POW_DIFFICULTY") {
            self.pow.difficulty = parse_override("FAUCET_POW_DIFFICULTY", &value)?;
        }
        if let Some(value) = lookup("FAUCET_CHALLENGE_TTL_SECS") {
            self.pow.challenge_ttl_secs = parse_override("FAUCET_CHALLENGE_TTL_SECS", &value)?;
        }
        if let Some(value) = lookup("FAUCET_MAX_REQUESTS_PER_DAY") {
            self.rate_limits.max_requests_per_day =
                parse_override("FAUCET_MAX_REQUESTS_PER_DAY", &value)?;
        }
        if let Some(value) = lookup("FAUCET_MAX_CHALLENGES_PER_HOUR") {
            self.rate_limits.max_challenges_per_hour =
                parse_override("FAUCET_MAX_CHALLENGES_PER_HOUR", &value)?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pow.difficulty == 0 || self.pow.difficulty > 64 {
            return Err(ConfigError::InvalidPow(format!(
                "difficulty must be within 1..=64, got {}",
                self.pow.difficulty
            )));
        }
        if self.pow.challenge_ttl_secs == 0 {
            return Err(ConfigError::InvalidPow(
                "challenge_ttl_secs cannot be 0".into(),
            ));
        }

        if self.rate_limits.max_requests_per_day == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_requests_per_day cannot be 0".into(),
            ));
        }
        if self.rate_limits.throttle_secs == 0 || self.rate_limits.throttle_lease_secs == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "throttle windows cannot be 0".into(),
            ));
        }

        if self.timeouts.collaborator_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "collaborator_ms cannot be 0".into(),
            ));
        }

        // The lease alone serialises a (caller, network, resource) until its marker
        // is committed, so it must outlive the slowest admission.
        let worst_case = self.max_admission_time();
        if Duration::from_secs(self.rate_limits.throttle_lease_secs) <= worst_case {
            return Err(ConfigError::InvalidRateLimit(format!(
                "throttle_lease_secs ({}) must exceed the worst-case admission time ({}s)",
                self.rate_limits.throttle_lease_secs,
                worst_case.as_secs_f64().ceil()
            )));
        }

        if self.networks.is_empty() {
            return Err(ConfigError::Invalid("no networks configured".into()));
        }
        for (network, config) in &self.networks {
            if config.min_balance_protect_pct > 100 {
                return Err(ConfigError::InvalidNetwork {
                    network: network.clone(),
                    reason: format!(
                        "min_balance_protect_pct must be <= 100, got {}",
                        config.min_balance_protect_pct
                    ),
                });
            }
            if config.resources.is_empty() {
                return Err(ConfigError::InvalidNetwork {
                    network: network.clone(),
                    reason: "no resources configured".into(),
                });
            }
            for (resource, resource_config) in &config.resources {
                resource_config.amounts().map_err(|reason| ConfigError::InvalidResource {
                    network: network.clone(),
                    resource: resource.clone(),
                    reason,
                })?;
            }
        }

        if let Some(default) = &self.default_network {
            if !self.networks.contains_key(default) {
                return Err(ConfigError::Invalid(format!(
                    "default_network {} is not configured",
                    default
                )));
            }
        }

        Ok(())
    }

    /// Upper bound on how long one admission can hold its throttle leases.
    ///
    /// Every collaborator call is bounded by the collaborator timeout and the
    /// confirmation wait by `confirmation_secs` plus one timeout. Counts the
    /// network with the most resources.
    pub fn max_admission_time(&self) -> Duration {
        let resources = self
            .networks
            .values()
            .map(|network| network.resources.len())
            .max()
            .unwrap_or(0) as u32;
        let call = self.timeouts.collaborator();
        // Daily check (2), lease acquisition (2 per resource), challenge load/claim/expiry (3).
        let before_disbursement = call * (5 + 2 * resources);
        // Reservation, balance, lease check (3), transfer, throttle and daily commits (4).
        let mut per_resource = call * 10;
        if self.timeouts.await_confirmation {
            per_resource += self.timeouts.confirmation() + call;
        }
        before_disbursement + per_resource * resources
    }

    /// Settings for a resource on a network.
    pub fn resource(
        &self,
        network: &NetworkId,
        resource: &ResourceSymbol,
    ) -> Option<&ResourceConfig> {
        self.networks.get(network)?.resources.get(resource)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Proof-of-work configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowConfig {
    /// Leading zero bits required (default: 20)
    pub difficulty: u8,
    /// Challenge lifetime in seconds (default: 300)
    pub challenge_ttl_secs: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            difficulty: 20,
            challenge_ttl_secs: 300,
        }
    }
}

impl PowConfig {
    /// Challenge lifetime.
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Daily requests per caller across all networks (default: 5)
    pub max_requests_per_day: u64,
    /// Challenges per caller per hour (default: 10)
    pub max_challenges_per_hour: u64,
    /// Per-(caller, network, resource) throttle window (default: 1 hour)
    pub throttle_secs: u64,
    /// Cooldown once the daily cap is reached (default: 24 hours)
    pub cooldown_secs: u64,
    /// Lifetime of an in-flight throttle lease (default: 15 minutes)
    pub throttle_lease_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_day: 5,
            max_challenges_per_hour: 10,
            throttle_secs: 3_600,
            cooldown_secs: 86_400,
            throttle_lease_secs: 900,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-call deadline for counter store and chain RPC (default: 10s)
    pub collaborator_ms: u64,
    /// Confirmation deadline after a transfer (default: 120s)
    pub confirmation_secs: u64,
    /// Confirmation poll interval (default: 3s)
    pub confirmation_poll_ms: u64,
    /// Wait for confirmation before committing (default: true)
    pub await_confirmation: bool,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            collaborator_ms: 10_000,
            confirmation_secs: 120,
            confirmation_poll_ms: 3_000,
            await_confirmation: true,
        }
    }
}

impl TimeoutConfig {
    /// Per-call collaborator deadline.
    pub fn collaborator(&self) -> Duration {
        Duration::from_millis(self.collaborator_ms)
    }

    /// Confirmation deadline.
    pub fn confirmation(&self) -> Duration {
        Duration::from_secs(self.confirmation_secs)
    }

    /// Confirmation poll interval.
    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }
}

/// Per-network configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Share of the faucet balance that must remain after a drip (0-100)
    pub min_balance_protect_pct: u8,
    /// Block explorer base URL for transaction links; chain clients built
    /// from this section use it
    pub explorer_url: String,
    /// Disbursable resources
    pub resources: BTreeMap<ResourceSymbol, ResourceConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            min_balance_protect_pct: 10,
            explorer_url: String::new(),
            resources: BTreeMap::new(),
        }
    }
}

/// Per-resource configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Amount per drip, decimal ("0.01")
    pub drip_amount: String,
    /// Global hourly distribution cap, decimal; "0" means uncapped
    pub max_per_hour: String,
    /// Global daily distribution cap, decimal; "0" means uncapped
    pub max_per_day: String,
    /// Decimal places of the base unit (default: 18)
    pub decimals: u8,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self::new("0", 18)
    }
}

/// Resource amounts converted to base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAmounts {
    /// Drip per request.
    pub drip: Amount,
    /// Hourly cap (0 = uncapped).
    pub max_per_hour: Amount,
    /// Daily cap (0 = uncapped).
    pub max_per_day: Amount,
}

impl ResourceConfig {
    /// Uncapped resource dripping `drip_amount`.
    pub fn new(drip_amount: &str, decimals: u8) -> Self {
        Self {
            drip_amount: drip_amount.to_string(),
            max_per_hour: "0".to_string(),
            max_per_day: "0".to_string(),
            decimals,
        }
    }

    /// Set global distribution caps.
    pub fn with_caps(mut self, max_per_hour: &str, max_per_day: &str) -> Self {
        self.max_per_hour = max_per_hour.to_string();
        self.max_per_day = max_per_day.to_string();
        self
    }

    /// Convert every decimal field to base units.
    pub fn amounts(&self) -> Result<ResourceAmounts, String> {
        let parse = |field: &str, raw: &str| {
            parse_units(raw, self.decimals)
                .ok_or_else(|| format!("{} {:?} is not a valid amount", field, raw))
        };
        let drip = parse("drip_amount", &self.drip_amount)?;
        if drip == 0 {
            return Err("drip_amount must be positive".to_string());
        }
        Ok(ResourceAmounts {
            drip,
            max_per_hour: parse("max_per_hour", &self.max_per_hour)?,
            max_per_day: parse("max_per_day", &self.max_per_day)?,
        })
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read configuration: {0}")]
    Io(String),
    /// JSON could not be parsed
    #[error("cannot parse configuration: {0}")]
    Parse(String),
    /// Environment override not parsable
    #[error("invalid value {value:?} for {key}")]
    InvalidOverride {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },
    /// Invalid PoW configuration
    #[error("invalid pow settings: {0}")]
    InvalidPow(String),
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid network section
    #[error("invalid network {network}: {reason}")]
    InvalidNetwork {
        /// Offending network
        network: NetworkId,
        /// What is wrong
        reason: String,
    },
    /// Invalid resource section
    #[error("invalid resource {resource} on {network}: {reason}")]
    InvalidResource {
        /// Network of the resource
        network: NetworkId,
        /// Offending resource
        resource: ResourceSymbol,
        /// What is wrong
        reason: String,
    },
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
