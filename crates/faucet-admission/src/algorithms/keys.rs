//! # Counter Store Key Layout
//!
//! ```text
//! daily:{caller}:{YYYY-MM-DD}
//! cooldown:{caller}
//! throttle:{caller}:{network}:{resource}
//! throttle-lease:{caller}:{network}:{resource}
//! dist:{network}:{resource}:hour:{YYYYMMDDHH}
//! dist:{network}:{resource}:day:{YYYYMMDD}
//! challenge:{id}
//! challenge-rate:{caller}:{YYYYMMDDHH}
//! ```
//!
//! Windows are aligned to UTC.

use crate::domain::{CallerId, DistributionWindow, NetworkId, ResourceSymbol, Timestamp};
use chrono::{DateTime, Utc};

/// Seconds per hour.
pub const HOUR_SECS: u64 = 3_600;
/// Seconds per day.
pub const DAY_SECS: u64 = 86_400;

fn utc(now: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::try_from(now).unwrap_or(i64::MAX), 0).unwrap_or_default()
}

/// Daily quota counter.
pub fn daily(caller: &CallerId, now: Timestamp) -> String {
    format!("daily:{}:{}", caller, utc(now).format("%Y-%m-%d"))
}

/// Cooldown marker.
pub fn cooldown(caller: &CallerId) -> String {
    format!("cooldown:{}", caller)
}

/// Hourly throttle marker.
pub fn throttle(caller: &CallerId, network: &NetworkId, resource: &ResourceSymbol) -> String {
    format!("throttle:{}:{}:{}", caller, network, resource)
}

/// In-flight lease for a throttle triple.
pub fn throttle_lease(caller: &CallerId, network: &NetworkId, resource: &ResourceSymbol) -> String {
    format!("throttle-lease:{}:{}:{}", caller, network, resource)
}

/// Global distribution counter for the window containing `now`.
pub fn distribution(
    network: &NetworkId,
    resource: &ResourceSymbol,
    window: DistributionWindow,
    now: Timestamp,
) -> String {
    let bucket = match window {
        DistributionWindow::Hour => utc(now).format("%Y%m%d%H"),
        DistributionWindow::Day => utc(now).format("%Y%m%d"),
    };
    format!("dist:{}:{}:{}:{}", network, resource, window.label(), bucket)
}

/// Stored challenge record.
pub fn challenge(id: &str) -> String {
    format!("challenge:{}", id)
}

/// Challenge issuance counter for the hour containing `now`.
pub fn challenge_rate(caller: &CallerId, now: Timestamp) -> String {
    format!("challenge-rate:{}:{}", caller, utc(now).format("%Y%m%d%H"))
}

/// Start of the next window after `now`.
pub fn window_end(window: DistributionWindow, now: Timestamp) -> Timestamp {
    let size = match window {
        DistributionWindow::Hour => HOUR_SECS,
        DistributionWindow::Day => DAY_SECS,
    };
    (now / size + 1) * size
}

/// Seconds until the window containing `now` rolls over.
pub fn until_window_end(window: DistributionWindow, now: Timestamp) -> u64 {
    window_end(window, now) - now
}
