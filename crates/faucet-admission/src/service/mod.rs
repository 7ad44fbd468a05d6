//! Application services: rate limiting and the admission coordinator.

mod calls;
pub mod coordinator;
pub mod rate_limiter;

pub use coordinator::AdmissionService;
pub use rate_limiter::{DailyQuota, DistributionCaps, RateLimiter, ThrottleLease};
