//! # Faucet Admission
//!
//! Request admission for a multi-network test-token faucet.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Decide whether a disbursement request may proceed, and if so drive it:
//! - Proof-of-work challenges, single use, with an expiry
//! - Per-caller daily quota with cooldown and a per-resource throttle
//! - Global hourly/daily distribution caps per network and resource
//! - A reserve floor on the faucet's own balance
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | Challenge used once | Consumption is a single delete; only the deleter proceeds |
//! | No lost updates under concurrency | Counter store increments are atomic |
//! | Global cap never exceeded | Hour and day windows reserved in one bounded increment |
//! | Reserve preserved | `balance - amount >= ceil(balance * pct / 100)` |
//! | Bounded waits | Every collaborator call runs under a deadline |
//!
//! ## Module Structure
//!
//! ```text
//! faucet-admission/
//! ├── domain/          # Value objects, entities, lifecycle, errors
//! ├── algorithms/      # PoW, balance guard, counter key layout
//! ├── ports/           # AdmissionApi, CounterStore, ChainClient, TimeSource
//! ├── adapters/        # In-memory store, mock chain, chain registry
//! ├── service/         # RateLimiter, AdmissionService
//! ├── config.rs        # FaucetConfig (file + env overrides)
//! └── telemetry.rs     # tracing subscriber setup
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod telemetry;

// Re-exports
pub use adapters::{ChainRegistry, InMemoryCounterStore, MockChainClient};
pub use algorithms::{solve, verify_solution, BalanceSnapshot, ChallengeEngine};
pub use config::{ConfigError, FaucetConfig, NetworkConfig, ResourceConfig};
pub use domain::{
    AddressFormat, AdmissionError, AdmissionReceipt, AdmissionRequest, CallerId,
    ChallengeResponse, DeploymentMode, NetworkId, Rejection, ResourceSelection, ResourceSymbol,
};
pub use ports::{AdmissionApi, ChainClient, CounterStore, ManualClock, SystemTimeSource, TimeSource};
pub use service::{AdmissionService, RateLimiter};
pub use telemetry::{init_tracing, TelemetryConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
