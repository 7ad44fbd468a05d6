//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits: the in-process counter store, the chain
//! registry and a mock chain client.

mod chain_registry;
mod memory_store;
mod mock_chain;

pub use chain_registry::ChainRegistry;
pub use memory_store::InMemoryCounterStore;
pub use mock_chain::{MockChainClient, RecordedTransfer};
