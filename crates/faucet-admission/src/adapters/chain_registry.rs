//! Chain Registry
//!
//! Runtime lookup of `ChainClient`s by network id.

use crate::domain::{NetworkId, ValidationError};
use crate::ports::outbound::ChainClient;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Networks preferred as default when none is configured, in order.
const PREFERRED_DEFAULTS: [&str; 2] = ["starknet", "ethereum"];

/// Chain clients keyed by network.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    clients: BTreeMap<NetworkId, Arc<dyn ChainClient>>,
    configured_default: Option<NetworkId>,
}

impl ChainRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own network id, replacing any previous one.
    pub fn register(&mut self, client: Arc<dyn ChainClient>) {
        self.clients.insert(client.network(), client);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_client(mut self, client: Arc<dyn ChainClient>) -> Self {
        self.register(client);
        self
    }

    /// Pin the default network.
    pub fn with_default(mut self, network: impl Into<NetworkId>) -> Self {
        self.configured_default = Some(network.into());
        self
    }

    /// Registered networks, sorted.
    pub fn networks(&self) -> Vec<NetworkId> {
        self.clients.keys().cloned().collect()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Client for a network.
    pub fn get(&self, network: &NetworkId) -> Option<Arc<dyn ChainClient>> {
        self.clients.get(network).cloned()
    }

    /// Network used when a request names none.
    ///
    /// The configured default if registered, else `starknet`, then `ethereum`,
    /// then the first registered network.
    pub fn default_network(&self) -> Option<NetworkId> {
        if let Some(network) = &self.configured_default {
            if self.clients.contains_key(network) {
                return Some(network.clone());
            }
        }
        PREFERRED_DEFAULTS
            .iter()
            .map(|name| NetworkId::new(name))
            .find(|network| self.clients.contains_key(network))
            .or_else(|| self.clients.keys().next().cloned())
    }

    /// Resolve an optional network to a registered client.
    pub fn resolve(
        &self,
        network: Option<&NetworkId>,
    ) -> Result<(NetworkId, Arc<dyn ChainClient>), ValidationError> {
        let network = match network {
            Some(network) => network.clone(),
            None => self
                .default_network()
                .ok_or_else(|| self.unsupported("<default>"))?,
        };
        let client = self
            .get(&network)
            .ok_or_else(|| self.unsupported(network.as_str()))?;
        Ok((network, client))
    }

    fn unsupported(&self, requested: &str) -> ValidationError {
        ValidationError::UnsupportedNetwork {
            network: requested.to_string(),
            available: self
                .clients
                .keys()
                .map(NetworkId::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}
