//! Provider registry - maps a `Provider` to its adapter.
//!
//! Built once at startup and shared read-only by the order handlers and the
//! webhook pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::Provider;
use crate::domain::order::OrderError;

use super::PaymentProvider;

/// Adapters keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under the provider it reports. A second adapter
    /// for the same provider replaces the first.
    pub fn with(mut self, adapter: Arc<dyn PaymentProvider>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn PaymentProvider>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn PaymentProvider>, OrderError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or(OrderError::ProviderNotConfigured(provider))
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Registered providers in a stable order.
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .iter()
            .copied()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
