//! Payment provider adapters.
//!
//! Network clients for the four providers live outside this crate; they plug
//! in through the `PaymentProvider` port and the `ProviderRegistry`. The
//! in-process `MockPaymentProvider` backs tests and local runs.

use std::sync::Arc;

use crate::domain::foundation::Provider;
use crate::ports::ProviderRegistry;

mod mock_provider;

pub use mock_provider::{MethodCall, MockPaymentProvider};

/// Registry of approving mocks for the given providers, for local runs.
pub fn mock_registry(providers: &[Provider]) -> ProviderRegistry {
    providers.iter().fold(ProviderRegistry::new(), |registry, provider| {
        registry.with(Arc::new(MockPaymentProvider::approving(*provider)))
    })
}
