//! Payment configuration

use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::foundation::Provider;

use super::error::ValidationError;

/// Order lifetime, provider deadlines and the set of enabled providers
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Minutes an unpaid order stays open
    #[serde(default = "default_order_expiry_minutes")]
    pub order_expiry_minutes: u64,

    /// Deadline for a single provider call in milliseconds
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    /// Enabled providers (comma-separated)
    #[serde(default = "default_enabled_providers")]
    pub enabled_providers: String,

    /// Register in-process mock adapters instead of real provider clients
    #[serde(default)]
    pub use_mock_providers: bool,
}

impl PaymentConfig {
    pub fn order_expiry(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::try_from(self.order_expiry_minutes).unwrap_or(i64::MAX))
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Parsed provider list, duplicates removed, order kept.
    pub fn providers(&self) -> Result<Vec<Provider>, ValidationError> {
        let mut providers = Vec::new();
        for name in self
            .enabled_providers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let provider = Provider::from_str(name)
                .map_err(|_| ValidationError::UnknownProvider(name.to_string()))?;
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
        Ok(providers)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range("payment.order_expiry_minutes", self.order_expiry_minutes, 1, 10_080)?;
        ValidationError::check_range("payment.provider_timeout_ms", self.provider_timeout_ms, 100, 60_000)?;
        if self.providers()?.is_empty() {
            return Err(ValidationError::NoProviderEnabled);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            order_expiry_minutes: default_order_expiry_minutes(),
            provider_timeout_ms: default_provider_timeout_ms(),
            enabled_providers: default_enabled_providers(),
            use_mock_providers: false,
        }
    }
}

fn default_order_expiry_minutes() -> u64 {
    30
}

fn default_provider_timeout_ms() -> u64 {
    5_000
}

fn default_enabled_providers() -> String {
    Provider::ALL
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
