//! Application configuration module
//!
//! Configuration is loaded from environment variables with the `PAYSYNC`
//! prefix; nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use paysync::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Listening on {}", config.server.socket_addr()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod database;
mod error;
mod payment;
mod server;
mod webhook;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};
pub use webhook::WebhookConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Order lifetime and provider settings
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Webhook pipeline and background workers
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads `PAYSYNC__*` variables:
    ///
    /// - `PAYSYNC__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `PAYSYNC__DATABASE__URL=...` -> `database.url = ...`
    /// - `PAYSYNC__WEBHOOK__WORKER_COUNT=8` -> `webhook.worker_count = 8`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PAYSYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.webhook.validate()?;

        if self.is_production() && self.payment.use_mock_providers {
            return Err(ValidationError::MockProvidersInProduction);
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
