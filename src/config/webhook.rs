//! Webhook pipeline and background worker configuration

use serde::Deserialize;
use std::time::Duration;

use crate::application::handlers::order::OrderExpiryConfig;
use crate::application::handlers::webhook::{RetrySweeperConfig, WorkerPoolConfig};
use crate::domain::notification::RetryPolicy;

use super::error::ValidationError;

/// Worker pool, retry schedule, retention and expiry sweep settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Bounded intake queue; a full queue answers 503
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: u32,

    /// Processed and skipped events older than this are purged
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_expiry_sweep_interval")]
    pub expiry_sweep_interval_secs: u64,

    #[serde(default = "default_expiry_batch_size")]
    pub expiry_batch_size: u32,
}

impl WebhookConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.retry_base_delay_secs,
            self.retry_max_delay_secs,
        )
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::default()
            .with_worker_count(self.worker_count)
            .with_queue_capacity(self.queue_capacity)
    }

    pub fn retry_sweeper_config(&self) -> RetrySweeperConfig {
        RetrySweeperConfig::default()
            .with_poll_interval(Duration::from_secs(self.sweep_interval_secs))
            .with_batch_size(self.sweep_batch_size)
            .with_retention_days(i64::from(self.retention_days))
    }

    pub fn order_expiry_config(&self) -> OrderExpiryConfig {
        OrderExpiryConfig::default()
            .with_poll_interval(Duration::from_secs(self.expiry_sweep_interval_secs))
            .with_batch_size(self.expiry_batch_size)
    }

    /// Validate webhook configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range("webhook.worker_count", self.worker_count as u64, 1, 256)?;
        ValidationError::check_range(
            "webhook.queue_capacity",
            self.queue_capacity as u64,
            1,
            1_000_000,
        )?;
        ValidationError::check_range("webhook.max_retries", u64::from(self.max_retries), 0, 50)?;
        ValidationError::check_range(
            "webhook.retry_base_delay_secs",
            self.retry_base_delay_secs,
            1,
            self.retry_max_delay_secs.max(1),
        )?;
        ValidationError::check_range("webhook.sweep_interval_secs", self.sweep_interval_secs, 1, 86_400)?;
        ValidationError::check_range("webhook.sweep_batch_size", u64::from(self.sweep_batch_size), 1, 10_000)?;
        ValidationError::check_range("webhook.retention_days", u64::from(self.retention_days), 1, 3_650)?;
        ValidationError::check_range(
            "webhook.expiry_sweep_interval_secs",
            self.expiry_sweep_interval_secs,
            1,
            86_400,
        )?;
        ValidationError::check_range("webhook.expiry_batch_size", u64::from(self.expiry_batch_size), 1, 10_000)?;
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay(),
            retry_max_delay_secs: default_retry_max_delay(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch_size(),
            retention_days: default_retention_days(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval(),
            expiry_batch_size: default_expiry_batch_size(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay() -> u64 {
    30
}

fn default_retry_max_delay() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_sweep_batch_size() -> u32 {
    50
}

fn default_retention_days() -> u32 {
    30
}

fn default_expiry_sweep_interval() -> u64 {
    60
}

fn default_expiry_batch_size() -> u32 {
    100
}
