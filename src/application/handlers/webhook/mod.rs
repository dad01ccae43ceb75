//! Webhook handlers.
//!
//! - `ReconcileDispatcher` maps a classified notification onto ledger writes
//! - `WebhookProcessor` adds the dedup guard and failure bookkeeping
//! - `WebhookWorkerPool` feeds the processor from the HTTP intake
//! - `RetrySweeper` replays failed events and purges old ones

mod processor;
mod reconcile;
mod retry_sweeper;
mod worker_pool;

pub use processor::{
    PipelineStats, PipelineStatsSnapshot, WebhookOutcome, WebhookProcessor,
    UNRECOGNIZED_EVENT_TYPE,
};
pub use reconcile::{
    Disposition, ReconcileDispatcher, PROVIDER_CANCELLED, PROVIDER_CLOSED, PROVIDER_REVOKED,
};
pub use retry_sweeper::{RetrySweeper, RetrySweeperConfig, SweepReport};
pub use worker_pool::{WebhookJob, WebhookWorkerPool, WorkerPoolConfig};
