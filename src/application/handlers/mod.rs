//! Application handlers.
//!
//! Command and query handlers that orchestrate ledger writes, provider calls
//! and webhook reconciliation.

pub mod order;
pub mod webhook;

pub use order::{
    // Commands
    CancelOrderCommand, CancelOrderHandler, CreateOrderCommand, CreateOrderHandler,
    ExpireStaleOrdersHandler, OrderExpiryConfig, OrderExpiryWorker, ProcessPaymentCommand,
    ProcessPaymentHandler, ProcessPaymentResult, RefundOrderCommand, RefundOrderHandler,
    // Queries
    GetOrderHandler, GetOrderQuery, ListOrdersHandler, ListOrdersQuery, OrderDetails,
};
pub use webhook::{
    PipelineStats, PipelineStatsSnapshot, ReconcileDispatcher, RetrySweeper, RetrySweeperConfig,
    WebhookOutcome, WebhookProcessor, WebhookWorkerPool, WorkerPoolConfig,
};
