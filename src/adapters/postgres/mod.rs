//! PostgreSQL adapters - Database implementations for the ledger ports.
//!
//! - `PostgresLedgerStore` - Transactional writes with row locks
//! - `PostgresOrderReader` - Order queries and the overdue scan
//! - `PostgresWebhookEventRepository` - Event lookups, retry scan, retention

mod ledger_store;
mod order_reader;
mod rows;
mod webhook_event_repository;

pub use ledger_store::{PostgresLedgerStore, PostgresLedgerTx};
pub use order_reader::PostgresOrderReader;
pub use webhook_event_repository::PostgresWebhookEventRepository;
