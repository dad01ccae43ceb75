//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application to external systems:
//! - `clock` - System and deterministic clocks and id generators
//! - `memory` - In-memory ledger store for tests and local runs
//! - `postgres` - sqlx-backed ledger store
//! - `providers` - Payment provider adapters (mocks in-crate)
//! - `http` - axum REST API and webhook intake

pub mod clock;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod providers;

pub use clock::{FixedClock, SequentialIdGenerator, SystemClock, UuidIdGenerator};
pub use memory::InMemoryLedgerStore;
pub use postgres::{PostgresLedgerStore, PostgresOrderReader, PostgresWebhookEventRepository};
