//! In-memory adapters for tests and local runs.

mod ledger_store;

pub use ledger_store::{InMemoryLedgerStore, InMemoryLedgerTx};
