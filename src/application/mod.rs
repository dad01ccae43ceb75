//! Application layer - Ledger, handlers and background workers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, command handlers write through the `OrderLedger` while
//! query handlers read through `OrderReader`.

pub mod handlers;
pub mod ledger;
pub mod payment_confirmation;
pub mod provider_call;

pub use ledger::{LedgerOutcome, OrderLedger, PaymentRecord, RefundRecord};
pub use payment_confirmation::{Confirmation, PaymentConfirmer};
