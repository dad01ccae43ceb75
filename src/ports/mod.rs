//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `LedgerStore` / `LedgerTx` - Transactional writes to orders, legs,
//!   transactions and webhook events
//! - `OrderReader` - Order queries outside a transaction
//! - `WebhookEventRepository` - Webhook event lookups, retry scan, retention
//!
//! ## Provider Ports
//!
//! - `PaymentProvider` - Verification, acknowledgment, refunds and
//!   notification authentication per payment network
//! - `ProviderRegistry` - Adapter lookup by provider
//!
//! ## Environment Ports
//!
//! - `Clock` / `IdGenerator` - Injected time and identifier sources

mod clock;
mod ledger_store;
mod order_reader;
mod payment_provider;
mod provider_registry;
mod webhook_event_repository;

pub use clock::{Clock, IdGenerator};
pub use ledger_store::{LedgerStore, LedgerTx};
pub use order_reader::OrderReader;
pub use payment_provider::{
    AcknowledgeRequest, NotificationHeaders, PaymentError, PaymentErrorCode, PaymentProvider,
    ProviderCapabilities, PurchaseState, RefundRequest, RefundResult, VerificationRequest,
    VerificationResult,
};
pub use provider_registry::ProviderRegistry;
pub use webhook_event_repository::{SaveResult, WebhookEventRepository};
