//! Foundation module - Shared domain primitives.
//!
//! Identifiers, time, money, provider identity, paging and the error
//! vocabulary used by every other domain module.

mod errors;
mod ids;
mod money;
mod pagination;
mod provider;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{OrderId, OrderNumber, PaymentTransactionId, ProductId, UserId, WebhookEventId};
pub use money::{Currency, Money};
pub use pagination::{Page, PageRequest};
pub use provider::Provider;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
