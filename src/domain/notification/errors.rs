//! Webhook error types.
//!
//! Only `InvalidSignature` and `QueueFull` ever reach the provider as an HTTP
//! status. Everything else is recorded on the webhook event and the provider
//! gets its acknowledgment regardless.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::order::OrderError;

/// Errors that occur during webhook intake and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Envelope authentication failed.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Payload could not be decoded into any known notification shape.
    #[error("Unrecognized notification: {0}")]
    UnrecognizedNotification(String),

    /// Shape is known but the type code is not.
    #[error("Unsupported notification type: {0}")]
    UnsupportedNotificationType(String),

    /// No order could be correlated with the notification.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    #[error("Amount mismatch: {0}")]
    AmountMismatch(String),

    /// Timeout or 5xx from a provider call made during reconciliation.
    #[error("Provider transient error: {0}")]
    ProviderTransient(String),

    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    /// Worker queue is at capacity.
    #[error("Webhook queue is full")]
    QueueFull,

    /// A write would break an order or event invariant. Replaying the same
    /// notification hits the same check.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the retry sweeper should replay the event.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::ProviderTransient(_) | WebhookError::Database(_)
        )
    }

    /// Status code returned to the provider when the error happens before
    /// the event is queued.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::QueueFull | WebhookError::ProviderTransient(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Recorded as failed events; the provider must not keep retrying.
            _ => StatusCode::OK,
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::OrderNotFound => WebhookError::OrderNotFound(err.message),
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat
            | ErrorCode::InvalidStateTransition
            | ErrorCode::DuplicateTransaction
            | ErrorCode::TransactionClosed => WebhookError::InvariantViolation(err.to_string()),
            _ => WebhookError::Database(err.to_string()),
        }
    }
}

impl From<OrderError> for WebhookError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(msg) => WebhookError::OrderNotFound(msg),
            OrderError::IllegalTransition { .. } | OrderError::TransactionConflict { .. } => {
                WebhookError::IllegalTransition(err.to_string())
            }
            OrderError::AmountMismatch { .. } => WebhookError::AmountMismatch(err.to_string()),
            OrderError::ProviderTransient(msg) => WebhookError::ProviderTransient(msg),
            OrderError::ProviderNotConfigured(provider) => {
                WebhookError::ProviderTransient(format!("no adapter registered for {}", provider))
            }
            OrderError::ProviderRejected(msg) | OrderError::PaymentNotCompleted(msg) => {
                WebhookError::ProviderRejected(msg)
            }
            OrderError::Unsupported { .. } => WebhookError::ProviderRejected(err.to_string()),
            OrderError::Validation(e) => WebhookError::UnrecognizedNotification(e.to_string()),
            OrderError::Infrastructure(msg) => WebhookError::Database(msg),
        }
    }
}
