//! Order ledger error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | IllegalTransition | 409 |
//! | TransactionConflict | 409 |
//! | AmountMismatch | 422 |
//! | PaymentNotCompleted | 402 |
//! | Validation | 400 |
//! | Unsupported | 400 |
//! | ProviderTransient | 503 |
//! | ProviderRejected | 502 |
//! | ProviderNotConfigured | 503 |
//! | Infrastructure | 500 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, Provider, ValidationError};

use super::OrderStatus;

/// Errors raised by ledger operations and the synchronous payment path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order {order_id} cannot {attempted} from status '{from}'")]
    IllegalTransition {
        order_id: OrderId,
        from: OrderStatus,
        attempted: &'static str,
    },

    #[error("Transaction '{transaction_id}' already belongs to order {existing_order}")]
    TransactionConflict {
        transaction_id: String,
        existing_order: OrderId,
    },

    #[error("Amount mismatch: order expects {expected}, provider reported {actual}")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("Payment not completed: {0}")]
    PaymentNotCompleted(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Provider {provider} does not support {operation}")]
    Unsupported {
        provider: Provider,
        operation: &'static str,
    },

    #[error("Provider call failed, retry later: {0}")]
    ProviderTransient(String),

    #[error("Provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("No adapter registered for provider {0}")]
    ProviderNotConfigured(Provider),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl OrderError {
    pub fn illegal(order_id: OrderId, from: OrderStatus, attempted: &'static str) -> Self {
        OrderError::IllegalTransition {
            order_id,
            from,
            attempted,
        }
    }

    /// Returns true if repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrderError::ProviderTransient(_)
                | OrderError::ProviderNotConfigured(_)
                | OrderError::Infrastructure(_)
        )
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::NotFound(_) => "ORDER_NOT_FOUND",
            OrderError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            OrderError::TransactionConflict { .. } => "TRANSACTION_CONFLICT",
            OrderError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            OrderError::PaymentNotCompleted(_) => "PAYMENT_NOT_COMPLETED",
            OrderError::Validation(_) => "VALIDATION_FAILED",
            OrderError::Unsupported { .. } => "UNSUPPORTED_OPERATION",
            OrderError::ProviderTransient(_) => "PROVIDER_TRANSIENT_ERROR",
            OrderError::ProviderRejected(_) => "PROVIDER_REJECTED",
            OrderError::ProviderNotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            OrderError::Infrastructure(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for OrderError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::OrderNotFound => OrderError::NotFound(err.message),
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => {
                OrderError::Validation(ValidationError::invalid_format("request", err.message))
            }
            _ => OrderError::Infrastructure(err.to_string()),
        }
    }
}
