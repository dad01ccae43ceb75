//! API error type and JSON error body.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::foundation::{DomainError, ValidationError};
use crate::domain::order::OrderError;

/// Error body returned by every order endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// API error type that converts ledger errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub OrderError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::IllegalTransition { .. } | OrderError::TransactionConflict { .. } => {
                StatusCode::CONFLICT
            }
            OrderError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OrderError::PaymentNotCompleted(_) => StatusCode::PAYMENT_REQUIRED,
            OrderError::Validation(_) | OrderError::Unsupported { .. } => StatusCode::BAD_REQUEST,
            OrderError::ProviderTransient(_) | OrderError::ProviderNotConfigured(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            OrderError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
            OrderError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(OrderError::Validation(err))
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(OrderError::from(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ValidationError::invalid_format("body", rejection.body_text()).into()
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ValidationError::invalid_format("path", rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ValidationError::invalid_format("query", rejection.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorResponse::new(self.0.code(), self.0.to_string());

        match &self.0 {
            OrderError::IllegalTransition {
                order_id,
                from,
                attempted,
            } => {
                body = body
                    .with_detail("order_id", order_id.to_string())
                    .with_detail("status", from.to_string())
                    .with_detail("attempted", *attempted);
            }
            OrderError::AmountMismatch { expected, actual } => {
                body = body
                    .with_detail("expected", expected.to_string())
                    .with_detail("actual", actual.to_string());
            }
            OrderError::Infrastructure(_) => {
                // Internal detail stays in the logs.
                tracing::error!(error = %self.0, "Request failed");
                body.message = "Internal server error".to_string();
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
