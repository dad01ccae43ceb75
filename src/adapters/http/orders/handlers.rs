//! HTTP handlers for order endpoints.
//!
//! These handlers connect axum routes to the order command and query
//! handlers. Extractor rejections are folded into `ApiError` so every
//! failure answers with the same JSON error body.

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::adapters::http::error::ApiError;
use crate::adapters::http::state::AppState;
use crate::application::handlers::order::{
    CancelOrderCommand, CreateOrderCommand, GetOrderQuery, ListOrdersQuery,
    ProcessPaymentCommand, RefundOrderCommand,
};
use crate::domain::foundation::{
    Currency, Money, OrderId, OrderNumber, PageRequest, ProductId, Provider, UserId,
    ValidationError,
};

use super::dto::{
    CancelOrderRequest, CreateOrderRequest, ListOrdersParams, OrderDetailsResponse,
    OrderListResponse, OrderMutationResponse, OrderResponse, ProcessPaymentRequest,
    ProcessPaymentResponse, RefundOrderRequest,
};

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::from_str(raw).map_err(|_| {
        ValidationError::invalid_format("order_id", format!("'{}' is not a valid order id", raw))
            .into()
    })
}

/// Optional JSON body: an empty body reads as the default request.
fn optional_body<T: Default>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw) = path?;
    let query = GetOrderQuery::ById(parse_order_id(&raw)?);

    let details = state.get_order_handler().handle(query).await?;
    Ok(Json(OrderDetailsResponse::from(details)))
}

/// GET /orders/by-number/:number
pub async fn get_order_by_number(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw) = path?;
    let query = GetOrderQuery::ByNumber(OrderNumber::new(raw)?);

    let details = state.get_order_handler().handle(query).await?;
    Ok(Json(OrderDetailsResponse::from(details)))
}

/// GET /users/:user_id/orders?page=&per_page=
pub async fn list_user_orders(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    params: Result<Query<ListOrdersParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw_user) = path?;
    let Query(params) = params?;
    let query = ListOrdersQuery {
        user_id: UserId::new(raw_user)?,
        page: PageRequest::new(params.page, params.per_page)?,
    };

    let page = state.list_orders_handler().handle(query).await?;
    Ok(Json(OrderListResponse::from(page)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let cmd = CreateOrderCommand {
        user_id: UserId::new(request.user_id)?,
        product_id: ProductId::new(request.product_id)?,
        provider: Provider::from_str(&request.provider)?,
        kind: request.kind,
        amount: Money::new(request.amount, Currency::new(request.currency)?)?,
        developer_payload: request.developer_payload,
    };

    let order = state.create_order_handler().handle(cmd).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

/// POST /orders/:id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<CancelOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw) = path?;
    let request = optional_body(payload)?;
    let cmd = CancelOrderCommand {
        order_id: parse_order_id(&raw)?,
        reason: request.reason,
    };

    let outcome = state.cancel_order_handler().handle(cmd).await?;
    Ok(Json(OrderMutationResponse::from(outcome)))
}

/// POST /orders/:id/payments - verify, acknowledge and book a client-reported
/// purchase.
pub async fn process_payment(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<ProcessPaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw) = path?;
    let request = optional_body(payload)?;
    let cmd = ProcessPaymentCommand {
        order_id: parse_order_id(&raw)?,
        purchase_token: request.purchase_token,
        transaction_id: request.transaction_id,
    };

    let result = state.process_payment_handler().handle(cmd).await?;
    Ok(Json(ProcessPaymentResponse::from(result)))
}

/// POST /orders/:id/refund
pub async fn refund_order(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<RefundOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw) = path?;
    let request = optional_body(payload)?;
    let cmd = RefundOrderCommand {
        order_id: parse_order_id(&raw)?,
        amount: request.amount,
        reason: request.reason,
    };

    let outcome = state.refund_order_handler().handle(cmd).await?;
    Ok(Json(OrderMutationResponse::from(outcome)))
}
