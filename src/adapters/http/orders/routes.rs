//! Axum router configuration for order endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use crate::adapters::http::state::AppState;

use super::handlers::{
    cancel_order, create_order, get_order, get_order_by_number, list_user_orders,
    process_payment, refund_order,
};

/// Create the order API router.
///
/// # Routes
///
/// - `POST /orders` - Create an order
/// - `GET /orders/:id` - Order with payment leg and transactions
/// - `GET /orders/by-number/:number` - Same, by provider-facing number
/// - `POST /orders/:id/cancel` - Cancel an unpaid or paid order
/// - `POST /orders/:id/payments` - Verify and book a client-reported purchase
/// - `POST /orders/:id/refund` - Refund through the provider and the ledger
/// - `GET /users/:user_id/orders` - Paginated orders of one user
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/by-number/:number", get(get_order_by_number))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/payments", post(process_payment))
        .route("/orders/:id/refund", post(refund_order))
        .route("/users/:user_id/orders", get(list_user_orders))
}
