//! Order handlers.
//!
//! ## Commands
//! - Creating orders
//! - Confirming a client-reported payment
//! - Cancelling and refunding orders
//! - Expiring unpaid orders (one-shot and background worker)
//!
//! ## Queries
//! - Get one order with its payment leg and transactions
//! - List a user's orders

mod cancel_order;
mod create_order;
mod expire_stale_orders;
mod get_order;
mod list_orders;
mod process_payment;
mod refund_order;

// Commands
pub use cancel_order::{CancelOrderCommand, CancelOrderHandler, DEFAULT_CANCEL_REASON};
pub use create_order::{CreateOrderCommand, CreateOrderHandler};
pub use expire_stale_orders::{ExpireStaleOrdersHandler, OrderExpiryConfig, OrderExpiryWorker};
pub use process_payment::{ProcessPaymentCommand, ProcessPaymentHandler, ProcessPaymentResult};
pub use refund_order::{refund_id_for, RefundOrderCommand, RefundOrderHandler};

// Queries
pub use get_order::{GetOrderHandler, GetOrderQuery, OrderDetails};
pub use list_orders::{ListOrdersHandler, ListOrdersQuery};
