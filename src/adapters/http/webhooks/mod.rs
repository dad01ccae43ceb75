//! Webhook intake HTTP adapter.

mod handlers;
mod routes;

pub use handlers::notification_headers;
pub use routes::webhook_routes;
