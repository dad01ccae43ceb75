//! HTTP adapters - REST API and webhook intake.
//!
//! - `orders` - Order commands and queries
//! - `webhooks` - Provider notification intake
//! - `router` - Route assembly, health and tower-http layers

pub mod error;
pub mod orders;
pub mod router;
pub mod state;
pub mod webhooks;

// Re-export key types for convenience
pub use error::{ApiError, ErrorResponse};
pub use router::{app_router, RouterOptions};
pub use state::AppState;
