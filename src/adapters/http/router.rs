//! Application router: order and webhook routes, health, and the tower-http
//! layers shared by all of them.

use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::handlers::webhook::PipelineStatsSnapshot;

use super::orders::order_routes;
use super::state::AppState;
use super::webhooks::webhook_routes;

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub request_timeout: Duration,

    /// Allowed CORS origins; empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub webhooks: PipelineStatsSnapshot,
    pub queued: usize,
    pub queue_capacity: usize,
    pub providers: Vec<String>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        webhooks: state.stats.snapshot(),
        queued: state.webhook_pool.queued(),
        queue_capacity: state.webhook_pool.capacity(),
        providers: state
            .providers
            .providers()
            .into_iter()
            .map(|p| p.to_string())
            .collect(),
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let allowed = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Builds the complete HTTP application.
pub fn app_router(state: AppState, options: &RouterOptions) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(order_routes())
        .merge(webhook_routes())
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(cors_layer(&options.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
