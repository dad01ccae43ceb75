//! HTTP handlers for provider notifications.
//!
//! Intake only authenticates and queues. The provider gets its
//! acknowledgment as soon as the payload is on the worker queue; whatever
//! reconciliation does later is recorded on the webhook event instead.
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | queued | 200 | provider-specific ack |
//! | bad signature | 401 | provider-specific failure |
//! | queue full, adapter timeout | 503 | provider-specific failure |

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, warn};

use crate::adapters::http::state::AppState;
use crate::application::provider_call::with_deadline;
use crate::domain::foundation::Provider;
use crate::domain::notification::WebhookError;
use crate::ports::NotificationHeaders;

/// POST /webhooks/google
pub async fn google_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, Provider::GooglePlay, &headers, &body).await
}

/// POST /webhooks/apple
pub async fn apple_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, Provider::AppStore, &headers, &body).await
}

/// POST /webhooks/alipay
pub async fn alipay_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, Provider::Alipay, &headers, &body).await
}

/// POST /webhooks/wechat
pub async fn wechat_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(&state, Provider::WechatPay, &headers, &body).await
}

async fn receive(state: &AppState, provider: Provider, headers: &HeaderMap, body: &[u8]) -> Response {
    match authenticate_and_queue(state, provider, headers, body).await {
        Ok(()) => {
            debug!(provider = %provider, bytes = body.len(), "Webhook queued");
            accepted(provider)
        }
        Err(err) => {
            warn!(provider = %provider, error = %err, "Webhook rejected at intake");
            let status = err.status_code();
            if status == StatusCode::OK {
                accepted(provider)
            } else {
                rejected(provider, status, &err)
            }
        }
    }
}

async fn authenticate_and_queue(
    state: &AppState,
    provider: Provider,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), WebhookError> {
    let adapter = state.providers.get(provider)?;
    let headers = notification_headers(headers);

    let payload = with_deadline(
        provider,
        "open_notification",
        state.provider_timeout,
        adapter.open_notification(body, &headers),
    )
    .await?;

    state.webhook_pool.submit(provider, payload)
}

/// Request headers with lowercased names. Values that are not valid UTF-8
/// are dropped.
pub fn notification_headers(headers: &HeaderMap) -> NotificationHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect::<HashMap<_, _>>()
}

fn accepted(provider: Provider) -> Response {
    match provider {
        Provider::Alipay => (StatusCode::OK, "success").into_response(),
        Provider::WechatPay => (
            StatusCode::OK,
            Json(json!({ "code": "SUCCESS", "message": "OK" })),
        )
            .into_response(),
        Provider::GooglePlay | Provider::AppStore => {
            (StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response()
        }
    }
}

fn rejected(provider: Provider, status: StatusCode, err: &WebhookError) -> Response {
    match provider {
        Provider::Alipay => (status, "fail").into_response(),
        Provider::WechatPay => (
            status,
            Json(json!({ "code": "FAIL", "message": err.to_string() })),
        )
            .into_response(),
        Provider::GooglePlay | Provider::AppStore => (
            status,
            Json(json!({ "status": "rejected", "error": err.to_string() })),
        )
            .into_response(),
    }
}
