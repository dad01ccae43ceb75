//! Axum router configuration for provider notifications.

use axum::{routing::post, Router};

use crate::adapters::http::state::AppState;

use super::handlers::{
    alipay_notification, apple_notification, google_notification, wechat_notification,
};

/// Create the webhook router.
///
/// No caller authentication; each adapter checks its provider's signature.
///
/// # Routes
/// - `POST /webhooks/google` - Google Play RTDN via Pub/Sub push
/// - `POST /webhooks/apple` - App Store Server Notifications v2
/// - `POST /webhooks/alipay` - Alipay async notify (form body)
/// - `POST /webhooks/wechat` - WeChat Pay v3 notify (encrypted resource)
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks/google", post(google_notification))
        .route("/webhooks/apple", post(apple_notification))
        .route("/webhooks/alipay", post(alipay_notification))
        .route("/webhooks/wechat", post(wechat_notification))
}
