//! Integration tests for the HTTP router.
//!
//! Drives the assembled axum application with `oneshot` requests against
//! the in-memory ledger store and mock providers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use paysync::adapters::http::{app_router, AppState, RouterOptions};
use paysync::adapters::providers::MockPaymentProvider;
use paysync::adapters::{FixedClock, InMemoryLedgerStore, SequentialIdGenerator};
use paysync::application::handlers::webhook::{
    ReconcileDispatcher, WebhookProcessor, WebhookWorkerPool, WorkerPoolConfig,
};
use paysync::application::{OrderLedger, PaymentConfirmer};
use paysync::domain::foundation::{Provider, Timestamp};
use paysync::domain::notification::RetryPolicy;
use paysync::ports::ProviderRegistry;

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    pool: Arc<WebhookWorkerPool>,
}

fn test_app() -> TestApp {
    let store = InMemoryLedgerStore::new();
    let clock = Arc::new(FixedClock::new(
        Timestamp::from_unix_millis(1_750_000_000_000).unwrap(),
    ));
    let ids = Arc::new(SequentialIdGenerator::new());
    let ledger = Arc::new(OrderLedger::new(
        Arc::new(store.clone()),
        clock.clone(),
        ids.clone(),
        chrono::Duration::minutes(30),
    ));
    let provider_timeout = Duration::from_millis(200);
    let confirmer = Arc::new(PaymentConfirmer::new(
        ledger.clone(),
        clock.clone(),
        provider_timeout,
    ));
    let providers = Arc::new(
        ProviderRegistry::new()
            .with(Arc::new(MockPaymentProvider::approving(Provider::Alipay)))
            .with(Arc::new(MockPaymentProvider::rejecting_notifications(
                Provider::WechatPay,
            ))),
    );
    let dispatcher = ReconcileDispatcher::new(
        ledger.clone(),
        confirmer.clone(),
        providers.clone(),
        clock.clone(),
    );
    let processor = Arc::new(WebhookProcessor::new(
        Arc::new(store.clone()),
        dispatcher,
        clock,
        ids,
        RetryPolicy::new(3, 30, 600),
    ));
    let pool = Arc::new(WebhookWorkerPool::start(
        processor.clone(),
        WorkerPoolConfig::default().with_worker_count(2),
    ));

    let state = AppState {
        ledger,
        reader: Arc::new(store),
        providers,
        confirmer,
        webhook_pool: pool.clone(),
        stats: processor.stats().clone(),
        provider_timeout,
    };

    TestApp {
        router: app_router(state, &RouterOptions::default()),
        pool,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_alipay_order(app: &TestApp) -> Value {
    let response = send(
        app,
        post_json(
            "/orders",
            json!({
                "user_id": "user-1",
                "product_id": "gems_100",
                "provider": "alipay",
                "amount": 2999,
                "currency": "CNY"
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn create_then_fetch_order() {
    let app = test_app();
    let created = create_alipay_order(&app).await;
    assert_eq!(created["status"], "created");
    assert_eq!(created["payment_status"], "pending");
    assert_eq!(created["display_amount"], "29.99");

    let id = created["id"].as_str().unwrap();
    let response = send(&app, get(&format!("/orders/{}", id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let details = json_body(response).await;
    assert_eq!(details["order_number"], created["order_number"]);

    let number = created["order_number"].as_str().unwrap();
    let response = send(&app, get(&format!("/orders/by-number/{}", number))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_order_id_is_a_validation_error() {
    let app = test_app();
    let response = send(&app, get("/orders/not-a-uuid")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error_code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = test_app();
    let response = send(
        &app,
        get("/orders/00000000-0000-4000-8000-000000000000"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error_code"], "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn unknown_or_unregistered_provider_is_rejected() {
    let app = test_app();

    let response = send(
        &app,
        post_json(
            "/orders",
            json!({
                "user_id": "user-1", "product_id": "p", "provider": "paypal",
                "amount": 100, "currency": "USD"
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        post_json(
            "/orders",
            json!({
                "user_id": "user-1", "product_id": "p", "provider": "google_play",
                "amount": 100, "currency": "USD"
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(response).await["error_code"],
        "PROVIDER_NOT_CONFIGURED"
    );
}

#[tokio::test]
async fn paid_order_can_be_cancelled() {
    let app = test_app();
    let created = create_alipay_order(&app).await;
    let id = created["id"].as_str().unwrap();

    let response = send(&app, post_json(&format!("/orders/{}/payments", id), json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let paid = json_body(response).await;
    assert_eq!(paid["order"]["status"], "paid");
    assert_eq!(paid["changed"], true);

    let response = send(
        &app,
        post_json(&format!("/orders/{}/cancel", id), json!({ "reason": "fraud review" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["order"]["status"], "cancelled");
    assert_eq!(body["changed"], true);
}

#[tokio::test]
async fn refunded_order_cannot_be_cancelled() {
    let app = test_app();
    let created = create_alipay_order(&app).await;
    let id = created["id"].as_str().unwrap();

    let response = send(&app, post_json(&format!("/orders/{}/payments", id), json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&app, post_json(&format!("/orders/{}/refund", id), json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["order"]["status"], "refunded");

    let response = send(
        &app,
        post_json(&format!("/orders/{}/cancel", id), json!({ "reason": "too late" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "ILLEGAL_TRANSITION");
    assert_eq!(body["details"]["status"], "refunded");
}

#[tokio::test]
async fn user_orders_listing_reports_pagination() {
    let app = test_app();
    for _ in 0..3 {
        create_alipay_order(&app).await;
    }

    let response = send(&app, get("/users/user-1/orders?page=2&per_page=2")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn alipay_notification_is_acknowledged_and_applied() {
    let app = test_app();
    let created = create_alipay_order(&app).await;
    let number = created["order_number"].as_str().unwrap();

    let form = format!(
        "notify_id=n-1&out_trade_no={}&trade_no=2025061522001&trade_status=TRADE_SUCCESS&total_amount=29.99",
        number
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/alipay")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"success");

    app.pool.shutdown().await;

    let response = send(&app, get(&format!("/orders/by-number/{}", number))).await;
    let details = json_body(response).await;
    assert_eq!(details["status"], "paid");

    let health = json_body(send(&app, get("/health")).await).await;
    assert_eq!(health["webhooks"]["processed"], 1);
}

#[tokio::test]
async fn bad_wechat_signature_answers_401_in_wechat_format() {
    let app = test_app();
    let response = send(&app, post_json("/webhooks/wechat", json!({ "id": "evt-1" }))).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "FAIL");
}

#[tokio::test]
async fn notification_for_unregistered_provider_asks_for_redelivery() {
    let app = test_app();
    let response = send(&app, post_json("/webhooks/google", json!({ "message": {} }))).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], "rejected");
}

#[tokio::test]
async fn health_lists_registered_providers() {
    let app = test_app();
    let response = send(&app, get("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(body["queue_capacity"], 1024);
}
