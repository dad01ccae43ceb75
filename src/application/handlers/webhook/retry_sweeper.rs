//! RetrySweeper - Background replay of failed webhook events.
//!
//! Each sweep replays failed, retryable events whose `next_retry_at` has
//! passed, then purges processed and skipped events older than the
//! retention window. Failed events are never purged.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 30s | Time between sweeps |
//! | `batch_size` | 50 | Max events replayed per sweep |
//! | `retention_days` | 30 | Age after which finished events are deleted |

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

use crate::domain::notification::WebhookError;
use crate::ports::{Clock, WebhookEventRepository};

use super::processor::{WebhookOutcome, WebhookProcessor};

#[derive(Debug, Clone)]
pub struct RetrySweeperConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub retention_days: i64,
}

impl Default for RetrySweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 50,
            retention_days: 30,
        }
    }
}

impl RetrySweeperConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub replayed: usize,
    pub recovered: usize,
    pub still_failing: usize,
    pub purged: u64,
}

pub struct RetrySweeper {
    events: Arc<dyn WebhookEventRepository>,
    processor: Arc<WebhookProcessor>,
    clock: Arc<dyn Clock>,
    config: RetrySweeperConfig,
}

impl RetrySweeper {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        processor: Arc<WebhookProcessor>,
        clock: Arc<dyn Clock>,
        config: RetrySweeperConfig,
    ) -> Self {
        Self {
            events,
            processor,
            clock,
            config,
        }
    }

    /// Sweeps until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Retry sweeper stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        error!(error = %e, "Webhook retry sweep failed");
                    }
                }
            }
        }
    }

    pub async fn process_batch(&self) -> Result<SweepReport, WebhookError> {
        let now = self.clock.now();
        let due = self
            .events
            .list_due_for_retry(now, self.config.batch_size)
            .await?;
        let mut report = SweepReport::default();

        for id in due {
            // Errors here mean the failure itself could not be recorded;
            // the event stays due and the next sweep picks it up again.
            match self.processor.replay(&id).await {
                Ok(WebhookOutcome::Processed(_)) | Ok(WebhookOutcome::Skipped(_)) => {
                    report.replayed += 1;
                    report.recovered += 1;
                }
                Ok(WebhookOutcome::Failed(_)) => {
                    report.replayed += 1;
                    report.still_failing += 1;
                }
                Ok(WebhookOutcome::AlreadyProcessed) => {}
                Err(e) => warn!(webhook_event_id = %id, error = %e, "Webhook replay failed"),
            }
        }

        report.purged = self
            .events
            .delete_before(now.minus_days(self.config.retention_days))
            .await?;

        if report.replayed > 0 || report.purged > 0 {
            info!(
                replayed = report.replayed,
                recovered = report.recovered,
                still_failing = report.still_failing,
                purged = report.purged,
                "Webhook retry sweep finished"
            );
        }
        Ok(report)
    }

    /// Run exactly one sweep (for testing).
    pub async fn poll_once(&self) -> Result<SweepReport, WebhookError> {
        self.process_batch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::{FixedClock, SequentialIdGenerator};
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::adapters::providers::MockPaymentProvider;
    use crate::application::handlers::webhook::ReconcileDispatcher;
    use crate::application::ledger::OrderLedger;
    use crate::application::payment_confirmation::PaymentConfirmer;
    use crate::domain::foundation::{
        Currency, Money, ProductId, Provider, Timestamp, UserId,
    };
    use crate::domain::notification::{RetryPolicy, WebhookStatus};
    use crate::domain::order::{NewOrder, OrderKind, OrderStatus, PaymentLeg};
    use crate::ports::{OrderReader, PaymentError, ProviderRegistry};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    struct Fixture {
        store: InMemoryLedgerStore,
        clock: Arc<FixedClock>,
        ledger: Arc<OrderLedger>,
        google: MockPaymentProvider,
        processor: Arc<WebhookProcessor>,
        sweeper: RetrySweeper,
    }

    fn fixture() -> Fixture {
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
        let confirmer = Arc::new(PaymentConfirmer::new(
            ledger.clone(),
            clock.clone(),
            Duration::from_millis(200),
        ));
        let google = MockPaymentProvider::approving(Provider::GooglePlay);
        let providers = Arc::new(ProviderRegistry::new().with(Arc::new(google.clone())));
        let dispatcher =
            ReconcileDispatcher::new(ledger.clone(), confirmer, providers, clock.clone());
        let processor = Arc::new(WebhookProcessor::new(
            Arc::new(store.clone()),
            dispatcher,
            clock.clone(),
            ids,
            RetryPolicy::new(2, 30, 600),
        ));
        let sweeper = RetrySweeper::new(
            Arc::new(store.clone()),
            processor.clone(),
            clock.clone(),
            RetrySweeperConfig::default().with_retention_days(7),
        );
        Fixture {
            store,
            clock,
            ledger,
            google,
            processor,
            sweeper,
        }
    }

    async fn google_order_with_token(f: &Fixture, token: &str) -> crate::domain::order::Order {
        let order = f
            .ledger
            .create_order(NewOrder {
                user_id: UserId::new("user-1").unwrap(),
                product_id: ProductId::new("gems_100").unwrap(),
                provider: Provider::GooglePlay,
                kind: OrderKind::Purchase,
                amount: Money::new(199, Currency::new("USD").unwrap()).unwrap(),
                developer_payload: None,
            })
            .await
            .unwrap();
        let mut leg = PaymentLeg::new(order.id, Provider::GooglePlay, "PENDING", f.clock.now());
        leg.purchase_token = Some(token.to_string());
        f.ledger.record_leg(&leg).await.unwrap();
        order
    }

    fn purchase_push(message_id: &str, token: &str) -> Vec<u8> {
        let inner = serde_json::json!({
            "oneTimeProductNotification": {
                "notificationType": 1,
                "purchaseToken": token,
                "sku": "gems_100"
            }
        });
        serde_json::to_vec(&serde_json::json!({
            "message": { "messageId": message_id, "data": STANDARD.encode(inner.to_string()) }
        }))
        .unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Replay
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn due_event_is_replayed_and_recovers() {
        let f = fixture();
        let order = google_order_with_token(&f, "T1").await;
        f.google
            .set_method_error("verify", PaymentError::network("connection reset"));
        f.processor
            .process(Provider::GooglePlay, &purchase_push("m-1", "T1"))
            .await;

        // Not due yet.
        assert_eq!(f.sweeper.poll_once().await.unwrap().replayed, 0);

        f.google.clear_errors();
        f.clock.advance(chrono::Duration::seconds(30));
        let report = f.sweeper.poll_once().await.unwrap();
        assert_eq!(report.recovered, 1);

        let stored = f.store.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn retries_stop_after_budget() {
        let f = fixture();
        google_order_with_token(&f, "T2").await;
        f.google
            .set_method_error("verify", PaymentError::network("connection reset"));
        f.processor
            .process(Provider::GooglePlay, &purchase_push("m-2", "T2"))
            .await;

        for _ in 0..4 {
            f.clock.advance(chrono::Duration::minutes(10));
            f.sweeper.poll_once().await.unwrap();
        }

        let events = f.store.webhook_events().await;
        assert_eq!(events[0].status, WebhookStatus::Failed);
        assert_eq!(events[0].retry_count, 2);
        assert!(!events[0].retryable);
        assert_eq!(f.google.call_count("verify"), 3);
    }

    // ══════════════════════════════════════════════════════════════
    // Retention
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn purges_old_finished_events_but_keeps_failures() {
        let f = fixture();
        let test_push = serde_json::to_vec(&serde_json::json!({
            "message": {
                "messageId": "m-test",
                "data": STANDARD.encode(r#"{"testNotification":{"version":"1.0"}}"#)
            }
        }))
        .unwrap();
        f.processor.process(Provider::GooglePlay, &test_push).await;
        f.processor.process(Provider::GooglePlay, b"not json").await;

        f.clock.advance(chrono::Duration::days(8));
        let report = f.sweeper.poll_once().await.unwrap();

        assert_eq!(report.purged, 1);
        let events = f.store.webhook_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, WebhookStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown_signal() {
        let f = fixture();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { f.sweeper.run(rx).await });
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        assert!(handle.await.is_ok());
    }
}
