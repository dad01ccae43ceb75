//! Bounded worker pool between the HTTP intake and the processor.
//!
//! Intake authenticates, calls `submit` and answers the provider right away.
//! `submit` never waits: a full queue is `WebhookError::QueueFull`, which the
//! HTTP layer turns into a 503 so the provider redelivers later.
//!
//! `shutdown` closes the queue and waits for the workers to drain what was
//! already accepted.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::foundation::Provider;
use crate::domain::notification::WebhookError;

use super::processor::WebhookProcessor;

/// One authenticated payload waiting for a worker.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub provider: Provider,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1024,
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

pub struct WebhookWorkerPool {
    sender: Mutex<Option<mpsc::Sender<WebhookJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl WebhookWorkerPool {
    /// Spawns the workers. Must be called inside a tokio runtime.
    pub fn start(processor: Arc<WebhookProcessor>, config: WorkerPoolConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.worker_count.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let processor = Arc::clone(&processor);
                tokio::spawn(async move { work(worker, receiver, processor).await })
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            queue_capacity = capacity,
            "Webhook worker pool started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            capacity,
        }
    }

    /// Queues a payload without waiting.
    pub fn submit(&self, provider: Provider, payload: Vec<u8>) -> Result<(), WebhookError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(WebhookError::QueueFull)?;

        match sender.try_send(WebhookJob { provider, payload }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!(provider = %job.provider, "Webhook queue full, rejecting delivery");
                Err(WebhookError::QueueFull)
            }
            Err(TrySendError::Closed(job)) => {
                warn!(provider = %job.provider, "Webhook queue closed, rejecting delivery");
                Err(WebhookError::QueueFull)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, |sender| self.capacity - sender.capacity())
    }

    /// Stops accepting jobs and waits until every accepted job is processed.
    pub async fn shutdown(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));

        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Webhook worker ended abnormally");
            }
        }
        info!("Webhook worker pool stopped");
    }
}

async fn work(
    worker: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<WebhookJob>>>,
    processor: Arc<WebhookProcessor>,
) {
    loop {
        // The lock is held only while waiting for the next job.
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker, "Webhook worker exiting");
            return;
        };

        let outcome = processor.process(job.provider, &job.payload).await;
        debug!(worker, provider = %job.provider, outcome = ?outcome, "Webhook job done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::{FixedClock, SequentialIdGenerator};
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::adapters::providers::mock_registry;
    use crate::application::handlers::webhook::ReconcileDispatcher;
    use crate::application::ledger::OrderLedger;
    use crate::application::payment_confirmation::PaymentConfirmer;
    use crate::domain::foundation::Timestamp;
    use crate::domain::notification::RetryPolicy;
    use std::time::Duration;

    fn processor(store: &InMemoryLedgerStore) -> Arc<WebhookProcessor> {
        let clock = Arc::new(FixedClock::new(Timestamp::now()));
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
        let providers = Arc::new(mock_registry(&[Provider::Alipay]));
        let dispatcher = ReconcileDispatcher::new(ledger, confirmer, providers, clock.clone());
        Arc::new(WebhookProcessor::new(
            Arc::new(store.clone()),
            dispatcher,
            clock,
            ids,
            RetryPolicy::default(),
        ))
    }

    // ══════════════════════════════════════════════════════════════
    // Queueing
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn shutdown_drains_accepted_jobs() {
        let store = InMemoryLedgerStore::new();
        let processor = processor(&store);
        let pool = WebhookWorkerPool::start(
            processor.clone(),
            WorkerPoolConfig::default().with_worker_count(2),
        );

        for n in 0..5 {
            let payload = format!("notify_id=n-{}&out_trade_no=ORD9&trade_status=TRADE_SUCCESS", n);
            pool.submit(Provider::Alipay, payload.into_bytes()).unwrap();
        }
        pool.shutdown().await;

        assert_eq!(processor.stats().snapshot().received, 5);
        assert_eq!(store.webhook_events().await.len(), 5);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let store = InMemoryLedgerStore::new();
        let processor = processor(&store);

        // Hold the store so the single worker blocks on its first job.
        let held = crate::ports::LedgerStore::begin(&store).await.unwrap();
        let pool = WebhookWorkerPool::start(
            processor,
            WorkerPoolConfig::default()
                .with_worker_count(1)
                .with_queue_capacity(1),
        );

        pool.submit(Provider::Alipay, b"notify_id=a".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.submit(Provider::Alipay, b"notify_id=b".to_vec()).unwrap();

        let err = pool
            .submit(Provider::Alipay, b"notify_id=c".to_vec())
            .unwrap_err();
        assert_eq!(err, WebhookError::QueueFull);
        assert_eq!(pool.queued(), 1);

        drop(held);
        pool.shutdown().await;
        assert_eq!(store.webhook_events().await.len(), 2);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let pool = WebhookWorkerPool::start(processor(&store), WorkerPoolConfig::default());
        pool.shutdown().await;

        assert_eq!(
            pool.submit(Provider::Alipay, b"notify_id=a".to_vec()),
            Err(WebhookError::QueueFull)
        );
    }
}
