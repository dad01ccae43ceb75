//! Expiry of orders that were never paid.
//!
//! `ExpireStaleOrdersHandler` runs one sweep; `OrderExpiryWorker` runs it on
//! an interval until shutdown.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 60s | Time between sweeps |
//! | `batch_size` | 100 | Max orders expired per sweep |

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::application::ledger::{finish, LedgerOutcome, OrderLedger};
use crate::domain::foundation::OrderId;
use crate::domain::order::{OrderError, PaymentStatus};
use crate::ports::{LedgerTx, OrderReader};

/// Expires `created` orders whose payment deadline has passed.
pub struct ExpireStaleOrdersHandler {
    ledger: Arc<OrderLedger>,
    reader: Arc<dyn OrderReader>,
    batch_size: u32,
}

impl ExpireStaleOrdersHandler {
    pub fn new(ledger: Arc<OrderLedger>, reader: Arc<dyn OrderReader>, batch_size: u32) -> Self {
        Self {
            ledger,
            reader,
            batch_size,
        }
    }

    /// Runs one sweep and returns how many orders were expired.
    ///
    /// A failure on one order is logged and does not stop the sweep.
    pub async fn handle(&self) -> Result<usize, OrderError> {
        let now = self.ledger.now();
        let overdue = self.reader.list_overdue_unpaid(now, self.batch_size).await?;
        let mut expired = 0;

        for order_id in overdue {
            match self.expire_one(&order_id).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => warn!(order_id = %order_id, error = %e, "Failed to expire order"),
            }
        }

        if expired > 0 {
            info!(count = expired, "Expired unpaid orders");
        }
        Ok(expired)
    }

    async fn expire_one(&self, order_id: &OrderId) -> Result<bool, OrderError> {
        let mut tx = self.ledger.store().begin().await?;
        let result = self.expire_in(tx.as_mut(), order_id).await;
        finish(tx, result).await
    }

    async fn expire_in(&self, tx: &mut dyn LedgerTx, order_id: &OrderId) -> Result<bool, OrderError> {
        // The scan ran without a lock; a payment may have landed since.
        let still_overdue = tx
            .lock_order(order_id)
            .await?
            .map_or(false, |order| order.is_payment_overdue(self.ledger.now()));
        if !still_overdue {
            debug!(order_id = %order_id, "Order no longer overdue");
            return Ok(false);
        }

        let outcome = self
            .ledger
            .expire_in(tx, order_id, PaymentStatus::Expired)
            .await?;
        Ok(matches!(outcome, LedgerOutcome::Changed(_)))
    }
}

/// Configuration for the OrderExpiryWorker.
#[derive(Debug, Clone)]
pub struct OrderExpiryConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
}

impl Default for OrderExpiryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

impl OrderExpiryConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }
}

/// Background service that expires unpaid orders.
pub struct OrderExpiryWorker {
    handler: ExpireStaleOrdersHandler,
    config: OrderExpiryConfig,
}

impl OrderExpiryWorker {
    pub fn new(
        ledger: Arc<OrderLedger>,
        reader: Arc<dyn OrderReader>,
        config: OrderExpiryConfig,
    ) -> Self {
        Self {
            handler: ExpireStaleOrdersHandler::new(ledger, reader, config.batch_size),
            config,
        }
    }

    /// Runs sweeps until the shutdown signal flips to `true`.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Order expiry worker stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        error!(error = %e, "Order expiry sweep failed");
                    }
                }
            }
        }
    }

    pub async fn process_batch(&self) -> Result<usize, OrderError> {
        self.handler.handle().await
    }

    /// Run exactly one sweep (for testing).
    pub async fn poll_once(&self) -> Result<usize, OrderError> {
        self.process_batch().await
    }
}
