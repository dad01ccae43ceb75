//! CancelOrderHandler - Command handler for caller-initiated cancellation.

use std::sync::Arc;

use crate::application::ledger::{LedgerOutcome, OrderLedger};
use crate::domain::foundation::OrderId;
use crate::domain::order::OrderError;

/// Reason recorded when the caller gives none.
pub const DEFAULT_CANCEL_REASON: &str = "user-cancelled";

#[derive(Debug, Clone)]
pub struct CancelOrderCommand {
    pub order_id: OrderId,
    pub reason: Option<String>,
}

pub struct CancelOrderHandler {
    ledger: Arc<OrderLedger>,
}

impl CancelOrderHandler {
    pub fn new(ledger: Arc<OrderLedger>) -> Self {
        Self { ledger }
    }

    pub async fn handle(&self, cmd: CancelOrderCommand) -> Result<LedgerOutcome, OrderError> {
        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_CANCEL_REASON);
        self.ledger.cancel(&cmd.order_id, reason).await
    }
}
