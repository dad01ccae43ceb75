//! ProcessPaymentHandler - Synchronous payment confirmation.
//!
//! The client reports a purchase (Google purchase token, Apple transaction
//! id, or nothing for wallet trades, which are looked up by order number).
//! Verification, acknowledgment and the ledger update share one
//! transaction: if any step fails the order is left untouched and the call
//! can simply be repeated.

use std::sync::Arc;

use tracing::info;

use crate::application::ledger::{finish, OrderLedger};
use crate::application::payment_confirmation::PaymentConfirmer;
use crate::domain::foundation::OrderId;
use crate::domain::order::{Order, OrderError, PaymentLeg};
use crate::ports::{LedgerTx, ProviderRegistry};

#[derive(Debug, Clone, Default)]
pub struct ProcessPaymentCommand {
    pub order_id: OrderId,
    pub purchase_token: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessPaymentResult {
    pub order: Order,
    pub transaction_id: String,
    pub payment_leg: PaymentLeg,

    /// False when the payment had already been booked by an earlier call or
    /// a notification, or when the subscription is not billable yet.
    pub changed: bool,
}

pub struct ProcessPaymentHandler {
    ledger: Arc<OrderLedger>,
    confirmer: Arc<PaymentConfirmer>,
    providers: Arc<ProviderRegistry>,
}

impl ProcessPaymentHandler {
    pub fn new(
        ledger: Arc<OrderLedger>,
        confirmer: Arc<PaymentConfirmer>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            ledger,
            confirmer,
            providers,
        }
    }

    pub async fn handle(&self, cmd: ProcessPaymentCommand) -> Result<ProcessPaymentResult, OrderError> {
        let mut tx = self.ledger.store().begin().await?;
        let result = self.process_in(tx.as_mut(), cmd).await;
        finish(tx, result).await
    }

    async fn process_in(
        &self,
        tx: &mut dyn LedgerTx,
        cmd: ProcessPaymentCommand,
    ) -> Result<ProcessPaymentResult, OrderError> {
        // 1. Lock the order
        let order = tx
            .lock_order(&cmd.order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(cmd.order_id.to_string()))?;

        // 2. Verify with the provider under the deadline
        let adapter = self.providers.get(order.provider)?;
        let verification = self
            .confirmer
            .verify(adapter.as_ref(), &order, cmd.purchase_token, cmd.transaction_id)
            .await?;

        // 3. Book it, acknowledging once
        let confirmation = self
            .confirmer
            .confirm_in(tx, &order, adapter.as_ref(), verification)
            .await?;

        info!(
            order_id = %order.id,
            transaction_id = %confirmation.transaction_id,
            changed = confirmation.outcome.is_changed(),
            acknowledged = confirmation.acknowledged_now,
            "Payment processed"
        );

        Ok(ProcessPaymentResult {
            changed: confirmation.outcome.is_changed(),
            order: confirmation.outcome.into_order(),
            transaction_id: confirmation.transaction_id,
            payment_leg: confirmation.leg,
        })
    }
}
