//! RefundOrderHandler - Provider refund followed by the ledger refund.
//!
//! Only wallet providers refund through their API; app store refunds arrive
//! as notifications. The provider call and the ledger write share one
//! transaction, and the refund id is derived from the order number so a
//! retried request (or the provider's later refund notification) lands on
//! the same refund.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::application::ledger::{finish, LedgerOutcome, OrderLedger, RefundRecord};
use crate::application::provider_call::with_deadline;
use crate::domain::foundation::{Money, OrderId, OrderNumber, ValidationError};
use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::ports::{LedgerTx, ProviderRegistry, RefundRequest};

/// Refund id used for every refund of `order_number`.
pub fn refund_id_for(order_number: &OrderNumber) -> String {
    format!("{}-refund", order_number)
}

#[derive(Debug, Clone)]
pub struct RefundOrderCommand {
    pub order_id: OrderId,

    /// Minor units; the full order amount when absent.
    pub amount: Option<i64>,

    pub reason: Option<String>,
}

pub struct RefundOrderHandler {
    ledger: Arc<OrderLedger>,
    providers: Arc<ProviderRegistry>,
    provider_timeout: std::time::Duration,
}

impl RefundOrderHandler {
    pub fn new(
        ledger: Arc<OrderLedger>,
        providers: Arc<ProviderRegistry>,
        provider_timeout: std::time::Duration,
    ) -> Self {
        Self {
            ledger,
            providers,
            provider_timeout,
        }
    }

    pub async fn handle(&self, cmd: RefundOrderCommand) -> Result<LedgerOutcome, OrderError> {
        let mut tx = self.ledger.store().begin().await?;
        let result = self.refund_in(tx.as_mut(), cmd).await;
        finish(tx, result).await
    }

    async fn refund_in(
        &self,
        tx: &mut dyn LedgerTx,
        cmd: RefundOrderCommand,
    ) -> Result<LedgerOutcome, OrderError> {
        // 1. Lock and check the order before calling out
        let order = tx
            .lock_order(&cmd.order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(cmd.order_id.to_string()))?;

        let refund_id = refund_id_for(&order.order_number);
        if order.status == OrderStatus::Refunded {
            // Replays resolve in the ledger without a second provider call.
            return self.book(tx, &order, refund_id, 0, cmd.reason, json!({})).await;
        }

        let adapter = self.providers.get(order.provider)?;
        if !adapter.capabilities().refund {
            return Err(OrderError::Unsupported {
                provider: order.provider,
                operation: "refund",
            });
        }
        if order.status != OrderStatus::Paid {
            return Err(OrderError::illegal(order.id, order.status, "refund"));
        }

        let amount = cmd.amount.unwrap_or_else(|| order.amount.amount());
        if amount <= 0 || amount > order.amount.amount() {
            return Err(
                ValidationError::out_of_range("amount", 1, order.amount.amount(), amount).into(),
            );
        }
        let refund_amount = Money::new(amount, order.amount.currency().clone())?;

        // 2. Refund at the provider
        let leg = tx.find_payment_leg(&order.id).await?;
        let request = RefundRequest {
            provider: order.provider,
            order_number: order.order_number.clone(),
            transaction_id: leg.as_ref().and_then(|l| l.provider_transaction_id.clone()),
            refund_id: refund_id.clone(),
            amount: refund_amount,
            total: order.amount.clone(),
            reason: cmd.reason.clone(),
        };
        let result = with_deadline(
            order.provider,
            "refund",
            self.provider_timeout,
            adapter.refund(request),
        )
        .await?;

        info!(
            order_id = %order.id,
            refund_id = %result.refund_id,
            amount = result.amount.amount(),
            "Provider accepted refund"
        );

        // 3. Book it and mirror the status on the leg
        let outcome = self
            .book(tx, &order, refund_id, amount, cmd.reason, result.raw)
            .await?;
        if let Some(mut leg) = leg {
            leg.set_raw_status("REFUNDED", self.ledger.now());
            self.ledger.record_leg_in(tx, &leg).await?;
        }
        Ok(outcome)
    }

    async fn book(
        &self,
        tx: &mut dyn LedgerTx,
        order: &Order,
        refund_id: String,
        amount: i64,
        reason: Option<String>,
        provider_data: serde_json::Value,
    ) -> Result<LedgerOutcome, OrderError> {
        self.ledger
            .refund_in(
                tx,
                &order.id,
                RefundRecord {
                    refund_id,
                    amount,
                    reason,
                    provider_data,
                },
            )
            .await
    }
}
