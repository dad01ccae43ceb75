//! CreateOrderHandler - Command handler for opening a new order.

use std::sync::Arc;

use crate::application::ledger::OrderLedger;
use crate::domain::foundation::{Money, ProductId, Provider, UserId};
use crate::domain::order::{NewOrder, Order, OrderError, OrderKind};
use crate::ports::ProviderRegistry;

/// Command to create an order.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub provider: Provider,
    pub kind: OrderKind,
    pub amount: Money,
    pub developer_payload: Option<String>,
}

/// Handler for creating orders.
///
/// Rejects providers without a registered adapter, since nothing could ever
/// confirm the payment.
pub struct CreateOrderHandler {
    ledger: Arc<OrderLedger>,
    providers: Arc<ProviderRegistry>,
}

impl CreateOrderHandler {
    pub fn new(ledger: Arc<OrderLedger>, providers: Arc<ProviderRegistry>) -> Self {
        Self { ledger, providers }
    }

    pub async fn handle(&self, cmd: CreateOrderCommand) -> Result<Order, OrderError> {
        if !self.providers.contains(cmd.provider) {
            return Err(OrderError::ProviderNotConfigured(cmd.provider));
        }

        self.ledger
            .create_order(NewOrder {
                user_id: cmd.user_id,
                product_id: cmd.product_id,
                provider: cmd.provider,
                kind: cmd.kind,
                amount: cmd.amount,
                developer_payload: cmd.developer_payload,
            })
            .await
    }
}
