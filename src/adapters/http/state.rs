//! Shared application state for the HTTP layer.

use std::sync::Arc;
use std::time::Duration;

use crate::application::handlers::order::{
    CancelOrderHandler, CreateOrderHandler, GetOrderHandler, ListOrdersHandler,
    ProcessPaymentHandler, RefundOrderHandler,
};
use crate::application::handlers::webhook::{PipelineStats, WebhookWorkerPool};
use crate::application::{OrderLedger, PaymentConfirmer};
use crate::ports::{OrderReader, ProviderRegistry};

/// Shared application state containing all dependencies.
///
/// Cloned for each request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<OrderLedger>,
    pub reader: Arc<dyn OrderReader>,
    pub providers: Arc<ProviderRegistry>,
    pub confirmer: Arc<PaymentConfirmer>,
    pub webhook_pool: Arc<WebhookWorkerPool>,
    pub stats: Arc<PipelineStats>,

    /// Deadline for provider calls made while serving a request.
    pub provider_timeout: Duration,
}

impl AppState {
    /// Create handlers on demand from the shared state.
    pub fn create_order_handler(&self) -> CreateOrderHandler {
        CreateOrderHandler::new(self.ledger.clone(), self.providers.clone())
    }

    pub fn get_order_handler(&self) -> GetOrderHandler {
        GetOrderHandler::new(self.reader.clone())
    }

    pub fn list_orders_handler(&self) -> ListOrdersHandler {
        ListOrdersHandler::new(self.reader.clone())
    }

    pub fn cancel_order_handler(&self) -> CancelOrderHandler {
        CancelOrderHandler::new(self.ledger.clone())
    }

    pub fn process_payment_handler(&self) -> ProcessPaymentHandler {
        ProcessPaymentHandler::new(
            self.ledger.clone(),
            self.confirmer.clone(),
            self.providers.clone(),
        )
    }

    pub fn refund_order_handler(&self) -> RefundOrderHandler {
        RefundOrderHandler::new(
            self.ledger.clone(),
            self.providers.clone(),
            self.provider_timeout,
        )
    }
}
