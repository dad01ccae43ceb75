//! GetOrderHandler - Query handler for one order with its leg and ledger.

use std::sync::Arc;

use crate::domain::foundation::{OrderId, OrderNumber};
use crate::domain::order::{Order, OrderError, PaymentLeg, PaymentTransaction};
use crate::ports::OrderReader;

/// How the caller identifies the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOrderQuery {
    ById(OrderId),
    ByNumber(OrderNumber),
}

/// Order with its payment leg and transactions, oldest first.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: Order,
    pub payment_leg: Option<PaymentLeg>,
    pub transactions: Vec<PaymentTransaction>,
}

pub struct GetOrderHandler {
    reader: Arc<dyn OrderReader>,
}

impl GetOrderHandler {
    pub fn new(reader: Arc<dyn OrderReader>) -> Self {
        Self { reader }
    }

    pub async fn handle(&self, query: GetOrderQuery) -> Result<OrderDetails, OrderError> {
        let order = match &query {
            GetOrderQuery::ById(id) => self.reader.find_by_id(id).await?,
            GetOrderQuery::ByNumber(number) => self.reader.find_by_number(number).await?,
        };
        let order = order.ok_or_else(|| {
            OrderError::NotFound(match query {
                GetOrderQuery::ById(id) => id.to_string(),
                GetOrderQuery::ByNumber(number) => number.to_string(),
            })
        })?;

        let payment_leg = self.reader.payment_leg(&order.id).await?;
        let transactions = self.reader.transactions(&order.id).await?;

        Ok(OrderDetails {
            order,
            payment_leg,
            transactions,
        })
    }
}
