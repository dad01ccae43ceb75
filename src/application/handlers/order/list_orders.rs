//! ListOrdersHandler - Query handler for a user's orders, newest first.

use std::sync::Arc;

use crate::domain::foundation::{Page, PageRequest, UserId};
use crate::domain::order::{Order, OrderError};
use crate::ports::OrderReader;

#[derive(Debug, Clone)]
pub struct ListOrdersQuery {
    pub user_id: UserId,
    pub page: PageRequest,
}

pub struct ListOrdersHandler {
    reader: Arc<dyn OrderReader>,
}

impl ListOrdersHandler {
    pub fn new(reader: Arc<dyn OrderReader>) -> Self {
        Self { reader }
    }

    pub async fn handle(&self, query: ListOrdersQuery) -> Result<Page<Order>, OrderError> {
        Ok(self.reader.list_by_user(&query.user_id, query.page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::{FixedClock, SequentialIdGenerator};
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::application::ledger::OrderLedger;
    use crate::domain::foundation::{Currency, Money, ProductId, Provider, Timestamp};
    use crate::domain::order::{NewOrder, OrderKind};

    #[tokio::test]
    async fn pages_through_user_orders() {
        let store = InMemoryLedgerStore::new();
        let clock = Arc::new(FixedClock::new(Timestamp::now()));
        let ledger = OrderLedger::new(
            Arc::new(store.clone()),
            clock.clone(),
            Arc::new(SequentialIdGenerator::new()),
            chrono::Duration::minutes(30),
        );
        for user in ["alice", "alice", "alice", "bob"] {
            ledger
                .create_order(NewOrder {
                    user_id: UserId::new(user).unwrap(),
                    product_id: ProductId::new("gems_100").unwrap(),
                    provider: Provider::Alipay,
                    kind: OrderKind::Purchase,
                    amount: Money::new(600, Currency::new("CNY").unwrap()).unwrap(),
                    developer_payload: None,
                })
                .await
                .unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }

        let handler = ListOrdersHandler::new(Arc::new(store));
        let page = handler
            .handle(ListOrdersQuery {
                user_id: UserId::new("alice").unwrap(),
                page: PageRequest::new(1, 2).unwrap(),
            })
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_pages(), 2);
        assert!(page.items[0].created_at > page.items[1].created_at);
    }
}
