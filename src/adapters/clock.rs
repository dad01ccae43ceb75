//! Clock and identifier adapters.
//!
//! `SystemClock` and `UuidIdGenerator` run in production. `FixedClock` and
//! `SequentialIdGenerator` give tests fully deterministic timestamps, order
//! numbers and event ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Duration;
use uuid::Uuid;

use crate::domain::foundation::{
    OrderId, OrderNumber, Provider, Timestamp, ValidationError, WebhookEventId,
};
use crate::ports::{Clock, IdGenerator};

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Random v4 ids. Order numbers are `<yyyyMMddHHmmss><8 hex>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn order_id(&self) -> OrderId {
        OrderId::new()
    }

    fn order_number(&self, now: Timestamp) -> Result<OrderNumber, ValidationError> {
        let suffix = Uuid::new_v4().simple().to_string();
        OrderNumber::new(format!("{}{}", now.compact(), &suffix[..8]))
    }

    fn webhook_event_id(&self) -> WebhookEventId {
        WebhookEventId::new()
    }

    fn fallback_event_id(&self, provider: Provider) -> String {
        format!("{}:unparsed:{}", provider, Uuid::new_v4())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.plus(by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counter-based ids: `ORD0000000001`, `<provider>:unparsed:1`, ...
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn order_id(&self) -> OrderId {
        OrderId::from_uuid(Uuid::from_u128(u128::from(self.bump())))
    }

    fn order_number(&self, _now: Timestamp) -> Result<OrderNumber, ValidationError> {
        OrderNumber::new(format!("ORD{:010}", self.bump()))
    }

    fn webhook_event_id(&self) -> WebhookEventId {
        WebhookEventId::from_uuid(Uuid::from_u128(u128::from(self.bump()) << 64))
    }

    fn fallback_event_id(&self, provider: Provider) -> String {
        format!("{}:unparsed:{}", provider, self.bump())
    }
}
