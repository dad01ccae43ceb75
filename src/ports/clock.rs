//! Time and identifier sources.
//!
//! Injected wherever a timestamp or a new identifier is produced, so tests
//! can pin both.

use crate::domain::foundation::{
    OrderId, OrderNumber, Provider, Timestamp, ValidationError, WebhookEventId,
};

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub trait IdGenerator: Send + Sync {
    fn order_id(&self) -> OrderId;

    /// Provider-facing order number, unique system-wide.
    fn order_number(&self, now: Timestamp) -> Result<OrderNumber, ValidationError>;

    fn webhook_event_id(&self) -> WebhookEventId;

    /// Id for a payload whose provider event id could not be read.
    fn fallback_event_id(&self, provider: Provider) -> String;
}
