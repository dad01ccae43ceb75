//! WebhookEventRepository port - Read and housekeeping access to webhook events.
//!
//! Inserts and status updates happen inside a `LedgerTx` so the dedup
//! record commits together with the order changes it caused. This port
//! covers everything outside that transaction: lookups, the retry
//! sweeper's scan and retention cleanup.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Provider, Timestamp, WebhookEventId};
use crate::domain::notification::WebhookEvent;

/// Result of a unique insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this key).
    Inserted,
    /// Record already exists (duplicate).
    AlreadyExists,
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        provider: Provider,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError>;

    /// Failed, retryable events whose `next_retry_at` has passed, oldest
    /// first.
    async fn list_due_for_retry(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<WebhookEventId>, DomainError>;

    /// Deletes processed and skipped events created before `before`.
    ///
    /// Returns the number of records deleted.
    async fn delete_before(&self, before: Timestamp) -> Result<u64, DomainError>;
}
