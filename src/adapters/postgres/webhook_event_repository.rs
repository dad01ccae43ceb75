//! PostgreSQL implementation of WebhookEventRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, Provider, Timestamp, WebhookEventId};
use crate::domain::notification::WebhookEvent;
use crate::ports::WebhookEventRepository;

use super::rows::{db_error, WebhookEventRow, EVENT_COLUMNS};

/// PostgreSQL implementation of the WebhookEventRepository port.
#[derive(Clone)]
pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        provider: Provider,
        event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        let sql = format!(
            "SELECT {} FROM webhook_events WHERE provider = $1 AND event_id = $2",
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, WebhookEventRow>(&sql)
            .bind(provider.as_str())
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch webhook event", e))?
            .map(WebhookEvent::try_from)
            .transpose()
    }

    async fn list_due_for_retry(
        &self,
        now: Timestamp,
        limit: u32,
    ) -> Result<Vec<WebhookEventId>, DomainError> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM webhook_events
            WHERE status = 'failed'
              AND retryable = TRUE
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to scan webhook retries", e))?;

        Ok(ids.into_iter().map(WebhookEventId::from_uuid).collect())
    }

    async fn delete_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_events
            WHERE created_at < $1 AND status IN ('processed', 'skipped')
            "#,
        )
        .bind(before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete webhook events", e))?;

        Ok(result.rows_affected())
    }
}
