//! Webhook event record.
//!
//! One row per provider event id. The row is the dedup anchor of the
//! asynchronous path and the audit trail of what was done with the payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    Provider, StateMachine, Timestamp, ValidationError, WebhookEventId,
};

use super::{RetryPolicy, WebhookError};

/// Processing status of a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Pending,
    Processed,
    Failed,

    /// Acknowledged without reconciliation (test notifications).
    Skipped,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "pending",
            WebhookStatus::Processed => "processed",
            WebhookStatus::Failed => "failed",
            WebhookStatus::Skipped => "skipped",
        }
    }
}

impl StateMachine for WebhookStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use WebhookStatus::*;
        match self {
            Pending => vec![Processed, Failed, Skipped],
            Failed => vec![Processed, Failed, Skipped],
            Processed | Skipped => vec![],
        }
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WebhookStatus::Pending),
            "processed" => Ok(WebhookStatus::Processed),
            "failed" => Ok(WebhookStatus::Failed),
            "skipped" => Ok(WebhookStatus::Skipped),
            other => Err(ValidationError::invalid_format(
                "webhook_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// A received provider notification and its processing outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    pub provider: Provider,

    /// Provider-assigned id; unique across all events.
    pub event_id: String,

    pub event_type: String,

    /// Authenticated payload as received (after `open_notification`).
    pub payload: String,

    pub status: WebhookStatus,
    pub retry_count: u32,
    pub next_retry_at: Option<Timestamp>,
    pub processed_at: Option<Timestamp>,

    /// Summary of what reconciliation did.
    pub processed_data: Option<serde_json::Value>,

    pub error_message: Option<String>,
    pub retryable: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookEvent {
    pub fn received(
        id: WebhookEventId,
        provider: Provider,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: &[u8],
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            provider,
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            status: WebhookStatus::Pending,
            retry_count: 0,
            next_retry_at: None,
            processed_at: None,
            processed_data: None,
            error_message: None,
            retryable: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_processed(
        &mut self,
        summary: serde_json::Value,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(WebhookStatus::Processed)?;
        self.processed_at = Some(now);
        self.processed_data = Some(summary);
        self.error_message = None;
        self.retryable = false;
        self.next_retry_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_skipped(&mut self, reason: &str, now: Timestamp) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(WebhookStatus::Skipped)?;
        self.processed_at = Some(now);
        self.processed_data = Some(serde_json::json!({ "skipped": reason }));
        self.retryable = false;
        self.next_retry_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed attempt. Retryable errors get a `next_retry_at` until
    /// `retry_count` reaches the policy's budget.
    pub fn mark_failed(
        &mut self,
        error: &WebhookError,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(WebhookStatus::Failed)?;
        self.error_message = Some(error.to_string());
        self.next_retry_at = if error.is_retryable() {
            policy.next_attempt(self.retry_count, now)
        } else {
            None
        };
        self.retryable = self.next_retry_at.is_some();
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed replay by the retry sweeper.
    pub fn record_retry_failure(
        &mut self,
        error: &WebhookError,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        self.retry_count = self.retry_count.saturating_add(1);
        self.mark_failed(error, policy, now)
    }

    /// True if the retry sweeper should replay this event at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == WebhookStatus::Failed
            && self.retryable
            && self.next_retry_at.map_or(false, |at| !at.is_after(&now))
    }

    pub fn is_final(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(now: Timestamp) -> WebhookEvent {
        WebhookEvent::received(
            WebhookEventId::new(),
            Provider::GooglePlay,
            "m-1",
            "SUBSCRIPTION_RENEWED",
            b"{}",
            now,
        )
    }

    // ══════════════════════════════════════════════════════════════
    // Status transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn processed_and_skipped_are_terminal() {
        assert!(WebhookStatus::Processed.is_terminal());
        assert!(WebhookStatus::Skipped.is_terminal());
        assert!(!WebhookStatus::Failed.is_terminal());
    }

    #[test]
    fn processed_event_cannot_be_failed() {
        let now = Timestamp::now();
        let mut event = event(now);
        event.mark_processed(serde_json::json!({}), now).unwrap();
        let err = WebhookError::Database("x".into());
        assert!(event.mark_failed(&err, &RetryPolicy::default(), now).is_err());
        assert_eq!(event.status, WebhookStatus::Processed);
    }

    #[test]
    fn status_parses_from_storage() {
        assert_eq!("skipped".parse::<WebhookStatus>().unwrap(), WebhookStatus::Skipped);
        assert!("done".parse::<WebhookStatus>().is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Failure bookkeeping
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn retryable_failure_is_scheduled() {
        let now = Timestamp::now();
        let policy = RetryPolicy::new(3, 30, 600);
        let mut event = event(now);

        event
            .mark_failed(&WebhookError::ProviderTransient("timeout".into()), &policy, now)
            .unwrap();

        assert_eq!(event.status, WebhookStatus::Failed);
        assert!(event.retryable);
        assert_eq!(event.next_retry_at, Some(now.plus_secs(30)));
        assert!(!event.is_due(now));
        assert!(event.is_due(now.plus_secs(30)));
    }

    #[test]
    fn permanent_failure_is_not_scheduled() {
        let now = Timestamp::now();
        let mut event = event(now);
        event
            .mark_failed(
                &WebhookError::OrderNotFound("token".into()),
                &RetryPolicy::default(),
                now,
            )
            .unwrap();
        assert!(!event.retryable);
        assert!(event.next_retry_at.is_none());
        assert_eq!(event.error_message.as_deref(), Some("Order not found: token"));
    }

    #[test]
    fn retry_budget_runs_out() {
        let now = Timestamp::now();
        let policy = RetryPolicy::new(2, 10, 100);
        let err = WebhookError::Database("down".into());
        let mut event = event(now);

        event.mark_failed(&err, &policy, now).unwrap();
        event.record_retry_failure(&err, &policy, now).unwrap();
        assert_eq!(event.retry_count, 1);
        assert!(event.retryable);

        event.record_retry_failure(&err, &policy, now).unwrap();
        assert_eq!(event.retry_count, 2);
        assert!(!event.retryable);
        assert!(!event.is_due(now.plus_days(1)));
    }

    #[test]
    fn replay_can_succeed_after_failure() {
        let now = Timestamp::now();
        let mut event = event(now);
        event
            .mark_failed(&WebhookError::Database("x".into()), &RetryPolicy::default(), now)
            .unwrap();
        event.mark_processed(serde_json::json!({"action": "renew"}), now).unwrap();
        assert!(event.is_final());
        assert!(event.error_message.is_none());
    }
}
