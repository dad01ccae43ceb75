//! Google Play real-time developer notifications.
//!
//! Delivered as a Pub/Sub push: `{message: {data: base64(JSON), messageId}}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use crate::domain::foundation::{Provider, Timestamp};

use super::{
    ClassifiedNotification, OneTimeNotificationType, ProviderNotification,
    SubscriptionNotificationType, WebhookError,
};

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

// Pub/Sub sends both spellings of the id; accepting either through an alias
// would reject the duplicate, so both are read separately.
#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(default)]
    data: Option<String>,
    #[serde(default, rename = "messageId")]
    message_id: Option<String>,
    #[serde(default, rename = "message_id")]
    message_id_snake: Option<String>,
}

impl PushMessage {
    fn id(&self) -> Option<String> {
        self.message_id
            .clone()
            .or_else(|| self.message_id_snake.clone())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeveloperNotification {
    #[serde(default)]
    event_time_millis: Option<String>,
    #[serde(default)]
    one_time_product_notification: Option<OneTimeProductPayload>,
    #[serde(default)]
    subscription_notification: Option<SubscriptionPayload>,
    #[serde(default)]
    test_notification: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OneTimeProductPayload {
    notification_type: i64,
    purchase_token: String,
    sku: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPayload {
    notification_type: i64,
    purchase_token: String,
    subscription_id: String,
}

/// Pub/Sub message id, if the envelope is readable at all.
pub fn event_id(payload: &[u8]) -> Option<String> {
    serde_json::from_slice::<PushEnvelope>(payload)
        .ok()
        .and_then(|envelope| envelope.message.id())
}

pub fn decode(payload: &[u8]) -> Result<ClassifiedNotification, WebhookError> {
    let envelope: PushEnvelope = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("pub/sub envelope: {}", e)))?;

    let event_id = envelope.message.id().ok_or_else(|| {
        WebhookError::UnrecognizedNotification("pub/sub message without messageId".into())
    })?;
    let data = envelope
        .message
        .data
        .as_deref()
        .ok_or_else(|| WebhookError::UnrecognizedNotification("pub/sub message without data".into()))?;
    let decoded = STANDARD
        .decode(data.trim())
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("pub/sub data is not base64: {}", e)))?;
    let inner: DeveloperNotification = serde_json::from_slice(&decoded)
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("developer notification: {}", e)))?;

    let occurred_at = inner
        .event_time_millis
        .as_deref()
        .and_then(|millis| millis.parse::<i64>().ok())
        .and_then(Timestamp::from_unix_millis);

    let notification = if let Some(one_time) = inner.one_time_product_notification {
        ProviderNotification::OneTimeProduct {
            purchase_token: one_time.purchase_token,
            sku: one_time.sku,
            notification_type: OneTimeNotificationType::from_code(one_time.notification_type),
        }
    } else if let Some(subscription) = inner.subscription_notification {
        ProviderNotification::Subscription {
            purchase_token: subscription.purchase_token,
            subscription_id: subscription.subscription_id,
            notification_type: SubscriptionNotificationType::from_code(subscription.notification_type),
        }
    } else if inner.test_notification.is_some() {
        ProviderNotification::Test {
            provider: Provider::GooglePlay,
        }
    } else {
        return Err(WebhookError::UnrecognizedNotification(
            "developer notification carries no known payload".into(),
        ));
    };

    Ok(ClassifiedNotification {
        event_id,
        provider: Provider::GooglePlay,
        occurred_at,
        notification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(inner: serde_json::Value) -> Vec<u8> {
        let data = STANDARD.encode(inner.to_string());
        json!({
            "message": {"data": data, "messageId": "m-1", "message_id": "m-1"},
            "subscription": "projects/p/subscriptions/s"
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn decodes_one_time_purchase() {
        let payload = envelope(json!({
            "version": "1.0",
            "packageName": "com.example",
            "eventTimeMillis": "1750000000000",
            "oneTimeProductNotification": {
                "version": "1.0", "notificationType": 1, "purchaseToken": "T1", "sku": "coins_100"
            }
        }));

        let classified = decode(&payload).unwrap();
        assert_eq!(classified.event_id, "m-1");
        assert_eq!(classified.occurred_at, Timestamp::from_unix_millis(1_750_000_000_000));
        assert_eq!(
            classified.notification,
            ProviderNotification::OneTimeProduct {
                purchase_token: "T1".into(),
                sku: "coins_100".into(),
                notification_type: OneTimeNotificationType::Purchased,
            }
        );
    }

    #[test]
    fn decodes_subscription_with_unknown_code() {
        let payload = envelope(json!({
            "subscriptionNotification": {
                "notificationType": 77, "purchaseToken": "S1", "subscriptionId": "gold"
            }
        }));

        match decode(&payload).unwrap().notification {
            ProviderNotification::Subscription { notification_type, .. } => {
                assert_eq!(notification_type, SubscriptionNotificationType::Unknown(77));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_test_notification() {
        let payload = envelope(json!({"testNotification": {"version": "1.0"}}));
        assert_eq!(
            decode(&payload).unwrap().notification,
            ProviderNotification::Test { provider: Provider::GooglePlay }
        );
    }

    #[test]
    fn rejects_non_base64_data() {
        let payload = json!({"message": {"data": "%%%", "messageId": "m-2"}}).to_string();
        assert!(matches!(
            decode(payload.as_bytes()),
            Err(WebhookError::UnrecognizedNotification(_))
        ));
        assert_eq!(event_id(payload.as_bytes()).as_deref(), Some("m-2"));
    }

    #[test]
    fn rejects_empty_developer_notification() {
        let payload = envelope(json!({"version": "1.0"}));
        assert!(decode(&payload).is_err());
    }

    #[test]
    fn event_id_accepts_snake_case_only() {
        let payload = json!({"message": {"data": "", "message_id": "m-3"}}).to_string();
        assert_eq!(event_id(payload.as_bytes()).as_deref(), Some("m-3"));
    }
}
