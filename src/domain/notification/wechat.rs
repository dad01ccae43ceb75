//! WeChat Pay v3 notifications.
//!
//! The adapter's `open_notification` verifies the `Wechatpay-Signature`
//! header and replaces the encrypted `resource` with its decrypted JSON, so
//! this decoder sees the plaintext resource object.

use chrono::DateTime;
use serde::Deserialize;

use crate::domain::foundation::{Provider, Timestamp};

use super::{
    ClassifiedNotification, ProviderNotification, TradeAmount, TradeNotification, TradeStatus,
    WebhookError,
};

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(default)]
    create_time: Option<String>,
    event_type: String,
    resource: Resource,
}

#[derive(Debug, Deserialize)]
struct Resource {
    out_trade_no: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    trade_state: Option<String>,
    #[serde(default)]
    refund_status: Option<String>,
    #[serde(default)]
    refund_id: Option<String>,
    #[serde(default)]
    amount: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct Amount {
    #[serde(default)]
    total: Option<i64>,
    #[serde(default)]
    refund: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

/// Notification `id`, if the envelope parses.
pub fn event_id(payload: &[u8]) -> Option<String> {
    serde_json::from_slice::<IdOnly>(payload)
        .ok()
        .map(|envelope| envelope.id)
        .filter(|id| !id.is_empty())
}

pub fn decode(payload: &[u8]) -> Result<ClassifiedNotification, WebhookError> {
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("wechat notification: {}", e)))?;

    let resource = envelope.resource;
    let is_refund_event = envelope.event_type.starts_with("REFUND.");

    let (status, raw_status) = if is_refund_event {
        let raw = resource
            .refund_status
            .clone()
            .unwrap_or_else(|| envelope.event_type.clone());
        let status = if raw == "SUCCESS" {
            TradeStatus::Refunded
        } else {
            TradeStatus::Unknown(format!("REFUND_{}", raw))
        };
        (status, raw)
    } else {
        let raw = match resource.trade_state.clone() {
            Some(state) => state,
            None if envelope.event_type == "TRANSACTION.SUCCESS" => "SUCCESS".to_string(),
            None => {
                return Err(WebhookError::UnrecognizedNotification(format!(
                    "{} notification without trade_state",
                    envelope.event_type
                )))
            }
        };
        (TradeStatus::from_wechat(&raw), raw)
    };

    let amount = resource.amount.as_ref();
    let occurred_at = envelope
        .create_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| Timestamp::from_datetime(t.with_timezone(&chrono::Utc)));

    Ok(ClassifiedNotification {
        event_id: envelope.id,
        provider: Provider::WechatPay,
        occurred_at,
        notification: ProviderNotification::TradeStatus(TradeNotification {
            provider: Provider::WechatPay,
            out_trade_no: resource.out_trade_no,
            trade_no: resource.transaction_id,
            status,
            raw_status,
            total_amount: amount.and_then(|a| a.total).map(TradeAmount::Minor),
            refund_amount: if is_refund_event {
                amount.and_then(|a| a.refund).map(TradeAmount::Minor)
            } else {
                None
            },
            refund_id: resource.refund_id,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_successful_transaction() {
        let payload = json!({
            "id": "EV-2018022511223320873",
            "create_time": "2025-06-15T20:00:00+08:00",
            "event_type": "TRANSACTION.SUCCESS",
            "resource_type": "encrypt-resource",
            "resource": {
                "out_trade_no": "20250615120000ab12cd34",
                "transaction_id": "4200000001",
                "trade_state": "SUCCESS",
                "amount": {"total": 2999, "currency": "CNY"}
            }
        })
        .to_string();

        let classified = decode(payload.as_bytes()).unwrap();
        assert_eq!(classified.event_id, "EV-2018022511223320873");
        assert!(classified.occurred_at.is_some());
        match classified.notification {
            ProviderNotification::TradeStatus(trade) => {
                assert_eq!(trade.status, TradeStatus::Success);
                assert_eq!(trade.total_amount, Some(TradeAmount::Minor(2999)));
                assert_eq!(trade.trade_no.as_deref(), Some("4200000001"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_refund_success() {
        let payload = json!({
            "id": "EV-2",
            "event_type": "REFUND.SUCCESS",
            "resource": {
                "out_trade_no": "o1",
                "refund_id": "50000000382019052709732678859",
                "refund_status": "SUCCESS",
                "amount": {"total": 2999, "refund": 1000}
            }
        })
        .to_string();

        match decode(payload.as_bytes()).unwrap().notification {
            ProviderNotification::TradeStatus(trade) => {
                assert_eq!(trade.status, TradeStatus::Refunded);
                assert_eq!(trade.refund_amount, Some(TradeAmount::Minor(1000)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn encrypted_resource_is_unrecognized() {
        let payload = json!({
            "id": "EV-3",
            "event_type": "TRANSACTION.SUCCESS",
            "resource": {"algorithm": "AEAD_AES_256_GCM", "ciphertext": "..."}
        })
        .to_string();
        assert!(decode(payload.as_bytes()).is_err());
        assert_eq!(event_id(payload.as_bytes()).as_deref(), Some("EV-3"));
    }
}
