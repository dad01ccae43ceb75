//! Alipay asynchronous trade notifications.
//!
//! Form-encoded key/value pairs; the signature travels in the `sign` field
//! and is checked by the adapter. Alipay expects the literal body `success`
//! in response.

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use std::collections::HashMap;

use crate::domain::foundation::{Provider, Timestamp};

use super::{
    ClassifiedNotification, ProviderNotification, TradeAmount, TradeNotification, TradeStatus,
    WebhookError,
};

/// Alipay timestamps are Beijing time without an offset.
const BEIJING_OFFSET_SECS: i32 = 8 * 3600;

fn parse_form(payload: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(payload)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

fn required<'a>(fields: &'a HashMap<String, String>, key: &str) -> Result<&'a str, WebhookError> {
    fields
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| WebhookError::UnrecognizedNotification(format!("alipay form without {}", key)))
}

fn parse_notify_time(value: &str) -> Option<Timestamp> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok()?;
    let offset = FixedOffset::east_opt(BEIJING_OFFSET_SECS)?;
    let local = offset.from_local_datetime(&naive).single()?;
    Some(Timestamp::from_datetime(local.with_timezone(&chrono::Utc)))
}

/// `notify_id`, if present.
pub fn event_id(payload: &[u8]) -> Option<String> {
    parse_form(payload)
        .remove("notify_id")
        .filter(|id| !id.is_empty())
}

pub fn decode(payload: &[u8]) -> Result<ClassifiedNotification, WebhookError> {
    let fields = parse_form(payload);
    let event_id = required(&fields, "notify_id")?.to_string();
    let out_trade_no = required(&fields, "out_trade_no")?.to_string();
    let raw_status = required(&fields, "trade_status")?.to_string();

    let optional = |key: &str| fields.get(key).filter(|v| !v.is_empty()).cloned();
    let refund_amount = optional("refund_fee").map(TradeAmount::Major);

    // Partial and full refunds both carry refund_fee; the trade status alone
    // (TRADE_SUCCESS / TRADE_CLOSED) does not tell a refund apart.
    let status = if refund_amount.is_some() {
        TradeStatus::Refunded
    } else {
        TradeStatus::from_alipay(&raw_status)
    };

    Ok(ClassifiedNotification {
        event_id,
        provider: Provider::Alipay,
        occurred_at: fields.get("notify_time").and_then(|t| parse_notify_time(t)),
        notification: ProviderNotification::TradeStatus(TradeNotification {
            provider: Provider::Alipay,
            out_trade_no,
            trade_no: optional("trade_no"),
            status,
            raw_status,
            total_amount: optional("total_amount").map(TradeAmount::Major),
            refund_amount,
            refund_id: optional("out_biz_no"),
        }),
    })
}
