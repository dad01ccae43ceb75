//! App Store Server Notifications V2.
//!
//! The body is `{signedPayload: <JWS>}`; the payload and the nested
//! transaction/renewal infos are JWS compact serializations as well. The
//! adapter checks the certificate chain in `open_notification`; here the
//! header is only checked for the expected algorithm before decoding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{decode_header, Algorithm};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::foundation::{Provider, Timestamp};

use super::{
    AppleNotificationType, AppleRenewalInfo, AppleSubtype, AppleTransactionInfo,
    ClassifiedNotification, ProviderNotification, WebhookError,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedBody {
    signed_payload: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPayload {
    notification_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(rename = "notificationUUID")]
    notification_uuid: String,
    #[serde(default)]
    signed_date: Option<i64>,
    #[serde(default)]
    data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationData {
    #[serde(default)]
    signed_transaction_info: Option<String>,
    #[serde(default)]
    signed_renewal_info: Option<String>,
}

/// Decodes the claims of a JWS compact token after checking its header.
pub fn decode_jws<T: DeserializeOwned>(token: &str) -> Result<T, WebhookError> {
    let header = decode_header(token)
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("JWS header: {}", e)))?;
    if header.alg != Algorithm::ES256 {
        return Err(WebhookError::UnrecognizedNotification(format!(
            "unexpected JWS algorithm {:?}",
            header.alg
        )));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(WebhookError::UnrecognizedNotification(
            "JWS must have three segments".into(),
        ));
    }
    let claims = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("JWS payload encoding: {}", e)))?;
    serde_json::from_slice(&claims)
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("JWS payload: {}", e)))
}

fn decode_payload(body: &[u8]) -> Result<NotificationPayload, WebhookError> {
    let body: SignedBody = serde_json::from_slice(body)
        .map_err(|e| WebhookError::UnrecognizedNotification(format!("signed body: {}", e)))?;
    decode_jws(&body.signed_payload)
}

/// `notificationUUID`, if the signed payload decodes.
pub fn event_id(body: &[u8]) -> Option<String> {
    decode_payload(body).ok().map(|payload| payload.notification_uuid)
}

pub fn decode(body: &[u8]) -> Result<ClassifiedNotification, WebhookError> {
    let payload = decode_payload(body)?;
    let notification_type = AppleNotificationType::parse(&payload.notification_type);
    let occurred_at = payload.signed_date.and_then(Timestamp::from_unix_millis);

    let notification = if notification_type == AppleNotificationType::Test {
        ProviderNotification::Test {
            provider: Provider::AppStore,
        }
    } else {
        let data = payload.data.ok_or_else(|| {
            WebhookError::UnrecognizedNotification(format!(
                "{} notification without data",
                payload.notification_type
            ))
        })?;
        let transaction_jws = data.signed_transaction_info.ok_or_else(|| {
            WebhookError::UnrecognizedNotification(format!(
                "{} notification without signedTransactionInfo",
                payload.notification_type
            ))
        })?;
        let transaction_info: AppleTransactionInfo = decode_jws(&transaction_jws)?;
        let renewal_info: Option<AppleRenewalInfo> = match data.signed_renewal_info {
            Some(jws) => Some(decode_jws(&jws)?),
            None => None,
        };

        ProviderNotification::AppleLifecycle {
            transaction_info,
            renewal_info,
            notification_type,
            subtype: payload.subtype.as_deref().map(AppleSubtype::parse),
        }
    };

    Ok(ClassifiedNotification {
        event_id: payload.notification_uuid,
        provider: Provider::AppStore,
        occurred_at,
        notification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn jws(alg: &str, claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": alg}).to_string());
        let body = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.c2lnbmF0dXJl", header, body)
    }

    fn body(notification_type: &str, subtype: Option<&str>) -> Vec<u8> {
        let transaction = jws(
            "ES256",
            json!({
                "transactionId": "2000001",
                "originalTransactionId": "1000001",
                "productId": "gold_monthly",
                "expiresDate": 1_750_000_000_000_i64
            }),
        );
        let renewal = jws(
            "ES256",
            json!({"autoRenewStatus": 1, "gracePeriodExpiresDate": 1_750_500_000_000_i64}),
        );
        let mut payload = json!({
            "notificationType": notification_type,
            "notificationUUID": "uuid-1",
            "signedDate": 1_749_000_000_000_i64,
            "data": {"signedTransactionInfo": transaction, "signedRenewalInfo": renewal}
        });
        if let Some(subtype) = subtype {
            payload["subtype"] = json!(subtype);
        }
        json!({"signedPayload": jws("ES256", payload)}).to_string().into_bytes()
    }

    #[test]
    fn decodes_grace_period_failure() {
        let classified = decode(&body("DID_FAIL_TO_RENEW", Some("GRACE_PERIOD"))).unwrap();
        assert_eq!(classified.event_id, "uuid-1");
        assert_eq!(classified.event_type(), "DID_FAIL_TO_RENEW.GRACE_PERIOD");

        match classified.notification {
            ProviderNotification::AppleLifecycle {
                transaction_info,
                renewal_info,
                subtype,
                ..
            } => {
                assert_eq!(transaction_info.original_transaction_id, "1000001");
                assert_eq!(subtype, Some(AppleSubtype::GracePeriod));
                let renewal = renewal_info.unwrap();
                assert!(renewal.auto_renewing());
                assert!(renewal.grace_period_expires_at().is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_test_notification_without_data() {
        let payload = jws("ES256", json!({"notificationType": "TEST", "notificationUUID": "t-1"}));
        let body = json!({"signedPayload": payload}).to_string();
        let classified = decode(body.as_bytes()).unwrap();
        assert_eq!(
            classified.notification,
            ProviderNotification::Test { provider: Provider::AppStore }
        );
    }

    #[test]
    fn rejects_unexpected_algorithm() {
        let payload = jws("HS256", json!({"notificationType": "TEST", "notificationUUID": "t-2"}));
        let body = json!({"signedPayload": payload}).to_string();
        assert!(matches!(
            decode(body.as_bytes()),
            Err(WebhookError::UnrecognizedNotification(_))
        ));
    }

    #[test]
    fn rejects_lifecycle_without_transaction_info() {
        let payload = jws(
            "ES256",
            json!({"notificationType": "DID_RENEW", "notificationUUID": "r-1", "data": {}}),
        );
        let body = json!({"signedPayload": payload}).to_string();
        assert!(decode(body.as_bytes()).is_err());
        assert_eq!(event_id(body.as_bytes()).as_deref(), Some("r-1"));
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(decode(b"signedPayload=abc").is_err());
        assert!(event_id(b"signedPayload=abc").is_none());
    }
}
