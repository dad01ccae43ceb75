//! Append-only financial events per order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Money, OrderId, PaymentTransactionId, Timestamp, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Payment,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Payment => "PAYMENT",
            TransactionKind::Refund => "REFUND",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT" => Ok(TransactionKind::Payment),
            "REFUND" => Ok(TransactionKind::Refund),
            other => Err(ValidationError::invalid_format(
                "transaction_kind",
                format!("unknown kind '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "transaction_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// One payment or refund.
///
/// `transaction_id` is provider-scoped and unique across the whole system;
/// it is what makes the synchronous confirmation path idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: PaymentTransactionId,
    pub order_id: OrderId,
    pub kind: TransactionKind,
    pub transaction_id: String,
    pub amount: Money,
    pub status: TransactionStatus,

    /// Provider response kept verbatim for audit.
    pub provider_data: serde_json::Value,

    pub created_at: Timestamp,
}

impl PaymentTransaction {
    pub fn payment(
        order_id: OrderId,
        transaction_id: impl Into<String>,
        amount: Money,
        provider_data: serde_json::Value,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentTransactionId::new(),
            order_id,
            kind: TransactionKind::Payment,
            transaction_id: transaction_id.into(),
            amount,
            status: TransactionStatus::Completed,
            provider_data,
            created_at: now,
        }
    }

    pub fn refund(
        order_id: OrderId,
        refund_id: impl Into<String>,
        amount: Money,
        provider_data: serde_json::Value,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentTransactionId::new(),
            order_id,
            kind: TransactionKind::Refund,
            transaction_id: refund_id.into(),
            amount,
            status: TransactionStatus::Completed,
            provider_data,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Currency;

    #[test]
    fn payment_constructor_is_completed_payment() {
        let txn = PaymentTransaction::payment(
            OrderId::new(),
            "GPA.1234",
            Money::new(2999, Currency::new("CNY").unwrap()).unwrap(),
            serde_json::json!({"source": "verify"}),
            Timestamp::now(),
        );
        assert_eq!(txn.kind, TransactionKind::Payment);
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.transaction_id, "GPA.1234");
    }

    #[test]
    fn kind_uses_upper_case_names() {
        assert_eq!(TransactionKind::Refund.as_str(), "REFUND");
        assert_eq!("PAYMENT".parse::<TransactionKind>().unwrap(), TransactionKind::Payment);
        assert!("payment".parse::<TransactionKind>().is_err());
    }
}
