//! Order and payment status state machines.
//!
//! `OrderStatus` is the business lifecycle; `PaymentStatus` tracks money
//! movement. They move together through the ledger but are stored apart
//! because a failed renewal expires the order while the payment failed.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Business lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, waiting for payment.
    Created,

    /// Payment confirmed.
    Paid,

    /// Goods handed over. Stored for compatibility with fulfilment systems.
    Delivered,

    /// Cancelled by the caller or the provider. Terminal.
    Cancelled,

    /// Money returned. Terminal.
    Refunded,

    /// Unpaid past its deadline, or a subscription that lapsed.
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Expired => "expired",
        }
    }
}

impl StateMachine for OrderStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            // From CREATED
            (Created, Paid)
                | (Created, Cancelled)
                | (Created, Expired)
            // From PAID
                | (Paid, Paid) // Renewal
                | (Paid, Delivered)
                | (Paid, Cancelled)
                | (Paid, Refunded)
                | (Paid, Expired)
            // From DELIVERED
                | (Delivered, Refunded)
                | (Delivered, Expired)
            // From EXPIRED
                | (Expired, Paid) // Subscription recovered or renewed late
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use OrderStatus::*;
        match self {
            Created => vec![Paid, Cancelled, Expired],
            Paid => vec![Paid, Delivered, Cancelled, Refunded, Expired],
            Delivered => vec![Refunded, Expired],
            Expired => vec![Paid],
            Cancelled | Refunded => vec![],
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            "paid" => Ok(OrderStatus::Paid),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            "expired" => Ok(OrderStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "order_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Money movement state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Completed, Failed, Cancelled, Expired],
            Completed => vec![Completed, Cancelled, Refunded, Expired, Failed],
            Failed => vec![Completed],
            Expired => vec![Completed],
            Cancelled | Refunded => vec![],
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ORDER: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Paid,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::Expired,
    ];

    // ══════════════════════════════════════════════════════════════
    // OrderStatus
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn created_can_be_paid_cancelled_or_expired() {
        let status = OrderStatus::Created;
        assert_eq!(status.transition_to(OrderStatus::Paid), Ok(OrderStatus::Paid));
        assert!(status.can_transition_to(&OrderStatus::Cancelled));
        assert!(status.can_transition_to(&OrderStatus::Expired));
        assert!(!status.can_transition_to(&OrderStatus::Refunded));
    }

    #[test]
    fn paid_can_renew_into_paid() {
        assert!(OrderStatus::Paid.can_transition_to(&OrderStatus::Paid));
    }

    #[test]
    fn only_paid_and_delivered_can_be_refunded() {
        for status in ALL_ORDER {
            let allowed = matches!(status, OrderStatus::Paid | OrderStatus::Delivered);
            assert_eq!(
                status.can_transition_to(&OrderStatus::Refunded),
                allowed,
                "{:?} -> Refunded",
                status
            );
        }
    }

    #[test]
    fn cancelled_and_refunded_are_terminal() {
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(!OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::Created.is_terminal());
    }

    #[test]
    fn can_transition_to_matches_valid_transitions() {
        for from in ALL_ORDER {
            for to in ALL_ORDER {
                assert_eq!(
                    from.can_transition_to(&to),
                    from.valid_transitions().contains(&to),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn order_status_parses_its_own_string() {
        for status in ALL_ORDER {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // PaymentStatus
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn pending_payment_can_complete_or_fail() {
        assert!(PaymentStatus::Pending.can_transition_to(&PaymentStatus::Completed));
        assert!(PaymentStatus::Pending.can_transition_to(&PaymentStatus::Failed));
        assert!(!PaymentStatus::Pending.can_transition_to(&PaymentStatus::Refunded));
    }

    #[test]
    fn failed_payment_can_recover() {
        assert!(PaymentStatus::Failed.can_transition_to(&PaymentStatus::Completed));
    }

    #[test]
    fn refunded_and_cancelled_payments_are_terminal() {
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn payment_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
