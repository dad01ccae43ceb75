//! Order domain - orders, payment legs and the transaction ledger.

mod aggregate;
mod errors;
mod payment_leg;
mod status;
mod transaction;

pub use aggregate::{NewOrder, Order, OrderKind};
pub use errors::OrderError;
pub use payment_leg::{GracePeriodStatus, PaymentLeg};
pub use status::{OrderStatus, PaymentStatus};
pub use transaction::{PaymentTransaction, TransactionKind, TransactionStatus};
