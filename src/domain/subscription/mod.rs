//! Subscription domain - canonical state derived from provider fields.

mod state;

pub use state::{
    derive_state, CancelReason, SubscriptionPaymentState, SubscriptionSnapshot, SubscriptionState,
};
