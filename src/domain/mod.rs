//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, money, errors)
//! - `order` - Order aggregate, payment legs and the transaction ledger types
//! - `subscription` - Canonical subscription state derived from provider fields
//! - `notification` - Provider webhook decoding and webhook event tracking

pub mod foundation;
pub mod notification;
pub mod order;
pub mod subscription;
