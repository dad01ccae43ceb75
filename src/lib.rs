//! paysync - payment order reconciliation for app stores and wallet providers.
//!
//! Orders are created by the service, paid through Google Play, the App Store,
//! Alipay or WeChat Pay, and kept consistent with what each provider reports
//! through client verification calls and server notifications.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
