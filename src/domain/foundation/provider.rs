//! Payment provider identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// The payment networks an order can be settled through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GooglePlay,
    AppStore,
    Alipay,
    WechatPay,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::GooglePlay,
        Provider::AppStore,
        Provider::Alipay,
        Provider::WechatPay,
    ];

    /// Stable identifier used in storage, routes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GooglePlay => "google_play",
            Provider::AppStore => "app_store",
            Provider::Alipay => "alipay",
            Provider::WechatPay => "wechat_pay",
        }
    }

    /// True when the purchase happens inside the client app before the
    /// server sees it (app stores). The payment leg then appears at first
    /// verification or notification instead of at order creation.
    pub fn is_client_initiated(&self) -> bool {
        matches!(self, Provider::GooglePlay | Provider::AppStore)
    }

    /// True when the server creates the trade and the provider echoes our
    /// order number back as `out_trade_no`.
    pub fn is_server_initiated(&self) -> bool {
        !self.is_client_initiated()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_play" | "google" => Ok(Provider::GooglePlay),
            "app_store" | "apple" => Ok(Provider::AppStore),
            "alipay" => Ok(Provider::Alipay),
            "wechat_pay" | "wechat" => Ok(Provider::WechatPay),
            other => Err(ValidationError::invalid_format(
                "provider",
                format!("unknown provider '{}'", other),
            )),
        }
    }
}
