//! LNURL-Pay (LUD-06) and LNURL-Withdraw (LUD-03) payloads
//!
//! Wallets only parse response bodies, so every protocol outcome, including
//! failures, is sent with HTTP 200.

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

pub const PAY_TAG: &str = "payRequest";
pub const WITHDRAW_TAG: &str = "withdrawRequest";

/// Static LUD-06 metadata shown by the payer's wallet
pub const PAY_METADATA: &str = r#"[["text/plain","Tip via TipMe"]]"#;

pub const WITHDRAW_DESCRIPTION: &str = "TipMe withdrawal";

/// `{"status":"OK"}` or `{"status":"ERROR","reason":"..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LnurlStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LnurlStatus {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            reason: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: "ERROR".to_string(),
            reason: Some(reason.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("ERROR")
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().json(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    pub tag: String,
    pub callback: String,
    pub min_sendable: i64,
    pub max_sendable: i64,
    pub metadata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PayRequest {
    pub fn new(callback: String, min_sendable: i64, max_sendable: i64, url: Option<String>) -> Self {
        Self {
            tag: PAY_TAG.to_string(),
            callback,
            min_sendable,
            max_sendable,
            metadata: PAY_METADATA.to_string(),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayCallbackResponse {
    pub pr: String,
    #[serde(default)]
    pub routes: Vec<serde_json::Value>,
}

impl PayCallbackResponse {
    pub fn new(pr: String) -> Self {
        Self { pr, routes: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub tag: String,
    pub callback: String,
    pub k1: String,
    pub default_description: String,
    pub min_withdrawable: i64,
    pub max_withdrawable: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WithdrawRequest {
    /// The whole balance is withdrawn at once, so min and max are equal
    pub fn whole_balance(callback: String, k1: String, balance_msats: i64, url: Option<String>) -> Self {
        Self {
            tag: WITHDRAW_TAG.to_string(),
            callback,
            k1,
            default_description: WITHDRAW_DESCRIPTION.to_string(),
            min_withdrawable: balance_msats,
            max_withdrawable: balance_msats,
            url,
        }
    }
}
