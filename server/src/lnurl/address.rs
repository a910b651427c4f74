//! Lightning addresses (LUD-16)
//!
//! A lightning address `user@domain` resolves to an LNURL-Pay endpoint at
//! `https://domain/.well-known/lnurlp/user`. Refunds are paid by asking that
//! endpoint's callback for an invoice.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// HTTP timeout for both the well-known lookup and the callback request
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

static LIGHTNING_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$")
        .unwrap_or_else(|e| panic!("lightning address pattern: {e}"))
});

pub fn is_valid_lightning_address(address: &str) -> bool {
    LIGHTNING_ADDRESS_RE.is_match(address)
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid lightning address: {0}")]
    InvalidAddress(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty callback in pay endpoint")]
    EmptyCallback,

    #[error("lnurl callback error: {0}")]
    Callback(String),

    #[error("empty invoice from callback")]
    EmptyInvoice,
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::Http(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightningAddress {
    pub user: String,
    pub domain: String,
}

impl LightningAddress {
    pub fn parse(address: &str) -> Result<Self, ResolveError> {
        match address.split_once('@') {
            Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(Self {
                user: user.to_string(),
                domain: domain.to_string(),
            }),
            _ => Err(ResolveError::InvalidAddress(address.to_string())),
        }
    }

    pub fn well_known_url(&self) -> String {
        format!("https://{}/.well-known/lnurlp/{}", self.domain, self.user)
    }
}

/// Resolved LNURL-Pay parameters of a remote wallet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayEndpoint {
    #[serde(default)]
    pub callback: String,
    #[serde(default)]
    pub min_sendable: i64,
    #[serde(default)]
    pub max_sendable: i64,
}

impl PayEndpoint {
    /// Amount to request from this endpoint for a refund of `amount_msats`.
    ///
    /// Capped at `max_sendable` and rounded down to a whole sat. Returns
    /// `None` for dust, i.e. anything that ends up below `min_sendable`.
    pub fn refund_amount(&self, amount_msats: i64) -> Option<i64> {
        if amount_msats < self.min_sendable {
            return None;
        }
        let capped = if self.max_sendable > 0 {
            amount_msats.min(self.max_sendable)
        } else {
            amount_msats
        };
        let rounded = (capped / 1000) * 1000;
        (rounded > 0 && rounded >= self.min_sendable).then_some(rounded)
    }
}

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    #[serde(default)]
    pr: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    reason: String,
}

/// `callback` with `amount=<msats>` appended as a query parameter
pub fn append_amount(callback: &str, amount_msats: i64) -> String {
    let sep = if callback.contains('?') { '&' } else { '?' };
    format!("{}{}amount={}", callback, sep, amount_msats)
}

#[async_trait]
pub trait PayEndpointResolver: Send + Sync {
    /// Look up the LNURL-Pay endpoint behind a lightning address
    async fn resolve(&self, address: &str) -> Result<PayEndpoint, ResolveError>;

    /// Ask a pay endpoint callback for a BOLT11 invoice of `amount_msats`
    async fn request_invoice(&self, callback: &str, amount_msats: i64) -> Result<String, ResolveError>;
}

pub struct HttpPayEndpointResolver {
    http_client: reqwest::Client,
}

impl HttpPayEndpointResolver {
    pub fn new() -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(RESOLVE_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http_client })
    }

    async fn get_ok(&self, url: &str) -> Result<String, ResolveError> {
        let resp = self.http_client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Fetch and validate pay endpoint parameters from a well-known URL
    pub async fn fetch_pay_endpoint(&self, url: &str) -> Result<PayEndpoint, ResolveError> {
        let body = self.get_ok(url).await?;
        let endpoint: PayEndpoint =
            serde_json::from_str(&body).map_err(|e| ResolveError::Malformed(e.to_string()))?;
        if endpoint.callback.is_empty() {
            return Err(ResolveError::EmptyCallback);
        }
        Ok(endpoint)
    }
}

#[async_trait]
impl PayEndpointResolver for HttpPayEndpointResolver {
    async fn resolve(&self, address: &str) -> Result<PayEndpoint, ResolveError> {
        let parsed = LightningAddress::parse(address)?;
        self.fetch_pay_endpoint(&parsed.well_known_url()).await
    }

    async fn request_invoice(&self, callback: &str, amount_msats: i64) -> Result<String, ResolveError> {
        let body = self.get_ok(&append_amount(callback, amount_msats)).await?;
        let result: CallbackResponse =
            serde_json::from_str(&body).map_err(|e| ResolveError::Malformed(e.to_string()))?;
        if result.status == "ERROR" {
            return Err(ResolveError::Callback(result.reason));
        }
        if result.pr.is_empty() {
            return Err(ResolveError::EmptyInvoice);
        }
        Ok(result.pr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(min: i64, max: i64) -> PayEndpoint {
        PayEndpoint {
            callback: "https://w.example/cb".into(),
            min_sendable: min,
            max_sendable: max,
        }
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_lightning_address("alice@example.com"));
        assert!(is_valid_lightning_address("a.b+tips@sub.wallet.io"));
        assert!(!is_valid_lightning_address("alice@localhost"));
        assert!(!is_valid_lightning_address("alice"));
        assert!(!is_valid_lightning_address("@example.com"));
        assert!(!is_valid_lightning_address("al ice@example.com"));
    }

    #[test]
    fn test_well_known_url() {
        let addr = LightningAddress::parse("alice@example.com").unwrap();
        assert_eq!(addr.well_known_url(), "https://example.com/.well-known/lnurlp/alice");
        assert!(LightningAddress::parse("nope").is_err());
    }

    #[test]
    fn test_append_amount() {
        assert_eq!(append_amount("https://w/cb", 1000), "https://w/cb?amount=1000");
        assert_eq!(append_amount("https://w/cb?id=7", 1000), "https://w/cb?id=7&amount=1000");
    }

    #[test]
    fn test_refund_amount_dust() {
        assert_eq!(endpoint(100_000, 1_000_000).refund_amount(500), None);
        assert_eq!(endpoint(1_000, 1_000_000).refund_amount(1_500), Some(1_000));
        // Rounds below a non-whole-sat minimum
        assert_eq!(endpoint(1_500, 1_000_000).refund_amount(1_900), None);
    }

    #[test]
    fn test_refund_amount_caps_and_rounds() {
        assert_eq!(endpoint(1_000, 100_000).refund_amount(250_000), Some(100_000));
        assert_eq!(endpoint(1_000, 1_000_000).refund_amount(48_999), Some(48_000));
    }

    #[tokio::test]
    async fn test_fetch_pay_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/lnurlp/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag": "payRequest",
                "callback": format!("{}/cb", server.uri()),
                "minSendable": 1000,
                "maxSendable": 5_000_000,
                "metadata": "[]"
            })))
            .mount(&server)
            .await;

        let resolver = HttpPayEndpointResolver::new().unwrap();
        let ep = resolver
            .fetch_pay_endpoint(&format!("{}/.well-known/lnurlp/alice", server.uri()))
            .await
            .unwrap();
        assert_eq!(ep.min_sendable, 1000);
        assert_eq!(ep.max_sendable, 5_000_000);
        assert!(ep.callback.ends_with("/cb"));
    }

    #[tokio::test]
    async fn test_fetch_pay_endpoint_failures() {
        let server = MockServer::start().await;
        Mock::given(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"minSendable": 1})))
            .mount(&server)
            .await;
        Mock::given(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let resolver = HttpPayEndpointResolver::new().unwrap();
        let uri = server.uri();
        assert!(matches!(
            resolver.fetch_pay_endpoint(&format!("{uri}/empty")).await,
            Err(ResolveError::EmptyCallback)
        ));
        assert!(matches!(
            resolver.fetch_pay_endpoint(&format!("{uri}/gone")).await,
            Err(ResolveError::Status { status: 404, .. })
        ));
        assert!(matches!(
            resolver.fetch_pay_endpoint(&format!("{uri}/garbage")).await,
            Err(ResolveError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_request_invoice() {
        let server = MockServer::start().await;
        Mock::given(path("/cb"))
            .and(query_param("amount", "48000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pr": "lnbc480n1x", "routes": []})))
            .mount(&server)
            .await;
        Mock::given(path("/cb"))
            .and(query_param("amount", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ERROR", "reason": "too small"})))
            .mount(&server)
            .await;
        Mock::given(path("/blank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pr": ""})))
            .mount(&server)
            .await;

        let resolver = HttpPayEndpointResolver::new().unwrap();
        let cb = format!("{}/cb", server.uri());
        assert_eq!(resolver.request_invoice(&cb, 48_000).await.unwrap(), "lnbc480n1x");

        match resolver.request_invoice(&cb, 1_000).await {
            Err(ResolveError::Callback(reason)) => assert_eq!(reason, "too small"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            resolver.request_invoice(&format!("{}/blank", server.uri()), 1_000).await,
            Err(ResolveError::EmptyInvoice)
        ));
    }
}
