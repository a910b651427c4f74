//! HTTP client for the gateway's JSON API
//!
//! - `POST /invoice {amount_msats, description}` -> `{payment_hash, invoice}`
//! - `GET /invoice/{payment_hash}` -> `{paid}`
//! - `POST /pay {invoice}` -> `{success, error}`

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{GatewayError, GatewayInvoice, LightningGateway, PaymentOutcome};
use crate::config::GatewayConfig;

/// Per-request timeout for invoice creation and status polls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct InvoiceStatus {
    #[serde(default)]
    paid: bool,
}

#[derive(Debug, Deserialize)]
struct PayResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: String,
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(err.to_string())
    }
}

/// Classify the body of a 2xx `/pay` response.
///
/// An unparsable body counts as success; only an explicit
/// `success=false` with an error message is a rejection.
fn classify_pay_body(body: &str) -> PaymentOutcome {
    match serde_json::from_str::<PayResult>(body) {
        Ok(result) if !result.success && !result.error.is_empty() => {
            PaymentOutcome::Failed(result.error)
        }
        _ => PaymentOutcome::Paid,
    }
}

pub struct GatewayClient {
    base_url: String,
    token: String,
    poll_interval: Duration,
    http_client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create gateway HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            poll_interval: config.poll_interval,
            http_client,
        })
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(timeout);
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<String, GatewayError> {
        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if status.as_u16() >= 400 {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl LightningGateway for GatewayClient {
    async fn create_invoice(
        &self,
        amount_msats: i64,
        description: &str,
    ) -> Result<GatewayInvoice, GatewayError> {
        let body = self
            .send(
                self.request(Method::POST, "/invoice", REQUEST_TIMEOUT)
                    .json(&json!({ "amount_msats": amount_msats, "description": description })),
            )
            .await?;

        let invoice: GatewayInvoice =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        if invoice.payment_hash.is_empty() || invoice.invoice.is_empty() {
            return Err(GatewayError::Malformed(format!("incomplete invoice response: {}", body)));
        }
        Ok(invoice)
    }

    async fn check_invoice_paid(&self, payment_hash: &str) -> Result<bool, GatewayError> {
        let body = self
            .send(self.request(
                Method::GET,
                &format!("/invoice/{}", payment_hash),
                REQUEST_TIMEOUT,
            ))
            .await?;
        let status: InvoiceStatus =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        Ok(status.paid)
    }

    async fn pay_invoice(&self, bolt11: &str, timeout: Duration) -> PaymentOutcome {
        let request = self
            .request(Method::POST, "/pay", timeout)
            .json(&json!({ "invoice": bolt11 }));

        let resp = match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => return PaymentOutcome::Ambiguous("payment timed out".to_string()),
            Ok(Err(e)) if e.is_timeout() => {
                return PaymentOutcome::Ambiguous(format!("payment timed out: {}", e))
            }
            // Never reached the gateway
            Ok(Err(e)) if e.is_connect() => {
                return PaymentOutcome::Failed(format!("gateway unreachable: {}", e))
            }
            Ok(Err(e)) => return PaymentOutcome::Ambiguous(format!("request failed: {}", e)),
            Ok(Ok(resp)) => resp,
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                warn!(error = %e, "Gateway accepted payment but body could not be read");
                return PaymentOutcome::Ambiguous(format!("response lost: {}", e));
            }
            Err(e) => return PaymentOutcome::Failed(format!("status {}: {}", status.as_u16(), e)),
        };

        if status.as_u16() >= 400 {
            return PaymentOutcome::Failed(format!("status {}: {}", status.as_u16(), body));
        }
        classify_pay_body(&body)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str, token: &str) -> GatewayClient {
        GatewayClient::new(&GatewayConfig {
            url: uri.to_string(),
            token: token.to_string(),
            poll_interval: Duration::from_millis(10),
        })
        .unwrap()
    }

    #[test]
    fn test_classify_pay_body() {
        assert_eq!(classify_pay_body(r#"{"success":true}"#), PaymentOutcome::Paid);
        assert_eq!(classify_pay_body(""), PaymentOutcome::Paid);
        assert_eq!(classify_pay_body(r#"{"success":false}"#), PaymentOutcome::Paid);
        assert_eq!(
            classify_pay_body(r#"{"success":false,"error":"no route"}"#),
            PaymentOutcome::Failed("no route".into())
        );
    }

    #[tokio::test]
    async fn test_create_invoice_sends_bearer_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/invoice"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_json(json!({"amount_msats": 30000, "description": "TipMe: create 3 voucher(s)"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"payment_hash": "ab12", "invoice": "lnbc300n1"})),
            )
            .mount(&server)
            .await;

        let gw = client(&server.uri(), "s3cret");
        let inv = gw.create_invoice(30_000, "TipMe: create 3 voucher(s)").await.unwrap();
        assert_eq!(inv.payment_hash, "ab12");
        assert_eq!(inv.invoice, "lnbc300n1");
    }

    #[tokio::test]
    async fn test_create_invoice_rejects_incomplete_and_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/invoice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payment_hash": "ab12"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(path("/invoice"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let gw = client(&server.uri(), "");
        assert!(matches!(
            gw.create_invoice(1000, "x").await,
            Err(GatewayError::Malformed(_))
        ));
        assert!(matches!(
            gw.create_invoice(1000, "x").await,
            Err(GatewayError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_check_invoice_paid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/invoice/ab12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payment_hash": "ab12", "paid": true})))
            .mount(&server)
            .await;

        let gw = client(&server.uri(), "");
        assert!(gw.check_invoice_paid("ab12").await.unwrap());
        assert!(gw.check_invoice_paid("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_pay_invoice_outcomes() {
        let server = MockServer::start().await;
        Mock::given(path("/pay"))
            .and(body_json(json!({"invoice": "lnbc-ok"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;
        Mock::given(path("/pay"))
            .and(body_json(json!({"invoice": "lnbc-rejected"})))
            .respond_with(ResponseTemplate::new(400).set_body_string("invoice expired"))
            .mount(&server)
            .await;
        Mock::given(path("/pay"))
            .and(body_json(json!({"invoice": "lnbc-slow"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let gw = client(&server.uri(), "");
        assert_eq!(gw.pay_invoice("lnbc-ok", Duration::from_secs(5)).await, PaymentOutcome::Paid);
        assert!(matches!(
            gw.pay_invoice("lnbc-rejected", Duration::from_secs(5)).await,
            PaymentOutcome::Failed(_)
        ));
        assert!(matches!(
            gw.pay_invoice("lnbc-slow", Duration::from_millis(100)).await,
            PaymentOutcome::Ambiguous(_)
        ));
    }

    #[tokio::test]
    async fn test_pay_invoice_unreachable_is_definitive() {
        // Nothing listens on port 9 of localhost
        let gw = client("http://127.0.0.1:9", "");
        assert!(matches!(
            gw.pay_invoice("lnbc", Duration::from_secs(5)).await,
            PaymentOutcome::Failed(_)
        ));
    }
}
