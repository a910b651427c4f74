//! Lightning payment gateway
//!
//! The gateway is an external service that creates invoices, reports whether
//! they were paid and pays invoices on our behalf. Flows only see the
//! `LightningGateway` trait so tests can script every outcome.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use client::GatewayClient;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayInvoice {
    pub payment_hash: String,
    /// BOLT11 payment request
    pub invoice: String,
}

/// Classified result of an outbound payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    /// The gateway rejected the payment; no money left the node
    Failed(String),
    /// Timeout or lost response; the payment may or may not have gone out
    Ambiguous(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Confirmed,
    TimedOut,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Unavailable(String),

    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed gateway response: {0}")]
    Malformed(String),

    #[error("gateway request timed out")]
    Timeout,
}

impl GatewayError {
    /// Worth polling again before the caller's deadline
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) | GatewayError::Timeout => true,
            GatewayError::Status { status, .. } => *status >= 500,
            GatewayError::Malformed(_) => false,
        }
    }
}

#[async_trait]
pub trait LightningGateway: Send + Sync {
    async fn create_invoice(
        &self,
        amount_msats: i64,
        description: &str,
    ) -> Result<GatewayInvoice, GatewayError>;

    async fn check_invoice_paid(&self, payment_hash: &str) -> Result<bool, GatewayError>;

    /// Pay a BOLT11 invoice, giving up after `timeout`
    async fn pay_invoice(&self, bolt11: &str, timeout: Duration) -> PaymentOutcome;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Poll until the invoice is paid, `timeout` elapses or `cancel` fires.
    ///
    /// Poll errors are logged and retried until the deadline.
    async fn wait_for_payment(
        &self,
        payment_hash: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                polled = tokio::time::timeout_at(deadline, self.check_invoice_paid(payment_hash)) => {
                    match polled {
                        Ok(Ok(true)) => return WaitOutcome::Confirmed,
                        Ok(Ok(false)) => {}
                        Ok(Err(e)) => debug!(
                            payment_hash = %crate::log_hash!(payment_hash),
                            error = %e,
                            transient = e.is_transient(),
                            "Invoice status poll failed"
                        ),
                        Err(_) => return WaitOutcome::TimedOut,
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            let nap = self.poll_interval().min(deadline - now);

            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}
