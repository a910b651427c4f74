//! Voucher batch creation
//!
//! The buyer pays a flat fee invoice; once the gateway confirms it, the batch
//! of vouchers is inserted and the request completes. Status pollers only
//! ever see the request's status move from `pending` to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{FlowError, TaskSupervisor, INVOICE_TIMEOUT};
use crate::config::{FeeConfig, VoucherConfig};
use crate::gateway::{GatewayError, LightningGateway, WaitOutcome};
use crate::lnurl::is_valid_lightning_address;
use crate::models::creation_request::{CreationRequest, CreationStatus, NewCreationRequest};
use crate::models::voucher::Voucher;
use crate::repositories::VoucherStore;

/// Body of `POST /api/vouchers/invoice`
#[derive(Debug, Clone, Deserialize)]
pub struct NewVoucherBatch {
    pub lightning_address: String,
    pub count: i64,
    #[serde(default)]
    pub expiry_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    pub invoice: String,
    pub payment_hash: String,
    pub fee_sats: i64,
}

#[derive(Clone)]
pub struct CreationService {
    store: VoucherStore,
    gateway: Arc<dyn LightningGateway>,
    supervisor: TaskSupervisor,
    fees: FeeConfig,
    vouchers: VoucherConfig,
    wait_timeout: Duration,
}

impl CreationService {
    pub fn new(
        store: VoucherStore,
        gateway: Arc<dyn LightningGateway>,
        supervisor: TaskSupervisor,
        fees: FeeConfig,
        vouchers: VoucherConfig,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            supervisor,
            fees,
            vouchers,
            wait_timeout,
        }
    }

    /// Issue the fee invoice for a batch and start waiting for its payment
    pub async fn request_batch(&self, req: NewVoucherBatch) -> Result<CreatedInvoice, FlowError> {
        let address = req.lightning_address.trim().to_string();
        if !is_valid_lightning_address(&address) {
            return Err(FlowError::Validation("invalid lightning address".to_string()));
        }
        if !self.vouchers.count_allowed(req.count) {
            return Err(FlowError::Validation(format!(
                "count must be between 1 and {}",
                self.vouchers.max_per_request
            )));
        }

        let expiry_seconds = self.vouchers.relative_expiry(req.expiry_seconds);
        let fee_sats = self.fees.creation_fee_sats(req.count);
        let fee_msats = self.fees.creation_fee_msats(req.count);
        let description = format!("TipMe: create {} voucher(s)", req.count);

        let invoice = tokio::time::timeout(
            INVOICE_TIMEOUT,
            self.gateway.create_invoice(fee_msats, &description),
        )
        .await
        .map_err(|_| GatewayError::Timeout)??;

        let count = i32::try_from(req.count)
            .map_err(|_| FlowError::Validation("count out of range".to_string()))?;
        self.store
            .insert_creation_request(NewCreationRequest {
                payment_hash: invoice.payment_hash.clone(),
                lightning_address: address.clone(),
                count,
                expiry_seconds,
                fee_msats,
                status: CreationStatus::Pending.as_str().to_string(),
                created_at: Utc::now().naive_utc(),
            })
            .await?;

        info!(
            payment_hash = %crate::log_hash!(&invoice.payment_hash),
            address = %crate::log_address!(&address),
            count,
            fee_sats,
            "Voucher batch requested"
        );

        let service = self.clone();
        let hash = invoice.payment_hash.clone();
        self.supervisor.spawn_detached("creation-waiter", async move {
            service.complete_when_paid(&hash).await
        });

        Ok(CreatedInvoice {
            invoice: invoice.invoice,
            payment_hash: invoice.payment_hash,
            fee_sats,
        })
    }

    /// Background half of `request_batch`
    pub async fn complete_when_paid(&self, payment_hash: &str) -> anyhow::Result<()> {
        let cancel = self.supervisor.cancellation_token();
        let outcome = self
            .gateway
            .wait_for_payment(payment_hash, self.wait_timeout, &cancel)
            .await;

        if outcome != WaitOutcome::Confirmed {
            info!(
                payment_hash = %crate::log_hash!(payment_hash),
                outcome = ?outcome,
                "Creation invoice not paid, expiring request"
            );
            self.store.expire_creation_request(payment_hash).await?;
            return Ok(());
        }

        match self.store.create_batch(payment_hash).await {
            Ok(vouchers) => {
                info!(
                    payment_hash = %crate::log_hash!(payment_hash),
                    count = vouchers.len(),
                    "Voucher batch created"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    payment_hash = %crate::log_hash!(payment_hash),
                    error = %e,
                    reconciliation = true,
                    "CRITICAL: creation fee paid but vouchers could not be created"
                );
                if let Err(expire_err) = self.store.expire_creation_request(payment_hash).await {
                    warn!(
                        payment_hash = %crate::log_hash!(payment_hash),
                        error = %expire_err,
                        "Failed to expire creation request"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Request row plus its vouchers once complete
    pub async fn status(&self, payment_hash: &str) -> Result<(CreationRequest, Vec<Voucher>), FlowError> {
        let request = self
            .store
            .creation_request(payment_hash)
            .await?
            .ok_or(FlowError::NotFound)?;

        let vouchers = if request.status() == CreationStatus::Complete {
            self.store.vouchers_for_creation(payment_hash).await?
        } else {
            Vec::new()
        };
        Ok((request, vouchers))
    }

    pub fn absolute_expiry_secs(&self) -> i64 {
        self.vouchers.absolute_expiry_secs
    }
}
