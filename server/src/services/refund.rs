//! Refunds to lightning addresses
//!
//! `Refunder` pays an amount back to a voucher owner's lightning address.
//! `RefundJob` sweeps vouchers whose funding window or absolute lifetime has
//! run out and refunds their balance.
//!
//! A voucher is always deactivated before its refund is paid. If the payment
//! outcome is unknown the voucher stays deactivated, so no later sweep can
//! pay the same balance twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::gateway::{LightningGateway, PaymentOutcome};
use crate::lnurl::address::{PayEndpointResolver, ResolveError};
use crate::models::voucher::Voucher;
use crate::repositories::{StoreError, VoucherStore};

/// Upper bound on the outbound refund payment
pub const REFUND_PAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RefundError {
    #[error("resolve lightning address: {0}")]
    Resolve(#[source] ResolveError),

    #[error("refund amount {amount_msats} msats is below target minSendable {min_sendable} msats (dust)")]
    Dust { amount_msats: i64, min_sendable: i64 },

    #[error("get invoice from callback: {0}")]
    Invoice(#[source] ResolveError),

    #[error("refund payment failed: {0}")]
    PaymentFailed(String),

    #[error("refund payment outcome unknown: {0}")]
    PaymentAmbiguous(String),
}

impl RefundError {
    /// Money may have left the node
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, RefundError::PaymentAmbiguous(_))
    }

    pub fn is_dust(&self) -> bool {
        matches!(self, RefundError::Dust { .. })
    }
}

#[derive(Clone)]
pub struct Refunder {
    resolver: Arc<dyn PayEndpointResolver>,
    gateway: Arc<dyn LightningGateway>,
}

impl Refunder {
    pub fn new(resolver: Arc<dyn PayEndpointResolver>, gateway: Arc<dyn LightningGateway>) -> Self {
        Self { resolver, gateway }
    }

    /// Pay `amount_msats` (capped and rounded per the target endpoint) to
    /// `address`. Returns the amount actually paid.
    ///
    /// Dust never reaches the gateway.
    pub async fn refund_to_lightning_address(
        &self,
        address: &str,
        amount_msats: i64,
    ) -> Result<i64, RefundError> {
        let endpoint = self
            .resolver
            .resolve(address)
            .await
            .map_err(RefundError::Resolve)?;

        let amount = endpoint
            .refund_amount(amount_msats)
            .ok_or(RefundError::Dust {
                amount_msats,
                min_sendable: endpoint.min_sendable,
            })?;

        let invoice = self
            .resolver
            .request_invoice(&endpoint.callback, amount)
            .await
            .map_err(RefundError::Invoice)?;

        match self.gateway.pay_invoice(&invoice, REFUND_PAY_TIMEOUT).await {
            PaymentOutcome::Paid => Ok(amount),
            PaymentOutcome::Failed(reason) => Err(RefundError::PaymentFailed(reason)),
            PaymentOutcome::Ambiguous(reason) => Err(RefundError::PaymentAmbiguous(reason)),
        }
    }

    /// Refund and log the outcome; used where no retry is possible
    pub async fn refund_and_log(&self, pay_id: &str, address: &str, amount_msats: i64) {
        match self.refund_to_lightning_address(address, amount_msats).await {
            Ok(paid) => info!(
                pay_id = %crate::log_id!(pay_id),
                paid_msats = paid,
                "Refund paid"
            ),
            Err(e) if e.is_dust() => warn!(
                pay_id = %crate::log_id!(pay_id),
                amount_msats,
                "Refund dropped as dust"
            ),
            Err(e) => error!(
                pay_id = %crate::log_id!(pay_id),
                address = %crate::log_address!(address),
                amount_msats,
                error = %e,
                reconciliation = true,
                "CRITICAL: refund of received payment did not complete"
            ),
        }
    }
}

/// What happened to one voucher during a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatus {
    Refunded,
    /// Another actor already drained or deactivated it
    Skipped,
    /// Below the target's minimum; balance dropped
    Dust,
    /// Definitive failure; balance restored for the next run
    Retrying,
    /// Outcome unknown; left deactivated for manual reconciliation
    Ambiguous,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefundReport {
    pub examined: usize,
    pub refunded: usize,
    pub skipped: usize,
    pub dust: usize,
    pub retrying: usize,
    pub ambiguous: usize,
    pub errors: usize,
}

impl RefundReport {
    fn record(&mut self, status: RefundStatus) {
        self.examined += 1;
        match status {
            RefundStatus::Refunded => self.refunded += 1,
            RefundStatus::Skipped => self.skipped += 1,
            RefundStatus::Dust => self.dust += 1,
            RefundStatus::Retrying => self.retrying += 1,
            RefundStatus::Ambiguous => self.ambiguous += 1,
            RefundStatus::Error => self.errors += 1,
        }
    }
}

pub struct RefundJob {
    store: VoucherStore,
    refunder: Refunder,
    period: Duration,
}

impl RefundJob {
    pub fn new(store: VoucherStore, refunder: Refunder, period: Duration) -> Self {
        Self {
            store,
            refunder,
            period,
        }
    }

    /// Run once immediately, then every `period` until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = self.period.as_secs(), "Starting refund job");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Refund job stopped");
                    return;
                }
                _ = timer.tick() => {}
            }

            if let Err(e) = self.run_once().await {
                error!("Error running refund sweep: {}", e);
            }
        }
    }

    /// One sweep over every expired, funded voucher, processed in sequence
    pub async fn run_once(&self) -> Result<RefundReport, StoreError> {
        let expired = self
            .store
            .find_expired_funded_vouchers(Utc::now().naive_utc())
            .await?;
        info!(count = expired.len(), "Refund sweep found expired vouchers with balance");

        let mut report = RefundReport::default();
        for voucher in &expired {
            report.record(self.refund_voucher(voucher).await);
        }

        if report.examined > 0 {
            info!(?report, "Refund sweep finished");
        }
        Ok(report)
    }

    async fn refund_voucher(&self, voucher: &Voucher) -> RefundStatus {
        let pay_id = voucher.pay_id.as_str();

        let balance = match self.store.deactivate_for_refund(pay_id).await {
            Ok(Some(balance)) => balance,
            Ok(None) => return RefundStatus::Skipped,
            Err(e) => {
                warn!(pay_id = %crate::log_id!(pay_id), error = %e, "Failed to deactivate voucher for refund");
                return RefundStatus::Error;
            }
        };

        info!(
            pay_id = %crate::log_id!(pay_id),
            balance_msats = balance,
            address = %crate::log_address!(&voucher.lightning_address),
            "Refunding expired voucher"
        );

        match self
            .refunder
            .refund_to_lightning_address(&voucher.lightning_address, balance)
            .await
        {
            Ok(paid) => {
                info!(pay_id = %crate::log_id!(pay_id), paid_msats = paid, "Voucher refunded");
                RefundStatus::Refunded
            }
            Err(e) if e.is_dust() => {
                warn!(
                    pay_id = %crate::log_id!(pay_id),
                    balance_msats = balance,
                    error = %e,
                    "Refund dropped as dust, voucher stays deactivated"
                );
                RefundStatus::Dust
            }
            Err(e) if e.is_ambiguous() => {
                error!(
                    pay_id = %crate::log_id!(pay_id),
                    balance_msats = balance,
                    address = %crate::log_address!(&voucher.lightning_address),
                    error = %e,
                    reconciliation = true,
                    "CRITICAL: refund payment outcome unknown, voucher left deactivated"
                );
                RefundStatus::Ambiguous
            }
            Err(e) => {
                warn!(
                    pay_id = %crate::log_id!(pay_id),
                    error = %e,
                    "Refund failed, re-activating voucher for next run"
                );
                if let Err(re) = self.store.reactivate_with_balance(pay_id, balance).await {
                    error!(
                        pay_id = %crate::log_id!(pay_id),
                        balance_msats = balance,
                        error = %re,
                        reconciliation = true,
                        "CRITICAL: failed to re-activate voucher after failed refund"
                    );
                    return RefundStatus::Error;
                }
                RefundStatus::Retrying
            }
        }
    }
}
