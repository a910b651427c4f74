//! Voucher redemption over LNURL-Withdraw
//!
//! The holder's wallet first fetches a single-use `k1`, then submits an
//! invoice for the full balance. How the payment outcome is handled decides
//! whether a voucher can ever pay out twice:
//!
//! - paid: deactivate; the wallet is told OK even if deactivation fails
//! - rejected: the voucher keeps its balance and can be retried
//! - unknown: deactivate anyway and flag for manual reconciliation
//!
//! At most one callback per voucher talks to the gateway at a time. A second
//! callback arriving while a payout is in flight is refused, even with a
//! freshly minted `k1`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tracing::{error, info, warn};

use super::FlowError;
use crate::gateway::{LightningGateway, PaymentOutcome};
use crate::lnurl::bolt11::invoice_amount_msats;
use crate::lnurl::links::{LinkKind, Links};
use crate::lnurl::protocol::WithdrawRequest;
use crate::logging::sanitize::sanitize_invoice;
use crate::repositories::VoucherStore;

/// Upper bound on the outbound withdrawal payment
pub const WITHDRAW_PAY_TIMEOUT: Duration = Duration::from_secs(60);

/// Marks a `withdraw_id` as paying out until dropped
struct PayoutGuard {
    in_flight: Arc<DashSet<String>>,
    withdraw_id: String,
}

impl Drop for PayoutGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.withdraw_id);
    }
}

#[derive(Clone)]
pub struct WithdrawalService {
    store: VoucherStore,
    gateway: Arc<dyn LightningGateway>,
    links: Links,
    /// withdraw_ids with a payout in progress
    in_flight: Arc<DashSet<String>>,
}

impl WithdrawalService {
    pub fn new(store: VoucherStore, gateway: Arc<dyn LightningGateway>, links: Links) -> Self {
        Self {
            store,
            gateway,
            links,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    fn begin_payout(&self, withdraw_id: &str) -> Result<PayoutGuard, FlowError> {
        if !self.in_flight.insert(withdraw_id.to_string()) {
            return Err(FlowError::WithdrawalInProgress);
        }
        Ok(PayoutGuard {
            in_flight: self.in_flight.clone(),
            withdraw_id: withdraw_id.to_string(),
        })
    }

    /// LNURL-Withdraw step 1: mint a session for the whole balance
    pub async fn withdraw_request(&self, withdraw_id: &str) -> Result<WithdrawRequest, FlowError> {
        if self.in_flight.contains(withdraw_id) {
            return Err(FlowError::WithdrawalInProgress);
        }
        let (voucher, session) = self.store.open_withdraw_session(withdraw_id).await?;

        let info_url = self
            .links
            .lnurl(LinkKind::Withdraw, withdraw_id)
            .ok()
            .map(|lnurl| self.links.info_url(&lnurl));

        Ok(WithdrawRequest::whole_balance(
            self.links.callback_url(LinkKind::Withdraw, withdraw_id),
            session.k1,
            voucher.total_paid_msats,
            info_url,
        ))
    }

    /// LNURL-Withdraw step 2: consume `k1` and pay `pr`
    pub async fn withdraw_callback(
        &self,
        withdraw_id: &str,
        k1: &str,
        pr: &str,
    ) -> Result<(), FlowError> {
        if k1.is_empty() || pr.is_empty() {
            return Err(FlowError::Validation("missing k1 or pr parameter".to_string()));
        }

        // Held until the voucher's fate is written back
        let _payout = self.begin_payout(withdraw_id)?;

        // Active and funded as of the transaction that consumed k1
        let voucher = self
            .store
            .validate_and_consume_session(k1, withdraw_id)
            .await
            .map_err(|e| {
                warn!(
                    withdraw_id = %crate::log_id!(withdraw_id),
                    k1 = %crate::log_hash!(k1),
                    error = %e,
                    "Withdraw session rejected"
                );
                FlowError::from(e)
            })?;
        let pay_id = voucher.pay_id;
        let balance = voucher.total_paid_msats;

        match invoice_amount_msats(pr) {
            Ok(Some(amount)) if amount > 0 && amount <= balance => {}
            Ok(Some(amount)) => {
                return Err(FlowError::Validation(format!(
                    "invoice amount {} msats exceeds balance {} msats",
                    amount, balance
                )))
            }
            Ok(None) => {
                return Err(FlowError::Validation("invoice must specify an amount".to_string()))
            }
            Err(e) => return Err(FlowError::Validation(e.to_string())),
        }

        match self.gateway.pay_invoice(pr, WITHDRAW_PAY_TIMEOUT).await {
            PaymentOutcome::Paid => {
                match self.store.deactivate_for_withdrawal(&pay_id).await {
                    Ok(previous) => info!(
                        pay_id = %crate::log_id!(&pay_id),
                        withdrawn_msats = previous,
                        "Voucher withdrawn"
                    ),
                    Err(e) => error!(
                        pay_id = %crate::log_id!(&pay_id),
                        balance_msats = balance,
                        error = %e,
                        reconciliation = true,
                        "CRITICAL: voucher paid out but not deactivated"
                    ),
                }
                Ok(())
            }
            PaymentOutcome::Failed(reason) => {
                warn!(
                    pay_id = %crate::log_id!(&pay_id),
                    invoice = %sanitize_invoice(pr),
                    reason = %reason,
                    "Withdrawal payment failed, voucher stays active"
                );
                Err(FlowError::PaymentFailed)
            }
            PaymentOutcome::Ambiguous(reason) => {
                error!(
                    pay_id = %crate::log_id!(&pay_id),
                    balance_msats = balance,
                    invoice = %sanitize_invoice(pr),
                    reason = %reason,
                    reconciliation = true,
                    "CRITICAL: withdrawal payment outcome unknown, deactivating voucher"
                );
                if let Err(e) = self.store.deactivate_for_withdrawal(&pay_id).await {
                    error!(
                        pay_id = %crate::log_id!(&pay_id),
                        error = %e,
                        reconciliation = true,
                        "CRITICAL: failed to deactivate voucher after unknown payment outcome"
                    );
                }
                Err(FlowError::PaymentAmbiguous)
            }
        }
    }
}
