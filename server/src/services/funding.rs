//! Voucher funding over LNURL-Pay
//!
//! Anyone holding the pay link can top up an active voucher. The payer is
//! charged the gross amount; the voucher is credited the amount net of the
//! funding fee once the gateway confirms payment.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::refund::Refunder;
use super::{FlowError, TaskSupervisor, INVOICE_TIMEOUT};
use crate::config::{FeeConfig, VoucherConfig};
use crate::gateway::{GatewayError, LightningGateway, WaitOutcome};
use crate::lnurl::links::{LinkKind, Links};
use crate::lnurl::protocol::{PayCallbackResponse, PayRequest};
use crate::models::pay_invoice::NewPayInvoice;
use crate::repositories::{CreditOutcome, VoucherStore};

pub const FUNDING_DESCRIPTION: &str = "TipMe voucher funding";

#[derive(Clone)]
pub struct FundingService {
    store: VoucherStore,
    gateway: Arc<dyn LightningGateway>,
    refunder: Refunder,
    supervisor: TaskSupervisor,
    links: Links,
    fees: FeeConfig,
    vouchers: VoucherConfig,
    wait_timeout: Duration,
}

impl FundingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: VoucherStore,
        gateway: Arc<dyn LightningGateway>,
        refunder: Refunder,
        supervisor: TaskSupervisor,
        links: Links,
        fees: FeeConfig,
        vouchers: VoucherConfig,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            refunder,
            supervisor,
            links,
            fees,
            vouchers,
            wait_timeout,
        }
    }

    /// LNURL-Pay step 1
    pub async fn pay_request(&self, pay_id: &str) -> Result<PayRequest, FlowError> {
        let voucher = self
            .store
            .voucher_by_pay_id(pay_id)
            .await?
            .ok_or(FlowError::NotFound)?;
        if !self.store.is_active(&voucher) {
            return Err(FlowError::Inactive);
        }

        let info_url = self
            .links
            .lnurl(LinkKind::Pay, pay_id)
            .ok()
            .map(|lnurl| self.links.info_url(&lnurl));

        Ok(PayRequest::new(
            self.links.callback_url(LinkKind::Pay, pay_id),
            self.vouchers.min_sendable_msats(),
            self.vouchers.max_sendable_msats(),
            info_url,
        ))
    }

    /// LNURL-Pay step 2: issue a funding invoice for `amount_msats`
    pub async fn pay_callback(
        &self,
        pay_id: &str,
        amount_msats: i64,
    ) -> Result<PayCallbackResponse, FlowError> {
        if amount_msats <= 0 {
            return Err(FlowError::Validation("invalid amount".to_string()));
        }
        let (min, max) = (
            self.vouchers.min_sendable_msats(),
            self.vouchers.max_sendable_msats(),
        );
        if amount_msats < min || amount_msats > max {
            return Err(FlowError::Validation(format!(
                "amount must be between {} and {} msats",
                min, max
            )));
        }

        let voucher = self
            .store
            .voucher_by_pay_id(pay_id)
            .await?
            .ok_or(FlowError::NotFound)?;
        if !self.store.is_active(&voucher) {
            return Err(FlowError::Inactive);
        }

        let credited_msats = self
            .fees
            .credited_msats(amount_msats)
            .ok_or(FlowError::AmountTooSmall)?;

        let invoice = tokio::time::timeout(
            INVOICE_TIMEOUT,
            self.gateway.create_invoice(amount_msats, FUNDING_DESCRIPTION),
        )
        .await
        .map_err(|_| GatewayError::Timeout)??;

        self.store
            .insert_pay_invoice(NewPayInvoice::new(
                pay_id,
                &invoice.payment_hash,
                amount_msats,
                credited_msats,
                Utc::now().naive_utc(),
            ))
            .await?;

        info!(
            pay_id = %crate::log_id!(pay_id),
            payment_hash = %crate::log_hash!(&invoice.payment_hash),
            amount_msats,
            credited_msats,
            "Funding invoice issued"
        );

        let service = self.clone();
        let pay_id = pay_id.to_string();
        let hash = invoice.payment_hash.clone();
        self.supervisor.spawn_detached("funding-waiter", async move {
            service.settle_when_paid(&pay_id, &hash, credited_msats).await
        });

        Ok(PayCallbackResponse::new(invoice.invoice))
    }

    /// Background half of `pay_callback`: credit the voucher, or refund the
    /// payer if the voucher stopped being active while the invoice was open.
    pub async fn settle_when_paid(
        &self,
        pay_id: &str,
        payment_hash: &str,
        credited_msats: i64,
    ) -> anyhow::Result<()> {
        let cancel = self.supervisor.cancellation_token();
        let outcome = self
            .gateway
            .wait_for_payment(payment_hash, self.wait_timeout, &cancel)
            .await;
        if outcome != WaitOutcome::Confirmed {
            info!(
                pay_id = %crate::log_id!(pay_id),
                outcome = ?outcome,
                "Funding invoice not paid"
            );
            return Ok(());
        }

        match self
            .store
            .credit_if_active(pay_id, credited_msats, payment_hash)
            .await
        {
            Ok(CreditOutcome::Credited(voucher)) => {
                info!(
                    pay_id = %crate::log_id!(pay_id),
                    credited_msats,
                    balance_msats = voucher.total_paid_msats,
                    "Voucher funded"
                );
                Ok(())
            }
            Ok(CreditOutcome::Inactive(voucher)) => {
                warn!(
                    pay_id = %crate::log_id!(pay_id),
                    credited_msats,
                    address = %crate::log_address!(&voucher.lightning_address),
                    "Voucher became inactive after payment, refunding payer"
                );
                self.refunder
                    .refund_and_log(pay_id, &voucher.lightning_address, credited_msats)
                    .await;
                Ok(())
            }
            Err(e) => {
                error!(
                    pay_id = %crate::log_id!(pay_id),
                    payment_hash = %crate::log_hash!(payment_hash),
                    credited_msats,
                    error = %e,
                    reconciliation = true,
                    "CRITICAL: funding payment received but voucher not credited"
                );
                Err(e.into())
            }
        }
    }
}
