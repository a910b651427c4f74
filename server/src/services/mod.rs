//! Voucher protocol flows
//!
//! Each flow validates input, talks to the store and the gateway, and hands
//! payment waiting to a detached task. Flow failures are `FlowError`s; the
//! HTTP layer turns them into LNURL error bodies or JSON API errors.

pub mod creation;
pub mod funding;
pub mod refund;
pub mod tasks;
pub mod withdrawal;

use std::time::Duration;

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::repositories::StoreError;

pub use creation::{CreatedInvoice, CreationService, NewVoucherBatch};
pub use funding::FundingService;
pub use refund::{RefundError, RefundJob, RefundReport, Refunder};
pub use tasks::TaskSupervisor;
pub use withdrawal::WithdrawalService;

/// Upper bound on a gateway invoice creation call
pub const INVOICE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("{0}")]
    Validation(String),

    #[error("voucher not found")]
    NotFound,

    #[error("voucher is not active")]
    Inactive,

    #[error("voucher has no balance")]
    NoBalance,

    #[error("amount too small to cover fee")]
    AmountTooSmall,

    #[error("withdrawal already in progress")]
    WithdrawalInProgress,

    #[error("invalid or already-used k1")]
    Session(#[source] StoreError),

    #[error("failed to create invoice")]
    Gateway(#[source] GatewayError),

    #[error("payment failed")]
    PaymentFailed,

    #[error("payment timed out")]
    PaymentAmbiguous,

    #[error("database error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for FlowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => FlowError::NotFound,
            StoreError::Inactive => FlowError::Inactive,
            StoreError::NoBalance => FlowError::NoBalance,
            e if e.is_session_error() => FlowError::Session(e),
            e => FlowError::Store(e),
        }
    }
}

impl From<GatewayError> for FlowError {
    fn from(err: GatewayError) -> Self {
        FlowError::Gateway(err)
    }
}

impl FlowError {
    /// `reason` of the LNURL `{"status":"ERROR"}` body
    pub fn lnurl_reason(&self) -> String {
        self.to_string()
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, FlowError::Store(_))
    }
}
