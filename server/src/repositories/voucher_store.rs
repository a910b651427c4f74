//! Transactional voucher store
//!
//! Every check-then-act sequence runs inside one `BEGIN IMMEDIATE`
//! transaction. SQLite hands out a single write lock, so two writers touching
//! the same voucher are serialized by the storage engine and neither can act
//! on a balance the other has already changed.
//!
//! Reads outside a transaction (`voucher_by_pay_id` and friends) may be stale;
//! callers re-validate through one of the transactional operations before
//! moving money.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::DbPool;
use crate::models::creation_request::{CreationRequest, CreationStatus, NewCreationRequest};
use crate::models::pay_invoice::{NewPayInvoice, PayInvoice};
use crate::models::voucher::{NewVoucher, Voucher};
use crate::models::withdraw_session::{NewWithdrawSession, WithdrawSession};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("voucher is not active")]
    Inactive,

    #[error("voucher has no balance")]
    NoBalance,

    #[error("invoice already paid")]
    InvoiceAlreadyPaid,

    #[error("withdraw session not found")]
    SessionNotFound,

    #[error("withdraw session belongs to another voucher")]
    SessionMismatch,

    #[error("withdraw session already used")]
    SessionUsed,

    #[error("conflicting state: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("blocking task failed: {0}")]
    Join(String),
}

impl StoreError {
    /// Session failures all map to the same protocol reason
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            StoreError::SessionNotFound | StoreError::SessionMismatch | StoreError::SessionUsed
        )
    }

    /// Storage-layer failure rather than a domain outcome
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_) | StoreError::Pool(_) | StoreError::Join(_)
        )
    }
}

/// Result of `credit_if_active`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Balance increased; carries the updated voucher
    Credited(Voucher),
    /// Voucher was no longer active; nothing was written
    Inactive(Voucher),
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn map_unique(err: DieselError, what: &str) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StoreError::Conflict(format!("duplicate {}", what))
        }
        other => StoreError::Database(other),
    }
}

#[derive(Clone)]
pub struct VoucherStore {
    pool: DbPool,
    absolute_expiry_secs: i64,
}

impl VoucherStore {
    pub fn new(pool: DbPool, absolute_expiry_secs: i64) -> Self {
        Self {
            pool,
            absolute_expiry_secs,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn absolute_expiry_secs(&self) -> i64 {
        self.absolute_expiry_secs
    }

    /// Derived is-active predicate evaluated against the current clock
    pub fn is_active(&self, voucher: &Voucher) -> bool {
        voucher.is_active_at(now(), self.absolute_expiry_secs)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Run `f` inside `BEGIN IMMEDIATE ... COMMIT`; any error rolls back.
    async fn write<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        self.with_conn(move |conn| conn.immediate_transaction(f)).await
    }

    // ---- creation requests ----

    pub async fn insert_creation_request(&self, new: NewCreationRequest) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            CreationRequest::insert(conn, &new).map_err(|e| map_unique(e, "payment hash"))?;
            Ok(())
        })
        .await
    }

    pub async fn creation_request(&self, hash: &str) -> Result<Option<CreationRequest>, StoreError> {
        let hash = hash.to_string();
        self.with_conn(move |conn| Ok(CreationRequest::find(conn, &hash)?))
            .await
    }

    /// Mark a pending request expired. Returns false if it had already
    /// reached a terminal state.
    pub async fn expire_creation_request(&self, hash: &str) -> Result<bool, StoreError> {
        let hash = hash.to_string();
        self.write(move |conn| {
            Ok(CreationRequest::finish(conn, &hash, CreationStatus::Expired)? == 1)
        })
        .await
    }

    /// Insert the request's vouchers and mark it complete, atomically.
    pub async fn create_batch(&self, hash: &str) -> Result<Vec<Voucher>, StoreError> {
        let hash = hash.to_string();
        self.write(move |conn| {
            let request = CreationRequest::find(conn, &hash)?.ok_or(StoreError::NotFound)?;
            if request.status() != CreationStatus::Pending {
                return Err(StoreError::Conflict(format!(
                    "creation request is {}",
                    request.status
                )));
            }

            let created_at = now();
            let batch: Vec<NewVoucher> = (0..request.count)
                .map(|_| {
                    NewVoucher::generate(
                        Some(request.payment_hash.clone()),
                        &request.lightning_address,
                        request.expiry_seconds,
                        created_at,
                    )
                })
                .collect();

            Voucher::insert_batch(conn, &batch)?;
            CreationRequest::finish(conn, &hash, CreationStatus::Complete)?;

            Ok(Voucher::find_by_creation_hash(conn, &hash)?)
        })
        .await
    }

    pub async fn vouchers_for_creation(&self, hash: &str) -> Result<Vec<Voucher>, StoreError> {
        let hash = hash.to_string();
        self.with_conn(move |conn| Ok(Voucher::find_by_creation_hash(conn, &hash)?))
            .await
    }

    // ---- vouchers ----

    pub async fn voucher_by_pay_id(&self, pay_id: &str) -> Result<Option<Voucher>, StoreError> {
        let id = pay_id.to_string();
        self.with_conn(move |conn| Ok(Voucher::find_by_pay_id(conn, &id)?))
            .await
    }

    pub async fn voucher_by_withdraw_id(
        &self,
        withdraw_id: &str,
    ) -> Result<Option<Voucher>, StoreError> {
        let id = withdraw_id.to_string();
        self.with_conn(move |conn| Ok(Voucher::find_by_withdraw_id(conn, &id)?))
            .await
    }

    /// Credit a settled funding invoice if the voucher is still active.
    ///
    /// The invoice must belong to `pay_id` and be unpaid. When the voucher is
    /// inactive nothing is written and the invoice stays unpaid; the caller
    /// refunds the payer.
    pub async fn credit_if_active(
        &self,
        pay_id: &str,
        credited_msats: i64,
        payment_hash: &str,
    ) -> Result<CreditOutcome, StoreError> {
        let pay_id = pay_id.to_string();
        let hash = payment_hash.to_string();
        let absolute_expiry = self.absolute_expiry_secs;

        self.write(move |conn| {
            let invoice = PayInvoice::find_by_hash(conn, &hash)?
                .filter(|inv| inv.pay_id == pay_id)
                .ok_or(StoreError::NotFound)?;
            if invoice.paid {
                return Err(StoreError::InvoiceAlreadyPaid);
            }

            let voucher = Voucher::find_by_pay_id(conn, &pay_id)?.ok_or(StoreError::NotFound)?;
            let at = now();
            if !voucher.is_active_at(at, absolute_expiry) {
                return Ok(CreditOutcome::Inactive(voucher));
            }

            if PayInvoice::mark_paid(conn, &hash, at)? != 1 {
                return Err(StoreError::InvoiceAlreadyPaid);
            }
            Voucher::credit(conn, &pay_id, credited_msats, at)?;

            let updated = Voucher::find_by_pay_id(conn, &pay_id)?.ok_or(StoreError::NotFound)?;
            debug!(
                pay_id = %crate::log_id!(&pay_id),
                credited_msats,
                balance_msats = updated.total_paid_msats,
                "Voucher credited"
            );
            Ok(CreditOutcome::Credited(updated))
        })
        .await
    }

    /// Zero the balance after a withdrawal payment. Returns the balance held
    /// before deactivation.
    pub async fn deactivate_for_withdrawal(&self, pay_id: &str) -> Result<i64, StoreError> {
        let pay_id = pay_id.to_string();
        self.write(move |conn| {
            let voucher = Voucher::find_by_pay_id(conn, &pay_id)?.ok_or(StoreError::NotFound)?;
            Voucher::deactivate(conn, &pay_id)?;
            Ok(voucher.total_paid_msats)
        })
        .await
    }

    /// Claim a voucher's balance ahead of a refund payment.
    ///
    /// Returns `None` when another actor already deactivated or drained it,
    /// so two sweeps can never both pay the same balance.
    pub async fn deactivate_for_refund(&self, pay_id: &str) -> Result<Option<i64>, StoreError> {
        let pay_id = pay_id.to_string();
        self.write(move |conn| {
            let voucher = Voucher::find_by_pay_id(conn, &pay_id)?.ok_or(StoreError::NotFound)?;
            if !voucher.active || voucher.total_paid_msats <= 0 {
                return Ok(None);
            }
            Voucher::deactivate(conn, &pay_id)?;
            Ok(Some(voucher.total_paid_msats))
        })
        .await
    }

    /// Restore a balance claimed by `deactivate_for_refund` after the refund
    /// definitively failed.
    pub async fn reactivate_with_balance(&self, pay_id: &str, balance_msats: i64) -> Result<(), StoreError> {
        let pay_id = pay_id.to_string();
        self.write(move |conn| {
            if Voucher::reactivate(conn, &pay_id, balance_msats)? != 1 {
                return Err(StoreError::NotFound);
            }
            info!(pay_id = %crate::log_id!(&pay_id), balance_msats, "Voucher reactivated");
            Ok(())
        })
        .await
    }

    /// Candidates for the refund sweep as of `at`
    pub async fn find_expired_funded_vouchers(&self, at: NaiveDateTime) -> Result<Vec<Voucher>, StoreError> {
        let absolute_expiry = self.absolute_expiry_secs;
        self.with_conn(move |conn| {
            Ok(Voucher::find_active_funded(conn)?
                .into_iter()
                .filter(|v| v.is_refund_due_at(at, absolute_expiry))
                .collect())
        })
        .await
    }

    // ---- funding invoices ----

    pub async fn insert_pay_invoice(&self, new: NewPayInvoice) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            PayInvoice::insert(conn, &new).map_err(|e| map_unique(e, "payment hash"))?;
            Ok(())
        })
        .await
    }

    pub async fn paid_invoices(&self, pay_id: &str) -> Result<Vec<PayInvoice>, StoreError> {
        let id = pay_id.to_string();
        self.with_conn(move |conn| Ok(PayInvoice::find_paid_by_pay_id(conn, &id)?))
            .await
    }

    // ---- withdraw sessions ----

    /// Mint a withdraw session for an active, funded voucher.
    pub async fn open_withdraw_session(
        &self,
        withdraw_id: &str,
    ) -> Result<(Voucher, WithdrawSession), StoreError> {
        let withdraw_id = withdraw_id.to_string();
        let absolute_expiry = self.absolute_expiry_secs;

        self.write(move |conn| {
            let voucher = Voucher::find_by_withdraw_id(conn, &withdraw_id)?
                .ok_or(StoreError::NotFound)?;
            let at = now();
            if !voucher.is_active_at(at, absolute_expiry) {
                return Err(StoreError::Inactive);
            }
            if voucher.total_paid_msats <= 0 {
                return Err(StoreError::NoBalance);
            }

            let new = NewWithdrawSession::generate(&withdraw_id, at);
            WithdrawSession::insert(conn, &new)?;
            let session = WithdrawSession::find(conn, &new.k1)?.ok_or(StoreError::NotFound)?;
            Ok((voucher, session))
        })
        .await
    }

    /// Consume a session and return the owning voucher.
    ///
    /// In the same transaction the voucher must still be active and funded,
    /// and every other open session for it is burned, so two sessions minted
    /// back to back cannot both reach the gateway.
    pub async fn validate_and_consume_session(
        &self,
        k1: &str,
        withdraw_id: &str,
    ) -> Result<Voucher, StoreError> {
        let k1 = k1.to_string();
        let withdraw_id = withdraw_id.to_string();
        let absolute_expiry = self.absolute_expiry_secs;

        self.write(move |conn| {
            let session = WithdrawSession::find(conn, &k1)?.ok_or(StoreError::SessionNotFound)?;
            if session.withdraw_id != withdraw_id {
                return Err(StoreError::SessionMismatch);
            }
            let at = now();
            if session.used || WithdrawSession::mark_used(conn, &k1, at)? != 1 {
                return Err(StoreError::SessionUsed);
            }

            let voucher = Voucher::find_by_withdraw_id(conn, &withdraw_id)?
                .ok_or(StoreError::NotFound)?;
            if !voucher.is_active_at(at, absolute_expiry) {
                return Err(StoreError::Inactive);
            }
            if voucher.total_paid_msats <= 0 {
                return Err(StoreError::NoBalance);
            }

            let revoked = WithdrawSession::revoke_others(conn, &withdraw_id, &k1, at)?;
            if revoked > 0 {
                debug!(
                    withdraw_id = %crate::log_id!(&withdraw_id),
                    revoked,
                    "Revoked sibling withdraw sessions"
                );
            }
            Ok(voucher)
        })
        .await
    }
}
