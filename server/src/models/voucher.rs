//! Voucher model
//!
//! A voucher is the redeemable unit: anyone can fund it through its
//! `pay_id` (LNURL-Pay) and the holder redeems the whole balance once through
//! its `withdraw_id` (LNURL-Withdraw). Both identifiers are random and fixed
//! for the lifetime of the row.

use chrono::{NaiveDateTime, TimeDelta};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::vouchers;

/// Add `secs` to a timestamp, saturating at the far future instead of panicking.
pub fn add_seconds(at: NaiveDateTime, secs: i64) -> NaiveDateTime {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Voucher row
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = vouchers)]
#[diesel(primary_key(pay_id))]
pub struct Voucher {
    pub pay_id: String,
    pub withdraw_id: String,
    pub creation_request_hash: Option<String>,
    pub lightning_address: String,
    pub total_paid_msats: i64,
    pub last_funded_at: Option<NaiveDateTime>,
    pub expiry_seconds: i64,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

/// Insertable voucher
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = vouchers)]
pub struct NewVoucher {
    pub pay_id: String,
    pub withdraw_id: String,
    pub creation_request_hash: Option<String>,
    pub lightning_address: String,
    pub total_paid_msats: i64,
    pub last_funded_at: Option<NaiveDateTime>,
    pub expiry_seconds: i64,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl NewVoucher {
    /// Fresh, unfunded voucher with newly drawn identifiers
    pub fn generate(
        creation_request_hash: Option<String>,
        lightning_address: &str,
        expiry_seconds: i64,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            pay_id: Uuid::new_v4().to_string(),
            withdraw_id: Uuid::new_v4().to_string(),
            creation_request_hash,
            lightning_address: lightning_address.to_string(),
            total_paid_msats: 0,
            last_funded_at: None,
            expiry_seconds,
            active: true,
            created_at,
        }
    }
}

impl Voucher {
    /// Hard deadline after which the voucher can never be used again
    pub fn absolute_expiry_at(&self, absolute_expiry_secs: i64) -> NaiveDateTime {
        add_seconds(self.created_at, absolute_expiry_secs)
    }

    /// Deadline of the relative funding window, if the voucher was ever funded
    pub fn relative_expiry_at(&self) -> Option<NaiveDateTime> {
        self.last_funded_at
            .map(|funded| add_seconds(funded, self.expiry_seconds))
    }

    /// The earlier of the two deadlines
    pub fn effective_expiry_at(&self, absolute_expiry_secs: i64) -> NaiveDateTime {
        let absolute = self.absolute_expiry_at(absolute_expiry_secs);
        match self.relative_expiry_at() {
            Some(relative) if relative < absolute => relative,
            _ => absolute,
        }
    }

    /// Derived is-active predicate. Both deadlines are inclusive.
    pub fn is_active_at(&self, now: NaiveDateTime, absolute_expiry_secs: i64) -> bool {
        if !self.active {
            return false;
        }
        if now > self.absolute_expiry_at(absolute_expiry_secs) {
            return false;
        }
        match self.relative_expiry_at() {
            Some(relative) => now <= relative,
            None => true,
        }
    }

    /// Active flag still set, balance held, and one of the deadlines reached
    pub fn is_refund_due_at(&self, now: NaiveDateTime, absolute_expiry_secs: i64) -> bool {
        if !self.active || self.total_paid_msats <= 0 {
            return false;
        }
        let relative_due = self.relative_expiry_at().is_some_and(|at| now >= at);
        relative_due || now >= self.absolute_expiry_at(absolute_expiry_secs)
    }

    pub fn find_by_pay_id(conn: &mut SqliteConnection, id: &str) -> QueryResult<Option<Self>> {
        vouchers::table
            .filter(vouchers::pay_id.eq(id))
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    pub fn find_by_withdraw_id(conn: &mut SqliteConnection, id: &str) -> QueryResult<Option<Self>> {
        vouchers::table
            .filter(vouchers::withdraw_id.eq(id))
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    /// Vouchers produced by one creation request, in insertion order
    pub fn find_by_creation_hash(conn: &mut SqliteConnection, hash: &str) -> QueryResult<Vec<Self>> {
        vouchers::table
            .filter(vouchers::creation_request_hash.eq(hash))
            .order(sql::<BigInt>("rowid"))
            .select(Self::as_select())
            .load(conn)
    }

    /// Candidates for the refund sweep; deadline filtering happens in Rust.
    pub fn find_active_funded(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        vouchers::table
            .filter(vouchers::active.eq(true))
            .filter(vouchers::total_paid_msats.gt(0))
            .select(Self::as_select())
            .load(conn)
    }

    pub fn insert_batch(conn: &mut SqliteConnection, batch: &[NewVoucher]) -> QueryResult<usize> {
        diesel::insert_into(vouchers::table).values(batch).execute(conn)
    }

    /// Add to the balance and restart the relative funding window
    pub fn credit(
        conn: &mut SqliteConnection,
        id: &str,
        credited_msats: i64,
        now: NaiveDateTime,
    ) -> QueryResult<usize> {
        diesel::update(vouchers::table.filter(vouchers::pay_id.eq(id)))
            .set((
                vouchers::total_paid_msats.eq(vouchers::total_paid_msats + credited_msats),
                vouchers::last_funded_at.eq(Some(now)),
            ))
            .execute(conn)
    }

    /// Zero the balance and clear the active flag
    pub fn deactivate(conn: &mut SqliteConnection, id: &str) -> QueryResult<usize> {
        diesel::update(vouchers::table.filter(vouchers::pay_id.eq(id)))
            .set((
                vouchers::total_paid_msats.eq(0i64),
                vouchers::active.eq(false),
            ))
            .execute(conn)
    }

    /// Restore a balance and the active flag
    pub fn reactivate(conn: &mut SqliteConnection, id: &str, balance_msats: i64) -> QueryResult<usize> {
        diesel::update(vouchers::table.filter(vouchers::pay_id.eq(id)))
            .set((
                vouchers::total_paid_msats.eq(balance_msats),
                vouchers::active.eq(true),
            ))
            .execute(conn)
    }
}
