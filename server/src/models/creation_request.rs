//! Voucher creation requests
//!
//! One row per "create N vouchers" invoice. The row is keyed by the invoice
//! payment hash and moves from `pending` to exactly one terminal state.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::voucher_creation_requests;

/// Lifecycle of a creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationStatus {
    Pending,
    Complete,
    Expired,
}

impl CreationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationStatus::Pending => "pending",
            CreationStatus::Complete => "complete",
            CreationStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CreationStatus::Pending),
            "complete" => Some(CreationStatus::Complete),
            "expired" => Some(CreationStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CreationStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = voucher_creation_requests)]
#[diesel(primary_key(payment_hash))]
pub struct CreationRequest {
    pub payment_hash: String,
    pub lightning_address: String,
    pub count: i32,
    pub expiry_seconds: i64,
    pub fee_msats: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = voucher_creation_requests)]
pub struct NewCreationRequest {
    pub payment_hash: String,
    pub lightning_address: String,
    pub count: i32,
    pub expiry_seconds: i64,
    pub fee_msats: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
}

impl CreationRequest {
    /// Parsed status; unknown strings read as pending so they are never
    /// reported as finished.
    pub fn status(&self) -> CreationStatus {
        CreationStatus::from_str(&self.status).unwrap_or(CreationStatus::Pending)
    }

    pub fn insert(conn: &mut SqliteConnection, new: &NewCreationRequest) -> QueryResult<usize> {
        diesel::insert_into(voucher_creation_requests::table)
            .values(new)
            .execute(conn)
    }

    pub fn find(conn: &mut SqliteConnection, hash: &str) -> QueryResult<Option<Self>> {
        voucher_creation_requests::table
            .filter(voucher_creation_requests::payment_hash.eq(hash))
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    /// Move a pending request to `status`. Returns the number of rows changed,
    /// which is zero if the request already reached a terminal state.
    pub fn finish(
        conn: &mut SqliteConnection,
        hash: &str,
        status: CreationStatus,
    ) -> QueryResult<usize> {
        diesel::update(
            voucher_creation_requests::table
                .filter(voucher_creation_requests::payment_hash.eq(hash))
                .filter(voucher_creation_requests::status.eq(CreationStatus::Pending.as_str())),
        )
        .set(voucher_creation_requests::status.eq(status.as_str()))
        .execute(conn)
    }
}
