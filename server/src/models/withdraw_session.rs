//! Single-use LNURL-Withdraw sessions

use chrono::NaiveDateTime;
use diesel::prelude::*;
use rand::RngCore;

use crate::schema::withdraw_sessions;

/// Raw length of a session challenge before hex encoding
pub const K1_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = withdraw_sessions)]
#[diesel(primary_key(k1))]
pub struct WithdrawSession {
    pub k1: String,
    pub withdraw_id: String,
    pub used: bool,
    pub created_at: NaiveDateTime,
    pub used_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = withdraw_sessions)]
pub struct NewWithdrawSession {
    pub k1: String,
    pub withdraw_id: String,
    pub used: bool,
    pub created_at: NaiveDateTime,
}

/// 32 random bytes, hex encoded
pub fn generate_k1() -> String {
    let mut bytes = [0u8; K1_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl NewWithdrawSession {
    pub fn generate(withdraw_id: &str, created_at: NaiveDateTime) -> Self {
        Self {
            k1: generate_k1(),
            withdraw_id: withdraw_id.to_string(),
            used: false,
            created_at,
        }
    }
}

impl WithdrawSession {
    pub fn insert(conn: &mut SqliteConnection, new: &NewWithdrawSession) -> QueryResult<usize> {
        diesel::insert_into(withdraw_sessions::table)
            .values(new)
            .execute(conn)
    }

    pub fn find(conn: &mut SqliteConnection, k1: &str) -> QueryResult<Option<Self>> {
        withdraw_sessions::table
            .filter(withdraw_sessions::k1.eq(k1))
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    /// Consume the session. Zero rows changed means it was already used.
    pub fn mark_used(conn: &mut SqliteConnection, k1: &str, now: NaiveDateTime) -> QueryResult<usize> {
        diesel::update(
            withdraw_sessions::table
                .filter(withdraw_sessions::k1.eq(k1))
                .filter(withdraw_sessions::used.eq(false)),
        )
        .set((
            withdraw_sessions::used.eq(true),
            withdraw_sessions::used_at.eq(Some(now)),
        ))
        .execute(conn)
    }

    /// Burn every other unused session of `withdraw_id`.
    pub fn revoke_others(
        conn: &mut SqliteConnection,
        withdraw_id: &str,
        keep_k1: &str,
        now: NaiveDateTime,
    ) -> QueryResult<usize> {
        diesel::update(
            withdraw_sessions::table
                .filter(withdraw_sessions::withdraw_id.eq(withdraw_id))
                .filter(withdraw_sessions::k1.ne(keep_k1))
                .filter(withdraw_sessions::used.eq(false)),
        )
        .set((
            withdraw_sessions::used.eq(true),
            withdraw_sessions::used_at.eq(Some(now)),
        ))
        .execute(conn)
    }
}
