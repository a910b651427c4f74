//! Funding invoices issued through a voucher's LNURL-Pay callback

use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::pay_invoices;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = pay_invoices)]
pub struct PayInvoice {
    pub id: String,
    pub pay_id: String,
    pub payment_hash: String,
    pub amount_msats: i64,
    pub credited_msats: i64,
    pub paid: bool,
    pub created_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pay_invoices)]
pub struct NewPayInvoice {
    pub id: String,
    pub pay_id: String,
    pub payment_hash: String,
    pub amount_msats: i64,
    pub credited_msats: i64,
    pub paid: bool,
    pub created_at: NaiveDateTime,
}

impl NewPayInvoice {
    pub fn new(
        pay_id: &str,
        payment_hash: &str,
        amount_msats: i64,
        credited_msats: i64,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pay_id: pay_id.to_string(),
            payment_hash: payment_hash.to_string(),
            amount_msats,
            credited_msats,
            paid: false,
            created_at,
        }
    }
}

impl PayInvoice {
    pub fn insert(conn: &mut SqliteConnection, new: &NewPayInvoice) -> QueryResult<usize> {
        diesel::insert_into(pay_invoices::table)
            .values(new)
            .execute(conn)
    }

    pub fn find_by_hash(conn: &mut SqliteConnection, hash: &str) -> QueryResult<Option<Self>> {
        pay_invoices::table
            .filter(pay_invoices::payment_hash.eq(hash))
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    /// Flip `paid` once. Zero rows changed means the invoice was already
    /// settled or does not exist.
    pub fn mark_paid(conn: &mut SqliteConnection, hash: &str, now: NaiveDateTime) -> QueryResult<usize> {
        diesel::update(
            pay_invoices::table
                .filter(pay_invoices::payment_hash.eq(hash))
                .filter(pay_invoices::paid.eq(false)),
        )
        .set((pay_invoices::paid.eq(true), pay_invoices::paid_at.eq(Some(now))))
        .execute(conn)
    }

    /// Settled funding payments of one voucher, oldest first
    pub fn find_paid_by_pay_id(conn: &mut SqliteConnection, id: &str) -> QueryResult<Vec<Self>> {
        pay_invoices::table
            .filter(pay_invoices::pay_id.eq(id))
            .filter(pay_invoices::paid.eq(true))
            .order(pay_invoices::paid_at.asc())
            .select(Self::as_select())
            .load(conn)
    }
}
