//! LNURL endpoints consumed by wallets
//!
//! Every outcome is HTTP 200. Failures carry `{"status":"ERROR","reason":..}`.

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::{error, warn};

use crate::lnurl::protocol::LnurlStatus;
use crate::services::{FlowError, FundingService, WithdrawalService};

#[derive(Debug, Deserialize)]
pub struct PayCallbackQuery {
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawCallbackQuery {
    pub k1: Option<String>,
    pub pr: Option<String>,
}

fn lnurl_error(endpoint: &'static str, err: FlowError) -> HttpResponse {
    if err.is_internal() {
        error!(endpoint, error = ?err, "LNURL request failed");
    } else {
        warn!(endpoint, reason = %err, "LNURL request rejected");
    }
    LnurlStatus::error(err.lnurl_reason()).into_response()
}

/// `GET /pay/{pay_id}`
#[get("/pay/{pay_id}")]
pub async fn pay_request(funding: web::Data<FundingService>, path: web::Path<String>) -> HttpResponse {
    match funding.pay_request(&path).await {
        Ok(req) => HttpResponse::Ok().json(req),
        Err(e) => lnurl_error("pay", e),
    }
}

/// `GET /pay/{pay_id}/callback?amount=<msats>`
#[get("/pay/{pay_id}/callback")]
pub async fn pay_callback(
    funding: web::Data<FundingService>,
    path: web::Path<String>,
    query: web::Query<PayCallbackQuery>,
) -> HttpResponse {
    let amount = match query.amount.as_deref() {
        None | Some("") => {
            return lnurl_error("pay_callback", FlowError::Validation("missing amount parameter".into()))
        }
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(amount) => amount,
            Err(_) => {
                return lnurl_error("pay_callback", FlowError::Validation("invalid amount".into()))
            }
        },
    };

    match funding.pay_callback(&path, amount).await {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => lnurl_error("pay_callback", e),
    }
}

/// `GET /withdraw/{withdraw_id}`
#[get("/withdraw/{withdraw_id}")]
pub async fn withdraw_request(
    withdrawals: web::Data<WithdrawalService>,
    path: web::Path<String>,
) -> HttpResponse {
    match withdrawals.withdraw_request(&path).await {
        Ok(req) => HttpResponse::Ok().json(req),
        Err(e) => lnurl_error("withdraw", e),
    }
}

/// `GET /withdraw/{withdraw_id}/callback?k1=&pr=`
#[get("/withdraw/{withdraw_id}/callback")]
pub async fn withdraw_callback(
    withdrawals: web::Data<WithdrawalService>,
    path: web::Path<String>,
    query: web::Query<WithdrawCallbackQuery>,
) -> HttpResponse {
    let k1 = query.k1.as_deref().unwrap_or("").trim();
    let pr = query.pr.as_deref().unwrap_or("").trim();

    match withdrawals.withdraw_callback(&path, k1, pr).await {
        Ok(()) => LnurlStatus::ok().into_response(),
        Err(e) => lnurl_error("withdraw_callback", e),
    }
}
