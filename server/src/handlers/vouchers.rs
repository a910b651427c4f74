//! Buyer-facing JSON API
//!
//! `POST /api/vouchers/invoice` starts a batch, `GET /api/vouchers/status/{hash}`
//! is polled until the batch completes, and `GET /api/vouchers/info` describes
//! a voucher given either of its LNURLs.

use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::rfc3339;
use crate::error::ApiError;
use crate::lnurl::codec::decode_lnurl;
use crate::lnurl::links::{parse_voucher_url, LinkKind, Links};
use crate::models::creation_request::CreationStatus;
use crate::models::voucher::Voucher;
use crate::repositories::VoucherStore;
use crate::services::{CreationService, NewVoucherBatch};

#[derive(Debug, Serialize)]
pub struct CreateInvoiceResponse {
    pub invoice: String,
    pub payment_hash: String,
    pub fee_sats: i64,
}

#[derive(Debug, Serialize)]
pub struct VoucherLinks {
    pub lnurl_pay: String,
    pub lnurl_withdraw: String,
    pub lightning_address: String,
    pub absolute_expiry: String,
    pub relative_expiry_seconds: i64,
    pub pay_info_url: String,
    pub withdraw_info_url: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vouchers: Option<Vec<VoucherLinks>>,
}

#[derive(Debug, Serialize)]
pub struct FundingEntry {
    pub paid_at: String,
    pub credited_sats: i64,
}

#[derive(Debug, Serialize)]
pub struct VoucherInfo {
    pub kind: &'static str,
    pub active: bool,
    pub balance_sats: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub funding_history: Vec<FundingEntry>,
}

#[derive(Debug, Deserialize)]
pub struct InfoQuery {
    pub lightning: Option<String>,
}

/// `POST /api/vouchers/invoice`
#[post("/api/vouchers/invoice")]
pub async fn create_invoice(
    creation: web::Data<CreationService>,
    body: web::Json<NewVoucherBatch>,
) -> Result<HttpResponse, ApiError> {
    let created = creation.request_batch(body.into_inner()).await?;

    Ok(HttpResponse::Ok().json(CreateInvoiceResponse {
        invoice: created.invoice,
        payment_hash: created.payment_hash,
        fee_sats: created.fee_sats,
    }))
}

/// `GET /api/vouchers/status/{payment_hash}`
#[get("/api/vouchers/status/{payment_hash}")]
pub async fn creation_status(
    creation: web::Data<CreationService>,
    links: web::Data<Links>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let payment_hash = path.into_inner();
    let (request, vouchers) = creation.status(&payment_hash).await?;
    let status = request.status();

    let vouchers = if status == CreationStatus::Complete {
        let absolute_expiry_secs = creation.absolute_expiry_secs();
        Some(
            vouchers
                .iter()
                .map(|v| voucher_links(&links, v, absolute_expiry_secs))
                .collect::<Result<Vec<_>, _>>()?,
        )
    } else {
        None
    };

    Ok(HttpResponse::Ok().json(StatusResponse {
        status: status.as_str(),
        vouchers,
    }))
}

fn voucher_links(links: &Links, voucher: &Voucher, absolute_expiry_secs: i64) -> Result<VoucherLinks, ApiError> {
    let encode = |kind: LinkKind, id: &str| {
        links
            .lnurl(kind, id)
            .map_err(|e| ApiError::Internal(format!("lnurl encoding failed: {}", e)))
    };
    let lnurl_pay = encode(LinkKind::Pay, &voucher.pay_id)?;
    let lnurl_withdraw = encode(LinkKind::Withdraw, &voucher.withdraw_id)?;

    Ok(VoucherLinks {
        pay_info_url: links.info_url(&lnurl_pay),
        withdraw_info_url: links.info_url(&lnurl_withdraw),
        lnurl_pay,
        lnurl_withdraw,
        lightning_address: voucher.lightning_address.clone(),
        absolute_expiry: rfc3339(voucher.absolute_expiry_at(absolute_expiry_secs)),
        relative_expiry_seconds: voucher.expiry_seconds,
    })
}

/// `GET /api/vouchers/info?lightning=<LNURL>`
#[get("/api/vouchers/info")]
pub async fn voucher_info(
    store: web::Data<VoucherStore>,
    query: web::Query<InfoQuery>,
) -> Result<HttpResponse, ApiError> {
    let lnurl = query
        .lightning
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing lightning parameter".to_string()))?;

    let url = decode_lnurl(lnurl).map_err(|e| ApiError::BadRequest(format!("invalid LNURL: {}", e)))?;
    let (kind, id) = parse_voucher_url(&url)
        .ok_or_else(|| ApiError::BadRequest("LNURL does not point at a voucher".to_string()))?;

    let voucher = match kind {
        LinkKind::Pay => store.voucher_by_pay_id(&id).await,
        LinkKind::Withdraw => store.voucher_by_withdraw_id(&id).await,
    }
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .ok_or_else(|| ApiError::NotFound("voucher not found".to_string()))?;

    let absolute_expiry_secs = store.absolute_expiry_secs();
    let active = voucher.is_active_at(Utc::now().naive_utc(), absolute_expiry_secs);

    let funding_history = match kind {
        LinkKind::Pay => store
            .paid_invoices(&voucher.pay_id)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .into_iter()
            .map(|inv| FundingEntry {
                paid_at: rfc3339(inv.paid_at.unwrap_or(inv.created_at)),
                credited_sats: inv.credited_msats / 1000,
            })
            .collect(),
        LinkKind::Withdraw => Vec::new(),
    };

    Ok(HttpResponse::Ok().json(VoucherInfo {
        kind: kind.as_str(),
        active,
        balance_sats: voucher.total_paid_msats / 1000,
        expires_at: active.then(|| rfc3339(voucher.effective_expiry_at(absolute_expiry_secs))),
        funding_history,
    }))
}
