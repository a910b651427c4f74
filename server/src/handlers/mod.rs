//! HTTP surface
//!
//! - `vouchers`: JSON API for buyers (`/api/vouchers/*`)
//! - `lnurl`: LNURL-Pay / LNURL-Withdraw endpoints for wallets
//! - `health`: liveness probe
//!
//! Handlers pull their collaborators from `web::Data`: `CreationService`,
//! `FundingService`, `WithdrawalService`, `VoucherStore` and `Links`.

pub mod health;
pub mod lnurl;
pub mod vouchers;

use actix_web::{error::JsonPayloadError, web, HttpRequest};
use chrono::{NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::ApiError;

/// Register every route. Shared state must be added to the `App` separately.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(health::health_check)
        .service(vouchers::create_invoice)
        .service(vouchers::creation_status)
        .service(vouchers::voucher_info)
        .service(lnurl::pay_request)
        .service(lnurl::pay_callback)
        .service(lnurl::withdraw_request)
        .service(lnurl::withdraw_callback);
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("invalid request body: {}", err)).into()
}

/// Stored timestamps are naive UTC
pub(crate) fn rfc3339(at: NaiveDateTime) -> String {
    Utc.from_utc_datetime(&at)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
