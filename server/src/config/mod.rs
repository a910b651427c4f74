//! Configuration for the voucher server
//!
//! Every value comes from the environment (after `.env` is loaded by
//! `dotenvy`). Unset variables take their default; set but malformed
//! variables are a startup error.

pub mod fee;
pub mod voucher;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub use fee::FeeConfig;
pub use voucher::VoucherConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "./tipme.db";
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000";
pub const DEFAULT_REFUND_INTERVAL_SECS: u64 = 24 * 3600;
pub const DEFAULT_PAYMENT_WAIT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_GATEWAY_POLL_INTERVAL_SECS: u64 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public base URL used to build LNURL callbacks, without trailing slash
    pub base_url: String,
    pub bind_address: String,
    pub port: u16,
    pub database_url: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    /// Empty means no Authorization header
    pub token: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub fees: FeeConfig,
    pub vouchers: VoucherConfig,
    pub refund_interval: Duration,
    pub payment_wait_timeout: Duration,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn positive(key: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}

/// Non-zero interval in whole seconds
fn interval_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = string_or(&lookup, "BASE_URL", DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        if url::Url::parse(&base_url).is_err() {
            return Err(ConfigError::Invalid {
                key: "BASE_URL",
                value: base_url,
            });
        }

        let server = ServerConfig {
            base_url,
            bind_address: string_or(&lookup, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            database_url: string_or(&lookup, "DATABASE_URL", DEFAULT_DATABASE_URL),
        };

        let gateway = GatewayConfig {
            url: string_or(&lookup, "GATEWAY_URL", DEFAULT_GATEWAY_URL)
                .trim_end_matches('/')
                .to_string(),
            token: lookup("GATEWAY_TOKEN").unwrap_or_default(),
            poll_interval: interval_secs(
                &lookup,
                "GATEWAY_POLL_INTERVAL_SECS",
                DEFAULT_GATEWAY_POLL_INTERVAL_SECS,
            )?,
        };

        let fees = FeeConfig {
            fee_per_voucher_sats: parse_or(
                &lookup,
                "FEE_PER_VOUCHER_SATS",
                fee::DEFAULT_FEE_PER_VOUCHER_SATS,
            )?,
            funding_fee_min_msats: parse_or(
                &lookup,
                "FUNDING_FEE_MIN_MSATS",
                fee::DEFAULT_FUNDING_FEE_MIN_MSATS,
            )?,
            funding_fee_percent: parse_or(
                &lookup,
                "FUNDING_FEE_PERCENT",
                fee::DEFAULT_FUNDING_FEE_PERCENT,
            )?,
        };
        if !(0.0..1.0).contains(&fees.funding_fee_percent) {
            return Err(ConfigError::Invalid {
                key: "FUNDING_FEE_PERCENT",
                value: fees.funding_fee_percent.to_string(),
            });
        }

        let vouchers = VoucherConfig {
            max_per_request: positive(
                "MAX_VOUCHERS_PER_REQUEST",
                parse_or(
                    &lookup,
                    "MAX_VOUCHERS_PER_REQUEST",
                    voucher::DEFAULT_MAX_VOUCHERS_PER_REQUEST,
                )?,
            )?,
            absolute_expiry_secs: positive(
                "VOUCHER_ABSOLUTE_EXPIRY_SECS",
                parse_or(
                    &lookup,
                    "VOUCHER_ABSOLUTE_EXPIRY_SECS",
                    voucher::DEFAULT_ABSOLUTE_EXPIRY_SECS,
                )?,
            )?,
            default_relative_expiry_secs: positive(
                "DEFAULT_RELATIVE_EXPIRY_SECS",
                parse_or(
                    &lookup,
                    "DEFAULT_RELATIVE_EXPIRY_SECS",
                    voucher::DEFAULT_RELATIVE_EXPIRY_SECS,
                )?,
            )?,
            min_pay_sats: parse_or(
                &lookup,
                "MIN_VOUCHER_PAY_AMOUNT_SATS",
                voucher::DEFAULT_MIN_PAY_SATS,
            )?,
            max_pay_sats: parse_or(
                &lookup,
                "MAX_VOUCHER_PAY_AMOUNT_SATS",
                voucher::DEFAULT_MAX_PAY_SATS,
            )?,
        };
        if vouchers.min_pay_sats <= 0 || vouchers.min_pay_sats > vouchers.max_pay_sats {
            return Err(ConfigError::Invalid {
                key: "MIN_VOUCHER_PAY_AMOUNT_SATS",
                value: vouchers.min_pay_sats.to_string(),
            });
        }

        Ok(Self {
            server,
            gateway,
            fees,
            vouchers,
            refund_interval: interval_secs(
                &lookup,
                "REFUND_INTERVAL_SECS",
                DEFAULT_REFUND_INTERVAL_SECS,
            )?,
            payment_wait_timeout: interval_secs(
                &lookup,
                "PAYMENT_WAIT_TIMEOUT_SECS",
                DEFAULT_PAYMENT_WAIT_TIMEOUT_SECS,
            )?,
        })
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.bind_address.clone(), self.server.port)
    }
}
