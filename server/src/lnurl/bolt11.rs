//! Amount extraction from a BOLT11 payment request
//!
//! Only the human-readable part is inspected: `ln` + currency prefix +
//! optional amount with multiplier, followed by the `1` separator. Signature
//! and tagged fields are left to the gateway.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Bolt11Error {
    #[error("not a lightning invoice")]
    NotAnInvoice,

    #[error("invalid invoice amount")]
    InvalidAmount,
}

/// msats per whole bitcoin
const MSATS_PER_BTC: i64 = 100_000_000_000;

/// Amount encoded in the invoice, in msats. `None` for amountless invoices.
pub fn invoice_amount_msats(invoice: &str) -> Result<Option<i64>, Bolt11Error> {
    let lower = invoice.trim().to_ascii_lowercase();
    let lower = lower.strip_prefix("lightning:").unwrap_or(&lower);
    let sep = lower.rfind('1').ok_or(Bolt11Error::NotAnInvoice)?;
    let hrp = lower[..sep]
        .strip_prefix("ln")
        .ok_or(Bolt11Error::NotAnInvoice)?;

    let amount = hrp.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if hrp.len() == amount.len() {
        // No currency prefix
        return Err(Bolt11Error::NotAnInvoice);
    }
    if amount.is_empty() {
        return Ok(None);
    }

    let (digits, multiplier) = match amount.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&amount[..idx], Some(c)),
        _ => (amount, None),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Bolt11Error::InvalidAmount);
    }
    let value: i64 = digits.parse().map_err(|_| Bolt11Error::InvalidAmount)?;

    let msats = match multiplier {
        None => value.checked_mul(MSATS_PER_BTC),
        Some('m') => value.checked_mul(MSATS_PER_BTC / 1_000),
        Some('u') => value.checked_mul(MSATS_PER_BTC / 1_000_000),
        Some('n') => value.checked_mul(MSATS_PER_BTC / 1_000_000_000),
        // pico-bitcoin is a tenth of a msat
        Some('p') if value % 10 == 0 => Some(value / 10),
        _ => None,
    };
    msats.map(Some).ok_or(Bolt11Error::InvalidAmount)
}
