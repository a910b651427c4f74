//! Bech32 encoding of LNURL strings
//!
//! An LNURL is a plain URL whose UTF-8 bytes are regrouped into 5-bit
//! symbols, checksummed with the original bech32 constant (not bech32m) and
//! rendered under the human-readable prefix `lnurl`. Wallets expect the
//! upper-case form because it packs densely into QR alphanumeric mode.
//! LNURLs routinely exceed the 90 character limit of BIP-173 addresses,
//! which `bech32::decode` does not enforce.

use bech32::{FromBase32, ToBase32, Variant};
use thiserror::Error;

/// Human-readable prefix for every LNURL
pub const LNURL_HRP: &str = "lnurl";

/// Errors raised while encoding or decoding bech32 data
#[derive(Debug, Error)]
pub enum Bech32Error {
    #[error("bech32: {0}")]
    Codec(#[from] bech32::Error),

    #[error("unexpected human-readable prefix '{0}'")]
    UnexpectedPrefix(String),

    #[error("bech32m checksum where bech32 was expected")]
    UnexpectedVariant,

    #[error("decoded payload is not UTF-8")]
    InvalidUtf8,
}

/// Encode raw bytes under `hrp`, returning the lower-case bech32 string.
pub fn encode(hrp: &str, payload: &[u8]) -> Result<String, Bech32Error> {
    Ok(bech32::encode(hrp, payload.to_base32(), Variant::Bech32)?)
}

/// Decode a bech32 string into its (lower-case) prefix and raw payload bytes.
pub fn decode(input: &str) -> Result<(String, Vec<u8>), Bech32Error> {
    let (hrp, symbols, variant) = bech32::decode(input.trim())?;
    if variant != Variant::Bech32 {
        return Err(Bech32Error::UnexpectedVariant);
    }
    Ok((hrp, Vec::<u8>::from_base32(&symbols)?))
}

/// Encode a URL as an upper-case LNURL (`LNURL1...`).
pub fn encode_lnurl(url: &str) -> Result<String, Bech32Error> {
    encode(LNURL_HRP, url.as_bytes()).map(|s| s.to_ascii_uppercase())
}

/// Decode an LNURL back into the URL it carries.
///
/// Accepts either case and an optional `lightning:` URI scheme.
pub fn decode_lnurl(lnurl: &str) -> Result<String, Bech32Error> {
    let trimmed = lnurl.trim();
    let stripped = trimmed
        .strip_prefix("lightning:")
        .or_else(|| trimmed.strip_prefix("LIGHTNING:"))
        .unwrap_or(trimmed);

    let (hrp, payload) = decode(stripped)?;
    if hrp != LNURL_HRP {
        return Err(Bech32Error::UnexpectedPrefix(hrp));
    }
    String::from_utf8(payload).map_err(|_| Bech32Error::InvalidUtf8)
}
