//! Log field redaction
//!
//! Voucher identifiers are bearer secrets: whoever knows a `withdraw_id` can
//! drain the voucher. Logs only ever carry shortened forms that are enough
//! to correlate lines while debugging.

// ============================================================================
// Identifier Sanitization
// ============================================================================

fn head_tail(value: &str, head: usize, tail: usize) -> Option<String> {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < head + tail + 4 {
        return None;
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    Some(format!("{}...{}", start, end))
}

/// Sanitize a voucher identifier (`pay_id` / `withdraw_id`)
///
/// Format: "abc12345...90ef" (first 8 + last 4 chars)
pub fn sanitize_id(id: &str) -> String {
    head_tail(id, 8, 4).unwrap_or_else(|| "[invalid_id]".to_string())
}

/// Sanitize a payment hash or withdraw `k1` (64 hex chars)
pub fn sanitize_hash(hash: &str) -> String {
    head_tail(hash, 8, 4).unwrap_or_else(|| "[invalid_hash]".to_string())
}

/// Sanitize a lightning address
///
/// Keeps the first two characters of the user part and the full domain, so
/// refunds to a misbehaving provider stay diagnosable.
pub fn sanitize_address(address: &str) -> String {
    match address.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => {
            let prefix: String = user.chars().take(2).collect();
            format!("{}***@{}", prefix, domain)
        }
        _ => "[invalid_address]".to_string(),
    }
}

/// Sanitize a BOLT11 invoice: only the network prefix and length are kept
pub fn sanitize_invoice(invoice: &str) -> String {
    let prefix: String = invoice
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .take(6)
        .collect();
    format!("[{}:{} chars]", prefix.to_lowercase(), invoice.len())
}

// ============================================================================
// Network Sanitization
// ============================================================================

/// Sanitize a URL down to scheme and host
///
/// Callback URLs may embed per-request tokens in the path or query.
pub fn sanitize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{}", parsed.scheme(), host),
            None => format!("[{}_endpoint]", parsed.scheme()),
        },
        Err(_) => "[endpoint]".to_string(),
    }
}
