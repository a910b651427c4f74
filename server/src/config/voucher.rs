//! Voucher limits and expiry windows

/// Override via MAX_VOUCHERS_PER_REQUEST.
pub const DEFAULT_MAX_VOUCHERS_PER_REQUEST: i64 = 10;

/// One year. Override via VOUCHER_ABSOLUTE_EXPIRY_SECS.
pub const DEFAULT_ABSOLUTE_EXPIRY_SECS: i64 = 365 * 24 * 3600;

/// Thirty days. Override via DEFAULT_RELATIVE_EXPIRY_SECS.
pub const DEFAULT_RELATIVE_EXPIRY_SECS: i64 = 30 * 24 * 3600;

/// Override via MIN_VOUCHER_PAY_AMOUNT_SATS.
pub const DEFAULT_MIN_PAY_SATS: i64 = 100;

/// Override via MAX_VOUCHER_PAY_AMOUNT_SATS.
pub const DEFAULT_MAX_PAY_SATS: i64 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoucherConfig {
    pub max_per_request: i64,
    pub absolute_expiry_secs: i64,
    pub default_relative_expiry_secs: i64,
    pub min_pay_sats: i64,
    pub max_pay_sats: i64,
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self {
            max_per_request: DEFAULT_MAX_VOUCHERS_PER_REQUEST,
            absolute_expiry_secs: DEFAULT_ABSOLUTE_EXPIRY_SECS,
            default_relative_expiry_secs: DEFAULT_RELATIVE_EXPIRY_SECS,
            min_pay_sats: DEFAULT_MIN_PAY_SATS,
            max_pay_sats: DEFAULT_MAX_PAY_SATS,
        }
    }
}

impl VoucherConfig {
    /// LNURL-Pay `minSendable`
    pub fn min_sendable_msats(&self) -> i64 {
        self.min_pay_sats.saturating_mul(1000)
    }

    /// LNURL-Pay `maxSendable`
    pub fn max_sendable_msats(&self) -> i64 {
        self.max_pay_sats.saturating_mul(1000)
    }

    /// Non-positive requests fall back to the default window
    pub fn relative_expiry(&self, requested_secs: i64) -> i64 {
        if requested_secs <= 0 {
            self.default_relative_expiry_secs
        } else {
            requested_secs
        }
    }

    pub fn count_allowed(&self, count: i64) -> bool {
        (1..=self.max_per_request).contains(&count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_expiry_defaults() {
        let cfg = VoucherConfig::default();
        assert_eq!(cfg.relative_expiry(0), DEFAULT_RELATIVE_EXPIRY_SECS);
        assert_eq!(cfg.relative_expiry(-5), DEFAULT_RELATIVE_EXPIRY_SECS);
        assert_eq!(cfg.relative_expiry(3600), 3600);
    }

    #[test]
    fn test_count_bounds() {
        let cfg = VoucherConfig::default();
        assert!(!cfg.count_allowed(0));
        assert!(cfg.count_allowed(1));
        assert!(cfg.count_allowed(10));
        assert!(!cfg.count_allowed(11));
    }

    #[test]
    fn test_sendable_bounds_in_msats() {
        let cfg = VoucherConfig::default();
        assert_eq!(cfg.min_sendable_msats(), 100_000);
        assert_eq!(cfg.max_sendable_msats(), 200_000_000);
    }
}
