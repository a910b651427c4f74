//! Fee configuration
//!
//! Two fees exist: a flat per-voucher fee charged when a batch is created,
//! and a retained fee on every funding payment.

/// Default creation fee per voucher, in sats
///
/// Override via FEE_PER_VOUCHER_SATS.
pub const DEFAULT_FEE_PER_VOUCHER_SATS: i64 = 10;

/// Default floor of the funding fee, in msats
///
/// Override via FUNDING_FEE_MIN_MSATS.
pub const DEFAULT_FUNDING_FEE_MIN_MSATS: i64 = 2_000;

/// Default proportional funding fee (0.4%)
///
/// Override via FUNDING_FEE_PERCENT.
pub const DEFAULT_FUNDING_FEE_PERCENT: f64 = 0.004;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeConfig {
    pub fee_per_voucher_sats: i64,
    pub funding_fee_min_msats: i64,
    pub funding_fee_percent: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_per_voucher_sats: DEFAULT_FEE_PER_VOUCHER_SATS,
            funding_fee_min_msats: DEFAULT_FUNDING_FEE_MIN_MSATS,
            funding_fee_percent: DEFAULT_FUNDING_FEE_PERCENT,
        }
    }
}

impl FeeConfig {
    /// Flat fee for a batch of `count` vouchers, in sats
    pub fn creation_fee_sats(&self, count: i64) -> i64 {
        count.saturating_mul(self.fee_per_voucher_sats)
    }

    pub fn creation_fee_msats(&self, count: i64) -> i64 {
        self.creation_fee_sats(count).saturating_mul(1000)
    }

    /// Retained fee: `max(minimum, floor(amount * percent))`
    pub fn funding_fee_msats(&self, amount_msats: i64) -> i64 {
        let proportional = (amount_msats as f64 * self.funding_fee_percent).floor() as i64;
        proportional.max(self.funding_fee_min_msats)
    }

    /// Amount credited to the voucher after the fee, or `None` when the fee
    /// swallows the whole payment.
    pub fn credited_msats(&self, amount_msats: i64) -> Option<i64> {
        let credited = amount_msats - self.funding_fee_msats(amount_msats);
        (credited > 0).then_some(credited)
    }
}
