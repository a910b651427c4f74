pub mod voucher_store;

pub use voucher_store::{CreditOutcome, StoreError, VoucherStore};
