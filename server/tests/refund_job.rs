//! Refund sweep over expired vouchers
//!
//! Run with: cargo test -p tipme-server --test refund_job

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, Harness, MockResolver};
use server::gateway::PaymentOutcome;
use server::services::{RefundJob, RefundReport};
use tokio_util::sync::CancellationToken;

const HOUR: i64 = 3600;

fn job(h: &Harness) -> RefundJob {
    RefundJob::new(h.store.clone(), h.refunder.clone(), Duration::from_secs(3600))
}

/// Funded voucher whose relative window closed an hour ago
async fn expired_voucher(h: &Harness, balance_msats: i64) -> String {
    let voucher = h.seed_vouchers(1, HOUR).await.remove(0);
    h.fund(&voucher.pay_id, balance_msats).await;
    h.backdate_funding(&voucher.pay_id, 2 * HOUR);
    voucher.pay_id
}

#[tokio::test]
async fn test_refunds_expired_voucher_once() {
    let h = Harness::new();
    let pay_id = expired_voucher(&h, 48_000).await;

    let report = job(&h).run_once().await.unwrap();
    assert_eq!(
        report,
        RefundReport {
            examined: 1,
            refunded: 1,
            ..RefundReport::default()
        }
    );
    assert_eq!(h.resolver.requested(), vec![48_000]);
    assert_eq!(h.gateway.payments(), vec!["lnbcrefund48000".to_string()]);

    let after = h.voucher(&pay_id).await;
    assert!(!after.active);
    assert_eq!(after.total_paid_msats, 0);

    let again = job(&h).run_once().await.unwrap();
    assert_eq!(again.examined, 0);
    assert_eq!(h.gateway.payments().len(), 1);
}

#[tokio::test]
async fn test_skips_live_and_unfunded_vouchers() {
    let h = Harness::new();
    let live = h.seed_vouchers(1, HOUR).await.remove(0);
    h.fund(&live.pay_id, 48_000).await;
    // Never funded: no relative deadline, absolute one is a year out
    h.seed_vouchers(1, HOUR).await;

    let report = job(&h).run_once().await.unwrap();
    assert_eq!(report.examined, 0);
    assert!(h.gateway.payments().is_empty());
    assert!(h.voucher(&live.pay_id).await.active);
}

#[tokio::test]
async fn test_definitive_failure_restores_balance_for_next_run() {
    let h = Harness::new();
    let pay_id = expired_voucher(&h, 48_000).await;
    h.gateway.script_payment(PaymentOutcome::Failed("no route".into()));

    let first = job(&h).run_once().await.unwrap();
    assert_eq!(first.retrying, 1);
    let restored = h.voucher(&pay_id).await;
    assert!(restored.active);
    assert_eq!(restored.total_paid_msats, 48_000);

    let second = job(&h).run_once().await.unwrap();
    assert_eq!(second.refunded, 1);
    assert_eq!(h.gateway.payments().len(), 2);
    assert!(!h.voucher(&pay_id).await.active);
}

#[tokio::test]
async fn test_ambiguous_refund_stays_deactivated() {
    let h = Harness::new();
    let pay_id = expired_voucher(&h, 48_000).await;
    h.gateway.script_payment(PaymentOutcome::Ambiguous("timed out".into()));

    let report = job(&h).run_once().await.unwrap();
    assert_eq!(report.ambiguous, 1);

    let after = h.voucher(&pay_id).await;
    assert!(!after.active);
    assert_eq!(after.total_paid_msats, 0);

    assert_eq!(job(&h).run_once().await.unwrap().examined, 0);
    assert_eq!(h.gateway.payments().len(), 1);
}

#[tokio::test]
async fn test_dust_never_reaches_gateway() {
    let h = Harness::with_resolver(MockResolver::new(100_000, 1_000_000_000));
    let pay_id = expired_voucher(&h, 500).await;

    let report = job(&h).run_once().await.unwrap();
    assert_eq!(report.dust, 1);
    assert!(h.resolver.requested().is_empty());
    assert!(h.gateway.payments().is_empty());

    let after = h.voucher(&pay_id).await;
    assert!(!after.active);
    assert_eq!(job(&h).run_once().await.unwrap().examined, 0);
}

#[tokio::test]
async fn test_refund_amount_capped_and_rounded() {
    let h = Harness::with_resolver(MockResolver::new(1_000, 40_000));
    expired_voucher(&h, 48_500).await;
    job(&h).run_once().await.unwrap();
    assert_eq!(h.resolver.requested(), vec![40_000]);

    let h = Harness::new();
    expired_voucher(&h, 48_500).await;
    job(&h).run_once().await.unwrap();
    assert_eq!(h.resolver.requested(), vec![48_000]);
}

#[tokio::test]
async fn test_one_failure_does_not_block_the_sweep() {
    let h = Harness::new();
    expired_voucher(&h, 48_000).await;
    expired_voucher(&h, 60_000).await;
    h.gateway.script_payment(PaymentOutcome::Failed("no route".into()));

    let report = job(&h).run_once().await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.retrying, 1);
    assert_eq!(report.refunded, 1);
}

#[tokio::test]
async fn test_run_loop_sweeps_immediately_and_stops_on_cancel() {
    let h = Harness::new();
    let pay_id = expired_voucher(&h, 48_000).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::new(job(&h)).run(cancel.clone()));

    let swept = eventually(|| async { !h.voucher(&pay_id).await.active }).await;
    assert!(swept, "first tick did not sweep");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("refund job did not stop")
        .unwrap();
}
