//! Shared fixtures for the integration tests
//!
//! `Harness` wires every service against a tempfile SQLite store, a scripted
//! `MockGateway` and a `MockResolver`, the same way `main` wires production.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use tempfile::TempDir;

use server::config::{FeeConfig, VoucherConfig};
use server::db::create_pool;
use server::gateway::{GatewayError, GatewayInvoice, LightningGateway, PaymentOutcome};
use server::lnurl::{Links, PayEndpoint, PayEndpointResolver, ResolveError};
use server::models::creation_request::{CreationStatus, NewCreationRequest};
use server::models::pay_invoice::NewPayInvoice;
use server::models::voucher::Voucher;
use server::repositories::{CreditOutcome, VoucherStore};
use server::services::{
    CreationService, FundingService, Refunder, TaskSupervisor, WithdrawalService,
};

pub const BASE_URL: &str = "https://tips.example.com";

/// Gateway whose invoices are settled by the test and whose outbound
/// payments follow a script (default: paid).
#[derive(Default)]
pub struct MockGateway {
    next_invoice: AtomicUsize,
    paid: Mutex<HashSet<String>>,
    pay_script: Mutex<VecDeque<PaymentOutcome>>,
    created: Mutex<Vec<(i64, String)>>,
    payments: Mutex<Vec<String>>,
    pay_delay: Mutex<Duration>,
}

impl MockGateway {
    pub fn settle(&self, payment_hash: &str) {
        self.paid.lock().unwrap().insert(payment_hash.to_string());
    }

    pub fn script_payment(&self, outcome: PaymentOutcome) {
        self.pay_script.lock().unwrap().push_back(outcome);
    }

    /// Hold every outbound payment in flight for `delay`
    pub fn set_pay_delay(&self, delay: Duration) {
        *self.pay_delay.lock().unwrap() = delay;
    }

    /// `(amount_msats, description)` of every created invoice
    pub fn created(&self) -> Vec<(i64, String)> {
        self.created.lock().unwrap().clone()
    }

    /// BOLT11 strings passed to `pay_invoice`
    pub fn payments(&self) -> Vec<String> {
        self.payments.lock().unwrap().clone()
    }
}

#[async_trait]
impl LightningGateway for MockGateway {
    async fn create_invoice(
        &self,
        amount_msats: i64,
        description: &str,
    ) -> Result<GatewayInvoice, GatewayError> {
        let n = self.next_invoice.fetch_add(1, Ordering::SeqCst) + 1;
        self.created
            .lock()
            .unwrap()
            .push((amount_msats, description.to_string()));
        Ok(GatewayInvoice {
            payment_hash: format!("{:064x}", n),
            invoice: format!("lnbcmock{}", n),
        })
    }

    async fn check_invoice_paid(&self, payment_hash: &str) -> Result<bool, GatewayError> {
        Ok(self.paid.lock().unwrap().contains(payment_hash))
    }

    async fn pay_invoice(&self, bolt11: &str, _timeout: Duration) -> PaymentOutcome {
        self.payments.lock().unwrap().push(bolt11.to_string());
        let delay = *self.pay_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.pay_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PaymentOutcome::Paid)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(10)
    }
}

/// Resolver returning one fixed endpoint for every address
pub struct MockResolver {
    endpoint: PayEndpoint,
    requested: Mutex<Vec<i64>>,
}

impl MockResolver {
    pub fn new(min_sendable: i64, max_sendable: i64) -> Self {
        Self {
            endpoint: PayEndpoint {
                callback: "https://wallet.example.com/lnurlp/cb".to_string(),
                min_sendable,
                max_sendable,
            },
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Amounts requested from the callback
    pub fn requested(&self) -> Vec<i64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PayEndpointResolver for MockResolver {
    async fn resolve(&self, _address: &str) -> Result<PayEndpoint, ResolveError> {
        Ok(self.endpoint.clone())
    }

    async fn request_invoice(&self, _callback: &str, amount_msats: i64) -> Result<String, ResolveError> {
        self.requested.lock().unwrap().push(amount_msats);
        Ok(format!("lnbcrefund{}", amount_msats))
    }
}

pub struct Harness {
    _dir: TempDir,
    pub store: VoucherStore,
    pub gateway: Arc<MockGateway>,
    pub resolver: Arc<MockResolver>,
    pub supervisor: TaskSupervisor,
    pub links: Links,
    pub refunder: Refunder,
    pub creation: CreationService,
    pub funding: FundingService,
    pub withdrawals: WithdrawalService,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Duration::from_secs(5), MockResolver::new(1_000, 1_000_000_000))
    }

    pub fn with_wait_timeout(wait_timeout: Duration) -> Self {
        Self::build(wait_timeout, MockResolver::new(1_000, 1_000_000_000))
    }

    pub fn with_resolver(resolver: MockResolver) -> Self {
        Self::build(Duration::from_secs(5), resolver)
    }

    fn build(wait_timeout: Duration, resolver: MockResolver) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vouchers.db");
        let pool = create_pool(path.to_str().unwrap(), 8).unwrap();

        // Low minimum so small funding amounts reach the fee logic
        let vouchers = VoucherConfig {
            min_pay_sats: 10,
            ..VoucherConfig::default()
        };
        let fees = FeeConfig::default();
        let store = VoucherStore::new(pool, vouchers.absolute_expiry_secs);

        let gateway = Arc::new(MockGateway::default());
        let resolver = Arc::new(resolver);
        let supervisor = TaskSupervisor::new();
        let links = Links::new(BASE_URL);
        let refunder = Refunder::new(resolver.clone(), gateway.clone());

        let creation = CreationService::new(
            store.clone(),
            gateway.clone(),
            supervisor.clone(),
            fees,
            vouchers,
            wait_timeout,
        );
        let funding = FundingService::new(
            store.clone(),
            gateway.clone(),
            refunder.clone(),
            supervisor.clone(),
            links.clone(),
            fees,
            vouchers,
            wait_timeout,
        );
        let withdrawals = WithdrawalService::new(store.clone(), gateway.clone(), links.clone());

        Self {
            _dir: dir,
            store,
            gateway,
            resolver,
            supervisor,
            links,
            refunder,
            creation,
            funding,
            withdrawals,
        }
    }

    /// Insert a completed batch of `count` vouchers directly through the store
    pub async fn seed_vouchers(&self, count: i32, expiry_seconds: i64) -> Vec<Voucher> {
        let hash = format!("seed-{}", uuid::Uuid::new_v4());
        self.store
            .insert_creation_request(NewCreationRequest {
                payment_hash: hash.clone(),
                lightning_address: "alice@example.com".to_string(),
                count,
                expiry_seconds,
                fee_msats: 10_000 * count as i64,
                status: CreationStatus::Pending.as_str().to_string(),
                created_at: now(),
            })
            .await
            .unwrap();
        self.store.create_batch(&hash).await.unwrap()
    }

    /// Record and settle a funding invoice for `pay_id` without the gateway
    pub async fn fund(&self, pay_id: &str, credited_msats: i64) -> Voucher {
        let hash = format!("fund-{}", uuid::Uuid::new_v4());
        self.store
            .insert_pay_invoice(NewPayInvoice::new(
                pay_id,
                &hash,
                credited_msats,
                credited_msats,
                now(),
            ))
            .await
            .unwrap();
        match self.store.credit_if_active(pay_id, credited_msats, &hash).await.unwrap() {
            CreditOutcome::Credited(v) => v,
            CreditOutcome::Inactive(_) => panic!("voucher {} is not active", pay_id),
        }
    }

    /// Move `last_funded_at` into the past
    pub fn backdate_funding(&self, pay_id: &str, seconds_ago: i64) {
        use server::schema::vouchers::dsl;

        let at = now() - chrono::Duration::seconds(seconds_ago);
        let mut conn = self.store.pool().get().unwrap();
        diesel::update(dsl::vouchers.filter(dsl::pay_id.eq(pay_id)))
            .set(dsl::last_funded_at.eq(Some(at)))
            .execute(&mut conn)
            .unwrap();
    }

    pub async fn voucher(&self, pay_id: &str) -> Voucher {
        self.store.voucher_by_pay_id(pay_id).await.unwrap().unwrap()
    }
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
