//! Test utilities and fixtures for Netvend integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;

pub use netvend::claim::{ClaimCoordinator, InFlight};
pub use netvend::db::{init_db, queries, AppState, CountCache, DbPool};
pub use netvend::handlers::public::{
    active_voucher, claim_state, initiate_buy, list_plans, payment_callback, retry_claim,
};
pub use netvend::models::*;
pub use netvend::payments::{
    Checkout, FlutterwaveConfig, GatewayError, InitializePayment, PaymentGateway, PaymentProvider,
    PaymentResult, PaystackConfig,
};
pub use netvend::util::RetryPolicy;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";
pub const TEST_PAYSTACK_SECRET: &str = "sk_test_secret";
pub const TEST_FLW_HASH: &str = "test-verif-hash";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a pooled test database backed by a unique temp file. Pooled
/// connections must see the same data, which `:memory:` does not give.
pub fn setup_test_pool() -> DbPool {
    let path = std::env::temp_dir().join(format!("netvend-test-{}.db", uuid::Uuid::new_v4()));
    let pool = netvend::db::create_pool(&path.to_string_lossy()).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

/// Create an AppState for testing. Both gateways are "configured" with
/// test credentials pointing at unroutable hosts; tests that need gateway
/// calls go through `MockGateway` instead.
pub fn create_test_app_state() -> AppState {
    AppState {
        db: setup_test_pool(),
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/voucher".to_string(),
        paystack: Some(PaystackConfig {
            secret_key: TEST_PAYSTACK_SECRET.to_string(),
            base_url: "http://paystack.invalid".to_string(),
        }),
        flutterwave: Some(FlutterwaveConfig {
            secret_key: "flw_test_secret".to_string(),
            webhook_hash: Some(TEST_FLW_HASH.to_string()),
            base_url: "http://flutterwave.invalid".to_string(),
        }),
        default_provider: Some(PaymentProvider::Paystack),
        admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
        // Zero TTL: availability checks in tests always see live counts
        count_cache: Arc::new(CountCache::new(Duration::from_secs(0))),
        in_flight: Arc::new(InFlight::default()),
        verify_retry: RetryPolicy::new(3, Duration::from_millis(1)),
    }
}

/// Create a test tenant with one location
pub fn create_test_tenant(conn: &mut Connection, name: &str) -> (Tenant, NetworkLocation) {
    let (tenant, mut locations) = queries::create_tenant(
        conn,
        &CreateTenant {
            name: name.to_string(),
            support_contact: Some("support@test.local".to_string()),
            locations: vec!["Main".to_string()],
        },
    )
    .expect("Failed to create test tenant");
    (tenant, locations.remove(0))
}

/// Create a test plan selling from a 1d/500MB/standard bucket
pub fn create_test_plan(conn: &Connection, tenant_id: &str, location_id: &str) -> Plan {
    queries::create_plan(
        conn,
        tenant_id,
        &CreatePlan {
            name: "Daily 500MB".to_string(),
            duration_class: "1d".to_string(),
            capacity_unit: CapacityUnit::Mb,
            bundle_size: 500,
            bundle_tier: BundleTier::Standard,
            location_id: location_id.to_string(),
            amount_minor: 20000,
            currency: "NGN".to_string(),
        },
    )
    .expect("Failed to create test plan")
}

/// Stock a bucket with the given codes
pub fn stock_vouchers(conn: &mut Connection, request: &VoucherRequest, codes: &[&str]) {
    let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    queries::add_vouchers(conn, request, &codes).expect("Failed to stock test vouchers");
}

/// Create a claim session in the Initiated stage
pub fn create_test_session(
    conn: &Connection,
    plan: &Plan,
    reference: &str,
    provider: PaymentProvider,
) -> ClaimSession {
    queries::create_claim_session(
        conn,
        &CreateClaimSession {
            tenant_id: plan.tenant_id.clone(),
            payment_reference: reference.to_string(),
            provider,
            request: plan.voucher_request(),
            amount_minor: plan.amount_minor,
            currency: plan.currency.clone(),
            email: "buyer@test.local".to_string(),
        },
    )
    .expect("Failed to create test claim session")
}

/// Create a Router with all public endpoints (without rate limiting)
pub fn public_app(state: AppState) -> Router {
    Router::new()
        .route("/buy", post(initiate_buy))
        .route("/plans", get(list_plans))
        .route("/callback", get(payment_callback))
        .route("/claim", get(claim_state))
        .route("/claim/retry", post(retry_claim))
        .route("/voucher/active", get(active_voucher))
        .with_state(state)
}

pub fn webhook_app(state: AppState) -> Router {
    netvend::handlers::webhooks::router().with_state(state)
}

pub fn admin_app(state: AppState) -> Router {
    netvend::handlers::admin::router().with_state(state)
}

/// Scripted outcome of one MockGateway verify call
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// Successful charge of the given minor-unit amount
    Success(i64),
    /// Successful charge of the given amount, settled in another currency
    SuccessInCurrency(i64, &'static str),
    /// Charge exists but is pending or failed
    NotSuccessful,
    /// Transport failure (retryable)
    Unreachable,
    /// Provider does not know the reference (not retryable)
    Rejected,
}

struct MockInner {
    script: Mutex<Vec<VerifyOutcome>>,
    verify_calls: AtomicUsize,
    init_calls: AtomicUsize,
}

/// A scripted payment gateway. Each verify call consumes the next outcome
/// from the script; the last outcome repeats once the script runs out.
#[derive(Clone)]
pub struct MockGateway {
    inner: Arc<MockInner>,
}

impl MockGateway {
    pub fn new(script: Vec<VerifyOutcome>) -> Self {
        assert!(!script.is_empty(), "mock gateway needs at least one outcome");
        Self {
            inner: Arc::new(MockInner {
                script: Mutex::new(script),
                verify_calls: AtomicUsize::new(0),
                init_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Gateway that always reports a successful charge of `amount_minor`
    pub fn always_success(amount_minor: i64) -> Self {
        Self::new(vec![VerifyOutcome::Success(amount_minor)])
    }

    pub fn verify_calls(&self) -> usize {
        self.inner.verify_calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.inner.init_calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for MockGateway {
    async fn initialize(&self, init: &InitializePayment) -> Result<Checkout, GatewayError> {
        self.inner.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Checkout {
            authorization_url: "http://gateway.test/checkout".to_string(),
            reference: init.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentResult, GatewayError> {
        let call = self.inner.verify_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let script = self.inner.script.lock().unwrap();
            script
                .get(call)
                .cloned()
                .unwrap_or_else(|| script.last().cloned().unwrap())
        };
        match outcome {
            VerifyOutcome::Success(amount_minor) => Ok(PaymentResult {
                verified: true,
                amount_minor,
                currency: "NGN".to_string(),
                provider_reference: reference.to_string(),
                raw: serde_json::json!({"status": "success"}),
            }),
            VerifyOutcome::SuccessInCurrency(amount_minor, currency) => Ok(PaymentResult {
                verified: true,
                amount_minor,
                currency: currency.to_string(),
                provider_reference: reference.to_string(),
                raw: serde_json::json!({"status": "success"}),
            }),
            VerifyOutcome::NotSuccessful => Ok(PaymentResult {
                verified: false,
                amount_minor: 0,
                currency: "NGN".to_string(),
                provider_reference: reference.to_string(),
                raw: serde_json::json!({"status": "failed"}),
            }),
            VerifyOutcome::Unreachable => {
                Err(GatewayError::Unreachable("connection refused".to_string()))
            }
            VerifyOutcome::Rejected => {
                Err(GatewayError::Rejected("transaction not found".to_string()))
            }
        }
    }
}
