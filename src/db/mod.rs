mod schema;

pub mod from_row;
pub mod queries;

pub use schema::init_db;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::claim::InFlight;
use crate::config::Config;
use crate::payments::{FlutterwaveConfig, PaymentProvider, PaystackConfig};
use crate::util::RetryPolicy;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Base URL for gateway callbacks (e.g. https://api.example.com)
    pub base_url: String,
    /// Where buyers land after the claim flow resolves
    pub success_page_url: String,
    pub paystack: Option<PaystackConfig>,
    pub flutterwave: Option<FlutterwaveConfig>,
    pub default_provider: Option<PaymentProvider>,
    /// Bearer token for admin inventory endpoints (None = admin disabled)
    pub admin_token: Option<String>,
    pub count_cache: Arc<CountCache>,
    /// Per-session re-entrancy guard for the claim coordinator
    pub in_flight: Arc<InFlight>,
    pub verify_retry: RetryPolicy,
}

impl AppState {
    pub fn from_config(config: &Config, db: DbPool) -> Self {
        Self {
            db,
            base_url: config.base_url.clone(),
            success_page_url: config.success_page_url.clone(),
            paystack: config.paystack_secret_key.clone().map(|secret_key| PaystackConfig {
                secret_key,
                base_url: config.paystack_base_url.clone(),
            }),
            flutterwave: config
                .flutterwave_secret_key
                .clone()
                .map(|secret_key| FlutterwaveConfig {
                    secret_key,
                    webhook_hash: config.flutterwave_webhook_hash.clone(),
                    base_url: config.flutterwave_base_url.clone(),
                }),
            default_provider: config
                .default_provider
                .as_deref()
                .and_then(|p| p.parse().ok()),
            admin_token: config.admin_token.clone(),
            count_cache: Arc::new(CountCache::new(Duration::from_secs(
                config.count_cache_ttl_secs,
            ))),
            in_flight: Arc::new(InFlight::default()),
            verify_retry: RetryPolicy::new(
                config.verify_max_attempts,
                Duration::from_millis(config.verify_backoff_ms),
            ),
        }
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // Claims open immediate transactions; concurrent writers must wait for
    // the lock rather than fail with SQLITE_BUSY.
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
    Pool::builder().max_size(10).build(manager)
}

/// Short-TTL cache of per-bucket voucher counts.
///
/// Availability is checked on every plan-card render and before every
/// purchase, so counts are served from here for a few tens of seconds and
/// invalidated whenever an upload or a successful claim changes a bucket.
pub struct CountCache {
    ttl: Duration,
    inner: Mutex<HashMap<String, (i64, Instant)>>,
}

impl CountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, bucket_key: &str) -> Option<i64> {
        let inner = self.inner.lock().expect("count cache poisoned");
        inner
            .get(bucket_key)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(count, _)| *count)
    }

    pub fn put(&self, bucket_key: String, count: i64) {
        let mut inner = self.inner.lock().expect("count cache poisoned");
        inner.insert(bucket_key, (count, Instant::now()));
    }

    pub fn invalidate(&self, bucket_key: &str) {
        let mut inner = self.inner.lock().expect("count cache poisoned");
        inner.remove(bucket_key);
    }
}
