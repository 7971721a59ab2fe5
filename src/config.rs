use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub success_page_url: String,
    /// Default gateway when a buy request does not name one ("paystack" or "flutterwave")
    pub default_provider: Option<String>,
    pub paystack_secret_key: Option<String>,
    pub paystack_base_url: String,
    pub flutterwave_secret_key: Option<String>,
    pub flutterwave_base_url: String,
    /// Flutterwave webhook hash (the `verif-hash` header value)
    pub flutterwave_webhook_hash: Option<String>,
    /// Bearer token guarding the admin inventory endpoints (None = admin disabled)
    pub admin_token: Option<String>,
    pub rate_limit_strict_rpm: u32,
    pub rate_limit_standard_rpm: u32,
    /// TTL for cached per-bucket voucher counts
    pub count_cache_ttl_secs: u64,
    pub verify_max_attempts: u32,
    pub verify_backoff_ms: u64,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("NETVEND_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let success_page_url =
            env::var("SUCCESS_PAGE_URL").unwrap_or_else(|_| format!("{}/voucher", base_url));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "netvend.db".to_string()),
            base_url,
            success_page_url,
            default_provider: env::var("PAYMENT_PROVIDER").ok(),
            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY").ok(),
            paystack_base_url: env::var("PAYSTACK_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            flutterwave_secret_key: env::var("FLUTTERWAVE_SECRET_KEY").ok(),
            flutterwave_base_url: env::var("FLUTTERWAVE_URL")
                .unwrap_or_else(|_| "https://api.flutterwave.com".to_string()),
            flutterwave_webhook_hash: env::var("FLUTTERWAVE_WEBHOOK_HASH").ok(),
            admin_token: env::var("ADMIN_TOKEN").ok(),
            rate_limit_strict_rpm: env::var("RATE_LIMIT_STRICT_RPM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            rate_limit_standard_rpm: env::var("RATE_LIMIT_STANDARD_RPM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            count_cache_ttl_secs: env::var("COUNT_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            verify_max_attempts: env::var("VERIFY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            verify_backoff_ms: env::var("VERIFY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
