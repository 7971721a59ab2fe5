use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netvend::config::Config;
use netvend::db::{create_pool, init_db, queries, AppState};
use netvend::handlers;
use netvend::models::{CreatePlan, CreateTenant, CreateVoucherBatch};
use netvend::rate_limit;

#[derive(Parser, Debug)]
#[command(name = "netvend")]
#[command(about = "Multi-tenant captive-portal voucher vending backend")]
struct Cli {
    /// Seed the database with dev data (tenant, location, plans, vouchers)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with dev data for testing.
/// Creates: a tenant with one location, three plans, and stocked buckets.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let mut conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM tenants", [], |row| row.get(0))
        .expect("Failed to count tenants");
    if existing > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let (tenant, locations) = queries::create_tenant(
        &mut conn,
        &CreateTenant {
            name: "Dev Portal".to_string(),
            support_contact: Some("dev@netvend.local".to_string()),
            locations: vec!["Main Gate".to_string()],
        },
    )
    .expect("Failed to create dev tenant");
    let location = &locations[0];

    tracing::info!("Tenant: {} (id: {})", tenant.name, tenant.id);
    tracing::info!("Location: {} (id: {})", location.name, location.id);

    let plans = [
        ("Daily 500MB", "1d", "MB", 500, 20000),
        ("Weekly 2GB", "7d", "GB", 2, 100000),
        ("Monthly 10GB", "30d", "GB", 10, 350000),
    ];
    for (name, duration, unit, size, amount) in plans {
        let plan = queries::create_plan(
            &conn,
            &tenant.id,
            &CreatePlan {
                name: name.to_string(),
                duration_class: duration.to_string(),
                capacity_unit: unit.parse().expect("seed capacity unit"),
                bundle_size: size,
                bundle_tier: "standard".parse().expect("seed bundle tier"),
                location_id: location.id.clone(),
                amount_minor: amount,
                currency: "NGN".to_string(),
            },
        )
        .expect("Failed to create dev plan");

        let batch = CreateVoucherBatch {
            request: plan.voucher_request(),
            codes: (1..=5)
                .map(|n| format!("{}-{:04}", plan.duration_class.to_uppercase(), n))
                .collect(),
        };
        let added = queries::add_vouchers(&mut conn, &batch.request, &batch.codes)
            .expect("Failed to stock dev bucket");

        tracing::info!("Plan: {} (id: {}, stocked: {})", plan.name, plan.id, added);
    }

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED SUCCESSFULLY");
    tracing::info!("============================================");

    // Copy-paste friendly output for a portal env file
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  tenant_id: {}", tenant.id);
    println!("  location_id: {}", location.id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netvend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.paystack_secret_key.is_none() && config.flutterwave_secret_key.is_none() {
        tracing::warn!("No payment gateway configured; /buy will reject all requests");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState::from_config(&config, db_pool);

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set NETVEND_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = Router::new()
        // Buyer-facing endpoints (no auth, IP rate limited)
        .merge(handlers::public::router(
            rate_limit::strict_layer(config.rate_limit_strict_rpm),
            rate_limit::standard_layer(config.rate_limit_standard_rpm),
        ))
        // Webhook endpoints (provider-specific auth)
        .merge(handlers::webhooks::router())
        // Admin inventory endpoints (bearer token auth)
        .merge(handlers::admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Netvend server listening on {}", addr);

    // Use into_make_service_with_connect_info to enable IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
