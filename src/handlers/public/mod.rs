mod buy;
mod callback;
mod claim;
mod plans;

pub use buy::*;
pub use callback::*;
pub use claim::*;
pub use plans::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::AppState;
use crate::rate_limit::RateLimitLayer;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Buyer-facing routes. /buy gets the strict rate limit tier because it
/// creates sessions and calls out to a payment gateway; the rest of the
/// flow is DB-bound and gets the standard tier.
pub fn router(strict: RateLimitLayer, standard: RateLimitLayer) -> Router<AppState> {
    let purchase = Router::new().route("/buy", post(initiate_buy)).layer(strict);

    let flow = Router::new()
        .route("/plans", get(list_plans))
        .route("/callback", get(payment_callback))
        .route("/claim", get(claim_state))
        .route("/claim/retry", post(retry_claim))
        .route("/voucher/active", get(active_voucher))
        .layer(standard);

    Router::new()
        .route("/health", get(health))
        .merge(purchase)
        .merge(flow)
}
