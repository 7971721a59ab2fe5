mod tenants;
mod vouchers;

pub use tenants::*;
pub use vouchers::*;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::util::extract_bearer_token;

/// Check the admin bearer token. Constant-time comparison; a server with
/// no token configured rejects everything.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(ref expected) = state.admin_token else {
        return Err(AppError::Unauthorized);
    };
    let provided = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;

    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided.as_bytes();
    if expected_bytes.len() != provided_bytes.len() {
        return Err(AppError::Unauthorized);
    }
    if bool::from(expected_bytes.ct_eq(provided_bytes)) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/tenants", post(create_tenant))
        .route("/admin/tenants/{tenant_id}/plans", post(create_plan))
        .route("/admin/tenants/{tenant_id}/stats", get(tenant_stats))
        .route("/admin/vouchers", post(upload_vouchers))
        .route("/admin/vouchers/count", get(voucher_count))
}
