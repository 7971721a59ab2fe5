use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Query};
use crate::models::{CreateVoucherBatch, VoucherRequest};

use super::require_admin;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub added: usize,
}

/// Bulk inventory upload into one bucket. Invalidates the cached count so
/// the new stock is visible immediately.
pub async fn upload_vouchers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<CreateVoucherBatch>,
) -> Result<Json<UploadResponse>> {
    require_admin(&state, &headers)?;

    if batch.codes.is_empty() {
        return Err(AppError::BadRequest("codes must not be empty".into()));
    }
    if batch.codes.iter().any(|c| c.trim().is_empty()) {
        return Err(AppError::BadRequest(
            "codes must not contain blank entries".into(),
        ));
    }

    let mut conn = state.db.get()?;
    queries::get_tenant_by_id(&conn, &batch.request.tenant_id)?.or_not_found("Unknown tenant")?;
    let added = queries::add_vouchers(&mut conn, &batch.request, &batch.codes)?;
    state.count_cache.invalidate(&batch.request.bucket_key());

    tracing::info!(bucket = %batch.request.bucket_key(), added, "vouchers uploaded");

    Ok(Json(UploadResponse { added }))
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub available: i64,
}

/// Live (uncached) count for one bucket.
pub async fn voucher_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<VoucherRequest>,
) -> Result<Json<CountResponse>> {
    require_admin(&state, &headers)?;

    request.validate()?;
    let conn = state.db.get()?;
    let available = queries::count_vouchers(&conn, &request)?;

    Ok(Json(CountResponse { available }))
}
