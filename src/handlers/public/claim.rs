use axum::extract::State;
use serde::Deserialize;

use crate::claim;
use crate::db::{queries, AppState};
use crate::error::{OptionExt, Result};
use crate::extractors::{Json, Query};
use crate::models::{ClaimStage, ClaimState, VoucherRequest};

#[derive(Debug, Deserialize)]
pub struct ClaimQuery {
    pub tenant: String,
    pub reference: String,
}

/// Poll the state of a claim session. Read-only: a lost redirect can
/// re-fetch a claimed code here without re-driving the flow.
pub async fn claim_state(
    State(state): State<AppState>,
    Query(query): Query<ClaimQuery>,
) -> Result<Json<ClaimState>> {
    let conn = state.db.get()?;
    let session = queries::get_claim_session_by_reference(&conn, &query.tenant, &query.reference)?
        .or_not_found("No purchase found for this payment reference")?;
    Ok(Json(claim::snapshot(&session)))
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub tenant_id: String,
    pub reference: String,
}

/// Re-run verification for a session whose last verification failed.
pub async fn retry_claim(
    State(state): State<AppState>,
    Json(request): Json<RetryRequest>,
) -> Result<Json<ClaimState>> {
    let outcome = claim::retry_session(&state, &request.tenant_id, &request.reference).await?;
    Ok(Json(outcome))
}

/// Most recently claimed code for a bucket. Served as the `idle` stage:
/// nothing was paid or claimed by this request.
pub async fn active_voucher(
    State(state): State<AppState>,
    Query(request): Query<VoucherRequest>,
) -> Result<Json<ClaimState>> {
    request.validate()?;
    let conn = state.db.get()?;
    let code = queries::get_active_voucher(&conn, &request)?
        .or_not_found("No active voucher for this bundle")?;
    Ok(Json(ClaimState::with_code(ClaimStage::Idle, code)))
}
