use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Serialize;

use crate::db::queries::{self, BucketStats, StageTally};
use crate::db::AppState;
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::Json;
use crate::models::{CreatePlan, CreateTenant, NetworkLocation, Plan, Tenant};

use super::require_admin;

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub locations: Vec<NetworkLocation>,
}

pub async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateTenant>,
) -> Result<Json<TenantResponse>> {
    require_admin(&state, &headers)?;

    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }

    let mut conn = state.db.get()?;
    let (tenant, locations) = queries::create_tenant(&mut conn, &input)?;
    tracing::info!(tenant = %tenant.id, "tenant created");

    Ok(Json(TenantResponse { tenant, locations }))
}

pub async fn create_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
    Json(input): Json<CreatePlan>,
) -> Result<Json<Plan>> {
    require_admin(&state, &headers)?;

    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    if input.amount_minor <= 0 {
        return Err(AppError::BadRequest(
            "amount_minor must be a positive integer".into(),
        ));
    }

    let conn = state.db.get()?;
    queries::get_tenant_by_id(&conn, &tenant_id)?.or_not_found("Unknown tenant")?;
    let plan = queries::create_plan(&conn, &tenant_id, &input)?;

    Ok(Json(plan))
}

#[derive(Debug, Serialize)]
pub struct TenantStats {
    pub sessions: Vec<StageTally>,
    pub buckets: Vec<BucketStats>,
}

/// Operational snapshot: session counts per stage plus remaining inventory
/// per bucket. Counts are live, not from the cache.
pub async fn tenant_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantStats>> {
    require_admin(&state, &headers)?;

    let conn = state.db.get()?;
    queries::get_tenant_by_id(&conn, &tenant_id)?.or_not_found("Unknown tenant")?;

    Ok(Json(TenantStats {
        sessions: queries::count_sessions_by_stage(&conn, &tenant_id)?,
        buckets: queries::list_buckets_with_counts(&conn, &tenant_id)?,
    }))
}
