use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{OptionExt, Result};
use crate::extractors::{Json, Query};
use crate::models::Plan;

#[derive(Debug, Deserialize)]
pub struct PlansQuery {
    pub tenant: String,
}

#[derive(Debug, Serialize)]
pub struct PlanListing {
    #[serde(flatten)]
    pub plan: Plan,
    /// Vouchers currently available in the plan's bucket (cached)
    pub available: i64,
}

/// Plans of a tenant with per-bucket availability, for the portal's plan
/// cards. Counts come from the short-TTL cache.
pub async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<PlansQuery>,
) -> Result<Json<Vec<PlanListing>>> {
    let conn = state.db.get()?;
    queries::get_tenant_by_id(&conn, &query.tenant)?.or_not_found("Unknown tenant")?;

    let plans = queries::list_plans(&conn, &query.tenant)?;
    let mut listings = Vec::with_capacity(plans.len());
    for plan in plans {
        let available =
            queries::count_vouchers_cached(&conn, &state.count_cache, &plan.voucher_request())?;
        listings.push(PlanListing { plan, available });
    }
    Ok(Json(listings))
}
