use axum::{extract::State, response::Redirect};
use serde::Deserialize;

use crate::claim;
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Query;
use crate::models::{ClaimStage, ClaimState};
use crate::util::append_query_params;

/// Both gateways redirect here. Paystack sends `reference` (and a legacy
/// `trxref`), Flutterwave sends `tx_ref`.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub tenant: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub trxref: Option<String>,
    #[serde(default)]
    pub tx_ref: Option<String>,
}

/// Payment redirect landing. Resumes the claim session for the returned
/// reference and forwards the buyer to the portal page with the outcome
/// in the query string. This endpoint always redirects; a failure becomes
/// `stage=...&error=...` rather than an HTTP error the buyer cannot read.
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect> {
    let reference = query
        .reference
        .or(query.trxref)
        .or(query.tx_ref)
        .unwrap_or_default();

    let outcome = if reference.is_empty() {
        ClaimState::with_error(ClaimStage::ClaimFailed, "Missing payment reference")
    } else {
        match claim::resume_session(&state, &query.tenant, &reference).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(reference = %reference, error = %e, "callback resume failed");
                ClaimState::with_error(ClaimStage::ClaimFailed, e.to_string())
            }
        }
    };

    let stage = outcome.stage.to_string();
    let mut params: Vec<(&str, &str)> = vec![("reference", &reference), ("stage", &stage)];
    if let Some(ref code) = outcome.voucher_code {
        params.push(("code", code));
    }
    if let Some(ref error) = outcome.error {
        params.push(("error", error));
    }
    let redirect_url = append_query_params(&state.success_page_url, &params);

    Ok(Redirect::temporary(&redirect_url))
}
