use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::payments::FlutterwaveClient;

/// Flutterwave webhook. Authenticated by the `verif-hash` header matching
/// the configured hash; payloads are not signed, so a deployment without
/// a configured hash rejects all deliveries.
pub async fn flutterwave_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let config = state
        .flutterwave
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Flutterwave is not enabled".into()))?;
    let client = FlutterwaveClient::new(config);

    let provided = headers
        .get("verif-hash")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if !client.verify_webhook_hash(provided) {
        tracing::warn!("flutterwave webhook rejected: bad verif-hash");
        return Err(AppError::Unauthorized);
    }

    let event: serde_json::Value = serde_json::from_slice(&body)?;
    if event["event"].as_str() != Some("charge.completed") {
        return Ok(StatusCode::OK);
    }
    if event["data"]["status"].as_str() != Some("successful") {
        return Ok(StatusCode::OK);
    }
    let Some(reference) = event["data"]["tx_ref"].as_str() else {
        return Ok(StatusCode::OK);
    };

    let conn = state.db.get()?;
    let Some(session) = queries::get_claim_session_by_reference_global(&conn, reference)? else {
        return Ok(StatusCode::OK);
    };
    // Flutterwave amounts are decimal major units.
    if let Some(charged) = event["data"]["amount"].as_f64() {
        if (charged * 100.0).round() as i64 != session.amount_minor {
            tracing::warn!(
                reference,
                charged,
                expected = session.amount_minor,
                "flutterwave webhook amount mismatch, not verifying"
            );
            return Ok(StatusCode::OK);
        }
    }
    if queries::mark_session_verified_by_reference(&conn, reference)? {
        tracing::info!(reference, "flutterwave webhook verified session");
    }

    Ok(StatusCode::OK)
}
