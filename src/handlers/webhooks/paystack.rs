use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::payments::PaystackClient;

/// Paystack webhook: on a successful charge, marks the matching claim
/// session as verified so the next resume can skip the verify round trip.
/// The voucher claim itself only ever happens on the resume path. When the
/// payload carries an amount it must match the session's price; an
/// underpaid charge is acknowledged but never verified.
///
/// Unknown references and non-charge events are acknowledged with 200;
/// Paystack retries anything else.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let config = state
        .paystack
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Paystack is not enabled".into()))?;
    let client = PaystackClient::new(config);

    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if !client.verify_webhook_signature(&body, signature) {
        tracing::warn!("paystack webhook rejected: bad signature");
        return Err(AppError::Unauthorized);
    }

    let event: serde_json::Value = serde_json::from_slice(&body)?;
    if event["event"].as_str() != Some("charge.success") {
        return Ok(StatusCode::OK);
    }
    let Some(reference) = event["data"]["reference"].as_str() else {
        return Ok(StatusCode::OK);
    };

    let conn = state.db.get()?;
    let Some(session) = queries::get_claim_session_by_reference_global(&conn, reference)? else {
        return Ok(StatusCode::OK);
    };
    // Paystack amounts are already in kobo.
    if let Some(charged) = event["data"]["amount"].as_i64() {
        if charged != session.amount_minor {
            tracing::warn!(
                reference,
                charged,
                expected = session.amount_minor,
                "paystack webhook amount mismatch, not verifying"
            );
            return Ok(StatusCode::OK);
        }
    }
    if queries::mark_session_verified_by_reference(&conn, reference)? {
        tracing::info!(reference, "paystack webhook verified session");
    }

    Ok(StatusCode::OK)
}
