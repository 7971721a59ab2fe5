use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::Json;
use crate::models::CreateClaimSession;
use crate::payments::{
    generate_payment_reference, FlutterwaveClient, InitializePayment, PaymentGateway,
    PaymentProvider, PaystackClient,
};
use crate::util::append_query_params;

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub tenant_id: String,
    pub plan_id: String,
    /// Buyer email, required by both gateways for the charge
    pub email: String,
    /// Optional: explicit payment provider (falls back to the configured default)
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BuyResponse {
    pub checkout_url: String,
    pub reference: String,
    pub session_id: String,
}

/// Start a purchase: check availability, create the claim session, and
/// open a checkout with the gateway. The session exists before the buyer
/// ever leaves for the payment page, so the redirect back always has
/// something to resume.
pub async fn initiate_buy(
    State(state): State<AppState>,
    Json(request): Json<BuyRequest>,
) -> Result<Json<BuyResponse>> {
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }

    let conn = state.db.get()?;

    let tenant = queries::get_tenant_by_id(&conn, &request.tenant_id)?
        .or_not_found("Unknown tenant")?;
    let plan = queries::get_plan_by_id(&conn, &tenant.id, &request.plan_id)?
        .or_not_found("Unknown plan for this tenant")?;
    let voucher_request = plan.voucher_request();

    // Soft pre-check. The claim itself is what guarantees exclusivity;
    // this only keeps buyers from paying into an obviously empty bucket.
    let available = queries::count_vouchers_cached(&conn, &state.count_cache, &voucher_request)?;
    if available == 0 {
        return Err(AppError::Conflict("This bundle is sold out".into()));
    }

    let provider = match request.provider.as_deref() {
        Some(p) => p
            .parse::<PaymentProvider>()
            .map_err(|_| AppError::BadRequest("Unknown payment provider".into()))?,
        None => state
            .default_provider
            .ok_or_else(|| AppError::BadRequest("No payment provider configured".into()))?,
    };
    match provider {
        PaymentProvider::Paystack if state.paystack.is_none() => {
            return Err(AppError::BadRequest("Paystack is not configured".into()));
        }
        PaymentProvider::Flutterwave if state.flutterwave.is_none() => {
            return Err(AppError::BadRequest("Flutterwave is not configured".into()));
        }
        _ => {}
    }

    let reference = generate_payment_reference(provider);
    let session = queries::create_claim_session(
        &conn,
        &CreateClaimSession {
            tenant_id: tenant.id.clone(),
            payment_reference: reference.clone(),
            provider,
            request: voucher_request,
            amount_minor: plan.amount_minor,
            currency: plan.currency.clone(),
            email: request.email.clone(),
        },
    )?;

    let callback_url = append_query_params(
        &format!("{}/callback", state.base_url),
        &[("tenant", &tenant.id), ("reference", &reference)],
    );
    let init = InitializePayment {
        reference: reference.clone(),
        amount_minor: plan.amount_minor,
        currency: plan.currency.clone(),
        email: request.email.clone(),
        callback_url,
        metadata: serde_json::json!({
            "tenant_id": tenant.id,
            "plan_id": plan.id,
            "session_id": session.id,
        }),
    };

    let checkout = match provider {
        PaymentProvider::Paystack => {
            let config = state
                .paystack
                .as_ref()
                .ok_or_else(|| AppError::BadRequest("Paystack is not configured".into()))?;
            PaystackClient::new(config).initialize(&init).await?
        }
        PaymentProvider::Flutterwave => {
            let config = state
                .flutterwave
                .as_ref()
                .ok_or_else(|| AppError::BadRequest("Flutterwave is not configured".into()))?;
            FlutterwaveClient::new(config).initialize(&init).await?
        }
    };

    tracing::info!(
        session = %session.id,
        reference = %checkout.reference,
        provider = %provider,
        "checkout initialized"
    );

    Ok(Json(BuyResponse {
        checkout_url: checkout.authorization_url,
        reference: checkout.reference,
        session_id: session.id,
    }))
}
