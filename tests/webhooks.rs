//! Webhook authentication and session verification.

use axum::{body::Body, http::Request};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha512;
use tower::ServiceExt;

mod common;
use common::*;

fn sign_paystack(body: &str) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(TEST_PAYSTACK_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn paystack_request(body: String, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/paystack")
        .header("content-type", "application/json")
        .header("x-paystack-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

fn flutterwave_request(body: String, hash: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/flutterwave")
        .header("content-type", "application/json")
        .header("verif-hash", hash)
        .body(Body::from(body))
        .unwrap()
}

fn session_stage(state: &AppState, tenant_id: &str, reference: &str) -> ClaimStage {
    let conn = state.db.get().unwrap();
    queries::get_claim_session_by_reference(&conn, tenant_id, reference)
        .unwrap()
        .unwrap()
        .stage
}

fn seed_session(state: &AppState, reference: &str, provider: PaymentProvider) -> String {
    let mut conn = state.db.get().unwrap();
    let (tenant, location) = create_test_tenant(&mut conn, "Webhook Tenant");
    let plan = create_test_plan(&conn, &tenant.id, &location.id);
    create_test_session(&conn, &plan, reference, provider);
    tenant.id
}

#[tokio::test]
async fn paystack_webhook_with_bad_signature_is_rejected() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "PS-hook-1", PaymentProvider::Paystack);
    let app = webhook_app(state.clone());

    let body = json!({
        "event": "charge.success",
        "data": { "reference": "PS-hook-1" }
    })
    .to_string();

    let response = app
        .oneshot(paystack_request(body, "deadbeef"))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(
        session_stage(&state, &tenant_id, "PS-hook-1"),
        ClaimStage::Initiated
    );
}

#[tokio::test]
async fn paystack_webhook_marks_the_session_verified() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "PS-hook-2", PaymentProvider::Paystack);
    let app = webhook_app(state.clone());

    let body = json!({
        "event": "charge.success",
        "data": { "reference": "PS-hook-2", "amount": 20000 }
    })
    .to_string();
    let signature = sign_paystack(&body);

    let response = app
        .oneshot(paystack_request(body, &signature))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        session_stage(&state, &tenant_id, "PS-hook-2"),
        ClaimStage::Verified
    );
}

#[tokio::test]
async fn duplicate_paystack_deliveries_are_idempotent() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "PS-hook-3", PaymentProvider::Paystack);

    let body = json!({
        "event": "charge.success",
        "data": { "reference": "PS-hook-3" }
    })
    .to_string();
    let signature = sign_paystack(&body);

    for _ in 0..2 {
        let response = webhook_app(state.clone())
            .oneshot(paystack_request(body.clone(), &signature))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
    assert_eq!(
        session_stage(&state, &tenant_id, "PS-hook-3"),
        ClaimStage::Verified
    );
}

#[tokio::test]
async fn paystack_webhook_does_not_regress_a_claimed_session() {
    let state = create_test_app_state();
    let reference = "PS-hook-4";
    let tenant_id = {
        let mut conn = state.db.get().unwrap();
        let (tenant, location) = create_test_tenant(&mut conn, "Webhook Tenant");
        let plan = create_test_plan(&conn, &tenant.id, &location.id);
        stock_vouchers(&mut conn, &plan.voucher_request(), &["WH-1"]);
        let session = create_test_session(&conn, &plan, reference, PaymentProvider::Paystack);
        queries::claim_and_record(&mut conn, &session.id, &plan.voucher_request()).unwrap();
        tenant.id
    };

    let body = json!({
        "event": "charge.success",
        "data": { "reference": reference }
    })
    .to_string();
    let signature = sign_paystack(&body);

    let response = webhook_app(state.clone())
        .oneshot(paystack_request(body, &signature))
        .await
        .unwrap();

    // Acknowledged, but a claimed session stays claimed
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        session_stage(&state, &tenant_id, reference),
        ClaimStage::Claimed
    );
}

#[tokio::test]
async fn paystack_webhook_ignores_an_underpaid_charge() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "PS-hook-6", PaymentProvider::Paystack);

    // Plan price is 20000 kobo; the charge came up short
    let body = json!({
        "event": "charge.success",
        "data": { "reference": "PS-hook-6", "amount": 19999 }
    })
    .to_string();
    let signature = sign_paystack(&body);

    let response = webhook_app(state.clone())
        .oneshot(paystack_request(body, &signature))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        session_stage(&state, &tenant_id, "PS-hook-6"),
        ClaimStage::Initiated
    );
}

#[tokio::test]
async fn paystack_webhook_ignores_other_events() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "PS-hook-5", PaymentProvider::Paystack);

    let body = json!({
        "event": "transfer.success",
        "data": { "reference": "PS-hook-5" }
    })
    .to_string();
    let signature = sign_paystack(&body);

    let response = webhook_app(state.clone())
        .oneshot(paystack_request(body, &signature))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        session_stage(&state, &tenant_id, "PS-hook-5"),
        ClaimStage::Initiated
    );
}

#[tokio::test]
async fn flutterwave_webhook_with_bad_hash_is_rejected() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "FLW-hook-1", PaymentProvider::Flutterwave);

    let body = json!({
        "event": "charge.completed",
        "data": { "tx_ref": "FLW-hook-1", "status": "successful" }
    })
    .to_string();

    let response = webhook_app(state.clone())
        .oneshot(flutterwave_request(body, "wrong-hash"))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(
        session_stage(&state, &tenant_id, "FLW-hook-1"),
        ClaimStage::Initiated
    );
}

#[tokio::test]
async fn flutterwave_webhook_marks_the_session_verified() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "FLW-hook-2", PaymentProvider::Flutterwave);

    let body = json!({
        "event": "charge.completed",
        "data": { "tx_ref": "FLW-hook-2", "status": "successful", "amount": 200.0 }
    })
    .to_string();

    let response = webhook_app(state.clone())
        .oneshot(flutterwave_request(body, TEST_FLW_HASH))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        session_stage(&state, &tenant_id, "FLW-hook-2"),
        ClaimStage::Verified
    );
}

#[tokio::test]
async fn flutterwave_webhook_ignores_an_underpaid_charge() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "FLW-hook-4", PaymentProvider::Flutterwave);

    // Plan price is 200.00; the charge came up short
    let body = json!({
        "event": "charge.completed",
        "data": { "tx_ref": "FLW-hook-4", "status": "successful", "amount": 150.0 }
    })
    .to_string();

    let response = webhook_app(state.clone())
        .oneshot(flutterwave_request(body, TEST_FLW_HASH))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        session_stage(&state, &tenant_id, "FLW-hook-4"),
        ClaimStage::Initiated
    );
}

#[tokio::test]
async fn flutterwave_webhook_ignores_unsuccessful_charges() {
    let state = create_test_app_state();
    let tenant_id = seed_session(&state, "FLW-hook-3", PaymentProvider::Flutterwave);

    let body = json!({
        "event": "charge.completed",
        "data": { "tx_ref": "FLW-hook-3", "status": "failed" }
    })
    .to_string();

    let response = webhook_app(state.clone())
        .oneshot(flutterwave_request(body, TEST_FLW_HASH))
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        session_stage(&state, &tenant_id, "FLW-hook-3"),
        ClaimStage::Initiated
    );
}
