//! Claim coordinator: payment verification driving the voucher claim.

mod common;

use common::*;

struct Fixture {
    state: AppState,
    plan: Plan,
    tenant: Tenant,
}

fn setup(stock: &[&str]) -> Fixture {
    let state = create_test_app_state();
    let mut conn = state.db.get().unwrap();
    let (tenant, location) = create_test_tenant(&mut conn, "Coordinator Tenant");
    let plan = create_test_plan(&conn, &tenant.id, &location.id);
    if !stock.is_empty() {
        stock_vouchers(&mut conn, &plan.voucher_request(), stock);
    } else {
        // Register the bucket so exhaustion reads as Empty
        queries::add_vouchers(&mut conn, &plan.voucher_request(), &[]).unwrap();
    }
    drop(conn);
    Fixture {
        state,
        plan,
        tenant,
    }
}

fn reload(fx: &Fixture, reference: &str) -> ClaimSession {
    let conn = fx.state.db.get().unwrap();
    queries::get_claim_session_by_reference(&conn, &fx.tenant.id, reference)
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn successful_payment_claims_a_voucher() {
    let fx = setup(&["HAPPY-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-happy", PaymentProvider::Paystack)
    };

    let gateway = MockGateway::always_success(fx.plan.amount_minor);
    let coordinator = ClaimCoordinator::new(fx.state.clone(), gateway.clone());
    let outcome = coordinator.resume(session).await.unwrap();

    assert_eq!(outcome.stage, ClaimStage::Claimed);
    assert_eq!(outcome.voucher_code.as_deref(), Some("HAPPY-1"));
    assert_eq!(gateway.verify_calls(), 1);

    let reloaded = reload(&fx, "PS-happy");
    assert_eq!(reloaded.stage, ClaimStage::Claimed);
    assert_eq!(reloaded.claimed_voucher_code.as_deref(), Some("HAPPY-1"));
    assert_eq!(reloaded.verify_attempts, 1);

    let conn = fx.state.db.get().unwrap();
    assert_eq!(
        queries::count_vouchers(&conn, &fx.plan.voucher_request()).unwrap(),
        0
    );
}

#[tokio::test]
async fn rejected_payment_never_touches_the_store() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-rejected", PaymentProvider::Paystack)
    };

    let gateway = MockGateway::new(vec![VerifyOutcome::Rejected]);
    let coordinator = ClaimCoordinator::new(fx.state.clone(), gateway.clone());
    let outcome = coordinator.resume(session).await.unwrap();

    assert_eq!(outcome.stage, ClaimStage::VerificationFailed);
    assert!(outcome.error.is_some());
    // Not retryable, so exactly one gateway call
    assert_eq!(gateway.verify_calls(), 1);

    let conn = fx.state.db.get().unwrap();
    assert_eq!(
        queries::count_vouchers(&conn, &fx.plan.voucher_request()).unwrap(),
        1
    );
}

#[tokio::test]
async fn pending_charge_fails_verification() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-pending", PaymentProvider::Paystack)
    };

    let gateway = MockGateway::new(vec![VerifyOutcome::NotSuccessful]);
    let outcome = ClaimCoordinator::new(fx.state.clone(), gateway)
        .resume(session)
        .await
        .unwrap();

    assert_eq!(outcome.stage, ClaimStage::VerificationFailed);
    assert_eq!(reload(&fx, "PS-pending").stage, ClaimStage::VerificationFailed);
}

#[tokio::test]
async fn amount_mismatch_fails_verification() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-short", PaymentProvider::Paystack)
    };

    // Charged less than the plan price
    let gateway = MockGateway::new(vec![VerifyOutcome::Success(fx.plan.amount_minor - 1)]);
    let outcome = ClaimCoordinator::new(fx.state.clone(), gateway)
        .resume(session)
        .await
        .unwrap();

    assert_eq!(outcome.stage, ClaimStage::VerificationFailed);
    let conn = fx.state.db.get().unwrap();
    assert_eq!(
        queries::count_vouchers(&conn, &fx.plan.voucher_request()).unwrap(),
        1
    );
}

#[tokio::test]
async fn currency_mismatch_fails_verification() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-usd", PaymentProvider::Paystack)
    };

    // Right amount, wrong currency
    let gateway = MockGateway::new(vec![VerifyOutcome::SuccessInCurrency(
        fx.plan.amount_minor,
        "USD",
    )]);
    let outcome = ClaimCoordinator::new(fx.state.clone(), gateway)
        .resume(session)
        .await
        .unwrap();

    assert_eq!(outcome.stage, ClaimStage::VerificationFailed);
    let conn = fx.state.db.get().unwrap();
    assert_eq!(
        queries::count_vouchers(&conn, &fx.plan.voucher_request()).unwrap(),
        1
    );
}

#[tokio::test]
async fn repeated_verification_of_one_reference_is_idempotent() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-again", PaymentProvider::Paystack)
    };

    // The charge stays pending across both checks
    let gateway = MockGateway::new(vec![VerifyOutcome::NotSuccessful]);
    let coordinator = ClaimCoordinator::new(fx.state.clone(), gateway.clone());
    let first = coordinator.resume(session).await.unwrap();
    let second = coordinator.retry(reload(&fx, "PS-again")).await.unwrap();

    // Same reference, same outcome, no side effects on the store
    assert_eq!(first.stage, ClaimStage::VerificationFailed);
    assert_eq!(second.stage, first.stage);
    assert_eq!(second.error, first.error);
    assert_eq!(gateway.verify_calls(), 2);

    let conn = fx.state.db.get().unwrap();
    assert_eq!(
        queries::count_vouchers(&conn, &fx.plan.voucher_request()).unwrap(),
        1
    );
}

#[tokio::test]
async fn transient_gateway_failure_is_retried() {
    let fx = setup(&["FLAKY-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-flaky", PaymentProvider::Paystack)
    };

    let gateway = MockGateway::new(vec![
        VerifyOutcome::Unreachable,
        VerifyOutcome::Success(fx.plan.amount_minor),
    ]);
    let coordinator = ClaimCoordinator::new(fx.state.clone(), gateway.clone());
    let outcome = coordinator.resume(session).await.unwrap();

    assert_eq!(outcome.stage, ClaimStage::Claimed);
    assert_eq!(gateway.verify_calls(), 2);
    assert_eq!(reload(&fx, "PS-flaky").verify_attempts, 2);
}

#[tokio::test]
async fn unreachable_gateway_exhausts_the_retry_budget() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-down", PaymentProvider::Paystack)
    };

    let gateway = MockGateway::new(vec![VerifyOutcome::Unreachable]);
    let coordinator = ClaimCoordinator::new(fx.state.clone(), gateway.clone());
    let outcome = coordinator.resume(session).await.unwrap();

    assert_eq!(outcome.stage, ClaimStage::VerificationFailed);
    // verify_retry in the test state allows 3 attempts
    assert_eq!(gateway.verify_calls(), 3);
    assert_eq!(reload(&fx, "PS-down").verify_attempts, 3);
}

#[tokio::test]
async fn resuming_a_claimed_session_returns_the_same_code_without_gateway_calls() {
    let fx = setup(&["ONCE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-once", PaymentProvider::Paystack)
    };

    let first = ClaimCoordinator::new(
        fx.state.clone(),
        MockGateway::always_success(fx.plan.amount_minor),
    )
    .resume(session)
    .await
    .unwrap();
    assert_eq!(first.voucher_code.as_deref(), Some("ONCE-1"));

    // A reload of the redirect page resumes the same session
    let gateway = MockGateway::new(vec![VerifyOutcome::Rejected]);
    let second = ClaimCoordinator::new(fx.state.clone(), gateway.clone())
        .resume(reload(&fx, "PS-once"))
        .await
        .unwrap();

    assert_eq!(second.stage, ClaimStage::Claimed);
    assert_eq!(second.voucher_code.as_deref(), Some("ONCE-1"));
    assert_eq!(gateway.verify_calls(), 0, "terminal session re-verified");
}

#[tokio::test]
async fn plain_resume_does_not_reenter_a_failed_verification() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-stuck", PaymentProvider::Paystack)
    };

    ClaimCoordinator::new(fx.state.clone(), MockGateway::new(vec![VerifyOutcome::Rejected]))
        .resume(session)
        .await
        .unwrap();

    let gateway = MockGateway::always_success(fx.plan.amount_minor);
    let coordinator = ClaimCoordinator::new(fx.state.clone(), gateway.clone());
    let outcome = coordinator.resume(reload(&fx, "PS-stuck")).await.unwrap();

    assert_eq!(outcome.stage, ClaimStage::VerificationFailed);
    assert_eq!(gateway.verify_calls(), 0);
}

#[tokio::test]
async fn explicit_retry_reenters_verification_and_claims() {
    let fx = setup(&["RETRY-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-retry", PaymentProvider::Paystack)
    };

    ClaimCoordinator::new(fx.state.clone(), MockGateway::new(vec![VerifyOutcome::Rejected]))
        .resume(session)
        .await
        .unwrap();

    let outcome = ClaimCoordinator::new(
        fx.state.clone(),
        MockGateway::always_success(fx.plan.amount_minor),
    )
    .retry(reload(&fx, "PS-retry"))
    .await
    .unwrap();

    assert_eq!(outcome.stage, ClaimStage::Claimed);
    assert_eq!(outcome.voucher_code.as_deref(), Some("RETRY-1"));
}

#[tokio::test]
async fn retry_of_a_non_failed_session_is_a_conflict() {
    let fx = setup(&["SAFE-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-fresh", PaymentProvider::Paystack)
    };

    let result = ClaimCoordinator::new(
        fx.state.clone(),
        MockGateway::always_success(fx.plan.amount_minor),
    )
    .retry(session)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn paid_claim_on_empty_bucket_falls_back_to_active_voucher() {
    let fx = setup(&["LAST-1"]);
    let conn = fx.state.db.get().unwrap();
    let first = create_test_session(&conn, &fx.plan, "PS-first", PaymentProvider::Paystack);
    let second = create_test_session(&conn, &fx.plan, "PS-second", PaymentProvider::Paystack);
    drop(conn);

    // First buyer takes the last voucher, which also fills the active slot
    ClaimCoordinator::new(
        fx.state.clone(),
        MockGateway::always_success(fx.plan.amount_minor),
    )
    .resume(first)
    .await
    .unwrap();

    let outcome = ClaimCoordinator::new(
        fx.state.clone(),
        MockGateway::always_success(fx.plan.amount_minor),
    )
    .resume(second)
    .await
    .unwrap();

    assert_eq!(outcome.stage, ClaimStage::Claimed);
    assert_eq!(outcome.voucher_code.as_deref(), Some("LAST-1"));
    assert_eq!(
        reload(&fx, "PS-second").claimed_voucher_code.as_deref(),
        Some("LAST-1")
    );
}

#[tokio::test]
async fn paid_claim_with_no_fallback_fails_closed_with_support_contact() {
    let fx = setup(&[]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        create_test_session(&conn, &fx.plan, "PS-soldout", PaymentProvider::Paystack)
    };

    let outcome = ClaimCoordinator::new(
        fx.state.clone(),
        MockGateway::always_success(fx.plan.amount_minor),
    )
    .resume(session)
    .await
    .unwrap();

    assert_eq!(outcome.stage, ClaimStage::ClaimFailed);
    let error = outcome.error.unwrap();
    assert!(error.contains("PS-soldout"), "error should carry the reference");
    assert!(error.contains("support@test.local"));

    assert_eq!(reload(&fx, "PS-soldout").stage, ClaimStage::ClaimFailed);
}

#[tokio::test]
async fn webhook_verified_session_skips_the_verify_call() {
    let fx = setup(&["HOOKED-1"]);
    let session = {
        let conn = fx.state.db.get().unwrap();
        let session = create_test_session(&conn, &fx.plan, "PS-hooked", PaymentProvider::Paystack);
        assert!(queries::mark_session_verified_by_reference(&conn, "PS-hooked").unwrap());
        drop(conn);
        session
    };
    assert_eq!(session.stage, ClaimStage::Initiated);

    let gateway = MockGateway::new(vec![VerifyOutcome::Rejected]);
    let outcome = ClaimCoordinator::new(fx.state.clone(), gateway.clone())
        .resume(reload(&fx, &session.payment_reference))
        .await
        .unwrap();

    assert_eq!(outcome.stage, ClaimStage::Claimed);
    assert_eq!(outcome.voucher_code.as_deref(), Some("HOOKED-1"));
    assert_eq!(gateway.verify_calls(), 0);
}
