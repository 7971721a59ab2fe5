//! Claim coordinator: drives a claim session from a returned payment
//! reference through verification to an atomically claimed voucher.
//!
//! All outcomes that reach a buyer surface as a [`ClaimState`]; the
//! coordinator only returns `Err` for infrastructure failures (pool
//! exhaustion, missing configuration), never for a failed payment.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::db::queries::{self, VoucherClaimError};
use crate::db::AppState;
use crate::error::{AppError, OptionExt, Result};
use crate::models::{ClaimEvent, ClaimSession, ClaimStage, ClaimState};
use crate::payments::{
    FlutterwaveClient, GatewayError, PaymentGateway, PaymentProvider, PaystackClient,
};

/// Per-session re-entrancy guard. A session id is held here for the
/// duration of one coordinator run; concurrent requests for the same
/// session observe the persisted stage instead of racing the flow.
#[derive(Default)]
pub struct InFlight {
    inner: Mutex<HashSet<String>>,
}

impl InFlight {
    pub fn try_begin(self: &Arc<Self>, session_id: &str) -> Option<InFlightGuard> {
        let mut inner = self.inner.lock().expect("in-flight set poisoned");
        if !inner.insert(session_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            session_id: session_id.to_string(),
        })
    }
}

/// Releases the session id when the coordinator run ends, on any path.
pub struct InFlightGuard {
    registry: Arc<InFlight>,
    session_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut inner = self.registry.inner.lock().expect("in-flight set poisoned");
        inner.remove(&self.session_id);
    }
}

/// Read-only view of a session for polling endpoints. Never advances the
/// flow.
pub fn snapshot(session: &ClaimSession) -> ClaimState {
    terminal_snapshot(session).unwrap_or_else(|| match session.stage {
        ClaimStage::VerificationFailed => ClaimState::with_error(
            session.stage,
            session
                .last_error
                .clone()
                .unwrap_or_else(|| "Payment verification failed".to_string()),
        ),
        stage => ClaimState::new(stage),
    })
}

fn terminal_snapshot(session: &ClaimSession) -> Option<ClaimState> {
    match session.stage {
        ClaimStage::Claimed => Some(match &session.claimed_voucher_code {
            Some(code) => ClaimState::with_code(ClaimStage::Claimed, code.clone()),
            // Should not happen: claimed stage and code are written together.
            None => ClaimState::with_error(
                ClaimStage::Claimed,
                "Voucher code unavailable; contact support with your payment reference",
            ),
        }),
        ClaimStage::ClaimFailed => Some(ClaimState::with_error(
            ClaimStage::ClaimFailed,
            session
                .last_error
                .clone()
                .unwrap_or_else(|| "Voucher claim failed".to_string()),
        )),
        _ => None,
    }
}

pub struct ClaimCoordinator<G: PaymentGateway> {
    state: AppState,
    gateway: G,
}

impl<G: PaymentGateway> ClaimCoordinator<G> {
    pub fn new(state: AppState, gateway: G) -> Self {
        Self { state, gateway }
    }

    /// Entry point for the payment redirect. Terminal sessions are served
    /// their recorded outcome; everything else is driven as far as it can
    /// go in one pass.
    pub async fn resume(&self, session: ClaimSession) -> Result<ClaimState> {
        if let Some(snapshot) = terminal_snapshot(&session) {
            return Ok(snapshot);
        }
        let Some(_guard) = self.state.in_flight.try_begin(&session.id) else {
            tracing::debug!(session = %session.id, "claim already in flight");
            return Ok(ClaimState::new(session.stage));
        };
        self.advance(session, ClaimEvent::ReferenceReturned).await
    }

    /// Manual retry after a failed verification. Any other stage is a
    /// conflict; in particular a terminal session cannot be re-driven.
    pub async fn retry(&self, session: ClaimSession) -> Result<ClaimState> {
        if session.stage != ClaimStage::VerificationFailed {
            return Err(AppError::Conflict(
                "Only a failed verification can be retried".to_string(),
            ));
        }
        let Some(_guard) = self.state.in_flight.try_begin(&session.id) else {
            return Ok(ClaimState::new(session.stage));
        };
        self.advance(session, ClaimEvent::RetryRequested).await
    }

    async fn advance(&self, mut session: ClaimSession, entry: ClaimEvent) -> Result<ClaimState> {
        if let Some(next) = session.stage.apply(entry) {
            self.transition(&mut session, next, None)?;
        } else if !matches!(session.stage, ClaimStage::Verified | ClaimStage::Claiming) {
            // A plain resume of a failed verification reports the failure;
            // only an explicit retry re-enters the flow.
            return Ok(snapshot(&session));
        }

        if session.stage == ClaimStage::Verifying {
            if let Some(failed) = self.verify_payment(&mut session).await? {
                return Ok(failed);
            }
        }

        if let Some(next) = session.stage.apply(ClaimEvent::ClaimStarted) {
            self.transition(&mut session, next, None)?;
        }
        if session.stage != ClaimStage::Claiming {
            return Ok(snapshot(&session));
        }
        self.claim(&session).await
    }

    /// Verify the charge with the gateway, retrying transient failures.
    /// Returns the failure state to report, or `None` once the session is
    /// verified.
    async fn verify_payment(&self, session: &mut ClaimSession) -> Result<Option<ClaimState>> {
        let reference = session.payment_reference.clone();
        let gateway = &self.gateway;
        let (result, attempts) = self
            .state
            .verify_retry
            .run(|_| gateway.verify(&reference), GatewayError::is_retryable)
            .await;

        {
            let conn = self.state.db.get()?;
            queries::record_verify_attempts(&conn, &session.id, attempts as i64)?;
        }

        let failure = match result {
            Err(e) => {
                tracing::warn!(session = %session.id, attempts, error = %e, "payment verification failed");
                e.to_string()
            }
            Ok(payment) if !payment.verified => {
                tracing::info!(session = %session.id, "charge not successful");
                "Payment was not successful".to_string()
            }
            Ok(payment) if payment.amount_minor != session.amount_minor => {
                tracing::warn!(
                    session = %session.id,
                    expected = session.amount_minor,
                    charged = payment.amount_minor,
                    "charge amount mismatch"
                );
                "Charge amount did not match the plan price".to_string()
            }
            Ok(payment) if !payment.currency.eq_ignore_ascii_case(&session.currency) => {
                tracing::warn!(
                    session = %session.id,
                    expected = %session.currency,
                    charged = %payment.currency,
                    "charge currency mismatch"
                );
                "Charge currency did not match the plan price".to_string()
            }
            Ok(_) => {
                if let Some(next) = session.stage.apply(ClaimEvent::VerifySucceeded) {
                    self.transition(session, next, None)?;
                }
                return Ok(None);
            }
        };

        if let Some(next) = session.stage.apply(ClaimEvent::VerifyFailed) {
            self.transition(session, next, Some(&failure))?;
        }
        Ok(Some(ClaimState::with_error(session.stage, failure)))
    }

    /// The claim step. A paid session whose bucket turns out empty falls
    /// back to the bucket's active voucher; with no fallback either, the
    /// session fails closed with a support message. A store write failure
    /// is never reported as success.
    async fn claim(&self, session: &ClaimSession) -> Result<ClaimState> {
        let mut conn = self.state.db.get()?;
        match queries::claim_and_record(&mut conn, &session.id, &session.request) {
            Ok(voucher) => {
                self.state
                    .count_cache
                    .invalidate(&session.request.bucket_key());
                tracing::info!(session = %session.id, reference = %session.payment_reference, "voucher claimed");
                Ok(ClaimState::with_code(ClaimStage::Claimed, voucher.code))
            }
            Err(VoucherClaimError::Empty) | Err(VoucherClaimError::BucketNotFound) => {
                if let Some(code) = queries::get_active_voucher(&conn, &session.request)? {
                    tracing::warn!(session = %session.id, "bucket empty, serving active voucher");
                    queries::record_claimed_code(&conn, &session.id, &code)?;
                    return Ok(ClaimState::with_code(ClaimStage::Claimed, code));
                }
                let message = self.support_message(
                    &conn,
                    session,
                    "Payment received but no voucher is available for this bundle",
                )?;
                queries::transition_claim_stage(
                    &conn,
                    &session.id,
                    ClaimStage::ClaimFailed,
                    Some(&message),
                )?;
                Ok(ClaimState::with_error(ClaimStage::ClaimFailed, message))
            }
            Err(VoucherClaimError::Store(e)) => {
                tracing::error!(session = %session.id, error = %e, "voucher store write failed");
                let message = self.support_message(
                    &conn,
                    session,
                    "Payment received but the voucher could not be delivered",
                )?;
                // Best effort: the session row may be the thing that failed.
                let _ = queries::transition_claim_stage(
                    &conn,
                    &session.id,
                    ClaimStage::ClaimFailed,
                    Some(&message),
                );
                Ok(ClaimState::with_error(ClaimStage::ClaimFailed, message))
            }
        }
    }

    fn transition(
        &self,
        session: &mut ClaimSession,
        next: ClaimStage,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.state.db.get()?;
        queries::transition_claim_stage(&conn, &session.id, next, error)?;
        session.stage = next;
        session.last_error = error.map(String::from);
        Ok(())
    }

    fn support_message(
        &self,
        conn: &rusqlite::Connection,
        session: &ClaimSession,
        prefix: &str,
    ) -> Result<String> {
        let contact = queries::get_tenant_by_id(conn, &session.tenant_id)?
            .and_then(|t| t.support_contact)
            .unwrap_or_else(|| "support".to_string());
        Ok(format!(
            "{}. Contact {} with payment reference {}",
            prefix, contact, session.payment_reference
        ))
    }
}

/// Load the session for `reference` and resume it with the gateway the
/// purchase was started on.
pub async fn resume_session(
    state: &AppState,
    tenant_id: &str,
    reference: &str,
) -> Result<ClaimState> {
    let session = load_session(state, tenant_id, reference)?;
    match session.provider {
        PaymentProvider::Paystack => {
            let config = paystack_config(state)?;
            ClaimCoordinator::new(state.clone(), PaystackClient::new(&config))
                .resume(session)
                .await
        }
        PaymentProvider::Flutterwave => {
            let config = flutterwave_config(state)?;
            ClaimCoordinator::new(state.clone(), FlutterwaveClient::new(&config))
                .resume(session)
                .await
        }
    }
}

/// Retry a failed verification for `reference`.
pub async fn retry_session(
    state: &AppState,
    tenant_id: &str,
    reference: &str,
) -> Result<ClaimState> {
    let session = load_session(state, tenant_id, reference)?;
    match session.provider {
        PaymentProvider::Paystack => {
            let config = paystack_config(state)?;
            ClaimCoordinator::new(state.clone(), PaystackClient::new(&config))
                .retry(session)
                .await
        }
        PaymentProvider::Flutterwave => {
            let config = flutterwave_config(state)?;
            ClaimCoordinator::new(state.clone(), FlutterwaveClient::new(&config))
                .retry(session)
                .await
        }
    }
}

fn load_session(state: &AppState, tenant_id: &str, reference: &str) -> Result<ClaimSession> {
    let conn = state.db.get()?;
    queries::get_claim_session_by_reference(&conn, tenant_id, reference)?
        .or_not_found("No purchase found for this payment reference")
}

fn paystack_config(state: &AppState) -> Result<crate::payments::PaystackConfig> {
    state
        .paystack
        .clone()
        .ok_or_else(|| AppError::Internal("Paystack is not configured".to_string()))
}

fn flutterwave_config(state: &AppState) -> Result<crate::payments::FlutterwaveConfig> {
    state
        .flutterwave
        .clone()
        .ok_or_else(|| AppError::Internal("Flutterwave is not configured".to_string()))
}
