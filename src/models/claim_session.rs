use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::VoucherRequest;
use crate::payments::PaymentProvider;

/// Stage of a claim session's payment-to-voucher handoff.
///
/// `Initiated -> Verifying -> Verified -> Claiming -> Claimed` is the happy
/// path; `VerificationFailed` and `ClaimFailed` are the failure exits.
/// `Idle` is reported (never driven through the flow) when a resumed
/// session can be served a previously claimed code without any new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStage {
    Initiated,
    Verifying,
    Verified,
    Claiming,
    Claimed,
    VerificationFailed,
    ClaimFailed,
    Idle,
}

/// Events that drive stage transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimEvent {
    /// A payment reference became available (redirect return)
    ReferenceReturned,
    VerifySucceeded,
    VerifyFailed,
    /// Manual retry requested from a failed verification
    RetryRequested,
    ClaimStarted,
    ClaimSucceeded,
    ClaimFailed,
}

impl ClaimStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStage::Initiated => "initiated",
            ClaimStage::Verifying => "verifying",
            ClaimStage::Verified => "verified",
            ClaimStage::Claiming => "claiming",
            ClaimStage::Claimed => "claimed",
            ClaimStage::VerificationFailed => "verification_failed",
            ClaimStage::ClaimFailed => "claim_failed",
            ClaimStage::Idle => "idle",
        }
    }

    /// `Claimed` and `ClaimFailed` end the flow for good. A failed
    /// verification is terminal for the attempt but re-enterable via
    /// `RetryRequested`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStage::Claimed | ClaimStage::ClaimFailed)
    }

    /// Pure transition function. Returns the next stage, or `None` when the
    /// event is not valid in this stage. The coordinator refuses to persist
    /// any transition this function rejects, which is what keeps a claim
    /// from ever starting before verification succeeded.
    pub fn apply(&self, event: ClaimEvent) -> Option<ClaimStage> {
        use ClaimEvent::*;
        use ClaimStage::*;
        match (self, event) {
            (Initiated, ReferenceReturned) => Some(Verifying),
            // A re-entered resume may observe Verifying after a crash;
            // re-running verification is idempotent.
            (Verifying, ReferenceReturned) => Some(Verifying),
            (Verifying, VerifySucceeded) => Some(Verified),
            (Verifying, VerifyFailed) => Some(VerificationFailed),
            (VerificationFailed, RetryRequested) => Some(Verifying),
            (Verified, ClaimStarted) => Some(Claiming),
            // A crash between Claiming and the claim commit leaves the
            // stage at Claiming with no code; the claim may be re-attempted.
            (Claiming, ClaimStarted) => Some(Claiming),
            (Claiming, ClaimSucceeded) => Some(Claimed),
            (Claiming, ClaimEvent::ClaimFailed) => Some(ClaimStage::ClaimFailed),
            _ => None,
        }
    }
}

impl FromStr for ClaimStage {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(ClaimStage::Initiated),
            "verifying" => Ok(ClaimStage::Verifying),
            "verified" => Ok(ClaimStage::Verified),
            "claiming" => Ok(ClaimStage::Claiming),
            "claimed" => Ok(ClaimStage::Claimed),
            "verification_failed" => Ok(ClaimStage::VerificationFailed),
            "claim_failed" => Ok(ClaimStage::ClaimFailed),
            "idle" => Ok(ClaimStage::Idle),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ClaimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one in-flight purchase. Created at /buy time, mutated
/// only by the claim coordinator as it advances through stages, and kept
/// around after a terminal stage so reloads can re-fetch the outcome.
///
/// At most one session exists per (tenant, payment reference); the
/// database enforces this with a UNIQUE constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSession {
    pub id: String,
    pub tenant_id: String,
    pub payment_reference: String,
    pub provider: PaymentProvider,
    #[serde(flatten)]
    pub request: VoucherRequest,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub stage: ClaimStage,
    pub claimed_voucher_code: Option<String>,
    pub last_error: Option<String>,
    pub verify_attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug)]
pub struct CreateClaimSession {
    pub tenant_id: String,
    pub payment_reference: String,
    pub provider: PaymentProvider,
    pub request: VoucherRequest,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
}

/// What the UI observes: stage plus, when available, a voucher code or an
/// error message. Errors never propagate past the coordinator as HTTP
/// failures; they surface here as `{stage, error}`.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimState {
    pub stage: ClaimStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClaimState {
    pub fn new(stage: ClaimStage) -> Self {
        Self {
            stage,
            voucher_code: None,
            error: None,
        }
    }

    pub fn with_code(stage: ClaimStage, code: impl Into<String>) -> Self {
        Self {
            stage,
            voucher_code: Some(code.into()),
            error: None,
        }
    }

    pub fn with_error(stage: ClaimStage, error: impl Into<String>) -> Self {
        Self {
            stage,
            voucher_code: None,
            error: Some(error.into()),
        }
    }
}
