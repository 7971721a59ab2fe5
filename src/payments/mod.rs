mod flutterwave;
mod paystack;

pub use flutterwave::*;
pub use paystack::*;

use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Hosted payment gateways the portal can charge through. Which one is
/// used is configuration, resolved once per purchase at /buy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Paystack,
    Flutterwave,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Paystack => "paystack",
            PaymentProvider::Flutterwave => "flutterwave",
        }
    }
}

impl FromStr for PaymentProvider {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paystack" => Ok(PaymentProvider::Paystack),
            "flutterwave" | "flw" => Ok(PaymentProvider::Flutterwave),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of a verify call, identical in shape for every
/// provider. `verified == false` means the charge exists but is pending or
/// failed; an unknown reference is a `GatewayError::Rejected` instead.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    pub verified: bool,
    /// Charge amount in minor units (kobo, cents)
    pub amount_minor: i64,
    pub currency: String,
    /// The provider's reference for the charge
    pub provider_reference: String,
    /// Raw provider payload, kept for support and debugging
    pub raw: serde_json::Value,
}

/// Parameters for initiating a checkout with a gateway.
#[derive(Debug, Clone)]
pub struct InitializePayment {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub callback_url: String,
    pub metadata: serde_json::Value,
}

/// A started checkout: where to send the buyer, and the reference that
/// will come back on the redirect.
#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network-level failure. Retryable with backoff.
    #[error("payment gateway unreachable: {0}")]
    Unreachable(String),

    /// The provider does not recognize the reference. Not retryable.
    #[error("reference rejected by provider: {0}")]
    Rejected(String),

    /// The provider answered with a shape we cannot interpret.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unreachable(_))
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unreachable(msg) => {
                AppError::Internal(format!("Payment gateway unreachable: {}", msg))
            }
            GatewayError::Rejected(msg) => {
                AppError::BadRequest(format!("Payment provider rejected the request: {}", msg))
            }
            GatewayError::Malformed(msg) => {
                AppError::Internal(format!("Unexpected payment provider response: {}", msg))
            }
        }
    }
}

/// A hosted payment gateway: starts a checkout, and later confirms whether
/// a reference corresponds to a successful charge. Verification is
/// idempotent and has no side effects on the voucher store.
pub trait PaymentGateway: Send + Sync {
    fn initialize(
        &self,
        init: &InitializePayment,
    ) -> impl Future<Output = std::result::Result<Checkout, GatewayError>> + Send;

    fn verify(
        &self,
        reference: &str,
    ) -> impl Future<Output = std::result::Result<PaymentResult, GatewayError>> + Send;
}

/// Generate a fresh payment reference for a checkout attempt. References
/// are unique per attempt and never reused across voucher requests.
pub fn generate_payment_reference(provider: PaymentProvider) -> String {
    use rand::Rng;

    let prefix = match provider {
        PaymentProvider::Paystack => "PS",
        PaymentProvider::Flutterwave => "FLW",
    };
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!(
        "{}-{}-{:06}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        nonce
    )
}
