use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use super::{Checkout, GatewayError, InitializePayment, PaymentGateway, PaymentResult};

// Paystack signs webhooks with HMAC-SHA512 of the raw body.
type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    /// Overridable for tests; defaults to https://api.paystack.co
    pub base_url: String,
}

/// Paystack envelope: `status` is a boolean, amounts are already in kobo.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackCheckoutData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct PaystackTransactionData {
    status: String,
    reference: String,
    amount: i64,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaystackClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl PaystackClient {
    pub fn new(config: &PaystackConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check the `x-paystack-signature` header against the raw body.
    /// Constant-time comparison; signature length is not secret.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        let mut mac = match HmacSha512::new_from_slice(self.secret_key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return false;
        }
        expected_bytes.ct_eq(provided_bytes).into()
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<(PaystackEnvelope<T>, serde_json::Value), GatewayError> {
        let status = response.status();
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if status.is_server_error() {
            return Err(GatewayError::Unreachable(format!(
                "Paystack returned {}",
                status
            )));
        }
        if status.is_client_error() {
            let message = raw["message"].as_str().unwrap_or("request rejected");
            return Err(GatewayError::Rejected(message.to_string()));
        }

        let envelope: PaystackEnvelope<T> = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        Ok((envelope, raw))
    }
}

impl PaymentGateway for PaystackClient {
    async fn initialize(&self, init: &InitializePayment) -> Result<Checkout, GatewayError> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&serde_json::json!({
                "email": init.email,
                "amount": init.amount_minor,
                "currency": init.currency,
                "reference": init.reference,
                "callback_url": init.callback_url,
                "metadata": init.metadata,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let (envelope, _raw) = Self::read_envelope::<PaystackCheckoutData>(response).await?;

        if !envelope.status {
            return Err(GatewayError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "checkout initialization failed".to_string()),
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Malformed("missing data in checkout response".into()))?;

        Ok(Checkout {
            authorization_url: data.authorization_url,
            reference: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentResult, GatewayError> {
        let response = self
            .client
            .get(format!(
                "{}/transaction/verify/{}",
                self.base_url, reference
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let (envelope, raw) = Self::read_envelope::<PaystackTransactionData>(response).await?;

        if !envelope.status {
            // Paystack answers status=false for references it has never seen.
            return Err(GatewayError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "transaction not found".to_string()),
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Malformed("missing data in verify response".into()))?;

        Ok(PaymentResult {
            verified: data.status == "success",
            amount_minor: data.amount,
            currency: data.currency.unwrap_or_else(|| "NGN".to_string()),
            provider_reference: data.reference,
            raw,
        })
    }
}
