use reqwest::Client;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::{Checkout, GatewayError, InitializePayment, PaymentGateway, PaymentResult};

#[derive(Debug, Clone)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    /// The configured `verif-hash` value webhooks must carry
    pub webhook_hash: Option<String>,
    /// Overridable for tests; defaults to https://api.flutterwave.com
    pub base_url: String,
}

/// Flutterwave envelope: `status` is a string ("success"/"error"), amounts
/// are decimal major units, and the charge status word is "successful".
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct FlutterwaveEnvelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveCheckoutData {
    link: String,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveTransactionData {
    status: String,
    tx_ref: String,
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FlutterwaveClient {
    client: Client,
    secret_key: String,
    webhook_hash: Option<String>,
    base_url: String,
}

impl FlutterwaveClient {
    pub fn new(config: &FlutterwaveConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_hash: config.webhook_hash.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check the `verif-hash` header against the configured hash.
    /// Constant-time comparison. Returns false when no hash is configured.
    pub fn verify_webhook_hash(&self, provided: &str) -> bool {
        let Some(ref expected) = self.webhook_hash else {
            return false;
        };
        let expected_bytes = expected.as_bytes();
        let provided_bytes = provided.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return false;
        }
        expected_bytes.ct_eq(provided_bytes).into()
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<(FlutterwaveEnvelope<T>, serde_json::Value), GatewayError> {
        let status = response.status();
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if status.is_server_error() {
            return Err(GatewayError::Unreachable(format!(
                "Flutterwave returned {}",
                status
            )));
        }
        if status.is_client_error() {
            let message = raw["message"].as_str().unwrap_or("request rejected");
            return Err(GatewayError::Rejected(message.to_string()));
        }

        let envelope: FlutterwaveEnvelope<T> = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        Ok((envelope, raw))
    }
}

impl PaymentGateway for FlutterwaveClient {
    async fn initialize(&self, init: &InitializePayment) -> Result<Checkout, GatewayError> {
        // Flutterwave takes decimal major units.
        let amount = init.amount_minor as f64 / 100.0;

        let response = self
            .client
            .post(format!("{}/v3/payments", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&serde_json::json!({
                "tx_ref": init.reference,
                "amount": amount,
                "currency": init.currency,
                "redirect_url": init.callback_url,
                "customer": { "email": init.email },
                "meta": init.metadata,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let (envelope, _raw) = Self::read_envelope::<FlutterwaveCheckoutData>(response).await?;

        if envelope.status != "success" {
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
            authorization_url: data.link,
            reference: init.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentResult, GatewayError> {
        let response = self
            .client
            .get(format!(
                "{}/v3/transactions/verify_by_reference",
                self.base_url
            ))
            .query(&[("tx_ref", reference)])
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let (envelope, raw) = Self::read_envelope::<FlutterwaveTransactionData>(response).await?;

        if envelope.status != "success" {
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
            verified: data.status == "successful",
            amount_minor: (data.amount * 100.0).round() as i64,
            currency: data.currency.unwrap_or_else(|| "NGN".to_string()),
            provider_reference: data.tx_ref,
            raw,
        })
    }
}
