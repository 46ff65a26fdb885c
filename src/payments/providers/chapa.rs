//! Chapa payment gateway implementation
//!
//! Integrates with Chapa's hosted checkout API: transactions are initialized
//! with a locally generated `tx_ref`, the payer is redirected to the returned
//! checkout URL, and the final status is re-derived through the verify
//! endpoint.

use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    CheckoutRequest, GatewayError, GatewayPaymentStatus, GatewayVerification, InitializedCheckout,
};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Chapa gateway configuration, passed in at construction. No ambient state.
#[derive(Debug, Clone)]
pub struct ChapaConfig {
    /// Chapa API secret key
    pub secret_key: String,
    /// API base URL (defaults to https://api.chapa.co)
    pub base_url: String,
    /// Currency for all checkouts (Chapa settles in ETB)
    pub currency: String,
    /// Webhook endpoint Chapa calls after the payer completes checkout
    pub callback_url: String,
    /// Page the payer is sent back to afterwards
    pub return_url: String,
    /// Secret used to sign webhook deliveries, when configured
    pub webhook_secret: Option<String>,
    /// Request timeout in seconds; the bound on the single suspension point
    pub timeout_secs: u64,
    /// Retries for transport-level failures and 5xx responses
    pub max_retries: u32,
}

impl Default for ChapaConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.chapa.co".to_string(),
            currency: "ETB".to_string(),
            callback_url: String::new(),
            return_url: String::new(),
            webhook_secret: None,
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

/// Chapa gateway client
pub struct ChapaGateway {
    config: ChapaConfig,
    client: Client,
}

impl ChapaGateway {
    pub fn new(config: ChapaConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self { config, client }
    }

    /// Send a request, retrying transport failures, 429 and 5xx with
    /// exponential backoff. 4xx responses are business rejections and are
    /// returned immediately.
    async fn execute<T>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ChapaEnvelope<T>, GatewayError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, path);

        for attempt in 0..=self.config.max_retries {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bearer {}", self.config.secret_key))
                .header("Content-Type", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < self.config.max_retries {
                        let backoff = Duration::from_millis(250 * 2_u64.pow(attempt));
                        warn!(
                            attempt = attempt + 1,
                            "chapa request failed, retrying after {backoff:?}: {e}"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(GatewayError::Unavailable(e.to_string()));
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.is_success() {
                return serde_json::from_str::<ChapaEnvelope<T>>(&text).map_err(|e| {
                    error!("failed to parse chapa response: {e}");
                    GatewayError::BadResponse(e.to_string())
                });
            }

            if (status.is_server_error() || status.as_u16() == 429)
                && attempt < self.config.max_retries
            {
                let backoff = Duration::from_millis(250 * 2_u64.pow(attempt));
                warn!(
                    attempt = attempt + 1,
                    %status,
                    "chapa server error, retrying after {backoff:?}"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            if status.is_client_error() {
                let message = serde_json::from_str::<ChapaEnvelope<serde_json::Value>>(&text)
                    .ok()
                    .and_then(|envelope| envelope.message)
                    .unwrap_or_else(|| format!("HTTP {status}"));
                error!(%status, "chapa rejected the request: {message}");
                return Err(GatewayError::Rejected(message));
            }

            return Err(GatewayError::Unavailable(format!("HTTP {status}")));
        }

        Err(GatewayError::Unavailable(format!(
            "request failed after {} retries",
            self.config.max_retries
        )))
    }
}

#[async_trait]
impl PaymentGateway for ChapaGateway {
    async fn initialize(
        &self,
        request: CheckoutRequest,
    ) -> Result<InitializedCheckout, GatewayError> {
        info!(
            reference = %request.reference,
            amount = %request.amount,
            "initializing chapa checkout"
        );

        let payload = serde_json::json!({
            "amount": request.amount.to_string(),
            "currency": self.config.currency,
            "email": request.customer.email,
            "first_name": request.customer.first_name,
            "last_name": request.customer.last_name,
            "phone_number": request.customer.phone,
            "tx_ref": request.reference,
            "callback_url": self.config.callback_url,
            "return_url": self.config.return_url,
            "customization": {
                "title": "Staybook Reservation",
                "description": format!("Payment for reservation ({})", request.reference),
            },
        });

        let envelope: ChapaEnvelope<ChapaCheckoutData> = self
            .execute(reqwest::Method::POST, "/v1/transaction/initialize", Some(&payload))
            .await?;

        if envelope.status != "success" {
            let message = envelope
                .message
                .unwrap_or_else(|| "initialization declined".to_string());
            return Err(GatewayError::Rejected(message));
        }

        let data = envelope
            .data
            .ok_or_else(|| GatewayError::BadResponse("missing data in response".to_string()))?;

        info!(reference = %request.reference, "chapa checkout initialized");

        Ok(InitializedCheckout {
            checkout_url: data.checkout_url,
            provider_reference: data.id,
        })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError> {
        info!(%reference, "verifying chapa transaction");

        let envelope: ChapaEnvelope<ChapaVerifyData> = self
            .execute(
                reqwest::Method::GET,
                &format!("/v1/transaction/verify/{reference}"),
                None,
            )
            .await?;

        let data = envelope
            .data
            .ok_or_else(|| GatewayError::BadResponse("missing data in response".to_string()))?;

        let status = map_verify_status(data.status.as_deref().unwrap_or_default());
        info!(%reference, ?status, "chapa verification result");

        Ok(GatewayVerification {
            status,
            amount: data.amount,
            currency: data.currency,
        })
    }

    fn validate_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            return false;
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());
        let provided = signature.trim();

        // Constant-time comparison.
        if computed.len() != provided.len() {
            return false;
        }
        computed
            .as_bytes()
            .iter()
            .zip(provided.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Translate Chapa's verify status string into the gateway taxonomy.
/// Anything unrecognized is treated as still pending: the reconciliation
/// sweep will look again rather than guess at a terminal state.
fn map_verify_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "success" => GatewayPaymentStatus::Success,
        "failed" | "cancelled" => GatewayPaymentStatus::Failed { reason: None },
        "expired" | "timeout" => GatewayPaymentStatus::Expired,
        _ => GatewayPaymentStatus::Pending,
    }
}

// Chapa API response wrapper
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ChapaEnvelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

// Initialize response payload
#[derive(Debug, Deserialize)]
struct ChapaCheckoutData {
    checkout_url: String,
    #[serde(default)]
    id: Option<String>,
}

// Verify response payload
#[derive(Debug, Deserialize)]
struct ChapaVerifyData {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
}
