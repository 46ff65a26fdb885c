//! Payment gateway trait definition
//!
//! The single seam between the transaction state machine and the remote
//! payment provider.

use crate::payments::types::{
    CheckoutRequest, GatewayError, GatewayVerification, InitializedCheckout,
};
use async_trait::async_trait;

/// Outbound contract with the payment gateway.
///
/// Both calls run under a bounded timeout. A timeout or transport failure
/// surfaces as `GatewayError::Unavailable` and must be treated as
/// indeterminate by the caller, never as a failed payment.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initialize a hosted checkout for the given request, returning the
    /// redirect URL and the gateway's own reference.
    async fn initialize(
        &self,
        request: CheckoutRequest,
    ) -> Result<InitializedCheckout, GatewayError>;

    /// Re-derive the true payment status from the gateway. This is the only
    /// source of truth for reconciliation; webhook payloads are never
    /// trusted directly.
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError>;

    /// Check an inbound webhook's signature against the shared secret.
    fn validate_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;
}
