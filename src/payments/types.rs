//! Gateway request/response types shared by every provider implementation.

use crate::database::transaction::Customer;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Checkout initialization request handed to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Amount in major units, fixed-point.
    pub amount: Decimal,
    /// Locally generated correlation reference (`tx_ref` on the wire).
    pub reference: String,
    /// Customer snapshot taken at initiation time.
    pub customer: Customer,
}

/// Result of a successful gateway initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializedCheckout {
    /// Redirect target for the payer.
    pub checkout_url: String,
    /// Gateway-assigned transaction identifier, when the gateway reports one
    /// at initialization time.
    pub provider_reference: Option<String>,
}

/// Outcome of a verify call, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentStatus {
    Success,
    Failed { reason: Option<String> },
    Expired,
    /// The gateway has not resolved the payment yet.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayVerification {
    pub status: GatewayPaymentStatus,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

/// Errors from outbound gateway calls.
///
/// `Unavailable` is the indeterminate case: the charge may have gone through
/// upstream even though the response was lost, so callers must re-verify
/// later instead of treating the transaction as failed.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure, timeout or 5xx; retryable.
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),

    /// 4xx-class business rejection; not retryable.
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),

    /// The gateway answered with a body we could not interpret.
    #[error("unexpected gateway response: {0}")]
    BadResponse(String),
}
