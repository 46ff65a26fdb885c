use crate::database::error::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Failures surfaced by the payment engine and its HTTP surface.
///
/// `Conflict` and `StaleState` from the store never appear here: the engine
/// absorbs both by returning the concurrent winner's state. What remains is
/// either caller error (400/404), a gateway business rejection (502), a
/// retryable gateway outage (503) or an internal fault (500).
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("reservation {0} is already paid for")]
    AlreadyPaid(Uuid),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("unknown payment reference: {0}")]
    NotFound(String),

    /// The gateway declined the transaction; terminal.
    #[error("payment gateway rejected the transaction: {0}")]
    GatewayRejected(String),

    /// Transient gateway outage or timeout; the transaction is left in its
    /// prior state and the caller may retry without creating a duplicate.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, retryable) = match &self {
            PaymentError::AlreadyPaid(_) | PaymentError::Invalid(_) => {
                (StatusCode::BAD_REQUEST, false)
            }
            PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, false),
            PaymentError::GatewayRejected(_) => (StatusCode::BAD_GATEWAY, false),
            PaymentError::GatewayUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, true),
            PaymentError::Store(_) | PaymentError::Internal(_) => {
                error!("internal failure: {self}");
                (StatusCode::INTERNAL_SERVER_ERROR, false)
            }
        };

        let body = json!({
            "status": "error",
            "error": self.to_string(),
            "retryable": retryable,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        let cases = [
            (PaymentError::AlreadyPaid(Uuid::new_v4()), StatusCode::BAD_REQUEST),
            (
                PaymentError::Invalid("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                PaymentError::NotFound("ghost-123".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                PaymentError::GatewayRejected("declined".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PaymentError::GatewayUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PaymentError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
