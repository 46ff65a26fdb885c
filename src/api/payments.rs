//! Payment HTTP surface: initiation, caller-driven verification and the
//! gateway webhook.

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::transaction::{Customer, TransactionStatus};
use crate::error::PaymentError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub status: String,
    pub message: String,
    pub checkout_url: String,
    pub client_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub client_reference: Option<String>,
    #[serde(default)]
    pub provider_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub status: String,
    pub client_reference: String,
    pub payment_status: TransactionStatus,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Fields we read from a webhook delivery. Only the correlating reference is
/// used; the payload's self-reported status and amount are ignored and the
/// true outcome is re-derived from the gateway.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub tx_ref: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
    Extension(customer): Extension<Customer>,
) -> Result<Json<InitiateResponse>, PaymentError> {
    let summary = state
        .reservations
        .summary(reservation_id)
        .await?
        .ok_or_else(|| PaymentError::Invalid(format!("unknown reservation: {reservation_id}")))?;

    if summary.already_paid {
        return Err(PaymentError::AlreadyPaid(reservation_id));
    }

    let session = state
        .engine
        .request_initiation(reservation_id, customer, summary.total_amount)
        .await?;

    Ok(Json(InitiateResponse {
        status: "success".to_string(),
        message: "Payment initiated successfully.".to_string(),
        checkout_url: session.checkout_url,
        client_reference: session.client_reference,
    }))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, PaymentError> {
    let reference = request
        .client_reference
        .or(request.provider_reference)
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| {
            PaymentError::Invalid(
                "a client_reference or provider_reference is required".to_string(),
            )
        })?;

    let outcome = state.engine.reconcile(&reference).await?;

    Ok(Json(VerifyResponse {
        status: "success".to_string(),
        client_reference: outcome.client_reference,
        payment_status: outcome.status,
        verified_at: outcome.verified_at,
    }))
}

/// Gateway push notifications. Responds 200 for every processable delivery,
/// including unknown references and transient reconcile failures: the
/// gateway retries on non-2xx, and business-terminal outcomes should not be
/// retried forever. Only an undecodable payload earns a 400.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if state.enforce_webhook_signature {
        let signature = headers
            .get("chapa-signature")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !state.engine.webhook_signature_ok(&body, signature) {
            warn!("webhook delivery with missing or invalid signature");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"status": "error", "error": "invalid signature"})),
            );
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("undecodable webhook payload: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "error": "malformed payload"})),
            );
        }
    };

    let Some(reference) = payload
        .tx_ref
        .or(payload.reference)
        .filter(|r| !r.trim().is_empty())
    else {
        warn!("webhook payload without a transaction reference");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "error": "missing transaction reference"})),
        );
    };

    match state.engine.reconcile(&reference).await {
        Ok(outcome) => {
            info!(
                client_reference = %outcome.client_reference,
                status = %outcome.status,
                "webhook reconciled"
            );
        }
        Err(e) => {
            // Logged and acknowledged; the reconciliation sweep will retry
            // anything transient.
            warn!(%reference, "webhook reconcile failed: {e}");
        }
    }

    (StatusCode::OK, Json(json!({"status": "received"})))
}
