//! Payment transaction state machine
//!
//! Owns every legal status transition and the idempotency rules around them.
//! All writes go through the store's compare-and-set, so concurrent
//! initiations and reconciliations race safely: the first matching update
//! wins and losers observe the winner's state instead of erroring.

use crate::database::error::StoreError;
use crate::database::transaction::{
    Customer, NewTransaction, PaymentTransaction, TransactionChange, TransactionStatus,
    TransactionStore,
};
use crate::error::PaymentError;
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{CheckoutRequest, GatewayError, GatewayPaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Checkout state returned to the initiating caller.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub transaction_id: Uuid,
    pub client_reference: String,
    pub checkout_url: String,
    pub status: TransactionStatus,
}

/// Result of a reconciliation pass. `status` may still be non-terminal when
/// the gateway has not resolved the payment (indeterminate).
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub client_reference: String,
    pub status: TransactionStatus,
    pub verified_at: Option<DateTime<Utc>>,
}

impl ReconcileOutcome {
    fn from_transaction(tx: &PaymentTransaction) -> Self {
        Self {
            client_reference: tx.client_reference.clone(),
            status: tx.status,
            verified_at: tx.verified_at,
        }
    }
}

pub struct PaymentEngine {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl PaymentEngine {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            currency: currency.into(),
        }
    }

    fn new_client_reference() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("staybook-{}", &id[..12])
    }

    /// Initiate payment for a reservation, idempotently.
    ///
    /// An existing `initiated` transaction short-circuits to its stored
    /// checkout URL without touching the gateway. An existing `pending`
    /// record (a previous attempt that never heard back) is re-driven
    /// through the gateway in place, so retries never create duplicates.
    pub async fn request_initiation(
        &self,
        reservation_id: Uuid,
        customer: Customer,
        amount: Decimal,
    ) -> Result<CheckoutSession, PaymentError> {
        // Two passes cover the create/find race: a concurrent initiation
        // that wins the insert is picked up by the second lookup.
        for _ in 0..2 {
            if let Some(existing) = self.store.find_active_by_reservation(reservation_id).await? {
                info!(
                    reservation_id = %reservation_id,
                    client_reference = %existing.client_reference,
                    status = %existing.status,
                    "reusing active payment transaction"
                );
                return self.resume(existing).await;
            }

            let new_tx = NewTransaction {
                reservation_id,
                client_reference: Self::new_client_reference(),
                amount,
                currency: self.currency.clone(),
                customer: customer.clone(),
            };
            match self.store.create(new_tx).await {
                Ok(tx) => {
                    info!(
                        reservation_id = %reservation_id,
                        client_reference = %tx.client_reference,
                        "created pending payment transaction"
                    );
                    return self.drive_initiation(tx).await;
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(
                        reservation_id = %reservation_id,
                        "lost initiation race, deferring to concurrent winner"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PaymentError::Internal(format!(
            "initiation for reservation {reservation_id} kept conflicting"
        )))
    }

    async fn resume(&self, tx: PaymentTransaction) -> Result<CheckoutSession, PaymentError> {
        match tx.status {
            TransactionStatus::Initiated => Self::session_from(&tx),
            TransactionStatus::Pending => self.drive_initiation(tx).await,
            other => Err(PaymentError::Internal(format!(
                "transaction {} unexpectedly active in state '{other}'",
                tx.id
            ))),
        }
    }

    fn session_from(tx: &PaymentTransaction) -> Result<CheckoutSession, PaymentError> {
        let checkout_url = tx.checkout_url.clone().ok_or_else(|| {
            PaymentError::Internal(format!("transaction {} has no checkout URL", tx.id))
        })?;
        Ok(CheckoutSession {
            transaction_id: tx.id,
            client_reference: tx.client_reference.clone(),
            checkout_url,
            status: tx.status,
        })
    }

    /// Drive a `pending` transaction through gateway initialization.
    async fn drive_initiation(
        &self,
        tx: PaymentTransaction,
    ) -> Result<CheckoutSession, PaymentError> {
        let request = CheckoutRequest {
            amount: tx.amount,
            reference: tx.client_reference.clone(),
            customer: tx.customer(),
        };

        match self.gateway.initialize(request).await {
            Ok(init) => {
                let mut change = TransactionChange::to(TransactionStatus::Initiated)
                    .with_checkout_url(init.checkout_url);
                if let Some(provider_reference) = init.provider_reference {
                    change = change.with_provider_reference(provider_reference);
                }

                match self.store.transition(tx.id, TransactionStatus::Pending, change).await {
                    Ok(updated) => {
                        info!(
                            client_reference = %updated.client_reference,
                            provider_reference = ?updated.provider_reference,
                            "payment transaction initiated"
                        );
                        Self::session_from(&updated)
                    }
                    Err(StoreError::StaleState { .. }) => {
                        // A concurrent initiation or reconciliation got there
                        // first; its result is authoritative.
                        let current = self
                            .store
                            .find_by_id(tx.id)
                            .await?
                            .ok_or_else(|| PaymentError::NotFound(tx.id.to_string()))?;
                        match current.status {
                            TransactionStatus::Initiated | TransactionStatus::Success => {
                                Self::session_from(&current)
                            }
                            other => Err(PaymentError::GatewayRejected(format!(
                                "payment was concurrently resolved as '{other}'"
                            ))),
                        }
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(GatewayError::Rejected(message)) => {
                match self
                    .store
                    .transition(
                        tx.id,
                        TransactionStatus::Pending,
                        TransactionChange::to(TransactionStatus::Failed),
                    )
                    .await
                {
                    Ok(_) | Err(StoreError::StaleState { .. }) => {}
                    Err(e) => warn!("failed to record gateway rejection: {e}"),
                }
                Err(PaymentError::GatewayRejected(message))
            }
            Err(GatewayError::Unavailable(message)) | Err(GatewayError::BadResponse(message)) => {
                // Indeterminate: the record stays pending and a later attempt
                // reuses it instead of creating a duplicate charge.
                warn!(
                    client_reference = %tx.client_reference,
                    "gateway unavailable during initiation, leaving transaction pending: {message}"
                );
                Err(PaymentError::GatewayUnavailable(message))
            }
        }
    }

    /// Reconcile a transaction against the gateway's view.
    ///
    /// The reference may be either the client reference or the provider
    /// reference. The caller's claimed status is never consulted; the true
    /// status is re-derived through `verify`. Duplicate deliveries are
    /// no-ops.
    pub async fn reconcile(&self, reference: &str) -> Result<ReconcileOutcome, PaymentError> {
        let tx = match self.store.find_by_client_reference(reference).await? {
            Some(tx) => tx,
            None => self
                .store
                .find_by_provider_reference(reference)
                .await?
                .ok_or_else(|| PaymentError::NotFound(reference.to_string()))?,
        };

        if tx.status.is_terminal() {
            info!(
                client_reference = %tx.client_reference,
                status = %tx.status,
                "reconcile on terminal transaction is a no-op"
            );
            return Ok(ReconcileOutcome::from_transaction(&tx));
        }

        if tx.status == TransactionStatus::Pending {
            // Initialization never completed; nothing to verify yet. The
            // caller retries initiation rather than reconciliation.
            info!(
                client_reference = %tx.client_reference,
                "reconcile on pending transaction, awaiting initiation"
            );
            return Ok(ReconcileOutcome::from_transaction(&tx));
        }

        let verification = self
            .gateway
            .verify(&tx.client_reference)
            .await
            .map_err(|e| PaymentError::GatewayUnavailable(e.to_string()))?;

        if let Some(amount) = verification.amount {
            if amount != tx.amount {
                warn!(
                    client_reference = %tx.client_reference,
                    recorded = %tx.amount,
                    reported = %amount,
                    "gateway reported a different amount than recorded"
                );
            }
        }

        let target = match verification.status {
            GatewayPaymentStatus::Success => TransactionStatus::Success,
            GatewayPaymentStatus::Failed { .. } => TransactionStatus::Failed,
            GatewayPaymentStatus::Expired => TransactionStatus::Expired,
            GatewayPaymentStatus::Pending => {
                info!(
                    client_reference = %tx.client_reference,
                    "gateway has not resolved the payment, staying initiated"
                );
                return Ok(ReconcileOutcome::from_transaction(&tx));
            }
        };

        let change = TransactionChange::to(target).verified();
        match self
            .store
            .transition(tx.id, TransactionStatus::Initiated, change)
            .await
        {
            Ok(updated) => {
                info!(
                    client_reference = %updated.client_reference,
                    status = %updated.status,
                    "payment transaction reconciled"
                );
                Ok(ReconcileOutcome::from_transaction(&updated))
            }
            Err(StoreError::StaleState { .. }) => {
                // A concurrent reconciliation won; report its result.
                let current = self
                    .store
                    .find_by_id(tx.id)
                    .await?
                    .ok_or_else(|| PaymentError::NotFound(reference.to_string()))?;
                Ok(ReconcileOutcome::from_transaction(&current))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check an inbound webhook signature against the gateway's secret.
    pub fn webhook_signature_ok(&self, payload: &[u8], signature: &str) -> bool {
        self.gateway.validate_webhook_signature(payload, signature)
    }
}
