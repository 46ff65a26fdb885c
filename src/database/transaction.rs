use crate::database::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a payment transaction.
///
/// Transitions only move forward: `pending -> initiated -> success | failed |
/// expired`, with `pending -> failed` when the gateway rejects initiation.
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Initiated,
    Success,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Initiated => "initiated",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success | TransactionStatus::Failed | TransactionStatus::Expired
        )
    }

    /// Active states count against the one-per-reservation limit.
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Initiated)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer snapshot captured at initiation time and sent to the gateway.
/// Never re-derived from the requesting account afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// Payment transaction entity
#[derive(Debug, Clone, FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub client_reference: String,
    pub provider_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub customer_email: String,
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub customer_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    pub fn customer(&self) -> Customer {
        Customer {
            email: self.customer_email.clone(),
            first_name: self.customer_first_name.clone(),
            last_name: self.customer_last_name.clone(),
            phone: self.customer_phone.clone(),
        }
    }
}

/// Fields for a fresh `pending` transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reservation_id: Uuid,
    pub client_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer: Customer,
}

/// Mutation applied through the compare-and-set `transition` operation.
///
/// `provider_reference` and `checkout_url` are write-once: a value already
/// present on the record is never overwritten by a later transition.
#[derive(Debug, Clone)]
pub struct TransactionChange {
    pub status: TransactionStatus,
    pub provider_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub set_verified_at: bool,
}

impl TransactionChange {
    pub fn to(status: TransactionStatus) -> Self {
        Self {
            status,
            provider_reference: None,
            checkout_url: None,
            set_verified_at: false,
        }
    }

    pub fn with_provider_reference(mut self, reference: impl Into<String>) -> Self {
        self.provider_reference = Some(reference.into());
        self
    }

    pub fn with_checkout_url(mut self, url: impl Into<String>) -> Self {
        self.checkout_url = Some(url.into());
        self
    }

    /// Stamp `verified_at` on this transition (verification outcomes only).
    pub fn verified(mut self) -> Self {
        self.set_verified_at = true;
        self
    }
}

/// Durable record of every payment attempt.
///
/// The compare-and-set `transition` is the sole mutual-exclusion mechanism
/// for a record: concurrent reconciliations race safely because only the
/// first matching update wins and the loser observes `StaleState`.
/// Rows are never deleted; resolved transactions remain as an audit trail.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a new `pending` transaction. Fails with `StoreError::Conflict`
    /// when the reservation already has a pending or initiated transaction.
    async fn create(&self, tx: NewTransaction) -> Result<PaymentTransaction, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>, StoreError>;

    async fn find_by_client_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError>;

    async fn find_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError>;

    /// The at-most-one pending/initiated transaction for a reservation.
    async fn find_active_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<PaymentTransaction>, StoreError>;

    async fn has_successful_payment(&self, reservation_id: Uuid) -> Result<bool, StoreError>;

    /// Compare-and-set status transition. Fails with `StoreError::StaleState`
    /// when the record's current status no longer matches `expected`.
    async fn transition(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        change: TransactionChange,
    ) -> Result<PaymentTransaction, StoreError>;

    /// Initiated transactions whose last update predates `cutoff`; feed for
    /// the periodic reconciliation sweep.
    async fn find_stale_initiated(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>, StoreError>;

    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
