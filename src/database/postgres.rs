use crate::database::error::StoreError;
use crate::database::transaction::{
    NewTransaction, PaymentTransaction, TransactionChange, TransactionStatus, TransactionStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

const COLUMNS: &str = "id, reservation_id, client_reference, provider_reference, checkout_url, \
     amount, currency, status, customer_email, customer_first_name, customer_last_name, \
     customer_phone, created_at, updated_at, verified_at";

/// Postgres-backed transaction store.
///
/// The one-active-transaction-per-reservation invariant is enforced by a
/// partial unique index, so concurrent creates resolve inside the database
/// rather than in application code.
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn is_unique_violation(error: &sqlx::Error) -> bool {
        matches!(
            error,
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
        )
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create(&self, tx: NewTransaction) -> Result<PaymentTransaction, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "INSERT INTO payment_transactions \
             (id, reservation_id, client_reference, amount, currency, status, \
              customer_email, customer_first_name, customer_last_name, customer_phone, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()) \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(tx.reservation_id)
        .bind(&tx.client_reference)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(TransactionStatus::Pending)
        .bind(&tx.customer.email)
        .bind(&tx.customer.first_name)
        .bind(&tx.customer.last_name)
        .bind(&tx.customer.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                StoreError::Conflict {
                    reservation_id: tx.reservation_id,
                }
            } else {
                StoreError::from_sqlx(e)
            }
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>, StoreError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn find_by_client_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE client_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn find_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions \
             WHERE provider_reference = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn find_active_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<PaymentTransaction>, StoreError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions \
             WHERE reservation_id = $1 AND status IN ('pending', 'initiated')"
        ))
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn has_successful_payment(&self, reservation_id: Uuid) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM payment_transactions \
             WHERE reservation_id = $1 AND status = 'success')",
        )
        .bind(reservation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        change: TransactionChange,
    ) -> Result<PaymentTransaction, StoreError> {
        // COALESCE keeps provider_reference, checkout_url and verified_at
        // write-once: an existing value always wins over a later one.
        let updated = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "UPDATE payment_transactions \
             SET status = $1, \
                 provider_reference = COALESCE(provider_reference, $2), \
                 checkout_url = COALESCE(checkout_url, $3), \
                 verified_at = COALESCE(verified_at, $4), \
                 updated_at = NOW() \
             WHERE id = $5 AND status = $6 \
             RETURNING {COLUMNS}"
        ))
        .bind(change.status)
        .bind(&change.provider_reference)
        .bind(&change.checkout_url)
        .bind(change.set_verified_at.then(Utc::now))
        .bind(id)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        match updated {
            Some(tx) => Ok(tx),
            None => match self.find_by_id(id).await? {
                Some(current) => {
                    warn!(
                        transaction_id = %id,
                        expected = %expected,
                        actual = %current.status,
                        "compare-and-set lost the race"
                    );
                    Err(StoreError::StaleState {
                        id,
                        expected,
                        actual: current.status,
                    })
                }
                None => Err(StoreError::NotFound {
                    reference: id.to_string(),
                }),
            },
        }
    }

    async fn find_stale_initiated(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions \
             WHERE status = 'initiated' AND updated_at < $1 \
             ORDER BY updated_at ASC LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(StoreError::from_sqlx)
    }
}
