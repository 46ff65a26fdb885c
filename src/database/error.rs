use crate::database::transaction::TransactionStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the transaction store.
///
/// `Conflict` and `StaleState` carry the concurrency semantics the payment
/// engine relies on; everything else is infrastructure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An active (pending/initiated) transaction already exists for the
    /// reservation.
    #[error("an active payment transaction already exists for reservation {reservation_id}")]
    Conflict { reservation_id: Uuid },

    /// A compare-and-set transition found the record in a different status
    /// than expected; a concurrent update won the race.
    #[error("transaction {id} is no longer '{expected}' (currently '{actual}')")]
    StaleState {
        id: Uuid,
        expected: TransactionStatus,
        actual: TransactionStatus,
    },

    #[error("payment transaction not found: {reference}")]
    NotFound { reference: String },

    /// Pool exhaustion, connection loss; retryable.
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("database query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Map a sqlx error to the store taxonomy. Constraint violations are
    /// handled at the call sites that know which constraint is in play.
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable("connection pool unavailable".to_string())
            }
            sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}
