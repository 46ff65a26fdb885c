use crate::database::error::StoreError;
use crate::database::transaction::TransactionStore;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What the payment core needs to know about a reservation before initiating
/// a charge.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationSummary {
    pub total_amount: Decimal,
    pub already_paid: bool,
}

/// Read-only surface of the reservation service. The payment core never
/// mutates reservations and never derives pricing itself.
#[async_trait]
pub trait ReservationDirectory: Send + Sync {
    /// `None` when the reservation does not exist.
    async fn summary(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationSummary>, StoreError>;
}

/// Postgres-backed directory; `already_paid` is derived from successful
/// payment rows rather than trusted from reservation state.
pub struct PgReservationDirectory {
    pool: PgPool,
}

impl PgReservationDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationDirectory for PgReservationDirectory {
    async fn summary(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationSummary>, StoreError> {
        let row = sqlx::query_as::<_, (Decimal, bool)>(
            "SELECT r.total_amount, \
                    EXISTS(SELECT 1 FROM payment_transactions p \
                           WHERE p.reservation_id = r.id AND p.status = 'success') \
             FROM reservations r WHERE r.id = $1",
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(|(total_amount, already_paid)| ReservationSummary {
            total_amount,
            already_paid,
        }))
    }
}

/// In-memory directory for tests and local runs; paid state is answered by
/// the transaction store so the two views cannot drift.
#[derive(Clone)]
pub struct InMemoryReservationDirectory {
    reservations: Arc<RwLock<HashMap<Uuid, Decimal>>>,
    store: Arc<dyn TransactionStore>,
}

impl InMemoryReservationDirectory {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            reservations: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    pub async fn insert(&self, reservation_id: Uuid, total_amount: Decimal) {
        self.reservations
            .write()
            .await
            .insert(reservation_id, total_amount);
    }
}

#[async_trait]
impl ReservationDirectory for InMemoryReservationDirectory {
    async fn summary(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationSummary>, StoreError> {
        let total_amount = match self.reservations.read().await.get(&reservation_id) {
            Some(amount) => *amount,
            None => return Ok(None),
        };
        let already_paid = self.store.has_successful_payment(reservation_id).await?;
        Ok(Some(ReservationSummary {
            total_amount,
            already_paid,
        }))
    }
}
