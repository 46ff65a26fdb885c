use crate::database::error::StoreError;
use crate::database::transaction::{
    NewTransaction, PaymentTransaction, TransactionChange, TransactionStatus, TransactionStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory transaction store.
///
/// Mirrors the Postgres store's compare-and-set and write-once semantics
/// exactly; used by the test suite and for local runs without a database.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<Uuid, PaymentTransaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions; handy for asserting that idempotent
    /// paths did not create duplicates.
    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, tx: NewTransaction) -> Result<PaymentTransaction, StoreError> {
        let mut transactions = self.transactions.write().await;

        let duplicate = transactions.values().any(|existing| {
            (existing.reservation_id == tx.reservation_id && existing.status.is_active())
                || existing.client_reference == tx.client_reference
        });
        if duplicate {
            return Err(StoreError::Conflict {
                reservation_id: tx.reservation_id,
            });
        }

        let now = Utc::now();
        let record = PaymentTransaction {
            id: Uuid::new_v4(),
            reservation_id: tx.reservation_id,
            client_reference: tx.client_reference,
            provider_reference: None,
            checkout_url: None,
            amount: tx.amount,
            currency: tx.currency,
            status: TransactionStatus::Pending,
            customer_email: tx.customer.email,
            customer_first_name: tx.customer.first_name,
            customer_last_name: tx.customer.last_name,
            customer_phone: tx.customer.phone,
            created_at: now,
            updated_at: now,
            verified_at: None,
        };
        transactions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentTransaction>, StoreError> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn find_by_client_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| tx.client_reference == reference)
            .cloned())
    }

    async fn find_by_provider_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| tx.provider_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn find_active_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<PaymentTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| tx.reservation_id == reservation_id && tx.status.is_active())
            .cloned())
    }

    async fn has_successful_payment(&self, reservation_id: Uuid) -> Result<bool, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().any(|tx| {
            tx.reservation_id == reservation_id && tx.status == TransactionStatus::Success
        }))
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        change: TransactionChange,
    ) -> Result<PaymentTransaction, StoreError> {
        let mut transactions = self.transactions.write().await;
        let record = transactions.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            reference: id.to_string(),
        })?;

        if record.status != expected {
            return Err(StoreError::StaleState {
                id,
                expected,
                actual: record.status,
            });
        }

        record.status = change.status;
        // Write-once fields keep their first value.
        if record.provider_reference.is_none() {
            record.provider_reference = change.provider_reference;
        }
        if record.checkout_url.is_none() {
            record.checkout_url = change.checkout_url;
        }
        if change.set_verified_at && record.verified_at.is_none() {
            record.verified_at = Some(Utc::now());
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn find_stale_initiated(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        let mut stale: Vec<PaymentTransaction> = transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Initiated && tx.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|tx| tx.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
