//! In-memory payment repository.
//!
//! Used by tests and local runs without a database. Writes follow the same
//! compare-and-swap contract as the Postgres adapter, checked under the
//! write lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, MemberId, PaymentId, Timestamp};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::ports::{PaymentRepository, WriteOutcome};

#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payments.
    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payments.read().await.is_empty()
    }

    /// Stores a payment as-is, bypassing uniqueness checks.
    pub async fn insert(&self, payment: Payment) {
        self.payments.write().await.insert(payment.id, payment);
    }
}

fn newest_first(mut payments: Vec<Payment>) -> Vec<Payment> {
    payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    payments
}

fn oldest_first(mut payments: Vec<Payment>, limit: usize) -> Vec<Payment> {
    payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    payments.truncate(limit);
    payments
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("Payment {} already exists", payment.id),
            ));
        }
        if payments.values().any(|p| p.invoice_id == payment.invoice_id) {
            return Err(DomainError::validation(
                "invoice_id",
                format!("Invoice {} already has a payment", payment.invoice_id),
            ));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.invoice_id == invoice_id)
            .cloned())
    }

    async fn update(&self, payment: &Payment) -> Result<WriteOutcome, DomainError> {
        let mut payments = self.payments.write().await;
        let stored = payments.get_mut(&payment.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::PaymentNotFound,
                format!("Payment {} not found", payment.id),
            )
        })?;

        if stored.version != payment.version {
            return Ok(WriteOutcome::Stale);
        }
        *stored = payment.clone();
        stored.version = payment.version + 1;
        Ok(WriteOutcome::Written)
    }

    async fn update_status(
        &self,
        id: &PaymentId,
        expected: PaymentStatus,
        target: PaymentStatus,
        updated_at: Timestamp,
    ) -> Result<WriteOutcome, DomainError> {
        let mut payments = self.payments.write().await;
        let stored = payments.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::PaymentNotFound, format!("Payment {} not found", id))
        })?;

        if stored.status != expected {
            return Ok(WriteOutcome::Stale);
        }
        stored.status = target;
        stored.updated_at = updated_at;
        stored.version += 1;
        Ok(WriteOutcome::Written)
    }

    async fn list_by_member_id(&self, member_id: &MemberId) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().await;
        Ok(newest_first(
            payments
                .values()
                .filter(|p| &p.member_id == member_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_status(
        &self,
        status: PaymentStatus,
        limit: usize,
    ) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().await;
        Ok(oldest_first(
            payments
                .values()
                .filter(|p| p.status == status)
                .cloned()
                .collect(),
            limit,
        ))
    }

    async fn list_expired(&self, now: Timestamp, limit: usize) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().await;
        let mut overdue: Vec<Payment> = payments
            .values()
            .filter(|p| p.is_expired_at(&now))
            .cloned()
            .collect();
        overdue.sort_by_key(|p| (p.status == PaymentStatus::Processing, p.expires_at));
        overdue.truncate(limit);
        Ok(overdue)
    }

    async fn list_pending_by_member_id(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().await;
        Ok(newest_first(
            payments
                .values()
                .filter(|p| &p.member_id == member_id && p.status.is_open())
                .cloned()
                .collect(),
        ))
    }
}
