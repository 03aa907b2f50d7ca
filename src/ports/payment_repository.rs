//! Payment repository port.
//!
//! Defines the contract for persisting and retrieving Payment aggregates.
//!
//! # Concurrency
//!
//! Both write methods are compare-and-swap operations. A writer that lost
//! a race gets [`WriteOutcome::Stale`] and is expected to reload and
//! re-evaluate rather than overwrite.
//!
//! # Example
//!
//! ```ignore
//! let mut payment = repo.find_by_id(&id).await?.ok_or(PaymentError::NotFound(id))?;
//! payment.apply(StatusUpdate::Expired, Timestamp::now())?;
//! match repo.update(&payment).await? {
//!     WriteOutcome::Written => {}
//!     WriteOutcome::Stale => { /* reload and retry */ }
//! }
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, MemberId, PaymentId, Timestamp};
use crate::domain::payment::{Payment, PaymentStatus};

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The row matched the expected state and was written.
    Written,
    /// The row changed since it was read; nothing was written.
    Stale,
}

/// Repository port for Payment aggregate persistence.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert a new payment.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the invoice id is already taken
    /// - `DatabaseError` on persistence failure
    async fn create(&self, payment: &Payment) -> Result<(), DomainError>;

    /// Find a payment by its ID.
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    /// Find a payment by its gateway invoice id.
    async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Payment>, DomainError>;

    /// Write every mutable field if the stored `version` equals `payment.version`.
    ///
    /// The stored version becomes `payment.version + 1` on success.
    async fn update(&self, payment: &Payment) -> Result<WriteOutcome, DomainError>;

    /// Change only the status if the stored status equals `expected`.
    ///
    /// Also bumps the stored version.
    async fn update_status(
        &self,
        id: &PaymentId,
        expected: PaymentStatus,
        target: PaymentStatus,
        updated_at: Timestamp,
    ) -> Result<WriteOutcome, DomainError>;

    /// All payments of a member, newest first.
    async fn list_by_member_id(&self, member_id: &MemberId) -> Result<Vec<Payment>, DomainError>;

    /// Payments in a status, oldest first, at most `limit`.
    async fn list_by_status(
        &self,
        status: PaymentStatus,
        limit: usize,
    ) -> Result<Vec<Payment>, DomainError>;

    /// Open payments whose `expires_at` is before `now`, at most `limit`.
    ///
    /// Pending payments come before processing ones, each group oldest
    /// deadline first, so processing rows cannot crowd pending ones out.
    async fn list_expired(&self, now: Timestamp, limit: usize) -> Result<Vec<Payment>, DomainError>;

    /// Open (pending or processing) payments of a member, newest first.
    async fn list_pending_by_member_id(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<Payment>, DomainError>;
}
