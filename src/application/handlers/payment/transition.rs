//! PaymentTransitioner - atomic read-transition-write for payment status.
//!
//! Every status change (orchestrator, callbacks, reconciliation, sweeper)
//! goes through here, so a callback and a sweep racing on one payment are
//! arbitrated by the same compare-and-swap write. The loser reloads and
//! re-evaluates: a no-op if the payment already holds the target, otherwise
//! the state machine's rejection.

use std::sync::Arc;

use crate::domain::foundation::{PaymentId, Timestamp, Transition};
use crate::domain::payment::{
    Payment, PaymentError, PaymentStateMachine, PaymentStatus, StatusUpdate,
};
use crate::ports::{PaymentNotifier, PaymentRepository, WriteOutcome};

/// Default number of read-transition-write attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Who asked for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    /// The gateway reported the status (callback or poll).
    Gateway,
    /// This service decided (cancel, refund, charge, sweep).
    Internal,
}

/// Result of a transition attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status moved and the record was written.
    Applied {
        payment: Payment,
        previous: PaymentStatus,
    },
    /// Payment already held the target; nothing written.
    Unchanged(Payment),
}

impl TransitionOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            TransitionOutcome::Applied { payment, .. } | TransitionOutcome::Unchanged(payment) => {
                payment
            }
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            TransitionOutcome::Applied { payment, .. } | TransitionOutcome::Unchanged(payment) => {
                payment
            }
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Shared read-transition-write service.
pub struct PaymentTransitioner {
    repository: Arc<dyn PaymentRepository>,
    notifier: Arc<dyn PaymentNotifier>,
    max_attempts: u32,
}

impl PaymentTransitioner {
    pub fn new(repository: Arc<dyn PaymentRepository>, notifier: Arc<dyn PaymentNotifier>) -> Self {
        Self {
            repository,
            notifier,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Loads the payment and applies `update`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the payment does not exist
    /// - see [`PaymentTransitioner::apply_to`]
    pub async fn transition(
        &self,
        id: &PaymentId,
        update: StatusUpdate,
        source: TransitionSource,
    ) -> Result<TransitionOutcome, PaymentError> {
        let payment = self.load(id).await?;
        self.apply_to(payment, update, source).await
    }

    /// Applies `update` starting from an already loaded snapshot.
    ///
    /// The snapshot is only trusted for the first attempt; after a lost
    /// race the payment is reloaded.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` / `ConflictingCallback` when the state machine rejects the edge
    /// - `Validation` for an out-of-bounds refund amount
    /// - `Storage` on persistence failure or when every attempt lost its race
    pub async fn apply_to(
        &self,
        mut payment: Payment,
        update: StatusUpdate,
        source: TransitionSource,
    ) -> Result<TransitionOutcome, PaymentError> {
        let target = update.target();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                payment = self.load(&payment.id).await?;
            }
            let previous = payment.status;

            let edge = match source {
                TransitionSource::Gateway => {
                    PaymentStateMachine::apply_reported(&payment.invoice_id, previous, target)
                }
                TransitionSource::Internal => PaymentStateMachine::apply(previous, target),
            }?;
            if let Transition::Unchanged(_) = edge {
                return Ok(TransitionOutcome::Unchanged(payment));
            }

            let now = Timestamp::now();
            let mut next = payment.clone();
            next.apply(update.clone(), now)?;

            let written = if update.is_status_only() {
                self.repository
                    .update_status(&next.id, previous, target, now)
                    .await?
            } else {
                self.repository.update(&next).await?
            };

            match written {
                WriteOutcome::Written => {
                    next.version = payment.version + 1;
                    tracing::info!(
                        payment_id = %next.id,
                        invoice_id = %next.invoice_id,
                        from = %previous,
                        to = %target,
                        "payment transition applied"
                    );
                    self.notify(&next, previous);
                    return Ok(TransitionOutcome::Applied {
                        payment: next,
                        previous,
                    });
                }
                WriteOutcome::Stale => {
                    tracing::debug!(
                        payment_id = %payment.id,
                        attempt,
                        to = %target,
                        "payment changed concurrently, re-evaluating"
                    );
                }
            }
        }

        Err(PaymentError::storage(format!(
            "payment {} kept changing concurrently; gave up after {} attempts",
            payment.id, self.max_attempts
        )))
    }

    async fn load(&self, id: &PaymentId) -> Result<Payment, PaymentError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(PaymentError::NotFound(*id))
    }

    fn notify(&self, payment: &Payment, previous: PaymentStatus) {
        let notifier = Arc::clone(&self.notifier);
        let payment = payment.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.status_changed(&payment, previous).await {
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %e,
                    "payment notification failed"
                );
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::adapters::memory::InMemoryPaymentRepository;
    use crate::domain::foundation::{DomainError, MemberId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Notifier that records every call.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub calls: Mutex<Vec<(PaymentId, PaymentStatus, PaymentStatus)>>,
    }

    #[async_trait]
    impl PaymentNotifier for RecordingNotifier {
        async fn status_changed(
            &self,
            payment: &Payment,
            previous: PaymentStatus,
        ) -> Result<(), DomainError> {
            self.calls
                .lock()
                .unwrap()
                .push((payment.id, previous, payment.status));
            Ok(())
        }
    }

    /// Repository that lets a competing writer apply `competitor` right
    /// before the first conditional write lands.
    pub struct RacingRepository {
        inner: InMemoryPaymentRepository,
        competitor: StatusUpdate,
        raced: AtomicBool,
    }

    impl RacingRepository {
        pub fn new(inner: InMemoryPaymentRepository, competitor: StatusUpdate) -> Self {
            Self {
                inner,
                competitor,
                raced: AtomicBool::new(false),
            }
        }

        async fn race(&self, id: &PaymentId) {
            if self.raced.swap(true, Ordering::SeqCst) {
                return;
            }
            let mut winner = self.inner.find_by_id(id).await.unwrap().unwrap();
            winner.apply(self.competitor.clone(), Timestamp::now()).unwrap();
            self.inner.update(&winner).await.unwrap();
        }
    }

    #[async_trait]
    impl PaymentRepository for RacingRepository {
        async fn create(&self, payment: &Payment) -> Result<(), DomainError> {
            self.inner.create(payment).await
        }
        async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Payment>, DomainError> {
            self.inner.find_by_invoice_id(invoice_id).await
        }
        async fn update(&self, payment: &Payment) -> Result<WriteOutcome, DomainError> {
            self.race(&payment.id).await;
            self.inner.update(payment).await
        }
        async fn update_status(
            &self,
            id: &PaymentId,
            expected: PaymentStatus,
            target: PaymentStatus,
            updated_at: Timestamp,
        ) -> Result<WriteOutcome, DomainError> {
            self.race(id).await;
            self.inner.update_status(id, expected, target, updated_at).await
        }
        async fn list_by_member_id(&self, m: &MemberId) -> Result<Vec<Payment>, DomainError> {
            self.inner.list_by_member_id(m).await
        }
        async fn list_by_status(
            &self,
            s: PaymentStatus,
            limit: usize,
        ) -> Result<Vec<Payment>, DomainError> {
            self.inner.list_by_status(s, limit).await
        }
        async fn list_expired(&self, now: Timestamp, limit: usize) -> Result<Vec<Payment>, DomainError> {
            self.inner.list_expired(now, limit).await
        }
        async fn list_pending_by_member_id(
            &self,
            m: &MemberId,
        ) -> Result<Vec<Payment>, DomainError> {
            self.inner.list_pending_by_member_id(m).await
        }
    }
}
