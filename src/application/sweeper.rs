//! ExpirySweeper - Background service that expires abandoned payments.
//!
//! Members who never finish the hosted payment page leave `pending`
//! payments behind. The sweeper moves pending payments past their
//! `expires_at` to `expired` through the shared transitioner, so a callback
//! arriving at the same moment is arbitrated by the same compare-and-swap.
//!
//! A `processing` payment cannot expire: the gateway already holds the
//! member's money. Overdue processing payments are handed to the status
//! reconciler instead, when one is configured, and are otherwise left for
//! a callback to settle.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 60s | How often to look for expired payments |
//! | `batch_size` | 100 | Max payments expired per cycle |
//!
//! ## Graceful Shutdown
//!
//! The service listens for a shutdown signal and sweeps one final batch
//! before stopping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::application::handlers::payment::{
    PaymentTransitioner, TransitionOutcome, TransitionSource, VerifyPaymentStatusHandler,
    VerifyPaymentStatusQuery,
};
use crate::domain::foundation::Timestamp;
use crate::domain::payment::{Payment, PaymentError, PaymentStatus, StatusUpdate};
use crate::ports::PaymentRepository;

/// Configuration for the ExpirySweeper service.
#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    /// How often to sweep.
    pub interval: Duration,

    /// Maximum payments to process per sweep.
    pub batch_size: usize,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

impl ExpirySweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Payments moved to `expired`.
    pub expired: usize,
    /// Overdue processing payments checked against the gateway.
    pub reconciled: usize,
    /// Payments that changed status before the sweeper could expire them.
    pub skipped: usize,
    /// Payments that could not be written.
    pub failed: usize,
}

/// Background service that expires stale open payments.
pub struct ExpirySweeper {
    repository: Arc<dyn PaymentRepository>,
    transitioner: Arc<PaymentTransitioner>,
    reconciler: Option<Arc<VerifyPaymentStatusHandler>>,
    config: ExpirySweeperConfig,
}

impl ExpirySweeper {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        transitioner: Arc<PaymentTransitioner>,
    ) -> Self {
        Self::with_config(repository, transitioner, ExpirySweeperConfig::default())
    }

    pub fn with_config(
        repository: Arc<dyn PaymentRepository>,
        transitioner: Arc<PaymentTransitioner>,
        config: ExpirySweeperConfig,
    ) -> Self {
        Self {
            repository,
            transitioner,
            reconciler: None,
            config,
        }
    }

    /// Polls the gateway for overdue processing payments.
    pub fn with_reconciler(mut self, reconciler: Arc<VerifyPaymentStatusHandler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Run the sweep loop until the shutdown signal is received.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.sweep_logged().await;
                        tracing::info!("expiry sweeper stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep_logged().await;
                }
            }
        }
    }

    /// Expire one batch of pending payments past their deadline and
    /// reconcile any overdue processing payments in the same batch.
    ///
    /// # Errors
    ///
    /// - `Storage` if the batch could not be listed
    pub async fn sweep_once(&self) -> Result<SweepReport, PaymentError> {
        let candidates = self
            .repository
            .list_expired(Timestamp::now(), self.config.batch_size)
            .await?;
        let mut report = SweepReport::default();

        for payment in candidates {
            if payment.status == PaymentStatus::Processing {
                self.reconcile(payment, &mut report).await;
                continue;
            }
            let id = payment.id;
            match self
                .transitioner
                .apply_to(payment, StatusUpdate::Expired, TransitionSource::Internal)
                .await
            {
                Ok(TransitionOutcome::Applied { .. }) => report.expired += 1,
                Ok(TransitionOutcome::Unchanged(_)) => report.skipped += 1,
                Err(PaymentError::InvalidTransition { from, .. }) => {
                    tracing::debug!(
                        payment_id = %id,
                        status = %from,
                        "payment settled before it could be expired"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(payment_id = %id, error = %e, "failed to expire payment");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn reconcile(&self, payment: Payment, report: &mut SweepReport) {
        let reconciler = match &self.reconciler {
            Some(reconciler) => reconciler,
            None => {
                tracing::debug!(
                    payment_id = %payment.id,
                    "overdue payment is processing; waiting for the gateway"
                );
                report.skipped += 1;
                return;
            }
        };

        match reconciler
            .handle(VerifyPaymentStatusQuery {
                payment_id: payment.id,
            })
            .await
        {
            Ok(result) if result.reconciled => report.reconciled += 1,
            Ok(_) => report.skipped += 1,
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %e,
                    "failed to reconcile overdue processing payment"
                );
                report.failed += 1;
            }
        }
    }

    async fn sweep_logged(&self) {
        match self.sweep_once().await {
            Ok(report) if report == SweepReport::default() => {}
            Ok(report) => tracing::info!(
                expired = report.expired,
                reconciled = report.reconciled,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            ),
            Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
        }
    }
}
