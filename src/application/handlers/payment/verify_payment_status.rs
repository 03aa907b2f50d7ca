//! VerifyPaymentStatusHandler - Query handler that reconciles stale payments.

use std::sync::Arc;

use chrono::Duration;

use crate::application::retry::RetryPolicy;
use crate::domain::foundation::{PaymentId, Timestamp};
use crate::domain::payment::{
    map_transaction_status, GatewayConfirmation, Payment, PaymentError, PaymentStatus,
    StatusUpdate,
};
use crate::ports::{GatewayTransaction, PaymentGateway, PaymentRepository};

use super::transition::{PaymentTransitioner, TransitionSource};

/// Default age after which an open payment is checked against the gateway.
pub const DEFAULT_FRESHNESS_SECS: i64 = 60;

/// Query for a payment's current status.
#[derive(Debug, Clone)]
pub struct VerifyPaymentStatusQuery {
    pub payment_id: PaymentId,
}

/// Payment status after optional reconciliation.
#[derive(Debug, Clone)]
pub struct VerifyPaymentStatusResult {
    pub payment: Payment,
    /// True when this call consulted the gateway and the local record now
    /// agrees with it.
    pub reconciled: bool,
}

impl VerifyPaymentStatusResult {
    fn unreconciled(payment: Payment) -> Self {
        Self {
            payment,
            reconciled: false,
        }
    }
}

/// Handler for status verification.
///
/// Fresh or terminal records are returned as stored. Open records older
/// than the freshness threshold are polled, with bounded retries on
/// transient failures, and reconciled through the transitioner. A gateway
/// that stays unreachable does not fail the query.
pub struct VerifyPaymentStatusHandler {
    gateway: Arc<dyn PaymentGateway>,
    repository: Arc<dyn PaymentRepository>,
    transitioner: Arc<PaymentTransitioner>,
    freshness: Duration,
    retry: RetryPolicy,
}

impl VerifyPaymentStatusHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        repository: Arc<dyn PaymentRepository>,
        transitioner: Arc<PaymentTransitioner>,
    ) -> Self {
        Self {
            gateway,
            repository,
            transitioner,
            freshness: Duration::seconds(DEFAULT_FRESHNESS_SECS),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn handle(
        &self,
        query: VerifyPaymentStatusQuery,
    ) -> Result<VerifyPaymentStatusResult, PaymentError> {
        let payment = self
            .repository
            .find_by_id(&query.payment_id)
            .await?
            .ok_or(PaymentError::NotFound(query.payment_id))?;

        if !payment.status.is_open() || !payment.is_stale_at(&Timestamp::now(), self.freshness) {
            return Ok(VerifyPaymentStatusResult {
                payment,
                reconciled: false,
            });
        }

        let gateway = Arc::clone(&self.gateway);
        let invoice_id = payment.invoice_id.clone();
        let polled = self
            .retry
            .run(|| {
                let gateway = Arc::clone(&gateway);
                let invoice_id = invoice_id.clone();
                async move { gateway.check_payment_status(&invoice_id).await }
            })
            .await;

        let transaction = match polled {
            Ok(Some(transaction)) => transaction,
            Ok(None) => {
                return Ok(VerifyPaymentStatusResult {
                    payment,
                    reconciled: true,
                })
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    invoice_id = %payment.invoice_id,
                    error = %e,
                    "status poll failed; returning local record"
                );
                return Ok(VerifyPaymentStatusResult {
                    payment,
                    reconciled: false,
                });
            }
        };

        self.reconcile(payment, transaction).await
    }

    async fn reconcile(
        &self,
        payment: Payment,
        transaction: GatewayTransaction,
    ) -> Result<VerifyPaymentStatusResult, PaymentError> {
        let target = match map_transaction_status(&transaction.status) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    invoice_id = %payment.invoice_id,
                    error = %e,
                    "gateway reported an unmapped transaction status"
                );
                return Ok(VerifyPaymentStatusResult::unreconciled(payment));
            }
        };

        if transaction.amount != payment.amount
            || !transaction
                .currency
                .eq_ignore_ascii_case(payment.currency.as_str())
        {
            tracing::error!(
                payment_id = %payment.id,
                invoice_id = %payment.invoice_id,
                local_amount = payment.amount,
                gateway_amount = transaction.amount,
                gateway_currency = %transaction.currency,
                "gateway transaction does not match local payment"
            );
            return Ok(VerifyPaymentStatusResult::unreconciled(payment));
        }

        let update = match target {
            // Gateway has not progressed past our own state.
            PaymentStatus::Pending => {
                return Ok(VerifyPaymentStatusResult {
                    payment,
                    reconciled: true,
                })
            }
            PaymentStatus::Processing => StatusUpdate::Processing,
            PaymentStatus::Completed => StatusUpdate::Completed(GatewayConfirmation {
                transaction_id: Some(transaction.id.clone()),
                card_mask: transaction.card_mask.clone(),
                approval_code: transaction.approval_code.clone(),
            }),
            PaymentStatus::Failed => StatusUpdate::Failed {
                code: transaction.status.clone(),
                message: "Payment was rejected by the gateway".to_string(),
            },
            PaymentStatus::Cancelled => StatusUpdate::Cancelled {
                reason: Some("Cancelled at the gateway".to_string()),
            },
            PaymentStatus::Expired => StatusUpdate::Expired,
            PaymentStatus::Refunded => StatusUpdate::Refunded {
                amount: payment.amount,
                reason: Some("Refunded at the gateway".to_string()),
            },
        };

        let id = payment.id;
        match self
            .transitioner
            .apply_to(payment, update, TransitionSource::Gateway)
            .await
        {
            Ok(outcome) => Ok(VerifyPaymentStatusResult {
                payment: outcome.into_payment(),
                reconciled: true,
            }),
            Err(e @ (PaymentError::InvalidTransition { .. }
            | PaymentError::ConflictingCallback { .. })) => {
                tracing::error!(
                    payment_id = %id,
                    error = %e,
                    "gateway status cannot be reconciled with local record"
                );
                let current = self
                    .repository
                    .find_by_id(&id)
                    .await?
                    .ok_or(PaymentError::NotFound(id))?;
                Ok(VerifyPaymentStatusResult::unreconciled(current))
            }
            Err(e) => Err(e),
        }
    }
}
