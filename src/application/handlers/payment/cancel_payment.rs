//! CancelPaymentHandler - Command handler for cancelling an open payment.

use std::sync::Arc;

use crate::domain::foundation::{MemberId, PaymentId};
use crate::domain::payment::{Payment, PaymentError, StatusUpdate};
use crate::ports::{PaymentGateway, PaymentRepository};

use super::transition::{PaymentTransitioner, TransitionOutcome, TransitionSource};

/// Command to cancel a payment.
#[derive(Debug, Clone)]
pub struct CancelPaymentCommand {
    pub payment_id: PaymentId,
    pub member_id: MemberId,
    pub reason: Option<String>,
}

/// Result of a successful cancellation.
#[derive(Debug, Clone)]
pub struct CancelPaymentResult {
    pub payment: Payment,
}

/// Handler for cancelling payments.
///
/// Only pending or processing payments can be cancelled. When the gateway
/// already holds a transaction for the invoice it is voided first.
pub struct CancelPaymentHandler {
    gateway: Arc<dyn PaymentGateway>,
    repository: Arc<dyn PaymentRepository>,
    transitioner: Arc<PaymentTransitioner>,
}

impl CancelPaymentHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        repository: Arc<dyn PaymentRepository>,
        transitioner: Arc<PaymentTransitioner>,
    ) -> Self {
        Self {
            gateway,
            repository,
            transitioner,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelPaymentCommand,
    ) -> Result<CancelPaymentResult, PaymentError> {
        // 1. Load and check ownership
        let payment = self
            .repository
            .find_by_id(&cmd.payment_id)
            .await?
            .ok_or(PaymentError::NotFound(cmd.payment_id))?;
        if !payment.is_owned_by(&cmd.member_id) {
            return Err(PaymentError::validation(
                "member_id",
                "Payment belongs to another member",
            ));
        }

        // 2. Only open payments can be cancelled
        if !payment.status.is_open() {
            return Err(PaymentError::invalid_state(payment.status, "cancel"));
        }

        // 3. Void at the gateway if a transaction exists
        if payment.gateway_transaction_id.is_some() {
            self.gateway
                .cancel_payment(&payment.invoice_id)
                .await
                .map_err(|e| {
                    tracing::warn!(
                        payment_id = %payment.id,
                        invoice_id = %payment.invoice_id,
                        error = %e,
                        "gateway cancellation failed"
                    );
                    PaymentError::Gateway(e)
                })?;
        }

        // 4. Apply
        let outcome = self
            .transitioner
            .apply_to(
                payment,
                StatusUpdate::Cancelled { reason: cmd.reason },
                TransitionSource::Internal,
            )
            .await
            .map_err(|e| match e {
                PaymentError::InvalidTransition { from, .. } => {
                    PaymentError::invalid_state(from, "cancel")
                }
                other => other,
            })?;

        // A concurrent cancel got there first
        if let TransitionOutcome::Unchanged(current) = &outcome {
            return Err(PaymentError::invalid_state(current.status, "cancel"));
        }

        Ok(CancelPaymentResult {
            payment: outcome.into_payment(),
        })
    }
}
