//! RefundPaymentHandler - Command handler for refunding a completed payment.

use std::sync::Arc;

use crate::domain::foundation::{MemberId, PaymentId};
use crate::domain::payment::{Payment, PaymentError, PaymentStatus, StatusUpdate};
use crate::ports::{PaymentGateway, PaymentRepository, RefundRequest};

use super::transition::{PaymentTransitioner, TransitionOutcome, TransitionSource};

/// Command to refund a payment.
#[derive(Debug, Clone)]
pub struct RefundPaymentCommand {
    pub payment_id: PaymentId,
    pub member_id: MemberId,
    pub is_admin: bool,
    pub reason: Option<String>,
    /// Partial refund amount; `None` refunds in full.
    pub amount: Option<i64>,
}

/// Result of a successful refund.
#[derive(Debug, Clone)]
pub struct RefundPaymentResult {
    pub payment: Payment,
    pub refunded_amount: i64,
}

/// Handler for refunds.
///
/// The gateway refund carries a key derived from the payment id, so a
/// repeated request after a lost response cannot refund twice.
pub struct RefundPaymentHandler {
    gateway: Arc<dyn PaymentGateway>,
    repository: Arc<dyn PaymentRepository>,
    transitioner: Arc<PaymentTransitioner>,
}

impl RefundPaymentHandler {
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
        cmd: RefundPaymentCommand,
    ) -> Result<RefundPaymentResult, PaymentError> {
        // 1. Load and authorize
        let payment = self
            .repository
            .find_by_id(&cmd.payment_id)
            .await?
            .ok_or(PaymentError::NotFound(cmd.payment_id))?;
        if !payment.is_owned_by(&cmd.member_id) && !cmd.is_admin {
            return Err(PaymentError::validation(
                "member_id",
                "Only an administrator can refund another member's payment",
            ));
        }

        // 2. Bound the amount before anything reaches the gateway
        if let Some(amount) = cmd.amount {
            payment.check_refund_amount(amount)?;
        }
        let refund_amount = cmd.amount.unwrap_or(payment.amount);

        // 3. Only completed payments can be refunded
        if payment.status != PaymentStatus::Completed {
            return Err(PaymentError::invalid_state(payment.status, "refund"));
        }

        // 4. Refund at the gateway
        self.gateway
            .refund_payment(RefundRequest {
                invoice_id: payment.invoice_id.clone(),
                amount: cmd.amount,
                idempotency_key: format!("refund-{}", payment.id),
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    payment_id = %payment.id,
                    invoice_id = %payment.invoice_id,
                    error = %e,
                    gateway_code = ?e.gateway_code,
                    "gateway refund failed"
                );
                PaymentError::Gateway(e)
            })?;

        // 5. Apply
        let outcome = self
            .transitioner
            .apply_to(
                payment,
                StatusUpdate::Refunded {
                    amount: refund_amount,
                    reason: cmd.reason,
                },
                TransitionSource::Internal,
            )
            .await
            .map_err(|e| match e {
                PaymentError::InvalidTransition { from, .. } => {
                    PaymentError::invalid_state(from, "refund")
                }
                other => other,
            })?;

        // A concurrent refund got there first
        if let TransitionOutcome::Unchanged(current) = &outcome {
            return Err(PaymentError::invalid_state(current.status, "refund"));
        }

        let payment = outcome.into_payment();
        Ok(RefundPaymentResult {
            refunded_amount: payment.refunded_amount.unwrap_or(refund_amount),
            payment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::MockPaymentGateway;
    use crate::adapters::memory::InMemoryPaymentRepository;
    use crate::application::handlers::payment::transition::test_support::{
        RacingRepository, RecordingNotifier,
    };
    use crate::domain::foundation::Timestamp;
    use crate::domain::payment::test_support::pending_payment;
    use crate::domain::payment::{GatewayConfirmation, GatewayError, GatewayErrorKind};

    fn completed_payment() -> Payment {
        let mut payment = pending_payment("INV-1");
        payment
            .apply(
                StatusUpdate::Completed(GatewayConfirmation::default()),
                Timestamp::now(),
            )
            .unwrap();
        payment
    }

    async fn setup(
        payment: &Payment,
    ) -> (MockPaymentGateway, InMemoryPaymentRepository, RefundPaymentHandler) {
        let gateway = MockPaymentGateway::new();
        let repo = InMemoryPaymentRepository::new();
        repo.insert(payment.clone()).await;
        let transitioner = Arc::new(PaymentTransitioner::new(
            Arc::new(repo.clone()),
            Arc::new(RecordingNotifier::default()),
        ));
        let handler = RefundPaymentHandler::new(
            Arc::new(gateway.clone()),
            Arc::new(repo.clone()),
            transitioner,
        );
        (gateway, repo, handler)
    }

    fn command(payment: &Payment, amount: Option<i64>) -> RefundPaymentCommand {
        RefundPaymentCommand {
            payment_id: payment.id,
            member_id: payment.member_id,
            is_admin: false,
            reason: Some("reservation cancelled".to_string()),
            amount,
        }
    }

    #[tokio::test]
    async fn partial_refund_then_second_refund_is_invalid_state() {
        let payment = completed_payment();
        let (gateway, repo, handler) = setup(&payment).await;

        let result = handler.handle(command(&payment, Some(2000))).await.unwrap();

        assert_eq!(result.refunded_amount, 2000);
        assert_eq!(result.payment.status, PaymentStatus::Refunded);
        let refunds = gateway.refund_requests();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, Some(2000));
        assert_eq!(refunds[0].idempotency_key, format!("refund-{}", payment.id));

        let second = handler.handle(command(&payment, Some(2000))).await;
        assert_eq!(
            second.unwrap_err(),
            PaymentError::invalid_state(PaymentStatus::Refunded, "refund")
        );
        assert_eq!(gateway.refund_requests().len(), 1);
        let stored = repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.refunded_amount, Some(2000));
    }

    #[tokio::test]
    async fn full_refund_records_whole_amount() {
        let payment = completed_payment();
        let (gateway, _, handler) = setup(&payment).await;

        let result = handler.handle(command(&payment, None)).await.unwrap();

        assert_eq!(result.refunded_amount, 5000);
        assert_eq!(gateway.refund_requests()[0].amount, None);
    }

    #[tokio::test]
    async fn amount_above_original_is_validation_error_without_gateway_call() {
        let payment = completed_payment();
        let (gateway, repo, handler) = setup(&payment).await;

        let result = handler.handle(command(&payment, Some(5001))).await;

        assert!(matches!(result, Err(PaymentError::Validation { .. })));
        assert_eq!(gateway.call_count("refund_payment"), 0);
        assert_eq!(repo.find_by_id(&payment.id).await.unwrap().unwrap(), payment);
    }

    #[tokio::test]
    async fn amount_above_original_is_validation_error_in_any_status() {
        let payment = pending_payment("INV-2");
        let (_, _, handler) = setup(&payment).await;

        let result = handler.handle(command(&payment, Some(10_000))).await;

        assert!(matches!(result, Err(PaymentError::Validation { .. })));
    }

    #[tokio::test]
    async fn pending_payment_cannot_be_refunded() {
        let payment = pending_payment("INV-2");
        let (gateway, _, handler) = setup(&payment).await;

        let result = handler.handle(command(&payment, None)).await;

        assert_eq!(
            result.unwrap_err(),
            PaymentError::invalid_state(PaymentStatus::Pending, "refund")
        );
        assert_eq!(gateway.call_count("refund_payment"), 0);
    }

    #[tokio::test]
    async fn non_owner_needs_admin() {
        let payment = completed_payment();
        let (_, _, handler) = setup(&payment).await;
        let mut cmd = command(&payment, None);
        cmd.member_id = MemberId::new();

        assert!(matches!(
            handler.handle(cmd.clone()).await,
            Err(PaymentError::Validation { .. })
        ));

        cmd.is_admin = true;
        let result = handler.handle(cmd).await.unwrap();
        assert_eq!(result.payment.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn gateway_refund_rejection_leaves_payment_completed() {
        let payment = completed_payment();
        let (gateway, repo, handler) = setup(&payment).await;
        gateway.set_error(
            "refund_payment",
            GatewayError::refund_rejected("refund_payment", "already refunded")
                .with_gateway_code("ALREADY_REFUNDED"),
        );

        let result = handler.handle(command(&payment, None)).await;

        assert!(matches!(
            result,
            Err(PaymentError::Gateway(ref e)) if e.kind == GatewayErrorKind::RefundRejected
        ));
        let stored = repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_refund_that_loses_the_race_is_invalid_state() {
        let payment = completed_payment();
        let inner = InMemoryPaymentRepository::new();
        inner.insert(payment.clone()).await;
        let racing: Arc<dyn PaymentRepository> = Arc::new(RacingRepository::new(
            inner.clone(),
            StatusUpdate::Refunded {
                amount: payment.amount,
                reason: None,
            },
        ));
        let transitioner = Arc::new(PaymentTransitioner::new(
            Arc::clone(&racing),
            Arc::new(RecordingNotifier::default()),
        ));
        let gateway = MockPaymentGateway::new();
        let handler = RefundPaymentHandler::new(Arc::new(gateway.clone()), racing, transitioner);

        let result = handler.handle(command(&payment, Some(2000))).await;

        assert_eq!(
            result.unwrap_err(),
            PaymentError::invalid_state(PaymentStatus::Refunded, "refund")
        );
        let stored = inner.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.refunded_amount, Some(payment.amount));
    }
}
