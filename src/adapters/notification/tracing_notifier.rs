//! Notifier that records payment status changes as structured log events.
//!
//! Stands in for the email/SMS senders, which live outside this crate.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::ports::PaymentNotifier;

#[derive(Debug, Default, Clone)]
pub struct TracingPaymentNotifier;

impl TracingPaymentNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentNotifier for TracingPaymentNotifier {
    async fn status_changed(
        &self,
        payment: &Payment,
        previous: PaymentStatus,
    ) -> Result<(), DomainError> {
        tracing::info!(
            target: "payment_notifications",
            payment_id = %payment.id,
            member_id = %payment.member_id,
            payment_type = %payment.payment_type,
            from = %previous,
            to = %payment.status,
            amount = payment.amount,
            currency = %payment.currency,
            "member notified of payment status change"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::test_support::pending_payment;

    #[tokio::test]
    async fn never_fails() {
        let notifier = TracingPaymentNotifier::new();
        let payment = pending_payment("INV-1");
        assert!(notifier
            .status_changed(&payment, PaymentStatus::Pending)
            .await
            .is_ok());
    }
}
