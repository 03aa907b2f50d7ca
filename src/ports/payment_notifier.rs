//! Payment notification port.
//!
//! Receives status changes after they are persisted. Delivery (email, SMS)
//! is best effort; a failing notifier never affects the payment.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::payment::{Payment, PaymentStatus};

#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    /// Called once per applied transition with the persisted payment.
    async fn status_changed(
        &self,
        payment: &Payment,
        previous: PaymentStatus,
    ) -> Result<(), DomainError>;
}
