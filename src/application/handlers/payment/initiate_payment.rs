//! InitiatePaymentHandler - Command handler for starting a hosted-page payment.

use std::sync::Arc;

use chrono::Duration;

use crate::domain::foundation::{MemberId, PaymentId, RelatedEntityId, Timestamp};
use crate::domain::payment::{
    Currency, NewPayment, Payment, PaymentError, PaymentMethod, PaymentType,
};
use crate::ports::{InitiatePaymentRequest, PaymentGateway, PaymentRepository};

/// Default lifetime of a pending payment session.
pub const DEFAULT_PAYMENT_TTL_MINUTES: i64 = 30;

/// Command to initiate a payment.
#[derive(Debug, Clone)]
pub struct InitiatePaymentCommand {
    pub member_id: MemberId,
    pub related_entity_id: RelatedEntityId,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub description: Option<String>,
}

/// Result of a successfully initiated payment.
#[derive(Debug, Clone)]
pub struct InitiatePaymentResult {
    pub payment_id: PaymentId,
    pub invoice_id: String,
    pub redirect_url: String,
    pub expires_at: Timestamp,
}

/// Handler for initiating payments.
///
/// The invoice is created at the gateway first. Once it exists, the local
/// pending record is written on a detached task so that a caller giving up
/// mid-request cannot leave a gateway invoice without a local payment.
pub struct InitiatePaymentHandler {
    gateway: Arc<dyn PaymentGateway>,
    repository: Arc<dyn PaymentRepository>,
    ttl: Duration,
}

impl InitiatePaymentHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, repository: Arc<dyn PaymentRepository>) -> Self {
        Self {
            gateway,
            repository,
            ttl: Duration::minutes(DEFAULT_PAYMENT_TTL_MINUTES),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn handle(
        &self,
        cmd: InitiatePaymentCommand,
    ) -> Result<InitiatePaymentResult, PaymentError> {
        // 1. Validate before touching the gateway
        if cmd.amount <= 0 {
            return Err(PaymentError::validation(
                "amount",
                format!("Amount must be positive, got {}", cmd.amount),
            ));
        }
        let currency = Currency::parse(&cmd.currency)?;
        if cmd.payment_method == PaymentMethod::SavedCard {
            return Err(PaymentError::validation(
                "payment_method",
                "Saved cards are charged directly, not through an invoice",
            ));
        }

        // 2. Create the invoice
        let description = cmd
            .description
            .clone()
            .unwrap_or_else(|| format!("Library {} payment", cmd.payment_type));
        let invoice = self
            .gateway
            .initiate_payment(InitiatePaymentRequest {
                member_id: cmd.member_id,
                amount: cmd.amount,
                currency: currency.clone(),
                description,
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    member_id = %cmd.member_id,
                    error = %e,
                    http_status = ?e.http_status,
                    gateway_code = ?e.gateway_code,
                    "invoice creation failed"
                );
                PaymentError::Gateway(e)
            })?;

        // 3. Persist the pending payment, detached from the caller
        let payment = Payment::create_pending(
            NewPayment {
                invoice_id: invoice.invoice_id.clone(),
                member_id: cmd.member_id,
                related_entity_id: cmd.related_entity_id,
                payment_type: cmd.payment_type,
                amount: cmd.amount,
                currency,
                payment_method: cmd.payment_method,
                ttl: self.ttl,
            },
            Timestamp::now(),
        )?;

        let repository = Arc::clone(&self.repository);
        let record = payment.clone();
        let persisted = tokio::spawn(async move { repository.create(&record).await })
            .await
            .map_err(|e| PaymentError::storage(format!("persistence task failed: {}", e)))?;
        if let Err(e) = persisted {
            tracing::error!(
                invoice_id = %payment.invoice_id,
                error = %e,
                "gateway invoice created but local payment was not stored"
            );
            return Err(e.into());
        }

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %payment.invoice_id,
            member_id = %payment.member_id,
            amount = payment.amount,
            currency = %payment.currency,
            "payment initiated"
        );

        Ok(InitiatePaymentResult {
            payment_id: payment.id,
            invoice_id: invoice.invoice_id,
            redirect_url: invoice.redirect_url,
            expires_at: payment.expires_at,
        })
    }
}
