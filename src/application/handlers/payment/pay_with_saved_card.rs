//! PayWithSavedCardHandler - Command handler for synchronous saved-card charges.

use std::sync::Arc;

use chrono::Duration;

use crate::domain::foundation::{MemberId, RelatedEntityId, Timestamp};
use crate::domain::payment::{
    Currency, GatewayConfirmation, GatewayErrorKind, NewPayment, Payment, PaymentError,
    PaymentMethod, PaymentType, StatusUpdate,
};
use crate::ports::{
    ChargeCardRequest, ChargeResult, PaymentGateway, PaymentRepository, SavedCardRepository,
};

use super::initiate_payment::DEFAULT_PAYMENT_TTL_MINUTES;
use super::transition::{PaymentTransitioner, TransitionSource};

/// Command to charge a saved card.
#[derive(Debug, Clone)]
pub struct PayWithSavedCardCommand {
    pub member_id: MemberId,
    pub card_token: String,
    pub invoice_id: String,
    pub amount: i64,
    pub currency: String,
    pub related_entity_id: RelatedEntityId,
    pub payment_type: PaymentType,
}

/// Result of a charge attempt that reached the gateway.
///
/// A declined charge is still a result: the payment is `failed` and carries
/// the gateway's code and message.
#[derive(Debug, Clone)]
pub struct PayWithSavedCardResult {
    pub payment: Payment,
    pub approved: bool,
}

/// Handler for saved-card payments.
///
/// The pending record is stored before the charge so that a charge whose
/// response is lost can still be reconciled by status polling or expired
/// by the sweeper.
pub struct PayWithSavedCardHandler {
    gateway: Arc<dyn PaymentGateway>,
    repository: Arc<dyn PaymentRepository>,
    saved_cards: Arc<dyn SavedCardRepository>,
    transitioner: Arc<PaymentTransitioner>,
    ttl: Duration,
}

impl PayWithSavedCardHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        repository: Arc<dyn PaymentRepository>,
        saved_cards: Arc<dyn SavedCardRepository>,
        transitioner: Arc<PaymentTransitioner>,
    ) -> Self {
        Self {
            gateway,
            repository,
            saved_cards,
            transitioner,
            ttl: Duration::minutes(DEFAULT_PAYMENT_TTL_MINUTES),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn handle(
        &self,
        cmd: PayWithSavedCardCommand,
    ) -> Result<PayWithSavedCardResult, PaymentError> {
        // 1. Validate input
        if cmd.amount <= 0 {
            return Err(PaymentError::validation(
                "amount",
                format!("Amount must be positive, got {}", cmd.amount),
            ));
        }
        let currency = Currency::parse(&cmd.currency)?;
        if cmd.invoice_id.trim().is_empty() {
            return Err(PaymentError::validation("invoice_id", "Invoice id cannot be empty"));
        }
        if !is_valid_invoice_id(&cmd.invoice_id) {
            return Err(PaymentError::validation(
                "invoice_id",
                "Invoice id may only contain letters, digits, '-', '_' and '.'",
            ));
        }

        // 2. The card must be the member's and still valid
        let card = self
            .saved_cards
            .find_by_token(&cmd.card_token)
            .await?
            .filter(|c| c.is_owned_by(&cmd.member_id))
            .ok_or_else(|| PaymentError::validation("card_token", "Saved card not found"))?;
        if card.is_expired_at(&Timestamp::now()) {
            return Err(PaymentError::validation("card_token", "Saved card has expired"));
        }

        // 3. Reuse the invoice's open payment or store a new pending one
        let payment = self.pending_payment_for(&cmd, currency).await?;

        // 4. Charge. A 4xx is the gateway refusing the card; anything else
        // leaves the outcome unknown and the payment pending.
        let charge = match self
            .gateway
            .charge_card_with_token(ChargeCardRequest {
                member_id: cmd.member_id,
                card_token: card.token.clone(),
                invoice_id: payment.invoice_id.clone(),
                amount: payment.amount,
                currency: payment.currency.clone(),
                idempotency_key: format!("charge-{}", payment.id),
            })
            .await
        {
            Ok(charge) => charge,
            Err(e) if e.kind == GatewayErrorKind::Rejected && !e.is_unauthorized() => {
                ChargeResult::Declined {
                    code: e
                        .gateway_code
                        .clone()
                        .unwrap_or_else(|| e.kind.to_string()),
                    message: e.message.clone(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    invoice_id = %payment.invoice_id,
                    error = %e,
                    "saved card charge failed; payment left pending"
                );
                return Err(PaymentError::Gateway(e));
            }
        };

        // 5. Record the outcome
        let (update, approved) = match charge {
            ChargeResult::Approved {
                transaction_id,
                approval_code,
                card_mask,
            } => (
                StatusUpdate::Completed(GatewayConfirmation {
                    transaction_id: Some(transaction_id),
                    card_mask: card_mask.or_else(|| Some(card.masked_number.clone())),
                    approval_code,
                }),
                true,
            ),
            ChargeResult::Declined { code, message } => {
                tracing::warn!(
                    payment_id = %payment.id,
                    invoice_id = %payment.invoice_id,
                    code = %code,
                    "saved card charge declined"
                );
                (StatusUpdate::Failed { code, message }, false)
            }
        };

        let outcome = self
            .transitioner
            .apply_to(payment, update, TransitionSource::Internal)
            .await
            .map_err(|e| match e {
                PaymentError::InvalidTransition { from, .. } => {
                    PaymentError::invalid_state(from, "charge")
                }
                other => other,
            })?;

        Ok(PayWithSavedCardResult {
            payment: outcome.into_payment(),
            approved,
        })
    }

    async fn pending_payment_for(
        &self,
        cmd: &PayWithSavedCardCommand,
        currency: Currency,
    ) -> Result<Payment, PaymentError> {
        if let Some(existing) = self.repository.find_by_invoice_id(&cmd.invoice_id).await? {
            if !existing.is_owned_by(&cmd.member_id) {
                return Err(PaymentError::validation(
                    "invoice_id",
                    "Invoice belongs to another member",
                ));
            }
            if existing.amount != cmd.amount || existing.currency != currency {
                return Err(PaymentError::validation(
                    "amount",
                    "Amount does not match the invoice",
                ));
            }
            if !existing.status.is_open() {
                return Err(PaymentError::invalid_state(existing.status, "charge"));
            }
            return Ok(existing);
        }

        let payment = Payment::create_pending(
            NewPayment {
                invoice_id: cmd.invoice_id.clone(),
                member_id: cmd.member_id,
                related_entity_id: cmd.related_entity_id,
                payment_type: cmd.payment_type,
                amount: cmd.amount,
                currency,
                payment_method: PaymentMethod::SavedCard,
                ttl: self.ttl,
            },
            Timestamp::now(),
        )?;
        self.repository.create(&payment).await?;
        Ok(payment)
    }
}

/// Caller-supplied invoice ids end up in gateway URL paths.
fn is_valid_invoice_id(invoice_id: &str) -> bool {
    invoice_id.len() <= MAX_INVOICE_ID_LEN
        && invoice_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && invoice_id != "."
        && invoice_id != ".."
}

const MAX_INVOICE_ID_LEN: usize = 64;
