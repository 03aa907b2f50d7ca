//! Integration tests for the payment lifecycle.
//!
//! These tests drive the public handlers end to end:
//! 1. Initiate a hosted-page payment or charge a saved card
//! 2. Deliver signed gateway callbacks, including duplicates and conflicts
//! 3. Refund, cancel, reconcile and expire
//!
//! Uses the in-memory repositories and the mock gateway, so no database or
//! network is needed.

use std::sync::Arc;

use chrono::Duration;
use secrecy::SecretString;
use serde_json::json;

use library_payments::adapters::{
    InMemoryPaymentRepository, InMemorySavedCardRepository, MockPaymentGateway,
    TracingPaymentNotifier,
};
use library_payments::application::handlers::payment::{
    CallbackOutcome, CancelPaymentCommand, CancelPaymentHandler, HandleGatewayCallbackHandler,
    InitiatePaymentCommand, InitiatePaymentHandler, InitiatePaymentResult,
    PayWithSavedCardCommand, PayWithSavedCardHandler, PaymentTransitioner, RefundPaymentCommand,
    RefundPaymentHandler, VerifyPaymentStatusHandler, VerifyPaymentStatusQuery,
};
use library_payments::application::{ExpirySweeper, ExpirySweeperConfig};
use library_payments::domain::foundation::{MemberId, RelatedEntityId};
use library_payments::domain::payment::{
    CallbackSignatureVerifier, GatewayError, Payment, PaymentError, PaymentMethod, PaymentStatus,
    PaymentType, SavedCard,
};
use library_payments::ports::{
    ChargeResult, GatewayTransaction, PaymentRepository, SavedCardRepository,
};

const WEBHOOK_SECRET: &str = "whsec_integration";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Harness {
    gateway: MockPaymentGateway,
    payments: InMemoryPaymentRepository,
    cards: InMemorySavedCardRepository,
    transitioner: Arc<PaymentTransitioner>,
    member: MemberId,
}

impl Harness {
    fn new() -> Self {
        let payments = InMemoryPaymentRepository::new();
        let transitioner = Arc::new(PaymentTransitioner::new(
            Arc::new(payments.clone()),
            Arc::new(TracingPaymentNotifier::new()),
        ));
        Self {
            gateway: MockPaymentGateway::new(),
            payments,
            cards: InMemorySavedCardRepository::new(),
            transitioner,
            member: MemberId::new(),
        }
    }

    fn initiate_handler(&self) -> InitiatePaymentHandler {
        InitiatePaymentHandler::new(Arc::new(self.gateway.clone()), Arc::new(self.payments.clone()))
    }

    fn callback_handler(&self) -> HandleGatewayCallbackHandler {
        HandleGatewayCallbackHandler::new(
            Arc::new(self.payments.clone()),
            self.transitioner.clone(),
            CallbackSignatureVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string())),
        )
    }

    fn refund_handler(&self) -> RefundPaymentHandler {
        RefundPaymentHandler::new(
            Arc::new(self.gateway.clone()),
            Arc::new(self.payments.clone()),
            self.transitioner.clone(),
        )
    }

    fn cancel_handler(&self) -> CancelPaymentHandler {
        CancelPaymentHandler::new(
            Arc::new(self.gateway.clone()),
            Arc::new(self.payments.clone()),
            self.transitioner.clone(),
        )
    }

    fn saved_card_handler(&self) -> PayWithSavedCardHandler {
        PayWithSavedCardHandler::new(
            Arc::new(self.gateway.clone()),
            Arc::new(self.payments.clone()),
            Arc::new(self.cards.clone()),
            self.transitioner.clone(),
        )
    }

    fn verify_handler(&self) -> VerifyPaymentStatusHandler {
        VerifyPaymentStatusHandler::new(
            Arc::new(self.gateway.clone()),
            Arc::new(self.payments.clone()),
            self.transitioner.clone(),
        )
        .with_freshness(Duration::zero())
    }

    fn initiate_command(&self, amount: i64) -> InitiatePaymentCommand {
        InitiatePaymentCommand {
            member_id: self.member,
            related_entity_id: RelatedEntityId::new(),
            payment_type: PaymentType::Fine,
            amount,
            currency: "KZT".to_string(),
            payment_method: PaymentMethod::Card,
            description: None,
        }
    }

    async fn initiate(&self, amount: i64) -> InitiatePaymentResult {
        self.initiate_handler()
            .handle(self.initiate_command(amount))
            .await
            .unwrap()
    }

    async fn load(&self, invoice_id: &str) -> Payment {
        self.payments
            .find_by_invoice_id(invoice_id)
            .await
            .unwrap()
            .expect("payment should exist")
    }

    async fn deliver(&self, body: serde_json::Value) -> Result<CallbackOutcome, PaymentError> {
        let payload = serde_json::to_vec(&body).unwrap();
        let header = sign(&payload);
        self.callback_handler().handle(&payload, Some(&header)).await
    }
}

fn sign(payload: &[u8]) -> String {
    CallbackSignatureVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string()))
        .sign(payload, chrono::Utc::now().timestamp())
        .unwrap()
}

fn success_callback(invoice_id: &str, amount: i64) -> serde_json::Value {
    json!({
        "invoiceId": invoice_id,
        "code": "ok",
        "reason": "success",
        "id": "TX-100",
        "cardMask": "4400****1234",
        "approvalCode": "A100",
        "amount": amount,
        "currency": "KZT",
    })
}

fn decline_callback(invoice_id: &str) -> serde_json::Value {
    json!({
        "invoiceId": invoice_id,
        "code": "error",
        "reason": "insufficient_funds",
        "reasonCode": "51",
    })
}

// =============================================================================
// Hosted-page payments
// =============================================================================

#[tokio::test]
async fn initiated_payment_completes_on_success_callback() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;

    let pending = h.load(&initiated.invoice_id).await;
    assert_eq!(pending.status, PaymentStatus::Pending);
    assert_eq!(pending.id, initiated.payment_id);

    let outcome = h.deliver(success_callback(&initiated.invoice_id, 5000)).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::Applied);

    let completed = h.load(&initiated.invoice_id).await;
    assert_eq!(completed.status, PaymentStatus::Completed);
    assert_eq!(completed.gateway_transaction_id.as_deref(), Some("TX-100"));
    assert!(completed.completed_at.is_some());
}

#[tokio::test]
async fn redelivered_callback_is_a_duplicate_and_changes_nothing() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;

    h.deliver(success_callback(&initiated.invoice_id, 5000)).await.unwrap();
    let first = h.load(&initiated.invoice_id).await;

    let outcome = h.deliver(success_callback(&initiated.invoice_id, 5000)).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::Duplicate);

    let second = h.load(&initiated.invoice_id).await;
    assert_eq!(second.completed_at, first.completed_at);
    assert_eq!(second.version, first.version);
}

#[tokio::test]
async fn concurrent_duplicate_callbacks_apply_exactly_once() {
    let h = Arc::new(Harness::new());
    let initiated = h.initiate(5000).await;

    let deliveries = (0..10).map(|_| {
        let h = h.clone();
        let invoice_id = initiated.invoice_id.clone();
        tokio::spawn(async move { h.deliver(success_callback(&invoice_id, 5000)).await })
    });
    let outcomes: Vec<CallbackOutcome> = futures::future::join_all(deliveries)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let applied = outcomes.iter().filter(|o| **o == CallbackOutcome::Applied).count();
    let duplicates = outcomes.iter().filter(|o| **o == CallbackOutcome::Duplicate).count();
    assert_eq!(applied, 1);
    assert_eq!(duplicates, 9);
    assert_eq!(h.load(&initiated.invoice_id).await.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn decline_then_late_success_is_a_conflict() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;

    let outcome = h.deliver(decline_callback(&initiated.invoice_id)).await.unwrap();
    assert_eq!(outcome, CallbackOutcome::Applied);
    let failed = h.load(&initiated.invoice_id).await;
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.error_code.as_deref(), Some("51"));

    let outcome = h.deliver(success_callback(&initiated.invoice_id, 5000)).await.unwrap();
    assert!(matches!(
        outcome,
        CallbackOutcome::Rejected(PaymentError::ConflictingCallback { .. })
    ));
    assert_eq!(h.load(&initiated.invoice_id).await.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn unsigned_callback_is_refused_before_any_lookup() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;
    let payload = serde_json::to_vec(&success_callback(&initiated.invoice_id, 5000)).unwrap();

    let result = h.callback_handler().handle(&payload, None).await;
    assert!(matches!(result, Err(PaymentError::InvalidSignature)));

    let tampered = sign(b"{}");
    let result = h.callback_handler().handle(&payload, Some(&tampered)).await;
    assert!(matches!(result, Err(PaymentError::InvalidSignature)));

    assert_eq!(h.load(&initiated.invoice_id).await.status, PaymentStatus::Pending);
}

// =============================================================================
// Refunds and cancellations
// =============================================================================

#[tokio::test]
async fn completed_payment_refunds_once() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;
    h.deliver(success_callback(&initiated.invoice_id, 5000)).await.unwrap();

    let command = RefundPaymentCommand {
        payment_id: initiated.payment_id,
        member_id: h.member,
        is_admin: false,
        reason: Some("reservation cancelled".to_string()),
        amount: None,
    };
    let result = h.refund_handler().handle(command.clone()).await.unwrap();
    assert_eq!(result.payment.status, PaymentStatus::Refunded);
    assert_eq!(result.refunded_amount, 5000);

    let second = h.refund_handler().handle(command).await;
    assert!(matches!(
        second,
        Err(PaymentError::InvalidState {
            current: PaymentStatus::Refunded,
            ..
        })
    ));
    assert_eq!(h.gateway.refund_requests().len(), 1);
}

#[tokio::test]
async fn refund_of_pending_payment_never_reaches_gateway() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;

    let result = h
        .refund_handler()
        .handle(RefundPaymentCommand {
            payment_id: initiated.payment_id,
            member_id: h.member,
            is_admin: false,
            reason: None,
            amount: None,
        })
        .await;

    assert!(matches!(result, Err(PaymentError::InvalidState { .. })));
    assert!(h.gateway.refund_requests().is_empty());
}

#[tokio::test]
async fn cancelled_payment_rejects_later_success_callback() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;

    let result = h
        .cancel_handler()
        .handle(CancelPaymentCommand {
            payment_id: initiated.payment_id,
            member_id: h.member,
            reason: Some("changed mind".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(result.payment.status, PaymentStatus::Cancelled);

    let outcome = h.deliver(success_callback(&initiated.invoice_id, 5000)).await.unwrap();
    assert!(matches!(
        outcome,
        CallbackOutcome::Rejected(PaymentError::ConflictingCallback { .. })
    ));
}

// =============================================================================
// Saved cards
// =============================================================================

#[tokio::test]
async fn saved_card_charge_completes_or_fails_synchronously() {
    let h = Harness::new();
    let card = SavedCard::new(h.member, "tok_visa", "4400****1234", 12, 2099);
    h.cards.save(&card).await.unwrap();

    let command = |invoice_id: &str| PayWithSavedCardCommand {
        member_id: h.member,
        card_token: "tok_visa".to_string(),
        invoice_id: invoice_id.to_string(),
        amount: 2500,
        currency: "KZT".to_string(),
        related_entity_id: RelatedEntityId::new(),
        payment_type: PaymentType::Reservation,
    };

    h.gateway.set_charge_result(ChargeResult::Approved {
        transaction_id: "TX-7".to_string(),
        approval_code: Some("A7".to_string()),
        card_mask: None,
    });
    let approved = h.saved_card_handler().handle(command("INV-SC-1")).await.unwrap();
    assert!(approved.approved);
    assert_eq!(approved.payment.status, PaymentStatus::Completed);
    assert_eq!(approved.payment.card_mask.as_deref(), Some("4400****1234"));

    h.gateway.set_charge_result(ChargeResult::Declined {
        code: "05".to_string(),
        message: "Do not honour".to_string(),
    });
    let declined = h.saved_card_handler().handle(command("INV-SC-2")).await.unwrap();
    assert!(!declined.approved);
    assert_eq!(declined.payment.status, PaymentStatus::Failed);
    assert_eq!(declined.payment.error_code.as_deref(), Some("05"));
}

#[tokio::test]
async fn saved_card_of_another_member_is_refused() {
    let h = Harness::new();
    let card = SavedCard::new(MemberId::new(), "tok_other", "5500****9999", 1, 2099);
    h.cards.save(&card).await.unwrap();

    let result = h
        .saved_card_handler()
        .handle(PayWithSavedCardCommand {
            member_id: h.member,
            card_token: "tok_other".to_string(),
            invoice_id: "INV-SC-3".to_string(),
            amount: 2500,
            currency: "KZT".to_string(),
            related_entity_id: RelatedEntityId::new(),
            payment_type: PaymentType::Reservation,
        })
        .await;

    assert!(matches!(result, Err(PaymentError::Validation { .. })));
    assert!(h.gateway.charge_requests().is_empty());
}

#[tokio::test]
async fn saved_card_refused_by_gateway_fails_instead_of_lingering() {
    let h = Harness::new();
    let card = SavedCard::new(h.member, "tok_visa", "4400****1234", 12, 2099);
    h.cards.save(&card).await.unwrap();
    h.gateway.set_error(
        "charge_card_with_token",
        GatewayError::rejected("charge_card_with_token", "Card blocked")
            .with_http_status(422)
            .with_gateway_code("card_blocked"),
    );

    let result = h
        .saved_card_handler()
        .handle(PayWithSavedCardCommand {
            member_id: h.member,
            card_token: "tok_visa".to_string(),
            invoice_id: "INV-SC-4".to_string(),
            amount: 2500,
            currency: "KZT".to_string(),
            related_entity_id: RelatedEntityId::new(),
            payment_type: PaymentType::Reservation,
        })
        .await
        .unwrap();

    assert!(!result.approved);
    let stored = h.load("INV-SC-4").await;
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.error_code.as_deref(), Some("card_blocked"));
}

// =============================================================================
// Reconciliation and expiry
// =============================================================================

#[tokio::test]
async fn status_check_reconciles_a_missed_callback() {
    let h = Harness::new();
    let initiated = h.initiate(5000).await;
    h.gateway.set_transaction(GatewayTransaction {
        id: "TX-55".to_string(),
        invoice_id: initiated.invoice_id.clone(),
        amount: 5000,
        currency: "KZT".to_string(),
        status: "CHARGE".to_string(),
        card_mask: Some("4400****1234".to_string()),
        approval_code: Some("A55".to_string()),
        reference: None,
    });

    let result = h
        .verify_handler()
        .handle(VerifyPaymentStatusQuery {
            payment_id: initiated.payment_id,
        })
        .await
        .unwrap();

    assert!(result.reconciled);
    assert_eq!(result.payment.status, PaymentStatus::Completed);
    assert_eq!(result.payment.gateway_transaction_id.as_deref(), Some("TX-55"));
}

#[tokio::test]
async fn sweeper_expires_abandoned_payment_and_late_success_conflicts() {
    let h = Harness::new();
    let initiated = h
        .initiate_handler()
        .with_ttl(Duration::seconds(-1))
        .handle(h.initiate_command(5000))
        .await
        .unwrap();
    let fresh = h.initiate(3000).await;

    let sweeper = ExpirySweeper::with_config(
        Arc::new(h.payments.clone()),
        h.transitioner.clone(),
        ExpirySweeperConfig::default().with_batch_size(10),
    );
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(h.load(&initiated.invoice_id).await.status, PaymentStatus::Expired);
    assert_eq!(h.load(&fresh.invoice_id).await.status, PaymentStatus::Pending);

    let outcome = h.deliver(success_callback(&initiated.invoice_id, 5000)).await.unwrap();
    assert!(matches!(
        outcome,
        CallbackOutcome::Rejected(PaymentError::ConflictingCallback { .. })
    ));
}

#[tokio::test]
async fn member_listing_shows_every_payment() {
    let h = Harness::new();
    h.initiate(1000).await;
    h.initiate(2000).await;

    let listed = h.payments.list_by_member_id(&h.member).await.unwrap();
    assert_eq!(listed.len(), 2);
    let pending = h.payments.list_pending_by_member_id(&h.member).await.unwrap();
    assert_eq!(pending.len(), 2);
}
