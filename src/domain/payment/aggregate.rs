//! Payment aggregate entity.
//!
//! # Design Decisions
//!
//! - **Money in minor units**: amounts are i64 in the smallest currency unit
//! - **One currency per payment**: fixed at creation, never converted
//! - **Status via state machine only**: fields change through [`Payment::apply`]
//! - **Optimistic concurrency**: `version` is the compare-and-swap key for writes

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    MemberId, PaymentId, RelatedEntityId, Timestamp, Transition,
};

use super::{Currency, PaymentError, PaymentMethod, PaymentStateMachine, PaymentStatus, PaymentType};

/// Details the gateway returns once funds are captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfirmation {
    pub transaction_id: Option<String>,
    pub card_mask: Option<String>,
    pub approval_code: Option<String>,
}

/// A requested status change together with the data it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Processing,
    Completed(GatewayConfirmation),
    Failed { code: String, message: String },
    Cancelled { reason: Option<String> },
    Expired,
    Refunded { amount: i64, reason: Option<String> },
}

impl StatusUpdate {
    /// The status this update moves the payment to.
    pub fn target(&self) -> PaymentStatus {
        match self {
            StatusUpdate::Processing => PaymentStatus::Processing,
            StatusUpdate::Completed(_) => PaymentStatus::Completed,
            StatusUpdate::Failed { .. } => PaymentStatus::Failed,
            StatusUpdate::Cancelled { .. } => PaymentStatus::Cancelled,
            StatusUpdate::Expired => PaymentStatus::Expired,
            StatusUpdate::Refunded { .. } => PaymentStatus::Refunded,
        }
    }

    /// Returns true when the update changes nothing but `status` and `updated_at`.
    pub fn is_status_only(&self) -> bool {
        matches!(self, StatusUpdate::Processing | StatusUpdate::Expired)
    }
}

/// Input for creating a pending payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: String,
    pub member_id: MemberId,
    pub related_entity_id: RelatedEntityId,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub ttl: Duration,
}

/// Payment aggregate.
///
/// # Invariants
///
/// - `amount > 0`, `currency` and `invoice_id` never change after creation
/// - `completed_at` is set iff status is completed or refunded
/// - `refunded_amount <= amount`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: String,
    pub member_id: MemberId,
    pub related_entity_id: RelatedEntityId,
    pub payment_type: PaymentType,
    pub amount: i64,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub gateway_transaction_id: Option<String>,
    pub card_mask: Option<String>,
    pub approval_code: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub refunded_amount: Option<i64>,
    pub status_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub expires_at: Timestamp,
    pub version: i64,
}

impl Payment {
    /// Creates a pending payment.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-positive amount or an empty invoice id.
    pub fn create_pending(new: NewPayment, now: Timestamp) -> Result<Self, PaymentError> {
        if new.amount <= 0 {
            return Err(PaymentError::validation(
                "amount",
                format!("Amount must be positive, got {}", new.amount),
            ));
        }
        if new.invoice_id.trim().is_empty() {
            return Err(PaymentError::validation("invoice_id", "Invoice id cannot be empty"));
        }

        Ok(Self {
            id: PaymentId::new(),
            invoice_id: new.invoice_id,
            member_id: new.member_id,
            related_entity_id: new.related_entity_id,
            payment_type: new.payment_type,
            amount: new.amount,
            currency: new.currency,
            status: PaymentStatus::Pending,
            payment_method: new.payment_method,
            gateway_transaction_id: None,
            card_mask: None,
            approval_code: None,
            error_code: None,
            error_message: None,
            refunded_amount: None,
            status_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: now.plus(new.ttl),
            version: 0,
        })
    }

    pub fn is_owned_by(&self, member_id: &MemberId) -> bool {
        &self.member_id == member_id
    }

    /// Returns true if the payment is open and its session has lapsed.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.status.is_open() && self.expires_at.is_before(now)
    }

    /// Returns true if the record has not been touched for at least `threshold`.
    pub fn is_stale_at(&self, now: &Timestamp, threshold: Duration) -> bool {
        now.duration_since(&self.updated_at) >= threshold
    }

    /// Applies a status update through the state machine.
    ///
    /// An update to the status already held returns `Unchanged` and leaves
    /// every field, `completed_at` included, untouched.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` when the edge does not exist
    /// - `Validation` when a refund amount is out of bounds
    pub fn apply(
        &mut self,
        update: StatusUpdate,
        now: Timestamp,
    ) -> Result<Transition<PaymentStatus>, PaymentError> {
        let transition = PaymentStateMachine::apply(self.status, update.target())?;
        if !transition.is_applied() {
            return Ok(transition);
        }

        match update {
            StatusUpdate::Processing | StatusUpdate::Expired => {}
            StatusUpdate::Completed(confirmation) => {
                if confirmation.transaction_id.is_some() {
                    self.gateway_transaction_id = confirmation.transaction_id;
                }
                if confirmation.card_mask.is_some() {
                    self.card_mask = confirmation.card_mask;
                }
                if confirmation.approval_code.is_some() {
                    self.approval_code = confirmation.approval_code;
                }
                self.completed_at = Some(now);
            }
            StatusUpdate::Failed { code, message } => {
                self.error_code = Some(code);
                self.error_message = Some(message);
            }
            StatusUpdate::Cancelled { reason } => {
                self.status_reason = reason;
            }
            StatusUpdate::Refunded { amount, reason } => {
                self.check_refund_amount(amount)?;
                self.refunded_amount = Some(amount);
                self.status_reason = reason;
            }
        }

        self.status = transition.state();
        self.updated_at = now;
        Ok(transition)
    }

    /// Validates a refund amount against the captured amount.
    ///
    /// # Errors
    ///
    /// `Validation` unless `0 < amount <= self.amount`.
    pub fn check_refund_amount(&self, amount: i64) -> Result<(), PaymentError> {
        if amount <= 0 {
            return Err(PaymentError::validation(
                "amount",
                format!("Refund amount must be positive, got {}", amount),
            ));
        }
        if amount > self.amount {
            return Err(PaymentError::validation(
                "amount",
                format!(
                    "Refund amount {} exceeds the payment amount {}",
                    amount, self.amount
                ),
            ));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::pending_payment;
    use super::*;

    fn confirmation() -> GatewayConfirmation {
        GatewayConfirmation {
            transaction_id: Some("TX-1".to_string()),
            card_mask: Some("4400****1234".to_string()),
            approval_code: Some("A1B2".to_string()),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Creation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn create_pending_sets_expiry_and_status() {
        let now = Timestamp::now();
        let mut new = NewPayment {
            invoice_id: "INV-1".to_string(),
            member_id: MemberId::new(),
            related_entity_id: RelatedEntityId::new(),
            payment_type: PaymentType::Subscription,
            amount: 5000,
            currency: Currency::parse("KZT").unwrap(),
            payment_method: PaymentMethod::Card,
            ttl: Duration::minutes(30),
        };
        let payment = Payment::create_pending(new.clone(), now).unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.expires_at, now.plus_minutes(30));
        assert_eq!(payment.version, 0);
        assert!(payment.completed_at.is_none());

        new.amount = 0;
        assert!(matches!(
            Payment::create_pending(new, now),
            Err(PaymentError::Validation { .. })
        ));
    }

    #[test]
    fn create_pending_rejects_blank_invoice() {
        let payment = pending_payment("INV-1");
        let new = NewPayment {
            invoice_id: "  ".to_string(),
            member_id: payment.member_id,
            related_entity_id: payment.related_entity_id,
            payment_type: payment.payment_type,
            amount: payment.amount,
            currency: payment.currency.clone(),
            payment_method: payment.payment_method,
            ttl: Duration::minutes(30),
        };
        assert!(Payment::create_pending(new, Timestamp::now()).is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn completing_records_confirmation_and_completed_at() {
        let mut payment = pending_payment("INV-1");
        let now = Timestamp::now();

        let t = payment
            .apply(StatusUpdate::Completed(confirmation()), now)
            .unwrap();

        assert!(t.is_applied());
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.gateway_transaction_id.as_deref(), Some("TX-1"));
        assert_eq!(payment.card_mask.as_deref(), Some("4400****1234"));
        assert_eq!(payment.approval_code.as_deref(), Some("A1B2"));
        assert_eq!(payment.completed_at, Some(now));
        assert_eq!(payment.updated_at, now);
    }

    #[test]
    fn completing_twice_does_not_overwrite_completed_at() {
        let mut payment = pending_payment("INV-1");
        let first = Timestamp::now();
        payment
            .apply(StatusUpdate::Completed(confirmation()), first)
            .unwrap();
        let snapshot = payment.clone();

        let t = payment
            .apply(
                StatusUpdate::Completed(GatewayConfirmation::default()),
                first.plus_secs(120),
            )
            .unwrap();

        assert!(!t.is_applied());
        assert_eq!(payment, snapshot);
    }

    #[test]
    fn failing_records_error_details() {
        let mut payment = pending_payment("INV-1");
        payment
            .apply(
                StatusUpdate::Failed {
                    code: "declined".to_string(),
                    message: "Card declined".to_string(),
                },
                Timestamp::now(),
            )
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.error_code.as_deref(), Some("declined"));
        assert!(payment.completed_at.is_none());
    }

    #[test]
    fn failed_after_completed_is_rejected_and_record_unchanged() {
        let mut payment = pending_payment("INV-1");
        payment
            .apply(StatusUpdate::Completed(confirmation()), Timestamp::now())
            .unwrap();
        let snapshot = payment.clone();

        let result = payment.apply(
            StatusUpdate::Failed {
                code: "declined".to_string(),
                message: "late".to_string(),
            },
            Timestamp::now(),
        );

        assert!(matches!(result, Err(PaymentError::InvalidTransition { .. })));
        assert_eq!(payment, snapshot);
    }

    #[test]
    fn refund_keeps_completed_at_and_stores_amount() {
        let mut payment = pending_payment("INV-1");
        let completed = Timestamp::now();
        payment
            .apply(StatusUpdate::Completed(confirmation()), completed)
            .unwrap();

        payment
            .apply(
                StatusUpdate::Refunded {
                    amount: 2000,
                    reason: Some("book returned".to_string()),
                },
                completed.plus_secs(60),
            )
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.refunded_amount, Some(2000));
        assert_eq!(payment.completed_at, Some(completed));
        assert_eq!(payment.status_reason.as_deref(), Some("book returned"));
    }

    #[test]
    fn refund_over_amount_is_validation_error() {
        let mut payment = pending_payment("INV-1");
        payment
            .apply(StatusUpdate::Completed(confirmation()), Timestamp::now())
            .unwrap();
        let snapshot = payment.clone();

        let result = payment.apply(
            StatusUpdate::Refunded {
                amount: 5001,
                reason: None,
            },
            Timestamp::now(),
        );

        assert!(matches!(result, Err(PaymentError::Validation { .. })));
        assert_eq!(payment, snapshot);
    }

    #[test]
    fn refund_requires_completed() {
        let mut payment = pending_payment("INV-1");
        let result = payment.apply(
            StatusUpdate::Refunded {
                amount: 100,
                reason: None,
            },
            Timestamp::now(),
        );
        assert!(matches!(result, Err(PaymentError::InvalidTransition { .. })));
    }

    // ══════════════════════════════════════════════════════════════
    // Expiry and staleness
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn expired_only_when_open_and_past_expiry() {
        let mut payment = pending_payment("INV-1");
        let later = payment.expires_at.plus_secs(1);
        assert!(payment.is_expired_at(&later));
        assert!(!payment.is_expired_at(&payment.created_at));

        payment
            .apply(StatusUpdate::Completed(confirmation()), Timestamp::now())
            .unwrap();
        assert!(!payment.is_expired_at(&later));
    }

    #[test]
    fn staleness_uses_updated_at() {
        let payment = pending_payment("INV-1");
        let threshold = Duration::seconds(60);
        assert!(!payment.is_stale_at(&payment.updated_at.plus_secs(59), threshold));
        assert!(payment.is_stale_at(&payment.updated_at.plus_secs(60), threshold));
    }

    #[test]
    fn status_only_updates() {
        assert!(StatusUpdate::Expired.is_status_only());
        assert!(StatusUpdate::Processing.is_status_only());
        assert!(!StatusUpdate::Cancelled { reason: None }.is_status_only());
    }
}
