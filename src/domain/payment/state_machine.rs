//! Payment lifecycle arbitration.
//!
//! Every status change in the crate goes through [`PaymentStateMachine::apply`].
//! Applying the status a payment already holds is a no-op rather than an
//! error, which is what makes redelivered callbacks and racing writers safe.

use crate::domain::foundation::{StateMachine, Transition};

use super::{PaymentError, PaymentStatus};

/// Stateless arbiter over [`PaymentStatus`] edges.
pub struct PaymentStateMachine;

impl PaymentStateMachine {
    /// Applies `target` to `current`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the edge does not exist.
    pub fn apply(
        current: PaymentStatus,
        target: PaymentStatus,
    ) -> Result<Transition<PaymentStatus>, PaymentError> {
        current
            .apply(target)
            .map_err(|_| PaymentError::invalid_transition(current, target))
    }

    /// Applies a status reported by the gateway for `invoice_id`.
    ///
    /// A rejected edge out of a settled status means the gateway disagrees
    /// with what is already recorded and is reported as `ConflictingCallback`.
    /// Rejections from an open status stay `InvalidTransition`. A success
    /// redelivered after a refund is a duplicate: the refund already implies
    /// the charge went through.
    pub fn apply_reported(
        invoice_id: &str,
        current: PaymentStatus,
        reported: PaymentStatus,
    ) -> Result<Transition<PaymentStatus>, PaymentError> {
        if current == PaymentStatus::Refunded && reported == PaymentStatus::Completed {
            return Ok(Transition::Unchanged(current));
        }
        Self::apply(current, reported).map_err(|err| {
            if current.is_open() {
                err
            } else {
                PaymentError::conflicting_callback(invoice_id, current, reported)
            }
        })
    }
}
