//! HandleGatewayCallbackHandler - Command handler for gateway payment callbacks.

use std::sync::Arc;

use crate::domain::payment::{
    map_callback_status, CallbackSignatureVerifier, GatewayCallback, PaymentError,
    PaymentStatus, StatusUpdate,
};
use crate::ports::PaymentRepository;

use super::transition::{PaymentTransitioner, TransitionOutcome, TransitionSource};

/// What happened to an authenticated callback.
///
/// Every variant is acknowledged to the gateway. Only storage failures and
/// bad signatures surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The reported status was applied.
    Applied,
    /// The payment already held the reported status.
    Duplicate,
    /// The callback was understood but not applied; the record is unchanged.
    Rejected(PaymentError),
}

/// Handler for asynchronous gateway callbacks.
///
/// Signature verification happens here rather than in the HTTP layer so
/// that every entry point shares one check.
pub struct HandleGatewayCallbackHandler {
    repository: Arc<dyn PaymentRepository>,
    transitioner: Arc<PaymentTransitioner>,
    verifier: CallbackSignatureVerifier,
}

impl HandleGatewayCallbackHandler {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        transitioner: Arc<PaymentTransitioner>,
        verifier: CallbackSignatureVerifier,
    ) -> Self {
        Self {
            repository,
            transitioner,
            verifier,
        }
    }

    /// Processes one raw callback body with its signature header.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the header is missing, malformed, stale or wrong
    /// - `Storage` if the payment could not be read or written
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackOutcome, PaymentError> {
        // 1. Authenticate
        let header = signature.ok_or(PaymentError::InvalidSignature)?;
        if let Err(e) = self.verifier.verify(payload, header) {
            tracing::warn!(error = %e, "callback signature rejected");
            return Err(PaymentError::InvalidSignature);
        }

        // 2. Decode
        let callback = match GatewayCallback::parse(payload) {
            Ok(callback) => callback,
            Err(e) => {
                tracing::warn!(error = %e, "callback payload rejected");
                return Ok(CallbackOutcome::Rejected(PaymentError::validation(
                    e.field(),
                    e.to_string(),
                )));
            }
        };

        // 3. Locate the payment
        let payment = match self
            .repository
            .find_by_invoice_id(&callback.invoice_id)
            .await?
        {
            Some(payment) => payment,
            None => {
                tracing::warn!(invoice_id = %callback.invoice_id, "callback for unknown invoice");
                return Ok(CallbackOutcome::Rejected(PaymentError::unknown_invoice(
                    callback.invoice_id,
                )));
            }
        };

        // 4. Interpret the reported status
        let reported = match map_callback_status(&callback.code, &callback.reason) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    invoice_id = %callback.invoice_id,
                    code = %callback.code,
                    reason = %callback.reason,
                    "callback status is not recognised"
                );
                return Ok(CallbackOutcome::Rejected(e));
            }
        };

        let update = match reported {
            PaymentStatus::Completed => {
                if let Some(mismatch) = callback.mismatch(payment.amount, &payment.currency) {
                    tracing::error!(
                        payment_id = %payment.id,
                        invoice_id = %callback.invoice_id,
                        mismatch = %mismatch,
                        "success callback does not match payment"
                    );
                    return Ok(CallbackOutcome::Rejected(PaymentError::validation(
                        "amount", mismatch,
                    )));
                }
                StatusUpdate::Completed(callback.confirmation())
            }
            PaymentStatus::Processing => StatusUpdate::Processing,
            PaymentStatus::Failed => StatusUpdate::Failed {
                code: callback.failure_code(),
                message: callback.reason.clone(),
            },
            PaymentStatus::Cancelled => StatusUpdate::Cancelled {
                reason: Some(callback.reason.clone()),
            },
            PaymentStatus::Expired => StatusUpdate::Expired,
            // The callback table never reports these.
            PaymentStatus::Pending | PaymentStatus::Refunded => {
                return Ok(CallbackOutcome::Rejected(PaymentError::unknown_gateway_status(
                    callback.code,
                    callback.reason,
                )));
            }
        };

        // 5. Apply
        let payment_id = payment.id;
        match self
            .transitioner
            .apply_to(payment, update, TransitionSource::Gateway)
            .await
        {
            Ok(TransitionOutcome::Applied { .. }) => Ok(CallbackOutcome::Applied),
            Ok(TransitionOutcome::Unchanged(_)) => {
                tracing::debug!(
                    payment_id = %payment_id,
                    invoice_id = %callback.invoice_id,
                    "duplicate callback ignored"
                );
                Ok(CallbackOutcome::Duplicate)
            }
            Err(e @ (PaymentError::ConflictingCallback { .. }
            | PaymentError::InvalidTransition { .. })) => {
                tracing::error!(
                    payment_id = %payment_id,
                    invoice_id = %callback.invoice_id,
                    error = %e,
                    "callback conflicts with recorded payment status"
                );
                Ok(CallbackOutcome::Rejected(e))
            }
            Err(e @ PaymentError::Validation { .. }) => Ok(CallbackOutcome::Rejected(e)),
            Err(e) => {
                tracing::error!(
                    payment_id = %payment_id,
                    invoice_id = %callback.invoice_id,
                    error = %e,
                    "callback could not be persisted"
                );
                Err(e)
            }
        }
    }
}
