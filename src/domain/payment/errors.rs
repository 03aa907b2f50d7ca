//! Payment-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | NotFound / UnknownInvoice | 404 |
//! | InvalidState | 409 |
//! | InvalidSignature | 401 |
//! | Gateway (Rejected, RefundRejected) | 402 |
//! | Gateway (Unavailable, InvalidResponse) | 502 |
//! | InvalidTransition / ConflictingCallback / UnknownGatewayStatus | 500 |
//! | Storage | 500 |

use std::fmt;

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, ValidationError};

use super::PaymentStatus;

/// Classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Network failure, timeout or 5xx. Safe to retry for reads only.
    Unavailable,
    /// Gateway answered 4xx or declined the request.
    Rejected,
    /// Refund declined: insufficient captured funds or already refunded.
    RefundRejected,
    /// 2xx response whose body could not be decoded.
    InvalidResponse,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatewayErrorKind::Unavailable => "unavailable",
            GatewayErrorKind::Rejected => "rejected",
            GatewayErrorKind::RefundRejected => "refund_rejected",
            GatewayErrorKind::InvalidResponse => "invalid_response",
        };
        f.write_str(s)
    }
}

/// Failure reported by the payment gateway client.
///
/// Carries everything needed for diagnostics. None of it is shown to members.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gateway {operation} failed ({kind}): {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub operation: &'static str,
    pub invoice_id: Option<String>,
    pub http_status: Option<u16>,
    pub gateway_code: Option<String>,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            invoice_id: None,
            http_status: None,
            gateway_code: None,
            message: message.into(),
        }
    }

    pub fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Unavailable, operation, message)
    }

    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Rejected, operation, message)
    }

    pub fn refund_rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::RefundRejected, operation, message)
    }

    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::InvalidResponse, operation, message)
    }

    /// Attaches the invoice the call was made for.
    pub fn with_invoice(mut self, invoice_id: impl Into<String>) -> Self {
        self.invoice_id = Some(invoice_id.into());
        self
    }

    /// Attaches the HTTP status returned by the gateway.
    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attaches the gateway's own error code.
    pub fn with_gateway_code(mut self, code: impl Into<String>) -> Self {
        self.gateway_code = Some(code.into());
        self
    }

    /// Returns true if the failure is transient.
    pub fn is_transient(&self) -> bool {
        self.kind == GatewayErrorKind::Unavailable
    }

    /// Returns true if the gateway rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        self.http_status == Some(401)
    }
}

/// Errors produced by payment operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Bad amount, currency, ownership or payload.
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// Payment was not found.
    #[error("payment not found: {0}")]
    NotFound(PaymentId),

    /// Callback referenced an invoice with no local payment.
    #[error("unknown invoice: {0}")]
    UnknownInvoice(String),

    /// Operation is not allowed in the current status.
    #[error("cannot {operation} a payment in status {current}")]
    InvalidState {
        current: PaymentStatus,
        operation: &'static str,
    },

    /// State machine rejected the edge.
    #[error("invalid payment transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Callback disagrees with a terminal status already recorded.
    #[error("callback for invoice {invoice_id} reports {reported} but {recorded} is recorded")]
    ConflictingCallback {
        invoice_id: String,
        recorded: PaymentStatus,
        reported: PaymentStatus,
    },

    /// Gateway code/reason pair is not in the mapping table.
    #[error("unknown gateway status code={code} reason={reason}")]
    UnknownGatewayStatus { code: String, reason: String },

    /// Callback signature verification failed.
    #[error("invalid callback signature")]
    InvalidSignature,

    /// Gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(id: PaymentId) -> Self {
        PaymentError::NotFound(id)
    }

    pub fn unknown_invoice(invoice_id: impl Into<String>) -> Self {
        PaymentError::UnknownInvoice(invoice_id.into())
    }

    pub fn invalid_state(current: PaymentStatus, operation: &'static str) -> Self {
        PaymentError::InvalidState { current, operation }
    }

    pub fn invalid_transition(from: PaymentStatus, to: PaymentStatus) -> Self {
        PaymentError::InvalidTransition { from, to }
    }

    pub fn conflicting_callback(
        invoice_id: impl Into<String>,
        recorded: PaymentStatus,
        reported: PaymentStatus,
    ) -> Self {
        PaymentError::ConflictingCallback {
            invoice_id: invoice_id.into(),
            recorded,
            reported,
        }
    }

    pub fn unknown_gateway_status(code: impl Into<String>, reason: impl Into<String>) -> Self {
        PaymentError::UnknownGatewayStatus {
            code: code.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        PaymentError::Storage(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PaymentError::Validation { .. } => ErrorCode::ValidationFailed,
            PaymentError::NotFound(_) => ErrorCode::PaymentNotFound,
            PaymentError::UnknownInvoice(_) => ErrorCode::InvoiceNotFound,
            PaymentError::InvalidState { .. } => ErrorCode::InvalidState,
            PaymentError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            PaymentError::ConflictingCallback { .. } => ErrorCode::ConflictingCallback,
            PaymentError::UnknownGatewayStatus { .. } => ErrorCode::UnknownGatewayStatus,
            PaymentError::InvalidSignature => ErrorCode::InvalidSignature,
            PaymentError::Gateway(e) => match e.kind {
                GatewayErrorKind::Unavailable => ErrorCode::GatewayUnavailable,
                GatewayErrorKind::Rejected => ErrorCode::GatewayRejected,
                GatewayErrorKind::RefundRejected => ErrorCode::RefundRejected,
                GatewayErrorKind::InvalidResponse => ErrorCode::InternalError,
            },
            PaymentError::Storage(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Gateway(e) => e.is_transient(),
            PaymentError::Storage(_) => true,
            _ => false,
        }
    }

    /// Member-facing description. Never includes gateway payloads or internal codes.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation { message, .. } => message.clone(),
            PaymentError::NotFound(_) | PaymentError::UnknownInvoice(_) => {
                "Payment not found".to_string()
            }
            PaymentError::InvalidState { current, operation } => {
                format!("A {} payment cannot be {}", current, past_tense(operation))
            }
            PaymentError::Gateway(e) => match e.kind {
                GatewayErrorKind::Rejected => "The payment was declined".to_string(),
                GatewayErrorKind::RefundRejected => "The refund could not be processed".to_string(),
                GatewayErrorKind::Unavailable | GatewayErrorKind::InvalidResponse => {
                    "The payment provider is temporarily unavailable".to_string()
                }
            },
            PaymentError::InvalidSignature
            | PaymentError::InvalidTransition { .. }
            | PaymentError::ConflictingCallback { .. }
            | PaymentError::UnknownGatewayStatus { .. }
            | PaymentError::Storage(_) => "An internal error occurred".to_string(),
        }
    }
}

fn past_tense(operation: &str) -> String {
    match operation {
        "cancel" => "cancelled".to_string(),
        "refund" => "refunded".to_string(),
        "charge" => "charged".to_string(),
        other => format!("{}ed", other),
    }
}

impl From<DomainError> for PaymentError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => PaymentError::Validation {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "request".to_string()),
                message: err.message,
            },
            _ => PaymentError::Storage(err.to_string()),
        }
    }
}

impl From<ValidationError> for PaymentError {
    fn from(err: ValidationError) -> Self {
        PaymentError::Validation {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_kinds_map_to_codes() {
        let cases = [
            (GatewayError::unavailable("initiate_payment", "timeout"), ErrorCode::GatewayUnavailable),
            (GatewayError::rejected("initiate_payment", "bad request"), ErrorCode::GatewayRejected),
            (GatewayError::refund_rejected("refund_payment", "already refunded"), ErrorCode::RefundRejected),
            (GatewayError::invalid_response("check_payment_status", "eof"), ErrorCode::InternalError),
        ];
        for (err, code) in cases {
            assert_eq!(PaymentError::from(err).code(), code);
        }
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(PaymentError::from(GatewayError::unavailable("op", "503")).is_retryable());
        assert!(PaymentError::storage("connection reset").is_retryable());
        assert!(!PaymentError::from(GatewayError::rejected("op", "400")).is_retryable());
        assert!(!PaymentError::validation("amount", "must be positive").is_retryable());
        assert!(!PaymentError::invalid_transition(PaymentStatus::Failed, PaymentStatus::Completed)
            .is_retryable());
    }

    #[test]
    fn gateway_error_keeps_diagnostic_context() {
        let err = GatewayError::rejected("initiate_payment", "currency not supported")
            .with_invoice("INV-1")
            .with_http_status(422)
            .with_gateway_code("E_CURRENCY");

        assert_eq!(err.invoice_id.as_deref(), Some("INV-1"));
        assert_eq!(err.http_status, Some(422));
        assert_eq!(err.gateway_code.as_deref(), Some("E_CURRENCY"));
        assert_eq!(
            err.to_string(),
            "gateway initiate_payment failed (rejected): currency not supported"
        );
    }

    #[test]
    fn user_message_hides_gateway_detail() {
        let err = PaymentError::from(
            GatewayError::rejected("charge_card", "raw: {\"code\":\"E42\"}").with_gateway_code("E42"),
        );
        let message = err.user_message();
        assert!(!message.contains("E42"));
        assert_eq!(message, "The payment was declined");
    }

    #[test]
    fn user_message_for_invalid_state() {
        let err = PaymentError::invalid_state(PaymentStatus::Completed, "cancel");
        assert_eq!(err.user_message(), "A completed payment cannot be cancelled");
    }

    #[test]
    fn domain_error_becomes_storage() {
        let err: PaymentError = DomainError::database("pool timed out").into();
        assert!(matches!(err, PaymentError::Storage(ref m) if m.contains("pool timed out")));
    }

    #[test]
    fn domain_validation_error_stays_validation() {
        let err: PaymentError =
            DomainError::validation("invoice_id", "Invoice INV-1 already exists").into();
        assert!(matches!(err, PaymentError::Validation { ref field, .. } if field == "invoice_id"));
    }

    #[test]
    fn validation_error_converts_with_field() {
        let err: PaymentError = ValidationError::not_positive("amount", 0).into();
        assert!(matches!(err, PaymentError::Validation { ref field, .. } if field == "amount"));
    }

    #[test]
    fn unauthorized_is_detected_from_status() {
        let err = GatewayError::rejected("get_auth_token", "expired").with_http_status(401);
        assert!(err.is_unauthorized());
    }
}
