//! Gateway status mapping tables.
//!
//! The gateway reports outcomes as a `(code, reason)` pair on callbacks and
//! as a transaction status string on status polls. Both are resolved here
//! through fixed tables. Anything not listed fails closed with
//! `UnknownGatewayStatus`; nothing defaults to success.

use super::{PaymentError, PaymentStatus};

/// Callback `(code, reason)` pairs and the status each one reports.
pub const CALLBACK_STATUS_TABLE: &[((&str, &str), PaymentStatus)] = &[
    (("ok", "success"), PaymentStatus::Completed),
    (("ok", "processing"), PaymentStatus::Processing),
    (("error", "declined"), PaymentStatus::Failed),
    (("error", "insufficient_funds"), PaymentStatus::Failed),
    (("error", "card_expired"), PaymentStatus::Failed),
    (("error", "3ds_failed"), PaymentStatus::Failed),
    (("error", "cancelled_by_user"), PaymentStatus::Cancelled),
    (("error", "timeout"), PaymentStatus::Expired),
];

/// Transaction status strings returned by the status endpoint.
pub const TRANSACTION_STATUS_TABLE: &[(&str, PaymentStatus)] = &[
    ("NEW", PaymentStatus::Pending),
    ("AUTH", PaymentStatus::Processing),
    ("3D", PaymentStatus::Processing),
    ("CHARGE", PaymentStatus::Completed),
    ("CANCEL", PaymentStatus::Cancelled),
    ("REJECT", PaymentStatus::Failed),
    ("FAILED", PaymentStatus::Failed),
    ("REFUND", PaymentStatus::Refunded),
];

/// Resolves a callback's `(code, reason)` pair.
///
/// Matching ignores case and surrounding whitespace.
///
/// # Errors
///
/// `UnknownGatewayStatus` for any pair not in [`CALLBACK_STATUS_TABLE`].
pub fn map_callback_status(code: &str, reason: &str) -> Result<PaymentStatus, PaymentError> {
    let code_norm = code.trim().to_ascii_lowercase();
    let reason_norm = reason.trim().to_ascii_lowercase();
    CALLBACK_STATUS_TABLE
        .iter()
        .find(|((c, r), _)| *c == code_norm && *r == reason_norm)
        .map(|(_, status)| *status)
        .ok_or_else(|| PaymentError::unknown_gateway_status(code, reason))
}

/// Resolves a polled transaction status.
///
/// # Errors
///
/// `UnknownGatewayStatus` for any status not in [`TRANSACTION_STATUS_TABLE`].
pub fn map_transaction_status(status: &str) -> Result<PaymentStatus, PaymentError> {
    let status_norm = status.trim().to_ascii_uppercase();
    TRANSACTION_STATUS_TABLE
        .iter()
        .find(|(s, _)| *s == status_norm)
        .map(|(_, mapped)| *mapped)
        .ok_or_else(|| PaymentError::unknown_gateway_status(status, ""))
}
