//! Gateway callback payload.

use serde::Deserialize;
use thiserror::Error;

use super::{Currency, GatewayConfirmation};

/// Errors decoding a callback body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackPayloadError {
    #[error("callback body is not valid JSON: {0}")]
    Malformed(String),

    #[error("callback is missing field: {0}")]
    MissingField(&'static str),
}

impl CallbackPayloadError {
    /// Name of the field the error concerns, for validation reporting.
    pub fn field(&self) -> &'static str {
        match self {
            CallbackPayloadError::Malformed(_) => "body",
            CallbackPayloadError::MissingField(field) => field,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCallback {
    invoice_id: Option<String>,
    code: Option<String>,
    reason: Option<String>,
    reason_code: Option<String>,
    id: Option<String>,
    card_mask: Option<String>,
    approval_code: Option<String>,
    amount: Option<i64>,
    currency: Option<String>,
}

/// Decoded callback notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub invoice_id: String,
    pub code: String,
    pub reason: String,
    pub reason_code: Option<String>,
    pub transaction_id: Option<String>,
    pub card_mask: Option<String>,
    pub approval_code: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl GatewayCallback {
    /// Decodes a raw callback body.
    ///
    /// # Errors
    ///
    /// - `Malformed` if the body is not a JSON object of the expected shape
    /// - `MissingField` if `invoiceId` or `code` is absent or blank
    pub fn parse(body: &[u8]) -> Result<Self, CallbackPayloadError> {
        let raw: RawCallback = serde_json::from_slice(body)
            .map_err(|e| CallbackPayloadError::Malformed(e.to_string()))?;

        let invoice_id = raw
            .invoice_id
            .filter(|s| !s.trim().is_empty())
            .ok_or(CallbackPayloadError::MissingField("invoiceId"))?;
        let code = raw
            .code
            .filter(|s| !s.trim().is_empty())
            .ok_or(CallbackPayloadError::MissingField("code"))?;

        Ok(Self {
            invoice_id,
            code,
            reason: raw.reason.unwrap_or_default(),
            reason_code: raw.reason_code,
            transaction_id: raw.id,
            card_mask: raw.card_mask,
            approval_code: raw.approval_code,
            amount: raw.amount,
            currency: raw.currency,
        })
    }

    /// Confirmation details carried by a success callback.
    pub fn confirmation(&self) -> GatewayConfirmation {
        GatewayConfirmation {
            transaction_id: self.transaction_id.clone(),
            card_mask: self.card_mask.clone(),
            approval_code: self.approval_code.clone(),
        }
    }

    /// Error code recorded on a failed payment.
    pub fn failure_code(&self) -> String {
        self.reason_code
            .clone()
            .unwrap_or_else(|| self.reason.clone())
    }

    /// Checks the reported amount and currency against the expected ones.
    ///
    /// Absent values are not a mismatch.
    pub fn mismatch(&self, amount: i64, currency: &Currency) -> Option<String> {
        if let Some(reported) = self.amount {
            if reported != amount {
                return Some(format!("amount {} does not match {}", reported, amount));
            }
        }
        if let Some(reported) = &self.currency {
            if !reported.eq_ignore_ascii_case(currency.as_str()) {
                return Some(format!("currency {} does not match {}", reported, currency));
            }
        }
        None
    }
}
