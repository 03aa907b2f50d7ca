//! Gateway wire types.
//!
//! These types mirror the processor's JSON. Amounts are integers in the
//! smallest currency unit.

use serde::{Deserialize, Deserializer, Serialize};

use crate::ports::GatewayTransaction;

/// Gateway code for a successful operation.
pub const CODE_OK: &str = "ok";

// ════════════════════════════════════════════════════════════════════════════════
// Auth
// ════════════════════════════════════════════════════════════════════════════════

/// Client-credentials token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Accepts `3600` as well as `"3600"`.
fn number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceBody<'a> {
    pub account_id: String,
    pub amount: i64,
    pub currency: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeBody<'a> {
    pub invoice_id: &'a str,
    pub account_id: String,
    pub card_token: &'a str,
    pub amount: i64,
    pub currency: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub invoice_id: String,
    pub redirect_url: String,
}

/// `{code, message}` result returned by charge, refund and cancel.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub transaction: Option<TransactionWire>,
}

impl OperationResponse {
    pub fn is_ok(&self) -> bool {
        self.code.eq_ignore_ascii_case(CODE_OK)
    }

    pub fn message(&self) -> String {
        self.message.clone().unwrap_or_else(|| self.code.clone())
    }
}

/// Invoice status response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(deserialize_with = "number_or_string")]
    pub result_code: i64,
    #[serde(default)]
    pub result_message: Option<String>,
    #[serde(default)]
    pub transaction: Option<TransactionWire>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionWire {
    pub id: String,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub card_mask: Option<String>,
    #[serde(default)]
    pub approval_code: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl TransactionWire {
    /// Converts a status-endpoint transaction, which must be complete.
    pub fn into_transaction(self, invoice_id: &str) -> Result<GatewayTransaction, &'static str> {
        Ok(GatewayTransaction {
            invoice_id: self.invoice_id.unwrap_or_else(|| invoice_id.to_string()),
            amount: self.amount.ok_or("transaction.amount")?,
            currency: self.currency.ok_or("transaction.currency")?,
            status: self.status.ok_or("transaction.status")?,
            id: self.id,
            card_mask: self.card_mask,
            approval_code: self.approval_code,
            reference: self.reference,
        })
    }
}
