//! Payment gateway port.
//!
//! Defines the contract for the external card processor: invoice creation,
//! saved-card charges, status polls, refunds and cancellations.
//!
//! # Design
//!
//! - **No retries inside**: implementations never retry; callers decide
//! - **Idempotency keys**: charges and refunds carry a caller-supplied key
//! - **Typed failures**: every error is a [`GatewayError`] with its kind and context

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::MemberId;
use crate::domain::payment::{Currency, GatewayError};

/// Port for the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns a bearer token valid for at least the configured safety margin.
    async fn get_auth_token(&self) -> Result<String, GatewayError>;

    /// Creates an invoice and returns where to send the member.
    async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<InvoiceCreated, GatewayError>;

    /// Charges a saved card synchronously.
    ///
    /// A decline is a successful call returning [`ChargeResult::Declined`].
    async fn charge_card_with_token(
        &self,
        request: ChargeCardRequest,
    ) -> Result<ChargeResult, GatewayError>;

    /// Polls the gateway's view of an invoice.
    ///
    /// Returns `None` when the gateway has no transaction for it yet.
    async fn check_payment_status(
        &self,
        invoice_id: &str,
    ) -> Result<Option<GatewayTransaction>, GatewayError>;

    /// Refunds a captured payment, fully when `amount` is `None`.
    async fn refund_payment(&self, request: RefundRequest) -> Result<(), GatewayError>;

    /// Voids an authorized but uncaptured transaction.
    async fn cancel_payment(&self, invoice_id: &str) -> Result<(), GatewayError>;
}

/// Request to create an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    pub member_id: MemberId,
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
}

/// Invoice created at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub invoice_id: String,
    pub redirect_url: String,
}

/// Request to charge a saved card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeCardRequest {
    pub member_id: MemberId,
    pub card_token: String,
    pub invoice_id: String,
    pub amount: i64,
    pub currency: Currency,
    pub idempotency_key: String,
}

/// Outcome of a saved-card charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeResult {
    Approved {
        transaction_id: String,
        approval_code: Option<String>,
        card_mask: Option<String>,
    },
    Declined {
        code: String,
        message: String,
    },
}

/// Gateway-side transaction as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub id: String,
    pub invoice_id: String,
    pub amount: i64,
    pub currency: String,
    /// Raw gateway status, resolved through the transaction status table.
    pub status: String,
    pub card_mask: Option<String>,
    pub approval_code: Option<String>,
    pub reference: Option<String>,
}

/// Request to refund a captured payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub invoice_id: String,
    /// Partial amount; `None` refunds in full.
    pub amount: Option<i64>,
    pub idempotency_key: String,
}
