//! HTTP handler for gateway callbacks.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::handlers::payment::{CallbackOutcome, HandleGatewayCallbackHandler};
use crate::domain::payment::PaymentError;

/// Header carrying `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the webhook route.
#[derive(Clone)]
pub struct WebhookAppState {
    pub callback_handler: Arc<HandleGatewayCallbackHandler>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Body returned to the gateway.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// Body returned when the callback was not accepted.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/gateway - Receive a gateway callback.
///
/// The signature is checked by the callback handler. Everything it
/// understood, applied or not, is acknowledged with 200 so the gateway
/// stops redelivering.
pub async fn handle_gateway_callback(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.callback_handler.handle(&body, signature).await?;
    let status = match outcome {
        CallbackOutcome::Applied => "applied",
        CallbackOutcome::Duplicate => "duplicate",
        CallbackOutcome::Rejected(_) => "ignored",
    };

    Ok((StatusCode::OK, Json(WebhookAck { status })))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts callback failures to HTTP responses.
pub struct WebhookApiError(PaymentError);

impl From<PaymentError> for WebhookApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PaymentError::InvalidSignature => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error_code: self.0.code().to_string(),
            message: self.0.user_message(),
        };
        (status, Json(body)).into_response()
    }
}
