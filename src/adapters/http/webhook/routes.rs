//! Axum router for the public webhook endpoint.

use axum::{routing::post, Router};

use super::handlers::{handle_gateway_callback, WebhookAppState};

/// Create the webhook router.
///
/// Mounted without session authentication; callbacks are authenticated by
/// their signature.
///
/// # Routes
/// - `POST /webhooks/gateway` - Gateway payment callbacks
pub fn webhook_router() -> Router<WebhookAppState> {
    Router::new().route("/webhooks/gateway", post(handle_gateway_callback))
}
