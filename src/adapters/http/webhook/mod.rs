//! Webhook HTTP adapter.
//!
//! Exposes the gateway callback endpoint and forwards the raw body and
//! signature header to the callback handler.

mod handlers;
mod routes;

pub use handlers::{WebhookAppState, SIGNATURE_HEADER};
pub use routes::webhook_router;
