//! HTTP adapters - inbound routes.

pub mod webhook;

pub use webhook::{webhook_router, WebhookAppState};
