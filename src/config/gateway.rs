//! Payment gateway configuration

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::adapters::gateway::{HttpGatewayConfig, DEFAULT_TOKEN_MARGIN_SECS};

use super::error::ValidationError;

/// Gateway credentials, endpoints and client behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// API root for invoice, charge, status, refund and cancel calls
    pub base_url: String,

    /// OAuth2 client-credentials token endpoint
    pub token_url: String,

    pub client_id: String,

    pub client_secret: SecretString,

    /// Shared secret for callback signatures
    pub webhook_secret: SecretString,

    #[serde(default = "default_scope")]
    pub scope: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Refresh the token when fewer than this many seconds remain
    #[serde(default = "default_token_margin")]
    pub token_margin_secs: i64,
}

impl GatewayConfig {
    /// Settings for the HTTP adapter.
    pub fn http_config(&self) -> HttpGatewayConfig {
        HttpGatewayConfig::new(
            &self.base_url,
            &self.token_url,
            &self.client_id,
            self.client_secret.clone(),
        )
        .with_scope(&self.scope)
        .with_timeout(Duration::from_secs(self.timeout_secs))
        .with_token_margin(chrono::Duration::seconds(self.token_margin_secs))
    }

    /// Validate gateway configuration
    ///
    /// Plain HTTP endpoints are refused in production.
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        check_url(&self.base_url, "GATEWAY__BASE_URL", production)?;
        check_url(&self.token_url, "GATEWAY__TOKEN_URL", production)?;
        if self.client_id.trim().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__CLIENT_ID"));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__CLIENT_SECRET"));
        }
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__WEBHOOK_SECRET"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        if !(1..=3600).contains(&self.token_margin_secs) {
            return Err(ValidationError::InvalidTokenMargin);
        }
        Ok(())
    }
}

fn check_url(url: &str, name: &'static str, production: bool) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::MissingRequired(name));
    }
    if production && !url.starts_with("https://") {
        return Err(ValidationError::GatewayUrlMustBeHttps(name));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ValidationError::InvalidGatewayUrl(name));
    }
    Ok(())
}

fn default_scope() -> String {
    "payment".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_token_margin() -> i64 {
    DEFAULT_TOKEN_MARGIN_SECS
}
