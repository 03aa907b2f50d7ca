//! HTTP payment gateway adapter.
//!
//! Implements `PaymentGateway` against the processor's REST API using
//! `reqwest`. Every API call carries a bearer token from the shared
//! [`TokenCache`] and the configured timeout.
//!
//! # Error classification
//!
//! | Response | Kind |
//! |----------|------|
//! | network failure, timeout, 5xx | `Unavailable` |
//! | 4xx | `Rejected` |
//! | refund 4xx, refund with non-ok code | `RefundRejected` |
//! | 2xx with undecodable body | `InvalidResponse` |
//!
//! A 401 also invalidates the cached token. Nothing is retried here.
//!
//! Invoice ids are pushed as single percent-encoded path segments, so an id
//! can never address another invoice or action.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::domain::payment::{GatewayError, GatewayErrorKind};
use crate::ports::{
    ChargeCardRequest, ChargeResult, GatewayTransaction, InitiatePaymentRequest, InvoiceCreated,
    PaymentGateway, RefundRequest,
};

use super::token_cache::{IssuedToken, TokenCache, DEFAULT_TOKEN_MARGIN_SECS};
use super::wire::{
    ChargeBody, CreateInvoiceBody, InvoiceResponse, OperationResponse, RefundBody,
    StatusResponse, TokenResponse,
};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Configuration for the HTTP gateway adapter.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// API root, e.g. `https://api.gateway.example/v2`.
    pub base_url: String,
    /// OAuth2 client-credentials token endpoint.
    pub token_url: String,
    pub client_id: String,
    client_secret: SecretString,
    pub scope: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Remaining validity below which the token is refreshed.
    pub token_margin: chrono::Duration,
}

impl HttpGatewayConfig {
    pub fn new(
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            scope: "payment".to_string(),
            timeout: Duration::from_secs(30),
            token_margin: chrono::Duration::seconds(DEFAULT_TOKEN_MARGIN_SECS),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_token_margin(mut self, margin: chrono::Duration) -> Self {
        self.token_margin = margin;
        self
    }
}

/// `PaymentGateway` over HTTP.
pub struct HttpPaymentGateway {
    config: HttpGatewayConfig,
    api_root: Url,
    client: Client,
    tokens: TokenCache,
}

impl HttpPaymentGateway {
    /// Creates the adapter. The first token is fetched lazily.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let api_root = Url::parse(&config.base_url).map_err(|e| {
            GatewayError::unavailable("build_client", format!("invalid base url: {}", e))
        })?;
        if api_root.cannot_be_a_base() {
            return Err(GatewayError::unavailable(
                "build_client",
                format!("base url {} cannot carry a path", config.base_url),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::unavailable("build_client", e.to_string()))?;

        Ok(Self {
            tokens: TokenCache::new(config.token_margin),
            config,
            api_root,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn invoice_url(
        &self,
        operation: &'static str,
        invoice_id: &str,
        action: &str,
    ) -> Result<Url, GatewayError> {
        // Dot segments are dropped by URL normalisation.
        if invoice_id.is_empty() || invoice_id == "." || invoice_id == ".." {
            return Err(GatewayError::rejected(operation, "invalid invoice id")
                .with_invoice(invoice_id));
        }
        Ok(self.endpoint(&["invoices", invoice_id, action]))
    }

    async fn fetch_token(&self) -> Result<IssuedToken, GatewayError> {
        const OP: &str = "get_auth_token";
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("scope", self.config.scope.as_str()),
        ];
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form[..])
            .send()
            .await
            .map_err(|e| transport_error(OP, e))?;

        let token: TokenResponse = decode(OP, response).await?;
        Ok(IssuedToken {
            access_token: SecretString::new(token.access_token),
            expires_in_secs: token.expires_in,
        })
    }

    /// Sends an authenticated request and returns the raw response.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, GatewayError> {
        let token = self.get_auth_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        Ok(response)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(operation, request).await?;
        decode(operation, response).await
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn get_auth_token(&self) -> Result<String, GatewayError> {
        self.tokens.get_or_refresh(|| self.fetch_token()).await
    }

    async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<InvoiceCreated, GatewayError> {
        let body = CreateInvoiceBody {
            account_id: request.member_id.to_string(),
            amount: request.amount,
            currency: request.currency.as_str(),
            description: &request.description,
        };
        let created: InvoiceResponse = self
            .call(
                "initiate_payment",
                self.client
                    .post(self.endpoint(&["invoices"]))
                    .json(&body),
            )
            .await?;

        tracing::debug!(invoice_id = %created.invoice_id, "gateway invoice created");
        Ok(InvoiceCreated {
            invoice_id: created.invoice_id,
            redirect_url: created.redirect_url,
        })
    }

    async fn charge_card_with_token(
        &self,
        request: ChargeCardRequest,
    ) -> Result<ChargeResult, GatewayError> {
        const OP: &str = "charge_card_with_token";
        let url = self.invoice_url(OP, &request.invoice_id, "charge")?;
        let body = ChargeBody {
            invoice_id: &request.invoice_id,
            account_id: request.member_id.to_string(),
            card_token: &request.card_token,
            amount: request.amount,
            currency: request.currency.as_str(),
        };
        let response: OperationResponse = self
            .call(
                OP,
                self.client
                    .post(url)
                    .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
                    .json(&body),
            )
            .await
            .map_err(|e| e.with_invoice(&request.invoice_id))?;

        if !response.is_ok() {
            tracing::warn!(
                invoice_id = %request.invoice_id,
                code = %response.code,
                "saved card charge declined"
            );
            return Ok(ChargeResult::Declined {
                message: response.message(),
                code: response.code,
            });
        }

        let transaction = response.transaction.ok_or_else(|| {
            GatewayError::invalid_response(OP, "approved charge without transaction")
                .with_invoice(&request.invoice_id)
        })?;
        Ok(ChargeResult::Approved {
            transaction_id: transaction.id,
            approval_code: transaction.approval_code,
            card_mask: transaction.card_mask,
        })
    }

    async fn check_payment_status(
        &self,
        invoice_id: &str,
    ) -> Result<Option<GatewayTransaction>, GatewayError> {
        const OP: &str = "check_payment_status";
        let url = self.invoice_url(OP, invoice_id, "status")?;
        let response = self
            .send(OP, self.client.get(url))
            .await
            .map_err(|e| e.with_invoice(invoice_id))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status: StatusResponse = decode(OP, response)
            .await
            .map_err(|e| e.with_invoice(invoice_id))?;
        if status.result_code != 0 {
            return Err(GatewayError::rejected(
                OP,
                status.result_message.unwrap_or_default(),
            )
            .with_invoice(invoice_id)
            .with_gateway_code(status.result_code.to_string()));
        }

        status
            .transaction
            .map(|tx| tx.into_transaction(invoice_id))
            .transpose()
            .map_err(|field| {
                GatewayError::invalid_response(OP, format!("missing {}", field))
                    .with_invoice(invoice_id)
            })
    }

    async fn refund_payment(&self, request: RefundRequest) -> Result<(), GatewayError> {
        const OP: &str = "refund_payment";
        let url = self.invoice_url(OP, &request.invoice_id, "refund")?;
        let response: OperationResponse = self
            .call(
                OP,
                self.client
                    .post(url)
                    .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
                    .json(&RefundBody {
                        amount: request.amount,
                    }),
            )
            .await
            .map_err(|e| {
                let e = e.with_invoice(&request.invoice_id);
                if e.kind == GatewayErrorKind::Rejected && !e.is_unauthorized() {
                    GatewayError {
                        kind: GatewayErrorKind::RefundRejected,
                        ..e
                    }
                } else {
                    e
                }
            })?;

        if !response.is_ok() {
            return Err(GatewayError::refund_rejected(OP, response.message())
                .with_invoice(&request.invoice_id)
                .with_gateway_code(response.code));
        }
        Ok(())
    }

    async fn cancel_payment(&self, invoice_id: &str) -> Result<(), GatewayError> {
        const OP: &str = "cancel_payment";
        let url = self.invoice_url(OP, invoice_id, "cancel")?;
        let response: OperationResponse = self
            .call(OP, self.client.post(url))
            .await
            .map_err(|e| e.with_invoice(invoice_id))?;

        if !response.is_ok() {
            return Err(GatewayError::rejected(OP, response.message())
                .with_invoice(invoice_id)
                .with_gateway_code(response.code));
        }
        Ok(())
    }
}

fn transport_error(operation: &'static str, e: reqwest::Error) -> GatewayError {
    let message = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    tracing::warn!(operation, error = %message, "gateway request failed");
    GatewayError::unavailable(operation, message)
}

/// Classifies the status and decodes a 2xx body.
async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(operation, e))?;

    if !status.is_success() {
        let error = classify_status(operation, status, &body);
        tracing::warn!(
            operation,
            http_status = status.as_u16(),
            kind = %error.kind,
            body = %String::from_utf8_lossy(&body),
            "gateway returned an error status"
        );
        return Err(error);
    }

    serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(operation, error = %e, "gateway response could not be decoded");
        GatewayError::invalid_response(operation, e.to_string()).with_http_status(status.as_u16())
    })
}

fn classify_status(operation: &'static str, status: StatusCode, body: &[u8]) -> GatewayError {
    let detail = serde_json::from_slice::<OperationResponse>(body).ok();
    let message = detail
        .as_ref()
        .map(OperationResponse::message)
        .unwrap_or_else(|| format!("HTTP {}", status));

    let kind = if status.is_client_error() {
        GatewayErrorKind::Rejected
    } else {
        GatewayErrorKind::Unavailable
    };
    let error = GatewayError::new(kind, operation, message).with_http_status(status.as_u16());
    match detail {
        Some(detail) => error.with_gateway_code(detail.code),
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_unavailable() {
        let error = classify_status("initiate_payment", StatusCode::BAD_GATEWAY, b"");
        assert_eq!(error.kind, GatewayErrorKind::Unavailable);
        assert!(error.is_transient());
        assert_eq!(error.http_status, Some(502));
    }

    #[test]
    fn client_errors_are_rejected_with_gateway_code() {
        let error = classify_status(
            "initiate_payment",
            StatusCode::UNPROCESSABLE_ENTITY,
            br#"{"code":"invalid_amount","message":"amount must be positive"}"#,
        );
        assert_eq!(error.kind, GatewayErrorKind::Rejected);
        assert_eq!(error.gateway_code.as_deref(), Some("invalid_amount"));
        assert_eq!(error.message, "amount must be positive");
    }

    #[test]
    fn unauthorized_is_flagged() {
        let error = classify_status("cancel_payment", StatusCode::UNAUTHORIZED, b"");
        assert!(error.is_unauthorized());
        assert!(!error.is_transient());
    }

    #[test]
    fn config_trims_trailing_slash() {
        let config = HttpGatewayConfig::new(
            "https://api.gateway.test/v2/",
            "https://auth.gateway.test/oauth2/token",
            "client",
            SecretString::new("secret".to_string()),
        );
        assert_eq!(config.base_url, "https://api.gateway.test/v2");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    fn gateway(base_url: &str) -> HttpPaymentGateway {
        HttpPaymentGateway::new(HttpGatewayConfig::new(
            base_url,
            "https://auth.gateway.test/oauth2/token",
            "client",
            SecretString::new("secret".to_string()),
        ))
        .unwrap()
    }

    #[test]
    fn invoice_url_keeps_the_id_in_one_segment() {
        let gateway = gateway("https://api.gateway.test/v2");

        let url = gateway
            .invoice_url("charge_card_with_token", "INV-OTHER/refund?x=", "charge")
            .unwrap();

        assert_eq!(url.path(), "/v2/invoices/INV-OTHER%2Frefund%3Fx=/charge");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn invoice_url_appends_to_the_api_root() {
        let gateway = gateway("https://api.gateway.test/v2/");

        let url = gateway.invoice_url("refund_payment", "INV-9", "refund").unwrap();

        assert_eq!(url.as_str(), "https://api.gateway.test/v2/invoices/INV-9/refund");
        assert_eq!(
            gateway.endpoint(&["invoices"]).as_str(),
            "https://api.gateway.test/v2/invoices"
        );
    }

    #[test]
    fn dot_segment_invoice_ids_are_rejected() {
        let gateway = gateway("https://api.gateway.test/v2");

        for invoice_id in ["", ".", ".."] {
            let error = gateway
                .invoice_url("cancel_payment", invoice_id, "cancel")
                .unwrap_err();
            assert_eq!(error.kind, GatewayErrorKind::Rejected);
            assert_eq!(error.http_status, None);
        }
    }

    #[test]
    fn unparseable_base_url_is_refused() {
        let config = HttpGatewayConfig::new(
            "not a url",
            "https://auth.gateway.test/oauth2/token",
            "client",
            SecretString::new("secret".to_string()),
        );
        assert!(HttpPaymentGateway::new(config).is_err());
    }
}
