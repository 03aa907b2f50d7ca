//! PaymentServices - the payment handlers wired over one set of ports.
//!
//! Built once at startup so that every handler shares the same transitioner
//! and the configured payment TTL, freshness threshold and status retry.

use std::sync::Arc;

use chrono::Duration;

use crate::domain::payment::CallbackSignatureVerifier;
use crate::ports::{PaymentGateway, PaymentRepository, SavedCardRepository};

use super::handlers::payment::{
    CancelPaymentHandler, HandleGatewayCallbackHandler, InitiatePaymentHandler,
    PayWithSavedCardHandler, PaymentTransitioner, RefundPaymentHandler,
    VerifyPaymentStatusHandler,
};
use super::retry::RetryPolicy;

/// Tunables shared by the payment handlers.
#[derive(Debug, Clone, Copy)]
pub struct PaymentSettings {
    /// How long a new payment stays payable.
    pub ttl: Duration,
    /// Age after which an open payment is polled on status checks.
    pub freshness: Duration,
    pub status_retry: RetryPolicy,
}

/// Ports the payment handlers run against.
#[derive(Clone)]
pub struct PaymentPorts {
    pub gateway: Arc<dyn PaymentGateway>,
    pub repository: Arc<dyn PaymentRepository>,
    pub saved_cards: Arc<dyn SavedCardRepository>,
    pub transitioner: Arc<PaymentTransitioner>,
}

#[derive(Clone)]
pub struct PaymentServices {
    pub initiate: Arc<InitiatePaymentHandler>,
    pub pay_with_saved_card: Arc<PayWithSavedCardHandler>,
    pub cancel: Arc<CancelPaymentHandler>,
    pub refund: Arc<RefundPaymentHandler>,
    pub verify_status: Arc<VerifyPaymentStatusHandler>,
    pub callbacks: Arc<HandleGatewayCallbackHandler>,
}

impl PaymentServices {
    pub fn new(
        ports: PaymentPorts,
        verifier: CallbackSignatureVerifier,
        settings: PaymentSettings,
    ) -> Self {
        let PaymentPorts {
            gateway,
            repository,
            saved_cards,
            transitioner,
        } = ports;

        Self {
            initiate: Arc::new(
                InitiatePaymentHandler::new(gateway.clone(), repository.clone())
                    .with_ttl(settings.ttl),
            ),
            pay_with_saved_card: Arc::new(
                PayWithSavedCardHandler::new(
                    gateway.clone(),
                    repository.clone(),
                    saved_cards,
                    transitioner.clone(),
                )
                .with_ttl(settings.ttl),
            ),
            cancel: Arc::new(CancelPaymentHandler::new(
                gateway.clone(),
                repository.clone(),
                transitioner.clone(),
            )),
            refund: Arc::new(RefundPaymentHandler::new(
                gateway.clone(),
                repository.clone(),
                transitioner.clone(),
            )),
            verify_status: Arc::new(
                VerifyPaymentStatusHandler::new(gateway, repository.clone(), transitioner.clone())
                    .with_freshness(settings.freshness)
                    .with_retry_policy(settings.status_retry),
            ),
            callbacks: Arc::new(HandleGatewayCallbackHandler::new(
                repository,
                transitioner,
                verifier,
            )),
        }
    }
}
