//! Payment handlers.
//!
//! Command and query handlers for the payment lifecycle:
//!
//! ## Commands
//! - Initiating a gateway-hosted payment
//! - Charging a saved card
//! - Cancelling an open payment
//! - Refunding a completed payment
//! - Processing gateway callbacks
//!
//! ## Queries
//! - Verifying status against the gateway
//!
//! All status changes go through [`PaymentTransitioner`].

mod cancel_payment;
mod handle_gateway_callback;
mod initiate_payment;
mod pay_with_saved_card;
mod refund_payment;
mod transition;
mod verify_payment_status;

// Commands
pub use cancel_payment::{CancelPaymentCommand, CancelPaymentHandler, CancelPaymentResult};
pub use handle_gateway_callback::{CallbackOutcome, HandleGatewayCallbackHandler};
pub use initiate_payment::{
    InitiatePaymentCommand, InitiatePaymentHandler, InitiatePaymentResult,
    DEFAULT_PAYMENT_TTL_MINUTES,
};
pub use pay_with_saved_card::{
    PayWithSavedCardCommand, PayWithSavedCardHandler, PayWithSavedCardResult,
};
pub use refund_payment::{RefundPaymentCommand, RefundPaymentHandler, RefundPaymentResult};

// Queries
pub use verify_payment_status::{
    VerifyPaymentStatusHandler, VerifyPaymentStatusQuery, VerifyPaymentStatusResult,
    DEFAULT_FRESHNESS_SECS,
};

// Shared
pub use transition::{
    PaymentTransitioner, TransitionOutcome, TransitionSource, DEFAULT_MAX_ATTEMPTS,
};

#[cfg(test)]
pub(crate) use transition::test_support;
