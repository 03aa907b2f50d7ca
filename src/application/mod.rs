//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers change payments; the status query reconciles them with
//! the gateway; the sweeper expires abandoned ones in the background.
//! `PaymentServices` wires the handlers together at startup.

pub mod handlers;
pub mod retry;
pub mod services;
pub mod sweeper;

pub use handlers::payment::{
    CallbackOutcome, CancelPaymentCommand, CancelPaymentHandler, CancelPaymentResult,
    HandleGatewayCallbackHandler, InitiatePaymentCommand, InitiatePaymentHandler,
    InitiatePaymentResult, PayWithSavedCardCommand, PayWithSavedCardHandler,
    PayWithSavedCardResult, PaymentTransitioner, RefundPaymentCommand, RefundPaymentHandler,
    RefundPaymentResult, TransitionOutcome, TransitionSource, VerifyPaymentStatusHandler,
    VerifyPaymentStatusQuery, VerifyPaymentStatusResult,
};
pub use retry::RetryPolicy;
pub use services::{PaymentPorts, PaymentServices, PaymentSettings};
pub use sweeper::{ExpirySweeper, ExpirySweeperConfig, SweepReport};
