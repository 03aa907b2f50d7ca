//! Payment domain module.
//!
//! Contains the payment aggregate, its lifecycle state machine, gateway
//! status mapping, and the callback payload and signature primitives used
//! by the callback processor.

mod aggregate;
mod callback;
mod currency;
mod errors;
mod method;
mod saved_card;
mod signature;
mod state_machine;
mod status;
mod status_mapping;

pub use aggregate::{GatewayConfirmation, NewPayment, Payment, StatusUpdate};
pub use callback::{CallbackPayloadError, GatewayCallback};
pub use currency::Currency;
pub use errors::{GatewayError, GatewayErrorKind, PaymentError};
pub use method::{PaymentMethod, PaymentType};
pub use saved_card::SavedCard;
pub use signature::{CallbackSignatureVerifier, SignatureError, SignatureHeader};
pub use state_machine::PaymentStateMachine;
pub use status::PaymentStatus;
pub use status_mapping::{
    map_callback_status, map_transaction_status, CALLBACK_STATUS_TABLE, TRANSACTION_STATUS_TABLE,
};

#[cfg(test)]
pub(crate) use aggregate::test_support;
