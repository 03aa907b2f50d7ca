//! Ports layer - interfaces for external dependencies.
//!
//! Ports define the contracts between the domain/application layers and
//! the outside world. Adapters implement them.
//!
//! - `PaymentGateway` - external card processor
//! - `PaymentRepository` - payment persistence with compare-and-swap writes
//! - `SavedCardRepository` - saved card token persistence
//! - `PaymentNotifier` - best-effort member notifications

mod payment_gateway;
mod payment_notifier;
mod payment_repository;
mod saved_card_repository;

pub use payment_gateway::{
    ChargeCardRequest, ChargeResult, GatewayTransaction, InitiatePaymentRequest, InvoiceCreated,
    PaymentGateway, RefundRequest,
};
pub use payment_notifier::PaymentNotifier;
pub use payment_repository::{PaymentRepository, WriteOutcome};
pub use saved_card_repository::SavedCardRepository;
