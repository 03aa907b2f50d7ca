//! PostgreSQL adapters.
//!
//! Schema lives in `migrations/`.

mod payment_repository;
mod saved_card_repository;

pub use payment_repository::PostgresPaymentRepository;
pub use saved_card_repository::PostgresSavedCardRepository;
