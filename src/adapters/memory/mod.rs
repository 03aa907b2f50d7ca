//! In-memory adapters for tests and database-less runs.

mod payment_repository;
mod saved_card_repository;

pub use payment_repository::InMemoryPaymentRepository;
pub use saved_card_repository::InMemorySavedCardRepository;
