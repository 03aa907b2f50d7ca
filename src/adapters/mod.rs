//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `gateway` - HTTP payment gateway client, token cache and a scriptable mock
//! - `memory` - In-memory repositories
//! - `postgres` - sqlx repositories
//! - `notification` - Payment event sinks
//! - `http` - Inbound webhook route

pub mod gateway;
pub mod http;
pub mod memory;
pub mod notification;
pub mod postgres;

pub use gateway::{HttpPaymentGateway, MockPaymentGateway};
pub use memory::{InMemoryPaymentRepository, InMemorySavedCardRepository};
pub use notification::TracingPaymentNotifier;
pub use postgres::{PostgresPaymentRepository, PostgresSavedCardRepository};
