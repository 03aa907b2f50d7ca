//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, the state machine trait and error
//! types that form the vocabulary of the payments domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{MemberId, PaymentId, RelatedEntityId, SavedCardId};
pub use state_machine::{StateMachine, Transition};
pub use timestamp::Timestamp;
