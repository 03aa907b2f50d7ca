//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine trait)
//! - `payment` - Payment aggregate, lifecycle state machine, gateway status mapping,
//!   callback payload parsing and signature verification

pub mod foundation;
pub mod payment;
