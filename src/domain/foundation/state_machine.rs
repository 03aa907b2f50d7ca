//! State machine trait for status enums.
//!
//! Provides a consistent interface for validating and performing state
//! transitions on lifecycle statuses.

use super::ValidationError;

/// Result of applying a target state to a current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The edge exists and the state moved to the contained target.
    Applied(S),
    /// The current state already equals the target; nothing to do.
    Unchanged(S),
}

impl<S: Copy> Transition<S> {
    /// The state after the transition, applied or not.
    pub fn state(&self) -> S {
        match self {
            Transition::Applied(s) | Transition::Unchanged(s) => *s,
        }
    }

    /// Returns true when the state actually changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// Trait for status enums that represent state machines.
///
/// Implementors define valid state transitions and get validated
/// transition methods for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for PaymentStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Pending, Completed) | (Completed, Refunded) /* ... */)
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Pending => vec![Processing, Completed, Failed, Cancelled, Expired],
///             // ... etc
///         }
///     }
/// }
///
/// let next = PaymentStatus::Pending.transition_to(PaymentStatus::Completed)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Applies a target state, treating "already there" as a no-op.
    ///
    /// Redelivered events re-apply the state they already caused; those
    /// must succeed without being mistaken for a new transition.
    fn apply(&self, target: Self) -> Result<Transition<Self>, ValidationError> {
        if *self == target {
            return Ok(Transition::Unchanged(target));
        }
        self.transition_to(target).map(Transition::Applied)
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
