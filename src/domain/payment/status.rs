//! Payment status state machine.
//!
//! Defines every payment lifecycle state and the legal edges between them.

use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Payment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Invoice created, awaiting the member or the gateway.
    Pending,

    /// Gateway accepted the payment and is authorizing it.
    Processing,

    /// Funds captured. Only a refund can follow.
    Completed,

    /// Declined or errored at the gateway.
    Failed,

    /// Cancelled by the member before capture.
    Cancelled,

    /// Captured funds were returned.
    Refunded,

    /// Abandoned session closed by the sweeper.
    Expired,
}

impl PaymentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
        PaymentStatus::Expired,
    ];

    /// Returns true while the payment is still waiting on an outcome.
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    /// Returns true for statuses that carry a completion timestamp.
    pub fn requires_completed_at(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Refunded)
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            // From PENDING
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Pending, Expired)
            // From PROCESSING
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
            // From COMPLETED
                | (Completed, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Processing, Completed, Failed, Cancelled, Expired],
            Processing => vec![Completed, Failed, Cancelled],
            Completed => vec![Refunded],
            Failed | Cancelled | Refunded | Expired => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Unit Tests - State Transitions

    #[test]
    fn pending_can_reach_every_outcome() {
        let status = PaymentStatus::Pending;
        for target in [
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Expired,
        ] {
            assert_eq!(status.transition_to(target), Ok(target));
        }
    }

    #[test]
    fn pending_cannot_be_refunded() {
        assert!(PaymentStatus::Pending
            .transition_to(PaymentStatus::Refunded)
            .is_err());
    }

    #[test]
    fn processing_cannot_expire() {
        assert!(!PaymentStatus::Processing.can_transition_to(&PaymentStatus::Expired));
    }

    #[test]
    fn processing_cannot_return_to_pending() {
        assert!(!PaymentStatus::Processing.can_transition_to(&PaymentStatus::Pending));
    }

    #[test]
    fn completed_can_only_be_refunded() {
        assert_eq!(
            PaymentStatus::Completed.valid_transitions(),
            vec![PaymentStatus::Refunded]
        );
        assert!(PaymentStatus::Completed
            .transition_to(PaymentStatus::Failed)
            .is_err());
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        for status in [
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
            PaymentStatus::Expired,
        ] {
            assert!(status.is_terminal(), "{} should be terminal", status);
        }
        assert!(!PaymentStatus::Completed.is_terminal());
    }

    #[test]
    fn is_open_only_for_pending_and_processing() {
        let open: Vec<_> = PaymentStatus::ALL
            .iter()
            .filter(|s| s.is_open())
            .copied()
            .collect();
        assert_eq!(open, vec![PaymentStatus::Pending, PaymentStatus::Processing]);
    }

    #[test]
    fn string_representation_roundtrips() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(status));
        }
        assert!("settled".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    // Property Tests

    fn any_status() -> impl Strategy<Value = PaymentStatus> {
        prop::sample::select(PaymentStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn can_transition_agrees_with_valid_transitions(from in any_status(), to in any_status()) {
            prop_assert_eq!(
                from.can_transition_to(&to),
                from.valid_transitions().contains(&to)
            );
        }

        #[test]
        fn no_edge_leads_back_to_pending(from in any_status()) {
            prop_assert!(!from.can_transition_to(&PaymentStatus::Pending));
        }
    }
}
