//! # Transition Validator
//!
//! A single gate shared by every state machine in the crate:
//! `check(current, requested, role) -> Verdict`.
//!
//! The gate answers three questions in order:
//!
//! 1. Is `current` terminal? Terminal states reject everything.
//! 2. Is `current -> requested` an edge of the transition table?
//! 3. May `role` take that edge?
//!
//! Entity-specific rules that need more than the status pair (payload
//! fields, the stage a dispute interrupted, which user is acting) live on
//! the entity's `apply` method and run after this gate.

use safetrade_core::{ActorRole, EntityKind, LifecycleError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A closed set of lifecycle states with a static transition table.
pub trait LifecycleStatus:
    Copy + Eq + std::hash::Hash + std::fmt::Debug + std::fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The entity kind this status belongs to.
    const ENTITY: EntityKind;

    /// Every status, in declaration order.
    fn all() -> &'static [Self];

    /// Stable snake_case token.
    fn as_str(&self) -> &'static str;

    /// Whether no further transition is defined.
    fn is_terminal(&self) -> bool;

    /// Successor states reachable in one transition.
    fn valid_transitions(&self) -> &'static [Self];

    /// Roles that may take the edge `self -> to`. Only consulted for edges
    /// present in [`LifecycleStatus::valid_transitions`].
    fn permitted_roles(&self, to: Self) -> &'static [ActorRole];

    /// Membership test against the token set.
    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.as_str() == name)
    }

    /// Whether `self -> to` is an edge of the table.
    fn can_transition_to(&self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// Why a transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The edge is not in the transition table.
    IllegalEdge,
    /// The current state is terminal.
    Terminal,
    /// The edge exists but the role may not take it.
    Unauthorized,
}

/// A refused transition with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: String,
}

/// Outcome of the transition validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Reject(Rejection),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Convert into the lifecycle error taxonomy.
    ///
    /// `IllegalEdge` and `Terminal` become `InvalidTransition`;
    /// `Unauthorized` becomes `Forbidden`.
    pub fn into_result<S: LifecycleStatus>(
        self,
        from: S,
        to: S,
        role: ActorRole,
    ) -> Result<(), LifecycleError> {
        match self {
            Self::Allow => Ok(()),
            Self::Reject(Rejection {
                kind: RejectionKind::Unauthorized,
                ..
            }) => Err(LifecycleError::Forbidden {
                role: role.as_str().to_string(),
                action: format!("move {} from {} to {}", S::ENTITY, from, to),
            }),
            Self::Reject(rejection) => Err(LifecycleError::InvalidTransition {
                entity: S::ENTITY,
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: rejection.reason,
            }),
        }
    }
}

/// Validate `from -> to` for `role` against the transition table.
pub fn check<S: LifecycleStatus>(from: S, to: S, role: ActorRole) -> Verdict {
    if from.is_terminal() {
        return Verdict::Reject(Rejection {
            kind: RejectionKind::Terminal,
            reason: format!("{} is terminal", from),
        });
    }
    if from == to {
        return Verdict::Reject(Rejection {
            kind: RejectionKind::IllegalEdge,
            reason: format!("already {}", from),
        });
    }
    if !from.can_transition_to(to) {
        let allowed: Vec<&str> = from.valid_transitions().iter().map(|s| s.as_str()).collect();
        return Verdict::Reject(Rejection {
            kind: RejectionKind::IllegalEdge,
            reason: format!("allowed from {}: [{}]", from, allowed.join(", ")),
        });
    }
    if !from.permitted_roles(to).contains(&role) {
        return Verdict::Reject(Rejection {
            kind: RejectionKind::Unauthorized,
            reason: format!("{} may not move {} to {}", role, from, to),
        });
    }
    Verdict::Allow
}

/// Roles that may take at least one edge out of `from`, deduplicated.
pub fn roles_leaving<S: LifecycleStatus>(from: S) -> Vec<ActorRole> {
    let mut roles = Vec::new();
    for to in from.valid_transitions() {
        for role in from.permitted_roles(*to) {
            if !roles.contains(role) {
                roles.push(*role);
            }
        }
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispute::DisputeStatus;
    use crate::transaction::TransactionStatus;

    #[test]
    fn test_terminal_wins_over_everything() {
        let verdict = check(
            TransactionStatus::Completed,
            TransactionStatus::Cancelled,
            ActorRole::Admin,
        );
        match verdict {
            Verdict::Reject(r) => assert_eq!(r.kind, RejectionKind::Terminal),
            Verdict::Allow => panic!("completed must be terminal"),
        }
    }

    #[test]
    fn test_self_loop_is_illegal() {
        let verdict = check(
            DisputeStatus::Escalated,
            DisputeStatus::Escalated,
            ActorRole::Admin,
        );
        assert!(!verdict.is_allowed());
    }

    #[test]
    fn test_unauthorized_maps_to_forbidden() {
        let err = check(
            TransactionStatus::PaymentSubmitted,
            TransactionStatus::PaymentVerified,
            ActorRole::Buyer,
        )
        .into_result(
            TransactionStatus::PaymentSubmitted,
            TransactionStatus::PaymentVerified,
            ActorRole::Buyer,
        )
        .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn test_illegal_edge_maps_to_invalid_transition() {
        let err = check(
            TransactionStatus::Pending,
            TransactionStatus::PaymentVerified,
            ActorRole::Admin,
        )
        .into_result(
            TransactionStatus::Pending,
            TransactionStatus::PaymentVerified,
            ActorRole::Admin,
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_roles_leaving_deduplicates() {
        let roles = roles_leaving(DisputeStatus::Open);
        assert_eq!(roles, vec![ActorRole::Admin]);
    }

    proptest::proptest! {
        #[test]
        fn prop_some_role_allowed_iff_edge(from in 0usize..12, to in 0usize..12) {
            let from = TransactionStatus::ALL[from];
            let to = TransactionStatus::ALL[to];
            let allowed = ActorRole::ALL.iter().any(|r| check(from, to, *r).is_allowed());
            let edge = !from.is_terminal() && from != to && from.can_transition_to(to);
            proptest::prop_assert_eq!(allowed, edge);
        }

        #[test]
        fn prop_allowed_implies_permitted(from in 0usize..12, to in 0usize..12, role in 0usize..5) {
            let from = TransactionStatus::ALL[from];
            let to = TransactionStatus::ALL[to];
            let role = ActorRole::ALL[role];
            if check(from, to, role).is_allowed() {
                proptest::prop_assert!(from.permitted_roles(to).contains(&role));
                proptest::prop_assert!(from.valid_transitions().contains(&to));
            }
        }
    }

    #[test]
    fn test_verdict_serializes_tagged() {
        let json = serde_json::to_value(Verdict::Allow).unwrap();
        assert_eq!(json["verdict"], "allow");
    }
}
