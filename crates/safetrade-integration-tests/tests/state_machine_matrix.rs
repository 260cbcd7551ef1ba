//! # Transition Matrix Tests
//!
//! Every `(from, to, role)` triple of all four state machines is run
//! through the validator and compared with the static tables. A verdict is
//! Allow exactly when `from` is not terminal, `to` is a listed successor and
//! the role is permitted on that edge.

use proptest::prelude::*;
use safetrade_core::{ActorRole, LifecycleError};
use safetrade_state::{
    check, DisputeStatus, InvoiceStatus, LifecycleStatus, ModerationStatus, RejectionKind,
    TransactionStatus, Verdict,
};

fn assert_matrix<S: LifecycleStatus>() {
    let mut allowed = 0usize;
    for &from in S::all() {
        for &to in S::all() {
            for role in ActorRole::ALL {
                let verdict = check(from, to, role);
                let expected = !from.is_terminal()
                    && from.can_transition_to(to)
                    && from.permitted_roles(to).contains(&role);
                assert_eq!(
                    verdict.is_allowed(),
                    expected,
                    "{} {from} -> {to} as {role}: {verdict:?}",
                    S::ENTITY
                );
                if expected {
                    allowed += 1;
                    continue;
                }
                let Verdict::Reject(rejection) = verdict else {
                    unreachable!()
                };
                let kind = if from.is_terminal() {
                    RejectionKind::Terminal
                } else if from == to || !from.can_transition_to(to) {
                    RejectionKind::IllegalEdge
                } else {
                    RejectionKind::Unauthorized
                };
                assert_eq!(rejection.kind, kind, "{from} -> {to} as {role}");
            }
        }
    }
    assert!(allowed > 0, "{} has no reachable edge", S::ENTITY);
}

#[test]
fn transaction_matrix_matches_table() {
    assert_matrix::<TransactionStatus>();
}

#[test]
fn dispute_matrix_matches_table() {
    assert_matrix::<DisputeStatus>();
}

#[test]
fn invoice_matrix_matches_table() {
    assert_matrix::<InvoiceStatus>();
}

#[test]
fn review_matrix_matches_table() {
    assert_matrix::<ModerationStatus>();
}

#[test]
fn terminal_states_have_no_successors() {
    fn check_terminal<S: LifecycleStatus>() {
        for s in S::all() {
            assert_eq!(s.is_terminal(), s.valid_transitions().is_empty(), "{s}");
        }
    }
    check_terminal::<TransactionStatus>();
    check_terminal::<DisputeStatus>();
    check_terminal::<InvoiceStatus>();
    check_terminal::<ModerationStatus>();
}

#[test]
fn completed_transaction_rejects_everything() {
    for &to in TransactionStatus::all() {
        for role in ActorRole::ALL {
            let verdict = check(TransactionStatus::Completed, to, role);
            assert!(!verdict.is_allowed());
        }
    }
}

#[test]
fn pending_to_payment_verified_is_invalid_transition() {
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
fn unauthorized_edge_maps_to_forbidden() {
    let err = check(
        InvoiceStatus::Paid,
        InvoiceStatus::Confirmed,
        ActorRole::Seller,
    )
    .into_result(InvoiceStatus::Paid, InvoiceStatus::Confirmed, ActorRole::Seller)
    .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden { .. }));
}

#[test]
fn status_tokens_round_trip_through_serde() {
    fn round_trip<S: LifecycleStatus>() {
        for s in S::all() {
            let json = serde_json::to_string(s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
            let back: S = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, s);
            assert_eq!(S::from_name(s.as_str()), Some(*s));
        }
        assert_eq!(S::from_name("not_a_status"), None);
    }
    round_trip::<TransactionStatus>();
    round_trip::<DisputeStatus>();
    round_trip::<InvoiceStatus>();
    round_trip::<ModerationStatus>();
}

fn transaction_status() -> impl Strategy<Value = TransactionStatus> {
    (0..TransactionStatus::ALL.len()).prop_map(|i| TransactionStatus::ALL[i])
}

fn role() -> impl Strategy<Value = ActorRole> {
    (0..ActorRole::ALL.len()).prop_map(|i| ActorRole::ALL[i])
}

proptest! {
    #[test]
    fn prop_allowed_edges_are_table_edges(
        from in transaction_status(),
        to in transaction_status(),
        role in role(),
    ) {
        if check(from, to, role).is_allowed() {
            prop_assert!(from.valid_transitions().contains(&to));
            prop_assert!(!from.is_terminal());
        }
    }
}
