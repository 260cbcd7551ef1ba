//! # safetrade-state: Lifecycle State Machines
//!
//! Validated-enum state machines for the four SafeTrade entities:
//!
//! | Entity | Status enum | Terminal |
//! |---|---|---|
//! | [`Transaction`] | [`TransactionStatus`] | completed, cancelled, refunded |
//! | [`Dispute`] | [`DisputeStatus`] | resolved, closed |
//! | [`Invoice`] | [`InvoiceStatus`] | confirmed, cancelled |
//! | [`Review`] | [`ModerationStatus`] | rejected |
//!
//! Every status enum implements [`LifecycleStatus`], and every transition
//! passes the shared gate in [`guard::check`] before the entity's own
//! `apply` stamps milestones and appends a hash-chained
//! [`TransitionRecord`].
//!
//! Entities here are plain values. Concurrency control and persistence
//! live in `safetrade-lifecycle`.

pub mod audit;
pub mod dispute;
pub mod guard;
pub mod invoice;
pub mod record;
pub mod review;
pub mod transaction;

pub use audit::{verify_chain, ChainError, TransitionRecord};
pub use dispute::{
    Dispute, DisputeCommand, DisputeStatus, DisputeType, NewDispute, ResolutionType,
};
pub use guard::{check, roles_leaving, LifecycleStatus, Rejection, RejectionKind, Verdict};
pub use invoice::{
    derive_amounts, validate_amounts, DerivedAmounts, Invoice, InvoiceCommand, InvoiceStatus,
    NewInvoice,
};
pub use record::{Recipient, Tracked};
pub use review::{
    screen_comment, trust_score, ModerationStatus, NewReview, Review, ReviewStatus, ReviewType,
    ScreeningFailure, VerificationMethod,
};
pub use transaction::{
    FeeSchedule, NewTransaction, ReferenceCodes, Settlement, Transaction, TransactionCommand,
    TransactionStatus,
};
