//! # safetrade-core: Foundational Types for SafeTrade
//!
//! Leaf crate of the workspace. Defines the primitives every other crate
//! builds on: identifier newtypes, UTC timestamps, money rounding, the
//! acting identity, canonical digests for the audit trail, and the
//! lifecycle error taxonomy.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `safetrade-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - Money is `rust_decimal::Decimal`. Floats never touch an amount.

pub mod actor;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod money;
pub mod temporal;

pub use actor::{Actor, ActorRole};
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{CanonicalizationError, EntityKind, LifecycleError};
pub use identity::{DealerId, DisputeId, InvoiceId, ReviewId, TransactionId, UserId, VehicleId};
pub use money::{percentage_of, round_half_up, Currency, MoneyError};
pub use temporal::Timestamp;
