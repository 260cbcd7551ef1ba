//! # Tracked Records
//!
//! The contract between an entity and the lifecycle executor: a stable key,
//! a current status, a version counter for compare-and-swap, and the set of
//! users to notify when the status changes.

use safetrade_core::{Timestamp, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::guard::LifecycleStatus;

/// Who should hear about a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Recipient {
    /// A specific user.
    User(UserId),
    /// The platform operators.
    Admins,
}

/// A versioned, lifecycle-managed record.
pub trait Tracked: Clone + Send + Sync + 'static {
    type Status: LifecycleStatus;

    /// Primary key.
    fn key(&self) -> Uuid;

    /// The transaction this record belongs to (itself, for transactions).
    fn transaction_id(&self) -> TransactionId;

    fn status(&self) -> Self::Status;

    /// Monotonic write counter.
    fn version(&self) -> u64;

    /// Bump the version and `updated_at`. Called once per committed write.
    fn touch(&mut self, now: Timestamp);

    /// Soft-deleted records are invisible to loads.
    fn is_deleted(&self) -> bool {
        false
    }

    /// Live records sharing this key cannot coexist in one repository.
    fn exclusive_key(&self) -> Option<String> {
        None
    }

    /// Users to notify about `from -> to`.
    fn recipients(&self, from: Self::Status, to: Self::Status) -> Vec<Recipient>;
}
