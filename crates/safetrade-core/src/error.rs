//! # Error Types: Lifecycle Error Taxonomy
//!
//! Every failure a lifecycle operation can surface to its caller.
//!
//! - `InvalidTransition`: the requested edge is not in the transition table
//!   or leaves a terminal state. Recoverable; the caller asked for
//!   something the state machine does not allow.
//! - `Conflict`: a concurrent writer changed the entity between load and
//!   commit. The caller should reload and retry.
//! - `ValidationFailure`: input failed a field rule. Carries the field name.
//! - `NotFound`: unknown or soft-deleted identifier.
//! - `Forbidden`: the edge exists but the acting role may not take it.
//!
//! No variant implies a partial write. Notifier failures never appear here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The lifecycle-managed entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Transaction,
    Dispute,
    Invoice,
    Review,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Dispute => "dispute",
            Self::Invoice => "invoice",
            Self::Review => "review",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Requested transition is not in the allowed set.
    #[error("invalid {entity} transition from {from} to {to}: {reason}")]
    InvalidTransition {
        /// Entity kind the transition was requested on.
        entity: EntityKind,
        /// Current status name.
        from: String,
        /// Requested status name.
        to: String,
        /// Why the validator rejected the edge.
        reason: String,
    },

    /// Concurrent modification detected.
    #[error("conflict on {entity} {id}: {reason}")]
    Conflict {
        /// Entity kind.
        entity: EntityKind,
        /// Entity identifier.
        id: String,
        /// What changed underneath the caller.
        reason: String,
    },

    /// Field-level input validation failed.
    #[error("validation failed on '{field}': {message}")]
    ValidationFailure {
        /// Offending field name.
        field: String,
        /// Human-readable rule violation.
        message: String,
    },

    /// Unknown identifier.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: EntityKind,
        /// Entity identifier.
        id: String,
    },

    /// The acting role may not perform the action.
    #[error("role '{role}' may not {action}")]
    Forbidden {
        /// Acting role name.
        role: String,
        /// Description of the refused action.
        action: String,
    },

    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LifecycleError {
    /// Shorthand for a [`LifecycleError::ValidationFailure`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailure {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`LifecycleError::NotFound`].
    pub fn not_found(entity: EntityKind, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`LifecycleError::Conflict`].
    pub fn conflict(
        entity: EntityKind,
        id: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Conflict { .. } => "CONFLICT",
            Self::ValidationFailure { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations; use a decimal string: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            LifecycleError::InvalidTransition {
                entity: EntityKind::Transaction,
                from: "pending".into(),
                to: "completed".into(),
                reason: "skip".into(),
            },
            LifecycleError::conflict(EntityKind::Transaction, "x", "raced"),
            LifecycleError::validation("resolution_type", "required"),
            LifecycleError::not_found(EntityKind::Dispute, "y"),
            LifecycleError::Forbidden {
                role: "buyer".into(),
                action: "verify payment".into(),
            },
            LifecycleError::Storage("down".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_carries_context() {
        let err = LifecycleError::validation("resolution", "must not be empty");
        assert_eq!(
            err.to_string(),
            "validation failed on 'resolution': must not be empty"
        );
        let err = LifecycleError::not_found(EntityKind::Invoice, "invoice:1");
        assert_eq!(err.to_string(), "invoice invoice:1 not found");
    }
}
