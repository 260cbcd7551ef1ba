//! # Transition Audit Trail
//!
//! Every committed transition appends a [`TransitionRecord`]. Records are
//! hash-chained: each digest covers the record's content and the digest of
//! its predecessor, so rewriting any historical entry breaks every digest
//! after it. [`verify_chain`] recomputes the chain.

use safetrade_core::{sha256_digest, Actor, CanonicalBytes, ContentDigest, LifecycleError, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::LifecycleStatus;

/// Record of one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "S: LifecycleStatus")]
pub struct TransitionRecord<S> {
    /// State before the transition.
    pub from: S,
    /// State after the transition.
    pub to: S,
    /// Who took the transition.
    pub actor: Actor,
    /// Free-text reason supplied with the request, if any.
    pub reason: Option<String>,
    /// When the transition was committed.
    pub occurred_at: Timestamp,
    /// Digest of the preceding record. `None` for the first record.
    pub previous_digest: Option<ContentDigest>,
    /// Digest over this record's content and `previous_digest`.
    pub digest: ContentDigest,
}

#[derive(Serialize)]
struct RecordContent<'a> {
    from: &'static str,
    to: &'static str,
    actor: &'a Actor,
    reason: Option<&'a str>,
    occurred_at: String,
    previous_digest: Option<String>,
}

fn record_digest<S: LifecycleStatus>(
    from: S,
    to: S,
    actor: &Actor,
    reason: Option<&str>,
    occurred_at: Timestamp,
    previous_digest: Option<ContentDigest>,
) -> Result<ContentDigest, LifecycleError> {
    let content = RecordContent {
        from: from.as_str(),
        to: to.as_str(),
        actor,
        reason,
        occurred_at: occurred_at.to_iso8601(),
        previous_digest: previous_digest.map(|d| d.to_hex()),
    };
    let canonical = CanonicalBytes::new(&content)
        .map_err(|e| LifecycleError::Storage(format!("audit record canonicalization: {e}")))?;
    Ok(sha256_digest(&canonical))
}

/// Append a chained record for `from -> to` to `log`.
pub fn append<S: LifecycleStatus>(
    log: &mut Vec<TransitionRecord<S>>,
    from: S,
    to: S,
    actor: &Actor,
    reason: Option<&str>,
    occurred_at: Timestamp,
) -> Result<(), LifecycleError> {
    let previous_digest = log.last().map(|r| r.digest);
    let digest = record_digest(from, to, actor, reason, occurred_at, previous_digest)?;
    log.push(TransitionRecord {
        from,
        to,
        actor: *actor,
        reason: reason.map(str::to_string),
        occurred_at,
        previous_digest,
        digest,
    });
    Ok(())
}

/// A broken link in a transition chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The record's `previous_digest` does not match its predecessor.
    #[error("record {index} does not link to its predecessor")]
    BrokenLink { index: usize },
    /// The record's digest does not match its content.
    #[error("record {index} digest does not match its content")]
    Tampered { index: usize },
    /// A record does not start where the previous one ended.
    #[error("record {index} starts at {found} but the previous record ended at {expected}")]
    Discontinuous {
        index: usize,
        expected: String,
        found: String,
    },
}

/// Recompute every digest and check continuity of states.
pub fn verify_chain<S: LifecycleStatus>(log: &[TransitionRecord<S>]) -> Result<(), ChainError> {
    let mut previous: Option<&TransitionRecord<S>> = None;
    for (index, record) in log.iter().enumerate() {
        if record.previous_digest != previous.map(|p| p.digest) {
            return Err(ChainError::BrokenLink { index });
        }
        if let Some(prev) = previous {
            if prev.to != record.from {
                return Err(ChainError::Discontinuous {
                    index,
                    expected: prev.to.to_string(),
                    found: record.from.to_string(),
                });
            }
        }
        let recomputed = record_digest(
            record.from,
            record.to,
            &record.actor,
            record.reason.as_deref(),
            record.occurred_at,
            record.previous_digest,
        )
        .map_err(|_| ChainError::Tampered { index })?;
        if recomputed != record.digest {
            return Err(ChainError::Tampered { index });
        }
        previous = Some(record);
    }
    Ok(())
}
