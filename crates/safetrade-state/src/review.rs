//! # Reviews and Moderation
//!
//! A party to a trade rates the counterparty or the vehicle. Two
//! independent axes:
//!
//! - `status` (`published | hidden`): visibility, toggled by the reviewer
//!   or an operator.
//! - `moderation_status`: the lifecycle-managed axis.
//!
//! ```text
//! Pending ──▶ Approved ◀──▶ Flagged
//!    │           │             │
//!    └───────────┴──▶ Rejected ◀┘
//! ```
//!
//! `Rejected` is terminal. Three distinct user flags move a review to
//! `Flagged` through the system actor.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use safetrade_core::{
    round_half_up, Actor, ActorRole, EntityKind, LifecycleError, ReviewId, Timestamp,
    TransactionId, UserId, VehicleId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{self, TransitionRecord};
use crate::guard::{self, LifecycleStatus};
use crate::record::{Recipient, Tracked};
use crate::transaction::{non_blank, Transaction, TransactionStatus};

/// Distinct flags that move a review into moderation.
pub const FLAG_THRESHOLD: u32 = 3;

/// Auto-verification window after trade completion.
pub const AUTO_VERIFY_WINDOW_DAYS: i64 = 90;

pub const MIN_COMMENT_CHARS: usize = 20;
pub const MAX_COMMENT_CHARS: usize = 1000;

const MAX_REPEATED_CHARS: usize = 10;
const MAX_URLS: usize = 2;

const PROFANITY: &[&str] = &[
    "fuck", "shit", "damn", "bitch", "asshole", "bastard", "crap", "piss", "dick", "cock",
    "pussy", "cunt", "slut", "whore",
];

// ─── Enumerations ────────────────────────────────────────────────────

/// Moderation state, the lifecycle-managed axis of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

impl ModerationStatus {
    pub const ALL: [ModerationStatus; 4] =
        [Self::Pending, Self::Approved, Self::Rejected, Self::Flagged];
}

impl LifecycleStatus for ModerationStatus {
    const ENTITY: EntityKind = EntityKind::Review;

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Flagged => "flagged",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Approved, Self::Rejected, Self::Flagged],
            Self::Approved => &[Self::Flagged, Self::Rejected],
            Self::Flagged => &[Self::Approved, Self::Rejected],
            Self::Rejected => &[],
        }
    }

    fn permitted_roles(&self, to: Self) -> &'static [ActorRole] {
        match to {
            // System: flag threshold and transaction-backed auto-verification.
            Self::Flagged | Self::Approved => &[ActorRole::Admin, ActorRole::System],
            Self::Rejected => &[ActorRole::Admin],
            Self::Pending => &[],
        }
    }
}

impl std::fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility on the public listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Published,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Manual,
    Transaction,
}

/// What is being rated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    Buyer,
    Seller,
    Vehicle,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Vehicle => "vehicle",
        }
    }
}

// ─── Screening ───────────────────────────────────────────────────────

/// Why a comment failed automated screening.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScreeningFailure {
    #[error("comment is shorter than 20 characters")]
    TooShort,
    #[error("comment contains blacklisted language")]
    Profanity,
    #[error("comment repeats a character more than 10 times in a row")]
    RepeatedCharacters,
    #[error("comment contains {0} links, at most 2 are allowed")]
    TooManyUrls(usize),
}

/// Automated content screening applied before auto-verification.
pub fn screen_comment(comment: &str) -> Result<(), ScreeningFailure> {
    let lowered = comment.to_lowercase();
    if lowered.trim().chars().count() < MIN_COMMENT_CHARS {
        return Err(ScreeningFailure::TooShort);
    }
    if PROFANITY.iter().any(|word| lowered.contains(word)) {
        return Err(ScreeningFailure::Profanity);
    }
    if longest_run(&lowered) > MAX_REPEATED_CHARS {
        return Err(ScreeningFailure::RepeatedCharacters);
    }
    let urls = lowered
        .split_whitespace()
        .filter(|w| w.contains("http://") || w.contains("https://"))
        .count();
    if urls > MAX_URLS {
        return Err(ScreeningFailure::TooManyUrls(urls));
    }
    Ok(())
}

fn longest_run(s: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev = None;
    for c in s.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        best = best.max(run);
    }
    best
}

// ─── Review ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub review_type: ReviewType,
    pub rating: u8,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub transaction_id: TransactionId,
    pub vehicle_id: VehicleId,
    pub reviewer_id: UserId,
    pub reviewee_id: UserId,
    pub review_type: ReviewType,
    pub rating: u8,
    pub comment: String,
    pub status: ReviewStatus,
    pub moderation_status: ModerationStatus,
    pub moderation_notes: Option<String>,
    pub moderated_by: Option<UserId>,
    pub moderated_at: Option<Timestamp>,
    pub verified: bool,
    pub verification_method: Option<VerificationMethod>,
    pub verified_at: Option<Timestamp>,
    pub flag_count: u32,
    pub flagged_by: BTreeSet<UserId>,
    pub version: u64,
    pub transition_log: Vec<TransitionRecord<ModerationStatus>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Review {
    /// Submit a review of the counterparty on `transaction`.
    pub fn new(
        input: NewReview,
        transaction: &Transaction,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Self, LifecycleError> {
        let reviewer = match actor.user_id {
            Some(user) if actor.role.is_party() && transaction.is_party(user) => user,
            _ => {
                return Err(LifecycleError::Forbidden {
                    role: actor.role.as_str().to_string(),
                    action: format!("review {}", transaction.id),
                })
            }
        };
        if !(1..=5).contains(&input.rating) {
            return Err(LifecycleError::validation(
                "rating",
                "rating must be between 1 and 5",
            ));
        }
        let comment = input.comment.trim().to_string();
        let len = comment.chars().count();
        if !(MIN_COMMENT_CHARS..=MAX_COMMENT_CHARS).contains(&len) {
            return Err(LifecycleError::validation(
                "comment",
                format!("comment must be {MIN_COMMENT_CHARS} to {MAX_COMMENT_CHARS} characters"),
            ));
        }
        let reviewee = if reviewer == transaction.buyer_id {
            transaction.seller_id
        } else {
            transaction.buyer_id
        };

        Ok(Self {
            id: ReviewId::new(),
            transaction_id: transaction.id,
            vehicle_id: transaction.vehicle_id,
            reviewer_id: reviewer,
            reviewee_id: reviewee,
            review_type: input.review_type,
            rating: input.rating,
            comment,
            status: ReviewStatus::Published,
            moderation_status: ModerationStatus::Pending,
            moderation_notes: None,
            moderated_by: None,
            moderated_at: None,
            verified: false,
            verification_method: None,
            verified_at: None,
            flag_count: 0,
            flagged_by: BTreeSet::new(),
            version: 1,
            transition_log: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Move `moderation_status`, recording who moderated. On error, `self`
    /// is unchanged.
    fn moderate(
        &mut self,
        to: ModerationStatus,
        actor: &Actor,
        notes: Option<&str>,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        let from = self.moderation_status;
        guard::check(from, to, actor.role).into_result(from, to, actor.role)?;
        audit::append(&mut self.transition_log, from, to, actor, notes, now)?;
        self.moderation_status = to;
        self.moderated_at = Some(now);
        if actor.user_id.is_some() {
            self.moderated_by = actor.user_id;
        }
        if let Some(notes) = notes {
            self.moderation_notes = Some(notes.to_string());
        }
        Ok(())
    }

    /// Operator verification. Approves the review and clears its flags.
    pub fn verify(
        &mut self,
        actor: &Actor,
        notes: Option<&str>,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        if actor.role != ActorRole::Admin {
            return Err(LifecycleError::Forbidden {
                role: actor.role.as_str().to_string(),
                action: "verify a review".to_string(),
            });
        }
        self.moderate(ModerationStatus::Approved, actor, non_blank(notes), now)?;
        self.verified = true;
        self.verification_method = Some(VerificationMethod::Manual);
        self.verified_at = Some(now);
        self.flag_count = 0;
        self.flagged_by.clear();
        Ok(())
    }

    /// Verify from trade evidence: the linked trade completed within the
    /// window, covers this vehicle, involves the reviewer, and the comment
    /// passes screening.
    pub fn auto_verify(
        &mut self,
        transaction: &Transaction,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        if transaction.id != self.transaction_id
            || transaction.vehicle_id != self.vehicle_id
            || !transaction.is_party(self.reviewer_id)
        {
            return Err(LifecycleError::validation(
                "transaction_id",
                "the linked trade does not match this review",
            ));
        }
        let completed_at = match (transaction.status, transaction.completed_at) {
            (TransactionStatus::Completed, Some(at)) => at,
            _ => {
                return Err(LifecycleError::validation(
                    "transaction_id",
                    "the linked trade is not completed",
                ))
            }
        };
        if now.days_since(&completed_at) > AUTO_VERIFY_WINDOW_DAYS {
            return Err(LifecycleError::validation(
                "transaction_id",
                format!("trade completed more than {AUTO_VERIFY_WINDOW_DAYS} days ago"),
            ));
        }
        screen_comment(&self.comment)
            .map_err(|e| LifecycleError::validation("comment", e.to_string()))?;

        self.moderate(ModerationStatus::Approved, &Actor::system(), None, now)?;
        self.verified = true;
        self.verification_method = Some(VerificationMethod::Transaction);
        self.verified_at = Some(now);
        Ok(())
    }

    /// Operator rejection. Terminal.
    pub fn reject(
        &mut self,
        actor: &Actor,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        let reason = non_blank(Some(reason))
            .ok_or_else(|| LifecycleError::validation("reason", "reason must not be blank"))?;
        self.moderate(ModerationStatus::Rejected, actor, Some(reason), now)?;
        self.verified = false;
        Ok(())
    }

    /// Record a user's report. Returns `true` when this flag crossed the
    /// threshold and moved the review into `Flagged`.
    pub fn flag(&mut self, actor: &Actor, now: Timestamp) -> Result<bool, LifecycleError> {
        let user = actor.user_id.ok_or_else(|| {
            LifecycleError::validation("user_id", "flags must come from a user")
        })?;
        if self.moderation_status.is_terminal() {
            return Err(LifecycleError::validation(
                "moderation_status",
                "rejected reviews cannot be flagged",
            ));
        }
        if self.flagged_by.contains(&user) {
            return Err(LifecycleError::conflict(
                EntityKind::Review,
                self.id,
                format!("{user} has already flagged this review"),
            ));
        }
        let mut next = self.clone();
        next.flagged_by.insert(user);
        next.flag_count += 1;
        let crossed = next.flag_count >= FLAG_THRESHOLD
            && next.moderation_status != ModerationStatus::Flagged;
        if crossed {
            next.moderate(
                ModerationStatus::Flagged,
                &Actor::system(),
                Some("flag threshold reached"),
                now,
            )?;
        }
        *self = next;
        Ok(crossed)
    }

    /// Show or hide the review. Reviewer or operator only.
    pub fn set_visibility(
        &mut self,
        actor: &Actor,
        status: ReviewStatus,
    ) -> Result<(), LifecycleError> {
        let is_reviewer = actor.user_id == Some(self.reviewer_id);
        if actor.role != ActorRole::Admin && !is_reviewer {
            return Err(LifecycleError::Forbidden {
                role: actor.role.as_str().to_string(),
                action: format!("change visibility of {}", self.id),
            });
        }
        self.status = status;
        Ok(())
    }

    pub fn is_publicly_visible(&self) -> bool {
        self.status == ReviewStatus::Published && self.moderation_status == ModerationStatus::Approved
    }
}

/// Reviewer trust score in `0..=100`: half verification rate, half approval
/// rate, minus half the rejection rate.
pub fn trust_score(reviews: &[Review]) -> Decimal {
    if reviews.is_empty() {
        return round_half_up(Decimal::ZERO, 2);
    }
    let verified = share(reviews, |r| r.verified);
    let approved = share(reviews, |r| r.moderation_status == ModerationStatus::Approved);
    let rejected = share(reviews, |r| r.moderation_status == ModerationStatus::Rejected);

    let half = Decimal::new(5, 1);
    let raw = (verified * half + approved * half - rejected * half)
        * Decimal::ONE_HUNDRED;
    round_half_up(raw.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED), 2)
}

fn share(reviews: &[Review], pred: impl Fn(&Review) -> bool) -> Decimal {
    let hits = reviews.iter().filter(|r| pred(r)).count() as u64;
    Decimal::from(hits) / Decimal::from(reviews.len() as u64)
}

impl Tracked for Review {
    type Status = ModerationStatus;

    fn key(&self) -> Uuid {
        self.id.0
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    fn status(&self) -> ModerationStatus {
        self.moderation_status
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self, now: Timestamp) {
        self.version += 1;
        self.updated_at = now;
    }

    /// One review per reviewer and review type on a transaction.
    fn exclusive_key(&self) -> Option<String> {
        Some(format!(
            "{}:{}:{}",
            self.transaction_id,
            self.reviewer_id,
            self.review_type.as_str()
        ))
    }

    fn recipients(&self, _from: ModerationStatus, to: ModerationStatus) -> Vec<Recipient> {
        match to {
            ModerationStatus::Flagged => vec![Recipient::User(self.reviewer_id), Recipient::Admins],
            _ => vec![Recipient::User(self.reviewer_id)],
        }
    }
}
