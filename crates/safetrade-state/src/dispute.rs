//! # Dispute Lifecycle
//!
//! ```text
//! Open ──▶ Investigating ◀──▶ AwaitingResponse
//!   │            │                  │
//!   └────────────┴───▶ Escalated ◀──┘
//!                │         │
//!                ▼         ▼
//!             Resolved ◀───┘        any non-terminal ──▶ Closed
//! ```
//!
//! Only operators move a dispute. The parties contribute through
//! [`Dispute::respond`], which is an amendment and not a transition.
//! `Resolved` and `Closed` are terminal; there is no reopen path.

use safetrade_core::{
    Actor, ActorRole, DisputeId, EntityKind, LifecycleError, Timestamp, TransactionId, UserId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{self, TransitionRecord};
use crate::guard::{self, LifecycleStatus};
use crate::record::{Recipient, Tracked};
use crate::transaction::{non_blank, Transaction};

// ─── Enumerations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Investigating,
    AwaitingResponse,
    Resolved,
    Escalated,
    Closed,
}

const ADMIN_ONLY: &[ActorRole] = &[ActorRole::Admin];

impl DisputeStatus {
    pub const ALL: [DisputeStatus; 6] = [
        Self::Open,
        Self::Investigating,
        Self::AwaitingResponse,
        Self::Resolved,
        Self::Escalated,
        Self::Closed,
    ];
}

impl LifecycleStatus for DisputeStatus {
    const ENTITY: EntityKind = EntityKind::Dispute;

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::AwaitingResponse => "awaiting_response",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
            Self::Closed => "closed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Open => &[
                Self::Investigating,
                Self::AwaitingResponse,
                Self::Escalated,
                Self::Closed,
            ],
            Self::Investigating => &[
                Self::AwaitingResponse,
                Self::Resolved,
                Self::Escalated,
                Self::Closed,
            ],
            Self::AwaitingResponse => &[
                Self::Investigating,
                Self::Resolved,
                Self::Escalated,
                Self::Closed,
            ],
            Self::Escalated => &[Self::Resolved, Self::Closed],
            Self::Resolved | Self::Closed => &[],
        }
    }

    fn permitted_roles(&self, _to: Self) -> &'static [ActorRole] {
        ADMIN_ONLY
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the complaint is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    PaymentNotReceived,
    VehicleCondition,
    MissingDocuments,
    FraudulentListing,
    Other,
}

/// How an operator settled a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    RefundFull,
    RefundPartial,
    Replacement,
    Compensation,
    NoAction,
    Dismissed,
    ReleaseSeller,
    RelistVehicle,
}

impl ResolutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefundFull => "refund_full",
            Self::RefundPartial => "refund_partial",
            Self::Replacement => "replacement",
            Self::Compensation => "compensation",
            Self::NoAction => "no_action",
            Self::Dismissed => "dismissed",
            Self::ReleaseSeller => "release_seller",
            Self::RelistVehicle => "relist_vehicle",
        }
    }

    /// Whether the escrowed funds go back to the buyer.
    pub fn refunds_buyer(&self) -> bool {
        matches!(self, Self::RefundFull | Self::RefundPartial)
    }
}

// ─── Inputs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDispute {
    pub dispute_type: DisputeType,
    pub reason: String,
    pub description: String,
}

/// A requested status change. `resolution_type` and `resolution` are
/// required when `to` is `resolved`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisputeCommand {
    pub to: Option<DisputeStatus>,
    pub resolution_type: Option<ResolutionType>,
    pub resolution: Option<String>,
    pub admin_notes: Option<String>,
}

impl DisputeCommand {
    pub fn to(status: DisputeStatus) -> Self {
        Self {
            to: Some(status),
            ..Self::default()
        }
    }

    pub fn resolve(resolution_type: ResolutionType, resolution: impl Into<String>) -> Self {
        Self {
            to: Some(DisputeStatus::Resolved),
            resolution_type: Some(resolution_type),
            resolution: Some(resolution.into()),
            admin_notes: None,
        }
    }
}

// ─── Dispute ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub transaction_id: TransactionId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub raised_by: Option<UserId>,
    pub raised_by_role: ActorRole,
    pub dispute_type: DisputeType,
    pub reason: String,
    pub description: String,
    pub status: DisputeStatus,
    pub buyer_response: Option<String>,
    pub seller_response: Option<String>,
    pub admin_notes: Option<String>,
    pub resolution_type: Option<ResolutionType>,
    pub resolution: Option<String>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<Timestamp>,
    pub escalated_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub version: u64,
    pub transition_log: Vec<TransitionRecord<DisputeStatus>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Dispute {
    /// Open a dispute against `transaction`.
    ///
    /// The raiser must be the buyer, the seller, or an operator.
    pub fn file(
        input: NewDispute,
        transaction: &Transaction,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Self, LifecycleError> {
        let is_party = actor.user_id.is_some_and(|u| transaction.is_party(u));
        if !(actor.role == ActorRole::Admin || (actor.role.is_party() && is_party)) {
            return Err(LifecycleError::Forbidden {
                role: actor.role.as_str().to_string(),
                action: format!("file a dispute on {}", transaction.id),
            });
        }
        let reason = non_blank(Some(&input.reason))
            .ok_or_else(|| LifecycleError::validation("reason", "reason must not be blank"))?
            .to_string();
        let description = non_blank(Some(&input.description))
            .ok_or_else(|| {
                LifecycleError::validation("description", "description must not be blank")
            })?
            .to_string();

        Ok(Self {
            id: DisputeId::new(),
            transaction_id: transaction.id,
            buyer_id: transaction.buyer_id,
            seller_id: transaction.seller_id,
            raised_by: actor.user_id,
            raised_by_role: actor.role,
            dispute_type: input.dispute_type,
            reason,
            description,
            status: DisputeStatus::Open,
            buyer_response: None,
            seller_response: None,
            admin_notes: None,
            resolution_type: None,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            escalated_at: None,
            closed_at: None,
            version: 1,
            transition_log: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Validate and apply a status change. On error, `self` is unchanged.
    ///
    /// Resolution fields are checked before the edge, so a resolve request
    /// without them always reports the missing field.
    pub fn apply(
        &mut self,
        cmd: &DisputeCommand,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        let to = cmd
            .to
            .ok_or_else(|| LifecycleError::validation("to", "target status is required"))?;
        let from = self.status;

        let mut resolution = None;
        if to == DisputeStatus::Resolved {
            let kind = cmd.resolution_type.ok_or_else(|| {
                LifecycleError::validation("resolution_type", "a resolution type is required")
            })?;
            let text = non_blank(cmd.resolution.as_deref()).ok_or_else(|| {
                LifecycleError::validation("resolution", "resolution text must not be blank")
            })?;
            resolution = Some((kind, text));
        }

        guard::check(from, to, actor.role).into_result(from, to, actor.role)?;

        let mut next = self.clone();
        if let Some(notes) = non_blank(cmd.admin_notes.as_deref()) {
            next.admin_notes = Some(notes.to_string());
        }
        match to {
            DisputeStatus::Resolved => {
                if let Some((kind, text)) = resolution {
                    next.resolution_type = Some(kind);
                    next.resolution = Some(text.to_string());
                }
                next.resolved_by = actor.user_id;
                next.resolved_at = Some(now);
            }
            DisputeStatus::Escalated => next.escalated_at = Some(now),
            DisputeStatus::Closed => next.closed_at = Some(now),
            DisputeStatus::Open | DisputeStatus::Investigating | DisputeStatus::AwaitingResponse => {}
        }
        next.status = to;

        let reason = resolution.map(|(kind, _)| kind.as_str());
        audit::append(&mut next.transition_log, from, to, actor, reason, now)?;
        *self = next;
        Ok(())
    }

    /// Record a party's statement. Each party has one response slot; a new
    /// response replaces the previous one.
    pub fn respond(&mut self, actor: &Actor, text: &str) -> Result<(), LifecycleError> {
        if self.status.is_terminal() {
            return Err(LifecycleError::validation(
                "status",
                format!("dispute is {} and accepts no responses", self.status),
            ));
        }
        let text = non_blank(Some(text))
            .ok_or_else(|| LifecycleError::validation("response", "response must not be blank"))?
            .to_string();
        match (actor.role, actor.user_id) {
            (ActorRole::Buyer, Some(user)) if user == self.buyer_id => {
                self.buyer_response = Some(text)
            }
            (ActorRole::Seller, Some(user)) if user == self.seller_id => {
                self.seller_response = Some(text)
            }
            _ => {
                return Err(LifecycleError::Forbidden {
                    role: actor.role.as_str().to_string(),
                    action: format!("respond to {}", self.id),
                })
            }
        }
        Ok(())
    }
}

impl Tracked for Dispute {
    type Status = DisputeStatus;

    fn key(&self) -> Uuid {
        self.id.0
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    fn status(&self) -> DisputeStatus {
        self.status
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self, now: Timestamp) {
        self.version += 1;
        self.updated_at = now;
    }

    /// One unfinished dispute per transaction.
    fn exclusive_key(&self) -> Option<String> {
        (!self.status.is_terminal()).then(|| self.transaction_id.to_string())
    }

    fn recipients(&self, _from: DisputeStatus, _to: DisputeStatus) -> Vec<Recipient> {
        vec![
            Recipient::User(self.buyer_id),
            Recipient::User(self.seller_id),
            Recipient::Admins,
        ]
    }
}
