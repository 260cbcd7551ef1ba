//! # Transaction Lifecycle State Machine
//!
//! Models an escrow-style vehicle trade from purchase intent to release of
//! funds.
//!
//! ## States
//!
//! ```text
//! Pending ──▶ AwaitingBankTransfer ──▶ PaymentSubmitted ──▶ PaymentVerified
//!    │               ▲      ▲                  │                  │
//!    ▼               │      └──(proof rejected)┘                  ▼
//! ContractGenerated ──▶ ContractSigned                     ReadyForDelivery
//!                                                                 │
//!                                                                 ▼
//!                                          Completed ◀──────── Delivered
//!
//! any non-terminal ──▶ Disputed ──▶ (resume the interrupted stage)
//! any non-terminal ──▶ Cancelled
//! PaymentVerified | ReadyForDelivery | Disputed ──▶ Refunded
//! ```
//!
//! Terminal: `Completed`, `Cancelled`, `Refunded`.
//!
//! ## Milestones
//!
//! Entering a status stamps its milestone timestamp. Along the payment
//! path and the contract path, a later milestone is never set while an
//! earlier one is null; [`Transaction::first_milestone_gap`] detects
//! violations and [`Transaction::apply`] refuses to produce one.
//!
//! ## Atomicity
//!
//! `apply` works on a copy and only replaces `self` once every check has
//! passed, so a rejected transition leaves the transaction untouched.

use rust_decimal::Decimal;
use safetrade_core::{
    percentage_of, round_half_up, Actor, ActorRole, Currency, DealerId, EntityKind,
    LifecycleError, Timestamp, TransactionId, UserId, VehicleId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{self, TransitionRecord};
use crate::guard::{self, LifecycleStatus};
use crate::record::{Recipient, Tracked};

/// Trades above this amount alert the operators on every status change.
pub const HIGH_VALUE_THRESHOLD: Decimal = Decimal::from_parts(50_000, 0, 0, false, 0);

// ─── Status ──────────────────────────────────────────────────────────

/// The closed set of transaction states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Buyer has initiated a purchase.
    Pending,
    /// Escrow account details issued; waiting for the buyer's wire.
    AwaitingBankTransfer,
    /// Purchase contract drafted.
    ContractGenerated,
    /// Buyer has uploaded the signed contract.
    ContractSigned,
    /// Buyer has uploaded a transfer proof.
    PaymentSubmitted,
    /// Funds confirmed on the escrow account.
    PaymentVerified,
    /// Seller has prepared the vehicle for handover.
    ReadyForDelivery,
    /// Vehicle handed over.
    Delivered,
    /// Funds released (terminal).
    Completed,
    /// A party has raised a dispute; the trade is frozen.
    Disputed,
    /// Trade abandoned (terminal).
    Cancelled,
    /// Escrowed funds returned to the buyer (terminal).
    Refunded,
}

const EARLY_CANCEL: &[ActorRole] = &[
    ActorRole::Buyer,
    ActorRole::Seller,
    ActorRole::Dealer,
    ActorRole::Admin,
];
const ADMIN_ONLY: &[ActorRole] = &[ActorRole::Admin];
const RAISE_DISPUTE: &[ActorRole] = &[ActorRole::Buyer, ActorRole::Seller, ActorRole::Admin];
const SELLER_SIDE_OR_SYSTEM: &[ActorRole] = &[
    ActorRole::Seller,
    ActorRole::Dealer,
    ActorRole::Admin,
    ActorRole::System,
];
const SELLER_SIDE: &[ActorRole] = &[ActorRole::Seller, ActorRole::Dealer, ActorRole::Admin];
const BUYER_ONLY: &[ActorRole] = &[ActorRole::Buyer];
const BUYER_OR_OPERATOR: &[ActorRole] = &[ActorRole::Buyer, ActorRole::Admin, ActorRole::System];
const PAYMENT_REVIEWERS: &[ActorRole] = &[ActorRole::Admin, ActorRole::Dealer];

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 12] = [
        Self::Pending,
        Self::AwaitingBankTransfer,
        Self::ContractGenerated,
        Self::ContractSigned,
        Self::PaymentSubmitted,
        Self::PaymentVerified,
        Self::ReadyForDelivery,
        Self::Delivered,
        Self::Completed,
        Self::Disputed,
        Self::Cancelled,
        Self::Refunded,
    ];

    /// Position on the happy path, `None` for off-path states.
    ///
    /// The contract branch sits between `Pending` and
    /// `AwaitingBankTransfer`.
    pub fn stage(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::ContractGenerated => Some(1),
            Self::ContractSigned => Some(2),
            Self::AwaitingBankTransfer => Some(3),
            Self::PaymentSubmitted => Some(4),
            Self::PaymentVerified => Some(5),
            Self::ReadyForDelivery => Some(6),
            Self::Delivered => Some(7),
            Self::Completed => Some(8),
            Self::Disputed | Self::Cancelled | Self::Refunded => None,
        }
    }

    /// Legal predecessors of this status, derived from the transition table.
    pub fn predecessors(&self) -> Vec<TransactionStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.valid_transitions().contains(self))
            .collect()
    }

    /// Name of the milestone field stamped on entry.
    pub fn milestone(&self) -> Option<&'static str> {
        match self {
            Self::ContractGenerated => Some("contract_generated_at"),
            Self::ContractSigned => Some("contract_signed_at"),
            Self::PaymentSubmitted => Some("payment_submitted_at"),
            Self::PaymentVerified => Some("payment_confirmed_at"),
            Self::ReadyForDelivery => Some("ready_for_delivery_at"),
            Self::Delivered => Some("delivered_at"),
            Self::Completed => Some("completed_at"),
            Self::Disputed => Some("disputed_at"),
            Self::Cancelled => Some("cancelled_at"),
            Self::Refunded => Some("refunded_at"),
            Self::Pending | Self::AwaitingBankTransfer => None,
        }
    }

    /// Whether a buyer or seller may still walk away without an operator.
    fn before_payment_verified(&self) -> bool {
        matches!(self.stage(), Some(stage) if stage < 5)
    }
}

impl LifecycleStatus for TransactionStatus {
    const ENTITY: EntityKind = EntityKind::Transaction;

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingBankTransfer => "awaiting_bank_transfer",
            Self::ContractGenerated => "contract_generated",
            Self::ContractSigned => "contract_signed",
            Self::PaymentSubmitted => "payment_submitted",
            Self::PaymentVerified => "payment_verified",
            Self::ReadyForDelivery => "ready_for_delivery",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Refunded)
    }

    fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Pending => &[
                Self::AwaitingBankTransfer,
                Self::ContractGenerated,
                Self::Disputed,
                Self::Cancelled,
            ],
            Self::ContractGenerated => &[Self::ContractSigned, Self::Disputed, Self::Cancelled],
            Self::ContractSigned => &[Self::AwaitingBankTransfer, Self::Disputed, Self::Cancelled],
            Self::AwaitingBankTransfer => &[Self::PaymentSubmitted, Self::Disputed, Self::Cancelled],
            Self::PaymentSubmitted => &[
                Self::PaymentVerified,
                Self::AwaitingBankTransfer,
                Self::Disputed,
                Self::Cancelled,
            ],
            Self::PaymentVerified => &[
                Self::ReadyForDelivery,
                Self::Disputed,
                Self::Cancelled,
                Self::Refunded,
            ],
            Self::ReadyForDelivery => &[
                Self::Delivered,
                Self::Disputed,
                Self::Cancelled,
                Self::Refunded,
            ],
            Self::Delivered => &[Self::Completed, Self::Disputed, Self::Cancelled],
            // Resume targets; the executor narrows this to `disputed_from`.
            Self::Disputed => &[
                Self::Pending,
                Self::ContractGenerated,
                Self::ContractSigned,
                Self::AwaitingBankTransfer,
                Self::PaymentSubmitted,
                Self::PaymentVerified,
                Self::ReadyForDelivery,
                Self::Delivered,
                Self::Cancelled,
                Self::Refunded,
            ],
            Self::Completed | Self::Cancelled | Self::Refunded => &[],
        }
    }

    fn permitted_roles(&self, to: Self) -> &'static [ActorRole] {
        match (self, to) {
            (_, Self::Disputed) => RAISE_DISPUTE,
            (_, Self::Refunded) => ADMIN_ONLY,
            (Self::Disputed, _) => ADMIN_ONLY,
            (from, Self::Cancelled) => {
                if from.before_payment_verified() {
                    EARLY_CANCEL
                } else {
                    ADMIN_ONLY
                }
            }
            (Self::Pending, Self::AwaitingBankTransfer | Self::ContractGenerated) => {
                SELLER_SIDE_OR_SYSTEM
            }
            (Self::ContractGenerated, Self::ContractSigned) => BUYER_ONLY,
            (Self::ContractSigned, Self::AwaitingBankTransfer) => BUYER_OR_OPERATOR,
            (Self::AwaitingBankTransfer, Self::PaymentSubmitted) => BUYER_ONLY,
            (Self::PaymentSubmitted, Self::PaymentVerified | Self::AwaitingBankTransfer) => {
                PAYMENT_REVIEWERS
            }
            (Self::PaymentVerified, Self::ReadyForDelivery)
            | (Self::ReadyForDelivery, Self::Delivered) => SELLER_SIDE,
            (Self::Delivered, Self::Completed) => BUYER_OR_OPERATOR,
            _ => &[],
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Fees ────────────────────────────────────────────────────────────

/// Platform fee percentages and accepted amount bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Buyer service fee, in percent of the trade amount.
    pub buyer_fee_percentage: Decimal,
    /// Dealer commission, in percent, charged only when a dealer brokers the trade.
    pub dealer_commission_percentage: Decimal,
    /// Smallest accepted trade amount.
    pub min_amount: Decimal,
    /// Largest accepted trade amount.
    pub max_amount: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            buyer_fee_percentage: Decimal::new(25, 1),
            dealer_commission_percentage: Decimal::new(30, 1),
            min_amount: Decimal::new(500, 0),
            max_amount: Decimal::new(500_000, 0),
        }
    }
}

impl FeeSchedule {
    /// Reject schedules that could produce a negative seller payout.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.buyer_fee_percentage.is_sign_negative()
            || self.dealer_commission_percentage.is_sign_negative()
        {
            return Err(LifecycleError::validation(
                "fee_schedule",
                "fee percentages must not be negative",
            ));
        }
        if self.buyer_fee_percentage + self.dealer_commission_percentage >= Decimal::ONE_HUNDRED {
            return Err(LifecycleError::validation(
                "fee_schedule",
                "fees must sum to less than 100%",
            ));
        }
        if self.min_amount <= Decimal::ZERO || self.min_amount > self.max_amount {
            return Err(LifecycleError::validation(
                "fee_schedule",
                "amount bounds must satisfy 0 < min <= max",
            ));
        }
        Ok(())
    }

    /// Amounts must carry at most two decimals and lie within the bounds.
    pub fn check_amount(&self, amount: Decimal) -> Result<(), LifecycleError> {
        if amount.normalize().scale() > 2 {
            return Err(LifecycleError::validation(
                "amount",
                "amount must have at most two decimal places",
            ));
        }
        if amount < self.min_amount || amount > self.max_amount {
            return Err(LifecycleError::validation(
                "amount",
                format!(
                    "amount must be between {} and {}",
                    self.min_amount, self.max_amount
                ),
            ));
        }
        Ok(())
    }

    /// Settlement a trade of `amount` would produce.
    pub fn quote(
        &self,
        amount: Decimal,
        currency: Currency,
        brokered: bool,
    ) -> Result<Settlement, LifecycleError> {
        self.check_amount(amount)?;
        let gross_amount = round_half_up(amount, 2);
        let service_fee = self.service_fee(gross_amount);
        let dealer_commission = self.dealer_commission(gross_amount, brokered);
        Ok(Settlement {
            currency,
            gross_amount,
            service_fee,
            dealer_commission,
            seller_payout: round_half_up(gross_amount - service_fee - dealer_commission, 2),
        })
    }

    pub fn service_fee(&self, amount: Decimal) -> Decimal {
        percentage_of(amount, self.buyer_fee_percentage)
    }

    pub fn dealer_commission(&self, amount: Decimal, brokered: bool) -> Decimal {
        if brokered {
            percentage_of(amount, self.dealer_commission_percentage)
        } else {
            round_half_up(Decimal::ZERO, 2)
        }
    }
}

/// Escrow release breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub currency: Currency,
    pub gross_amount: Decimal,
    pub service_fee: Decimal,
    pub dealer_commission: Decimal,
    /// `gross_amount - service_fee - dealer_commission`.
    pub seller_payout: Decimal,
}

// ─── Inputs ──────────────────────────────────────────────────────────

/// Input for opening a new trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub vehicle_id: VehicleId,
    pub dealer_id: Option<DealerId>,
    pub amount: Decimal,
    pub currency: Currency,
    pub escrow_account_iban: Option<String>,
    pub notes: Option<String>,
}

/// Human-readable references assigned at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCodes {
    /// `AS24-TXN-{YYYY}-{XXXXXX}`.
    pub transaction_code: String,
    /// `AS24-REF-{XXXXXXXXXXXX}`, quoted by the buyer on the wire.
    pub payment_reference: String,
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCommand {
    pub to: TransactionStatus,
    /// Required for `disputed`, `cancelled`, `refunded`, and proof rejection.
    pub reason: Option<String>,
    /// Required for `payment_submitted`.
    pub payment_proof: Option<String>,
}

impl TransactionCommand {
    pub fn to(status: TransactionStatus) -> Self {
        Self {
            to: status,
            reason: None,
            payment_proof: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_payment_proof(mut self, proof: impl Into<String>) -> Self {
        self.payment_proof = Some(proof.into());
        self
    }
}

// ─── Transaction ─────────────────────────────────────────────────────

/// One buyer-seller-vehicle trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub transaction_code: String,
    pub payment_reference: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub vehicle_id: VehicleId,
    pub dealer_id: Option<DealerId>,
    pub amount: Decimal,
    pub currency: Currency,
    pub service_fee: Decimal,
    pub dealer_commission: Decimal,
    pub escrow_account_iban: Option<String>,
    pub status: TransactionStatus,
    /// The stage a dispute interrupted, while `status == Disputed`.
    pub disputed_from: Option<TransactionStatus>,
    pub payment_proof: Option<String>,
    pub contract_generated_at: Option<Timestamp>,
    pub contract_signed_at: Option<Timestamp>,
    pub payment_submitted_at: Option<Timestamp>,
    pub payment_confirmed_at: Option<Timestamp>,
    pub payment_verified_by: Option<UserId>,
    pub ready_for_delivery_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub disputed_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by: Option<UserId>,
    pub cancelled_at: Option<Timestamp>,
    pub cancelled_by: Option<UserId>,
    pub cancellation_reason: Option<String>,
    pub refunded_at: Option<Timestamp>,
    pub notes: Option<String>,
    pub version: u64,
    pub transition_log: Vec<TransitionRecord<TransactionStatus>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Transaction {
    /// Open a trade in `Pending`, deriving fees from the schedule.
    pub fn create(
        input: NewTransaction,
        codes: ReferenceCodes,
        fees: &FeeSchedule,
        now: Timestamp,
    ) -> Result<Self, LifecycleError> {
        if input.buyer_id == input.seller_id {
            return Err(LifecycleError::validation(
                "seller_id",
                "buyer and seller must be different users",
            ));
        }
        fees.check_amount(input.amount)?;

        let amount = round_half_up(input.amount, 2);
        Ok(Self {
            id: TransactionId::new(),
            transaction_code: codes.transaction_code,
            payment_reference: codes.payment_reference,
            buyer_id: input.buyer_id,
            seller_id: input.seller_id,
            vehicle_id: input.vehicle_id,
            dealer_id: input.dealer_id,
            amount,
            currency: input.currency,
            service_fee: fees.service_fee(amount),
            dealer_commission: fees.dealer_commission(amount, input.dealer_id.is_some()),
            escrow_account_iban: input.escrow_account_iban,
            status: TransactionStatus::Pending,
            disputed_from: None,
            payment_proof: None,
            contract_generated_at: None,
            contract_signed_at: None,
            payment_submitted_at: None,
            payment_confirmed_at: None,
            payment_verified_by: None,
            ready_for_delivery_at: None,
            delivered_at: None,
            completed_at: None,
            disputed_at: None,
            resolved_at: None,
            resolved_by: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            refunded_at: None,
            notes: input.notes,
            version: 1,
            transition_log: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Validate and apply a status change.
    ///
    /// On error, `self` is unchanged.
    pub fn apply(
        &mut self,
        cmd: &TransactionCommand,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        use TransactionStatus::*;

        let from = self.status;
        let to = cmd.to;
        guard::check(from, to, actor.role).into_result(from, to, actor.role)?;
        self.require_party(actor)?;

        let resuming = from == Disputed && !matches!(to, Cancelled | Refunded);
        if resuming && self.disputed_from != Some(to) {
            let interrupted = self
                .disputed_from
                .map(|s| s.as_str())
                .unwrap_or("no recorded stage");
            return Err(LifecycleError::InvalidTransition {
                entity: EntityKind::Transaction,
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("dispute interrupted {interrupted}; it can only resume there"),
            });
        }

        let reason = non_blank(cmd.reason.as_deref());
        let proof_rejected = from == PaymentSubmitted && to == AwaitingBankTransfer;
        if (matches!(to, Disputed | Cancelled | Refunded) || proof_rejected) && reason.is_none() {
            return Err(LifecycleError::validation(
                "reason",
                format!("a reason is required to move to {to}"),
            ));
        }
        let proof = non_blank(cmd.payment_proof.as_deref());
        if to == PaymentSubmitted && !resuming && proof.is_none() {
            return Err(LifecycleError::validation(
                "payment_proof",
                "a transfer proof reference is required",
            ));
        }

        let mut next = self.clone();
        if resuming {
            next.disputed_from = None;
            next.resolved_at = Some(now);
            next.resolved_by = actor.user_id;
        } else {
            match to {
                ContractGenerated => next.contract_generated_at = Some(now),
                ContractSigned => next.contract_signed_at = Some(now),
                AwaitingBankTransfer if proof_rejected => {
                    next.payment_submitted_at = None;
                    next.payment_proof = None;
                }
                PaymentSubmitted => {
                    next.payment_submitted_at = Some(now);
                    next.payment_proof = proof.map(str::to_string);
                }
                PaymentVerified => {
                    next.payment_confirmed_at = Some(now);
                    next.payment_verified_by = actor.user_id;
                }
                ReadyForDelivery => next.ready_for_delivery_at = Some(now),
                Delivered => next.delivered_at = Some(now),
                Completed => next.completed_at = Some(now),
                Disputed => {
                    next.disputed_at = Some(now);
                    next.disputed_from = Some(from);
                }
                Cancelled => {
                    next.cancelled_at = Some(now);
                    next.cancelled_by = actor.user_id;
                    next.cancellation_reason = reason.map(str::to_string);
                    next.disputed_from = None;
                }
                Refunded => {
                    next.refunded_at = Some(now);
                    if from == Disputed {
                        next.resolved_at = Some(now);
                        next.resolved_by = actor.user_id;
                    }
                    next.disputed_from = None;
                }
                Pending | AwaitingBankTransfer => {}
            }
        }
        next.status = to;

        if let Some(field) = next.first_milestone_gap() {
            return Err(LifecycleError::validation(
                field,
                "milestone would be set while an earlier milestone is empty",
            ));
        }

        audit::append(&mut next.transition_log, from, to, actor, reason, now)?;
        *self = next;
        Ok(())
    }

    /// First milestone that is set while an earlier one on the same path is
    /// still empty.
    pub fn first_milestone_gap(&self) -> Option<&'static str> {
        let payment_path = [
            ("payment_submitted_at", self.payment_submitted_at),
            ("payment_confirmed_at", self.payment_confirmed_at),
            ("ready_for_delivery_at", self.ready_for_delivery_at),
            ("delivered_at", self.delivered_at),
            ("completed_at", self.completed_at),
        ];
        let contract_path = [
            ("contract_generated_at", self.contract_generated_at),
            ("contract_signed_at", self.contract_signed_at),
        ];
        for path in [&payment_path[..], &contract_path[..]] {
            let mut gap_seen = false;
            for (field, value) in path {
                match value {
                    None => gap_seen = true,
                    Some(_) if gap_seen => return Some(field),
                    Some(_) => {}
                }
            }
        }
        None
    }

    /// Mark a finished trade as deleted. Only operators may do this, and
    /// only once the trade is terminal.
    pub fn soft_delete(&mut self, actor: &Actor, now: Timestamp) -> Result<(), LifecycleError> {
        if actor.role != ActorRole::Admin {
            return Err(LifecycleError::Forbidden {
                role: actor.role.as_str().to_string(),
                action: "delete a transaction".to_string(),
            });
        }
        if !self.status.is_terminal() {
            return Err(LifecycleError::validation(
                "status",
                format!("only finished trades can be deleted, this one is {}", self.status),
            ));
        }
        self.deleted_at.get_or_insert(now);
        Ok(())
    }

    /// Escrow release breakdown for this trade.
    pub fn settlement(&self) -> Settlement {
        Settlement {
            currency: self.currency.clone(),
            gross_amount: self.amount,
            service_fee: self.service_fee,
            dealer_commission: self.dealer_commission,
            seller_payout: round_half_up(
                self.amount - self.service_fee - self.dealer_commission,
                2,
            ),
        }
    }

    /// Whether `user` is the buyer or the seller.
    pub fn is_party(&self, user: UserId) -> bool {
        user == self.buyer_id || user == self.seller_id
    }

    pub fn is_high_value(&self) -> bool {
        self.amount > HIGH_VALUE_THRESHOLD
    }

    /// Buyers and sellers may only act on their own trades.
    fn require_party(&self, actor: &Actor) -> Result<(), LifecycleError> {
        let expected = match actor.role {
            ActorRole::Buyer => self.buyer_id,
            ActorRole::Seller => self.seller_id,
            _ => return Ok(()),
        };
        if actor.user_id == Some(expected) {
            Ok(())
        } else {
            Err(LifecycleError::Forbidden {
                role: actor.role.as_str().to_string(),
                action: format!("act on {} as a non-party", self.id),
            })
        }
    }
}

impl Tracked for Transaction {
    type Status = TransactionStatus;

    fn key(&self) -> Uuid {
        self.id.0
    }

    fn transaction_id(&self) -> TransactionId {
        self.id
    }

    fn status(&self) -> TransactionStatus {
        self.status
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self, now: Timestamp) {
        self.version += 1;
        self.updated_at = now;
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn recipients(&self, _from: TransactionStatus, to: TransactionStatus) -> Vec<Recipient> {
        let mut out = vec![Recipient::User(self.buyer_id), Recipient::User(self.seller_id)];
        if matches!(to, TransactionStatus::Disputed | TransactionStatus::Cancelled)
            || self.is_high_value()
        {
            out.push(Recipient::Admins);
        }
        out
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ─── Tests ───────────────────────────────────────────────────────────
