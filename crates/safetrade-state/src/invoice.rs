//! # Invoices
//!
//! An invoice bills the buyer for a trade. Its VAT and total are never
//! set directly: [`derive_amounts`] computes them from `amount` and
//! `vat_percentage` on creation and on every reprice.
//!
//! ```text
//! Draft ──▶ Sent ──▶ Paid ──▶ Confirmed
//!   │         │
//!   └─────────┴──▶ Cancelled
//! ```

use rust_decimal::Decimal;
use safetrade_core::{
    round_half_up, Actor, ActorRole, Currency, EntityKind, InvoiceId, LifecycleError, Timestamp,
    TransactionId, UserId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{self, TransitionRecord};
use crate::guard::{self, LifecycleStatus};
use crate::record::{Recipient, Tracked};
use crate::transaction::{non_blank, Transaction};

/// Days between issue and due date when none is given.
pub const DEFAULT_DUE_DAYS: i64 = 14;

/// Default VAT percentage.
pub fn default_vat_percentage() -> Decimal {
    Decimal::new(19, 0)
}

// ─── Derivation ──────────────────────────────────────────────────────

/// VAT and gross total for a net amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAmounts {
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
}

/// Derive VAT and total, rounding half-up to two decimal places.
///
/// Both are rounded from the exact product, so the total is
/// `round(amount + amount * vat / 100)`. For an amount that
/// [`validate_amounts`] accepts it equals `amount + vat_amount`.
///
/// ```
/// use rust_decimal::Decimal;
/// use safetrade_state::invoice::derive_amounts;
///
/// let d = derive_amounts(Decimal::new(100_000, 2), Decimal::new(19, 0));
/// assert_eq!(d.vat_amount.to_string(), "190.00");
/// assert_eq!(d.total_amount.to_string(), "1190.00");
/// ```
pub fn derive_amounts(amount: Decimal, vat_percentage: Decimal) -> DerivedAmounts {
    let vat = amount * vat_percentage / Decimal::ONE_HUNDRED;
    DerivedAmounts {
        vat_amount: round_half_up(vat, 2),
        total_amount: round_half_up(amount + vat, 2),
    }
}

/// Reject inputs `derive_amounts` should never see.
pub fn validate_amounts(amount: Decimal, vat_percentage: Decimal) -> Result<(), LifecycleError> {
    if amount <= Decimal::ZERO {
        return Err(LifecycleError::validation("amount", "amount must be positive"));
    }
    if amount.normalize().scale() > 2 {
        return Err(LifecycleError::validation(
            "amount",
            "amount must have at most two decimal places",
        ));
    }
    if vat_percentage < Decimal::ZERO || vat_percentage > Decimal::ONE_HUNDRED {
        return Err(LifecycleError::validation(
            "vat_percentage",
            "VAT must be between 0 and 100",
        ));
    }
    Ok(())
}

// ─── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Confirmed,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        Self::Draft,
        Self::Sent,
        Self::Paid,
        Self::Confirmed,
        Self::Cancelled,
    ];

    /// Whether the amounts may still change.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }
}

impl LifecycleStatus for InvoiceStatus {
    const ENTITY: EntityKind = EntityKind::Invoice;

    fn all() -> &'static [Self] {
        &Self::ALL
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }

    fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Sent, Self::Cancelled],
            Self::Sent => &[Self::Paid, Self::Cancelled],
            Self::Paid => &[Self::Confirmed],
            Self::Confirmed | Self::Cancelled => &[],
        }
    }

    fn permitted_roles(&self, to: Self) -> &'static [ActorRole] {
        match to {
            Self::Sent => &[
                ActorRole::Admin,
                ActorRole::Seller,
                ActorRole::Dealer,
                ActorRole::System,
            ],
            Self::Paid => &[ActorRole::Admin, ActorRole::Buyer, ActorRole::System],
            Self::Confirmed => &[ActorRole::Admin],
            Self::Cancelled => &[ActorRole::Admin, ActorRole::Seller, ActorRole::Dealer],
            Self::Draft => &[],
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Invoice ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub amount: Decimal,
    pub vat_percentage: Option<Decimal>,
    pub due_date: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCommand {
    pub to: InvoiceStatus,
    pub notes: Option<String>,
}

impl InvoiceCommand {
    pub fn to(status: InvoiceStatus) -> Self {
        Self { to: status, notes: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub transaction_id: TransactionId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub invoice_number: String,
    pub amount: Decimal,
    pub vat_percentage: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub status: InvoiceStatus,
    pub due_date: Timestamp,
    pub issued_at: Option<Timestamp>,
    pub paid_at: Option<Timestamp>,
    pub confirmed_at: Option<Timestamp>,
    pub verified_by: Option<UserId>,
    pub verification_notes: Option<String>,
    pub cancelled_at: Option<Timestamp>,
    pub version: u64,
    pub transition_log: Vec<TransitionRecord<InvoiceStatus>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Invoice {
    /// Draft an invoice for `transaction` under `invoice_number`.
    pub fn new(
        input: NewInvoice,
        transaction: &Transaction,
        invoice_number: String,
        now: Timestamp,
    ) -> Result<Self, LifecycleError> {
        let vat_percentage = input.vat_percentage.unwrap_or_else(default_vat_percentage);
        validate_amounts(input.amount, vat_percentage)?;
        let due_date = input
            .due_date
            .unwrap_or_else(|| now.plus_days(DEFAULT_DUE_DAYS));
        if due_date < now {
            return Err(LifecycleError::validation(
                "due_date",
                "due date must not be in the past",
            ));
        }
        let amount = round_half_up(input.amount, 2);
        let derived = derive_amounts(amount, vat_percentage);
        Ok(Self {
            id: InvoiceId::new(),
            transaction_id: transaction.id,
            buyer_id: transaction.buyer_id,
            seller_id: transaction.seller_id,
            invoice_number,
            amount,
            vat_percentage,
            vat_amount: derived.vat_amount,
            total_amount: derived.total_amount,
            currency: transaction.currency.clone(),
            status: InvoiceStatus::Draft,
            due_date,
            issued_at: None,
            paid_at: None,
            confirmed_at: None,
            verified_by: None,
            verification_notes: None,
            cancelled_at: None,
            version: 1,
            transition_log: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Change the net amount and/or VAT and re-derive the totals.
    pub fn reprice(
        &mut self,
        amount: Option<Decimal>,
        vat_percentage: Option<Decimal>,
    ) -> Result<(), LifecycleError> {
        if !self.status.is_editable() {
            return Err(LifecycleError::validation(
                "status",
                format!("a {} invoice can no longer be repriced", self.status),
            ));
        }
        let amount = amount.unwrap_or(self.amount);
        let vat_percentage = vat_percentage.unwrap_or(self.vat_percentage);
        validate_amounts(amount, vat_percentage)?;

        let amount = round_half_up(amount, 2);
        let derived = derive_amounts(amount, vat_percentage);
        self.amount = amount;
        self.vat_percentage = vat_percentage;
        self.vat_amount = derived.vat_amount;
        self.total_amount = derived.total_amount;
        Ok(())
    }

    /// Whether the stored totals match a fresh derivation.
    pub fn amounts_consistent(&self) -> bool {
        let derived = derive_amounts(self.amount, self.vat_percentage);
        derived.vat_amount == self.vat_amount && derived.total_amount == self.total_amount
    }

    /// Validate and apply a status change. On error, `self` is unchanged.
    pub fn apply(
        &mut self,
        cmd: &InvoiceCommand,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        let from = self.status;
        let to = cmd.to;
        guard::check(from, to, actor.role).into_result(from, to, actor.role)?;
        if actor.role == ActorRole::Buyer && actor.user_id != Some(self.buyer_id) {
            return Err(LifecycleError::Forbidden {
                role: actor.role.as_str().to_string(),
                action: format!("pay {} as a non-party", self.invoice_number),
            });
        }
        if actor.role == ActorRole::Seller && actor.user_id != Some(self.seller_id) {
            return Err(LifecycleError::Forbidden {
                role: actor.role.as_str().to_string(),
                action: format!("manage {} as a non-party", self.invoice_number),
            });
        }

        let notes = non_blank(cmd.notes.as_deref());
        let mut next = self.clone();
        match to {
            InvoiceStatus::Sent => next.issued_at = Some(now),
            InvoiceStatus::Paid => next.paid_at = Some(now),
            InvoiceStatus::Confirmed => {
                next.confirmed_at = Some(now);
                next.verified_by = actor.user_id;
                next.verification_notes = notes.map(str::to_string);
            }
            InvoiceStatus::Cancelled => next.cancelled_at = Some(now),
            InvoiceStatus::Draft => {}
        }
        next.status = to;
        audit::append(&mut next.transition_log, from, to, actor, notes, now)?;
        *self = next;
        Ok(())
    }

    pub fn is_overdue(&self, now: Timestamp) -> bool {
        matches!(self.status, InvoiceStatus::Draft | InvoiceStatus::Sent) && now > self.due_date
    }
}

impl Tracked for Invoice {
    type Status = InvoiceStatus;

    fn key(&self) -> Uuid {
        self.id.0
    }

    fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    fn status(&self) -> InvoiceStatus {
        self.status
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self, now: Timestamp) {
        self.version += 1;
        self.updated_at = now;
    }

    fn recipients(&self, _from: InvoiceStatus, to: InvoiceStatus) -> Vec<Recipient> {
        match to {
            InvoiceStatus::Paid => vec![Recipient::User(self.seller_id), Recipient::Admins],
            _ => vec![Recipient::User(self.buyer_id)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{FeeSchedule, NewTransaction, ReferenceCodes};
    use proptest::prelude::*;
    use safetrade_core::VehicleId;
    use std::str::FromStr;

    fn now() -> Timestamp {
        Timestamp::parse("2026-06-01T08:30:00Z").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn transaction() -> Transaction {
        let input = NewTransaction {
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            vehicle_id: VehicleId::new(),
            dealer_id: None,
            amount: dec("18000"),
            currency: Currency::eur(),
            escrow_account_iban: None,
            notes: None,
        };
        let codes = ReferenceCodes {
            transaction_code: "AS24-TXN-2026-INV001".to_string(),
            payment_reference: "AS24-REF-INV000000001".to_string(),
        };
        Transaction::create(input, codes, &FeeSchedule::default(), now()).unwrap()
    }

    fn draft(amount: &str) -> Invoice {
        let input = NewInvoice {
            amount: dec(amount),
            vat_percentage: None,
            due_date: None,
        };
        Invoice::new(input, &transaction(), "INV-2026-00001".to_string(), now()).unwrap()
    }

    #[test]
    fn test_derive_reference_example() {
        let d = derive_amounts(dec("1000.00"), dec("19"));
        assert_eq!(d.vat_amount, dec("190.00"));
        assert_eq!(d.total_amount, dec("1190.00"));
    }

    #[test]
    fn test_derive_rounds_half_up() {
        // 0.125 rounds up to 0.13.
        let d = derive_amounts(dec("0.50"), dec("25"));
        assert_eq!(d.vat_amount.to_string(), "0.13");
        assert_eq!(d.total_amount.to_string(), "0.63");
        let d = derive_amounts(dec("10.05"), dec("7"));
        assert_eq!(d.vat_amount.to_string(), "0.70");
    }

    #[test]
    fn test_sub_cent_amounts_are_rejected() {
        // The exact total 0.008 rounds to 0.01; rounding VAT first gives 0.00.
        let d = derive_amounts(dec("0.004"), dec("100"));
        assert_eq!(d.total_amount, dec("0.01"));
        let err = validate_amounts(dec("0.004"), dec("100")).unwrap_err();
        assert!(matches!(err, LifecycleError::ValidationFailure { .. }));
        assert!(validate_amounts(dec("12.500"), dec("19")).is_ok());

        let mut inv = draft("100");
        assert!(inv.reprice(Some(dec("99.999")), None).is_err());
        assert_eq!(inv.amount, dec("100.00"));
    }

    #[test]
    fn test_new_uses_defaults() {
        let inv = draft("1000");
        assert_eq!(inv.vat_percentage, dec("19"));
        assert_eq!(inv.total_amount.to_string(), "1190.00");
        assert_eq!(inv.due_date, now().plus_days(14));
        assert_eq!(inv.status, InvoiceStatus::Draft);
        assert!(inv.amounts_consistent());
    }

    #[test]
    fn test_new_rejects_bad_inputs() {
        let t = transaction();
        let bad_amount = NewInvoice {
            amount: Decimal::ZERO,
            vat_percentage: None,
            due_date: None,
        };
        let err = Invoice::new(bad_amount, &t, "INV-2026-00002".into(), now()).unwrap_err();
        assert!(matches!(err, LifecycleError::ValidationFailure { ref field, .. } if field == "amount"));

        let bad_vat = NewInvoice {
            amount: dec("10"),
            vat_percentage: Some(dec("100.01")),
            due_date: None,
        };
        let err = Invoice::new(bad_vat, &t, "INV-2026-00003".into(), now()).unwrap_err();
        assert!(matches!(err, LifecycleError::ValidationFailure { ref field, .. } if field == "vat_percentage"));
    }

    #[test]
    fn test_reprice_rederives_and_locks_after_payment() {
        let mut inv = draft("1000");
        inv.reprice(None, Some(dec("7"))).unwrap();
        assert_eq!(inv.vat_amount.to_string(), "70.00");
        assert_eq!(inv.total_amount.to_string(), "1070.00");

        let admin = Actor::admin(UserId::new());
        inv.apply(&InvoiceCommand::to(InvoiceStatus::Sent), &admin, now())
            .unwrap();
        inv.reprice(Some(dec("2000")), None).unwrap();
        assert_eq!(inv.total_amount.to_string(), "2140.00");

        inv.apply(&InvoiceCommand::to(InvoiceStatus::Paid), &admin, now())
            .unwrap();
        let err = inv.reprice(Some(dec("1")), None).unwrap_err();
        assert!(matches!(err, LifecycleError::ValidationFailure { ref field, .. } if field == "status"));
        assert_eq!(inv.total_amount.to_string(), "2140.00");
    }

    #[test]
    fn test_confirm_records_verifier() {
        let mut inv = draft("500");
        let admin = Actor::admin(UserId::new());
        inv.apply(&InvoiceCommand::to(InvoiceStatus::Sent), &admin, now())
            .unwrap();
        let buyer = Actor::buyer(inv.buyer_id);
        inv.apply(&InvoiceCommand::to(InvoiceStatus::Paid), &buyer, now())
            .unwrap();
        let cmd = InvoiceCommand {
            to: InvoiceStatus::Confirmed,
            notes: Some("matched bank statement".to_string()),
        };
        inv.apply(&cmd, &admin, now()).unwrap();
        assert_eq!(inv.verified_by, admin.user_id);
        assert_eq!(inv.verification_notes.as_deref(), Some("matched bank statement"));
        assert!(inv.issued_at.is_some() && inv.paid_at.is_some() && inv.confirmed_at.is_some());
    }

    #[test]
    fn test_only_admin_confirms() {
        let mut inv = draft("500");
        let seller = Actor::seller(inv.seller_id);
        inv.apply(&InvoiceCommand::to(InvoiceStatus::Sent), &seller, now())
            .unwrap();
        inv.apply(&InvoiceCommand::to(InvoiceStatus::Paid), &Actor::system(), now())
            .unwrap();
        let err = inv
            .apply(&InvoiceCommand::to(InvoiceStatus::Confirmed), &seller, now())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden { .. }));
    }

    #[test]
    fn test_paid_cannot_be_cancelled() {
        let mut inv = draft("500");
        let admin = Actor::admin(UserId::new());
        inv.apply(&InvoiceCommand::to(InvoiceStatus::Sent), &admin, now())
            .unwrap();
        inv.apply(&InvoiceCommand::to(InvoiceStatus::Paid), &admin, now())
            .unwrap();
        let err = inv
            .apply(&InvoiceCommand::to(InvoiceStatus::Cancelled), &admin, now())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_overdue() {
        let inv = draft("500");
        assert!(!inv.is_overdue(now()));
        assert!(inv.is_overdue(now().plus_days(15)));
    }

    proptest! {
        #[test]
        fn prop_total_matches_half_up_formula(
            cents in 1i64..100_000_000,
            vat_tenths in 0u32..=1000,
        ) {
            let amount = Decimal::new(cents, 2);
            let vat = Decimal::new(vat_tenths as i64, 1);
            let d = derive_amounts(amount, vat);
            let expected_vat = (amount * vat / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
            prop_assert_eq!(d.vat_amount, expected_vat);
            prop_assert_eq!(d.total_amount, amount + expected_vat);
            prop_assert!(d.total_amount >= amount);
            prop_assert_eq!(d.vat_amount.scale(), 2);
        }

        #[test]
        fn prop_total_rounds_the_exact_gross(
            units in 1i64..10_000_000_000,
            scale in 0u32..=6,
            vat_hundredths in 0i64..=10_000,
        ) {
            let amount = Decimal::new(units, scale);
            let vat = Decimal::new(vat_hundredths, 2);
            let d = derive_amounts(amount, vat);
            let exact = amount + amount * vat / Decimal::ONE_HUNDRED;
            let expected = exact
                .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
            prop_assert_eq!(d.total_amount, expected);

            let accepted = validate_amounts(amount, vat).is_ok();
            prop_assert_eq!(accepted, amount.normalize().scale() <= 2);
            if accepted {
                prop_assert_eq!(d.total_amount, amount + d.vat_amount);
            }
        }
    }
}
