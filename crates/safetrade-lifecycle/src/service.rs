//! # Lifecycle Service
//!
//! The operations the HTTP layer exposes, composed from the four
//! executors. Single-entity operations delegate to
//! [`TransitionExecutor::transition`] or [`TransitionExecutor::amend`];
//! the composite ones keep a dispute and its transaction in step:
//!
//! - [`SafeTradeService::file_dispute`] stores the dispute, then freezes
//!   the transaction in `disputed`. If the freeze fails the dispute is
//!   discarded.
//! - [`SafeTradeService::transition_dispute`] checks that the transaction
//!   can be released, commits the dispute, then releases the transaction
//!   (refund, cancel, or resume the interrupted stage). If the release
//!   cannot be written the dispute is reverted.
//!
//! While a dispute is unfinished, only the dispute path moves its
//! transaction out of `disputed`.

use std::sync::Arc;

use rust_decimal::Decimal;
use safetrade_core::{
    Actor, ActorRole, EntityKind, LifecycleError, Timestamp, TransactionId,
};
use safetrade_state::{
    Dispute, DisputeCommand, DisputeStatus, FeeSchedule, Invoice, InvoiceCommand, LifecycleStatus,
    NewDispute, NewInvoice, NewReview, NewTransaction, ResolutionType, Review, ReviewStatus,
    Settlement, Transaction, TransactionCommand, TransactionStatus,
};
use uuid::Uuid;

use crate::codes::{parse_invoice_number, reference_codes, InvoiceNumberSequence};
use crate::executor::TransitionExecutor;
use crate::notify::NotificationDispatcher;
use crate::repository::{MemoryRepository, Repository};

/// One repository per entity.
#[derive(Clone)]
pub struct Repositories {
    pub transactions: Arc<dyn Repository<Transaction>>,
    pub disputes: Arc<dyn Repository<Dispute>>,
    pub invoices: Arc<dyn Repository<Invoice>>,
    pub reviews: Arc<dyn Repository<Review>>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            transactions: Arc::new(MemoryRepository::<Transaction>::new()),
            disputes: Arc::new(MemoryRepository::<Dispute>::new()),
            invoices: Arc::new(MemoryRepository::<Invoice>::new()),
            reviews: Arc::new(MemoryRepository::<Review>::new()),
        }
    }
}

/// Business settings fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub fees: FeeSchedule,
    pub default_vat_percentage: Decimal,
    /// Escrow IBAN assigned to trades that do not name one.
    pub escrow_iban: Option<String>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            default_vat_percentage: safetrade_state::invoice::default_vat_percentage(),
            escrow_iban: None,
        }
    }
}

#[derive(Clone)]
pub struct SafeTradeService {
    transactions: TransitionExecutor<Transaction>,
    disputes: TransitionExecutor<Dispute>,
    invoices: TransitionExecutor<Invoice>,
    reviews: TransitionExecutor<Review>,
    settings: Arc<LifecycleSettings>,
    invoice_numbers: Arc<InvoiceNumberSequence>,
}

impl std::fmt::Debug for SafeTradeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeTradeService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

const RELEASE_ATTEMPTS: u32 = 3;

fn forbidden(actor: &Actor, action: impl Into<String>) -> LifecycleError {
    LifecycleError::Forbidden {
        role: actor.role.as_str().to_string(),
        action: action.into(),
    }
}

/// How a finished dispute releases its transaction.
///
/// Refund resolutions refund the buyer and relisting cancels the trade;
/// anything else resumes the interrupted stage. A transaction that is no
/// longer `disputed` cannot be released.
fn release_command(
    dispute: &Dispute,
    transaction: &Transaction,
) -> Result<TransactionCommand, LifecycleError> {
    if transaction.status != TransactionStatus::Disputed {
        return Err(LifecycleError::conflict(
            EntityKind::Transaction,
            transaction.id,
            format!(
                "{} ended but the transaction is {}, not disputed",
                dispute.id, transaction.status
            ),
        ));
    }
    let cmd = match (dispute.status, dispute.resolution_type) {
        (DisputeStatus::Resolved, Some(kind)) if kind.refunds_buyer() => {
            TransactionCommand::to(TransactionStatus::Refunded).with_reason(kind.as_str())
        }
        (DisputeStatus::Resolved, Some(ResolutionType::RelistVehicle)) => {
            TransactionCommand::to(TransactionStatus::Cancelled)
                .with_reason(ResolutionType::RelistVehicle.as_str())
        }
        _ => match transaction.disputed_from {
            Some(stage) => TransactionCommand::to(stage),
            None => {
                return Err(LifecycleError::conflict(
                    EntityKind::Transaction,
                    transaction.id,
                    "no interrupted stage to resume",
                ))
            }
        },
    };
    Ok(cmd)
}

impl SafeTradeService {
    pub fn new(
        repos: Repositories,
        dispatcher: NotificationDispatcher,
        settings: LifecycleSettings,
    ) -> Result<Self, LifecycleError> {
        settings.fees.validate()?;
        safetrade_state::validate_amounts(Decimal::ONE, settings.default_vat_percentage)?;
        Ok(Self {
            transactions: TransitionExecutor::new(repos.transactions, dispatcher.clone()),
            disputes: TransitionExecutor::new(repos.disputes, dispatcher.clone()),
            invoices: TransitionExecutor::new(repos.invoices, dispatcher.clone()),
            reviews: TransitionExecutor::new(repos.reviews, dispatcher),
            settings: Arc::new(settings),
            invoice_numbers: Arc::new(InvoiceNumberSequence::new()),
        })
    }

    /// In-memory service with default settings and no notifications.
    pub fn in_memory() -> Result<Self, LifecycleError> {
        Self::new(
            Repositories::in_memory(),
            NotificationDispatcher::disabled(),
            LifecycleSettings::default(),
        )
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Continue invoice numbering after the highest stored number.
    pub async fn prime_invoice_numbers(&self) -> Result<(), LifecycleError> {
        for invoice in self.invoices.list().await? {
            if let Some((year, seq)) = parse_invoice_number(&invoice.invoice_number) {
                self.invoice_numbers.resume(year, seq);
            }
        }
        Ok(())
    }

    // ─── Transactions ────────────────────────────────────────────────

    /// Open a trade. Buyers open their own; operators may open any.
    pub async fn open_transaction(
        &self,
        mut input: NewTransaction,
        actor: &Actor,
    ) -> Result<Transaction, LifecycleError> {
        let allowed = match actor.role {
            ActorRole::Admin | ActorRole::System => true,
            ActorRole::Buyer => actor.user_id == Some(input.buyer_id),
            _ => false,
        };
        if !allowed {
            return Err(forbidden(actor, "open a transaction"));
        }
        if input.escrow_account_iban.is_none() {
            input.escrow_account_iban = self.settings.escrow_iban.clone();
        }
        let now = Timestamp::now();
        let transaction =
            Transaction::create(input, reference_codes(now), &self.settings.fees, now)?;
        self.transactions.insert(&transaction).await?;
        tracing::info!(
            id = %transaction.id,
            code = %transaction.transaction_code,
            amount = %transaction.amount,
            "transaction opened"
        );
        Ok(transaction)
    }

    pub async fn transaction(&self, id: Uuid) -> Result<Transaction, LifecycleError> {
        self.transactions.load(id).await
    }

    /// Newest first, optionally filtered by status.
    pub async fn list_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>, LifecycleError> {
        let mut all: Vec<Transaction> = self
            .transactions
            .list()
            .await?
            .into_iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// What `actor` may see: buyers and sellers get their own trades,
    /// operators get all of them.
    pub async fn list_transactions_for(
        &self,
        status: Option<TransactionStatus>,
        actor: &Actor,
    ) -> Result<Vec<Transaction>, LifecycleError> {
        let all = self.list_transactions(status).await?;
        if !actor.role.is_party() {
            return Ok(all);
        }
        let user = actor
            .user_id
            .ok_or_else(|| forbidden(actor, "list transactions without a user id"))?;
        Ok(all.into_iter().filter(|t| t.is_party(user)).collect())
    }

    /// Move a transaction.
    ///
    /// Without `expected_status` the move is checked against whatever the
    /// record holds when it is loaded, so a request repeated after it
    /// succeeded is an `InvalidTransition`, not a `Conflict`.
    pub async fn transition_transaction(
        &self,
        id: Uuid,
        expected_status: Option<TransactionStatus>,
        cmd: TransactionCommand,
        actor: &Actor,
    ) -> Result<Transaction, LifecycleError> {
        let current = self.transactions.load(id).await?;
        if current.status == TransactionStatus::Disputed && cmd.to != TransactionStatus::Disputed {
            if let Some(open) = self.unfinished_dispute(current.id).await? {
                return Err(LifecycleError::conflict(
                    EntityKind::Transaction,
                    current.id,
                    format!("{} is still {}; the dispute decides the outcome", open.id, open.status),
                ));
            }
        }
        let expected = expected_status.unwrap_or(current.status);
        self.transactions
            .transition(id, Some(expected), actor, |t, now| t.apply(&cmd, actor, now))
            .await
    }

    pub async fn settlement(&self, id: Uuid) -> Result<Settlement, LifecycleError> {
        Ok(self.transactions.load(id).await?.settlement())
    }

    pub async fn delete_transaction(
        &self,
        id: Uuid,
        actor: &Actor,
    ) -> Result<Transaction, LifecycleError> {
        self.transactions
            .amend(id, actor, |t, now| t.soft_delete(actor, now))
            .await
    }

    // ─── Disputes ────────────────────────────────────────────────────

    /// Open a dispute and freeze its transaction.
    ///
    /// At most one unfinished dispute may exist per transaction. The
    /// disputes repository enforces it on insert for filings that race.
    pub async fn file_dispute(
        &self,
        transaction_id: Uuid,
        input: NewDispute,
        actor: &Actor,
    ) -> Result<Dispute, LifecycleError> {
        let transaction = self.transactions.load(transaction_id).await?;
        let now = Timestamp::now();
        let dispute = Dispute::file(input, &transaction, actor, now)?;
        if let Some(existing) = self.unfinished_dispute(transaction.id).await? {
            return Err(LifecycleError::conflict(
                EntityKind::Transaction,
                transaction.id,
                format!("{} is still {}", existing.id, existing.status),
            ));
        }

        let cmd = TransactionCommand::to(TransactionStatus::Disputed).with_reason(&dispute.reason);
        transaction.clone().apply(&cmd, actor, now)?;

        self.disputes.insert(&dispute).await?;
        let frozen = self
            .transactions
            .transition(
                transaction_id,
                Some(transaction.status),
                actor,
                |t, now| t.apply(&cmd, actor, now),
            )
            .await;
        if let Err(e) = frozen {
            if let Err(undo) = self.disputes.discard(&dispute).await {
                tracing::error!(
                    dispute = %dispute.id,
                    transaction = %transaction.id,
                    error = %undo,
                    "freeze failed and the dispute could not be discarded"
                );
            }
            return Err(e);
        }
        tracing::info!(dispute = %dispute.id, transaction = %transaction.id, "dispute filed");
        Ok(dispute)
    }

    async fn unfinished_dispute(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Dispute>, LifecycleError> {
        Ok(self
            .disputes
            .repository()
            .list_for_transaction(transaction_id)
            .await?
            .into_iter()
            .find(|d| !d.status.is_terminal()))
    }

    pub async fn dispute(&self, id: Uuid) -> Result<Dispute, LifecycleError> {
        self.disputes.load(id).await
    }

    pub async fn list_disputes(
        &self,
        transaction_id: Option<TransactionId>,
    ) -> Result<Vec<Dispute>, LifecycleError> {
        let mut all = match transaction_id {
            Some(t) => self.disputes.repository().list_for_transaction(t).await?,
            None => self.disputes.list().await?,
        };
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// Move a dispute. When it ends, release its transaction.
    pub async fn transition_dispute(
        &self,
        id: Uuid,
        cmd: DisputeCommand,
        actor: &Actor,
    ) -> Result<Dispute, LifecycleError> {
        let current = self.disputes.load(id).await?;
        let mut next = current.clone();
        next.apply(&cmd, actor, Timestamp::now())?;
        if !next.status.is_terminal() {
            return self
                .disputes
                .transition(id, Some(current.status), actor, |d, now| {
                    d.apply(&cmd, actor, now)
                })
                .await;
        }

        let transaction = self.transactions.load(current.transaction_id.0).await?;
        let release = release_command(&next, &transaction)?;
        transaction.clone().apply(&release, actor, Timestamp::now())?;

        // Commit exactly the version checked above, so a revert restores it.
        let committed = self
            .disputes
            .transition(id, Some(current.status), actor, |d, now| {
                if d.version != current.version {
                    return Err(LifecycleError::conflict(
                        EntityKind::Dispute,
                        id,
                        "the dispute changed since it was read; reload and retry",
                    ));
                }
                d.apply(&cmd, actor, now)
            })
            .await?;
        if let Err(e) = self.release_transaction(&committed, actor).await {
            tracing::error!(dispute = %id, error = %e, "transaction not released; reverting dispute");
            if let Err(undo) = self.disputes.revert(&committed, &current, actor).await {
                tracing::error!(dispute = %id, error = %undo, "dispute could not be reverted");
            }
            return Err(e);
        }
        Ok(committed)
    }

    pub async fn resolve_dispute(
        &self,
        id: Uuid,
        resolution_type: ResolutionType,
        resolution: String,
        actor: &Actor,
    ) -> Result<Dispute, LifecycleError> {
        self.transition_dispute(id, DisputeCommand::resolve(resolution_type, resolution), actor)
            .await
    }

    /// Release the transaction of a committed, finished dispute.
    ///
    /// Retries when a non-status edit to the transaction wins the swap.
    async fn release_transaction(
        &self,
        dispute: &Dispute,
        actor: &Actor,
    ) -> Result<Transaction, LifecycleError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let transaction = self.transactions.load(dispute.transaction_id.0).await?;
            let cmd = release_command(dispute, &transaction)?;
            let released = self
                .transactions
                .transition(
                    transaction.id.0,
                    Some(TransactionStatus::Disputed),
                    actor,
                    |t, now| t.apply(&cmd, actor, now),
                )
                .await;
            match released {
                Err(LifecycleError::Conflict { .. }) if attempts < RELEASE_ATTEMPTS => continue,
                other => return other,
            }
        }
    }

    pub async fn respond_to_dispute(
        &self,
        id: Uuid,
        text: String,
        actor: &Actor,
    ) -> Result<Dispute, LifecycleError> {
        self.disputes
            .amend(id, actor, |d, _| d.respond(actor, &text))
            .await
    }

    // ─── Invoices ────────────────────────────────────────────────────

    pub async fn create_invoice(
        &self,
        transaction_id: Uuid,
        mut input: NewInvoice,
        actor: &Actor,
    ) -> Result<Invoice, LifecycleError> {
        let transaction = self.transactions.load(transaction_id).await?;
        let allowed = match actor.role {
            ActorRole::Admin | ActorRole::System | ActorRole::Dealer => true,
            ActorRole::Seller => actor.user_id == Some(transaction.seller_id),
            ActorRole::Buyer => false,
        };
        if !allowed {
            return Err(forbidden(actor, "issue an invoice"));
        }
        input
            .vat_percentage
            .get_or_insert(self.settings.default_vat_percentage);
        let now = Timestamp::now();
        let number = self.invoice_numbers.next(now.year());
        let invoice = Invoice::new(input, &transaction, number, now)?;
        self.invoices.insert(&invoice).await?;
        tracing::info!(invoice = %invoice.invoice_number, total = %invoice.total_amount, "invoice drafted");
        Ok(invoice)
    }

    pub async fn invoice(&self, id: Uuid) -> Result<Invoice, LifecycleError> {
        self.invoices.load(id).await
    }

    pub async fn list_invoices(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Invoice>, LifecycleError> {
        Ok(self
            .invoices
            .repository()
            .list_for_transaction(transaction_id)
            .await?)
    }

    /// Change amount and/or VAT; totals are re-derived.
    pub async fn reprice_invoice(
        &self,
        id: Uuid,
        amount: Option<Decimal>,
        vat_percentage: Option<Decimal>,
        actor: &Actor,
    ) -> Result<Invoice, LifecycleError> {
        self.invoices
            .amend(id, actor, |inv, _| {
                let allowed = match actor.role {
                    ActorRole::Admin | ActorRole::System | ActorRole::Dealer => true,
                    ActorRole::Seller => actor.user_id == Some(inv.seller_id),
                    ActorRole::Buyer => false,
                };
                if !allowed {
                    return Err(forbidden(actor, "reprice an invoice"));
                }
                inv.reprice(amount, vat_percentage)
            })
            .await
    }

    pub async fn transition_invoice(
        &self,
        id: Uuid,
        cmd: InvoiceCommand,
        actor: &Actor,
    ) -> Result<Invoice, LifecycleError> {
        self.invoices
            .transition(id, None, actor, |inv, now| inv.apply(&cmd, actor, now))
            .await
    }

    // ─── Reviews ─────────────────────────────────────────────────────

    /// Submit a review and try to verify it from the trade straight away.
    pub async fn submit_review(
        &self,
        transaction_id: Uuid,
        input: NewReview,
        actor: &Actor,
    ) -> Result<Review, LifecycleError> {
        let transaction = self.transactions.load(transaction_id).await?;
        let review = Review::new(input, &transaction, actor, Timestamp::now())?;
        // One review per reviewer and type; the repository rejects repeats.
        self.reviews.insert(&review).await?;
        match self.auto_verify_review(review.id.0).await {
            Ok(verified) => Ok(verified),
            Err(e) => {
                tracing::debug!(review = %review.id, reason = %e, "review left for moderation");
                Ok(review)
            }
        }
    }

    pub async fn review(&self, id: Uuid) -> Result<Review, LifecycleError> {
        self.reviews.load(id).await
    }

    /// Verify a review from its linked trade, acting as the system.
    pub async fn auto_verify_review(&self, id: Uuid) -> Result<Review, LifecycleError> {
        let review = self.reviews.load(id).await?;
        let transaction = self.transactions.load(review.transaction_id.0).await?;
        let system = Actor::system();
        self.reviews
            .transition(id, Some(review.moderation_status), &system, |r, now| {
                r.auto_verify(&transaction, now)
            })
            .await
    }

    pub async fn verify_review(
        &self,
        id: Uuid,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<Review, LifecycleError> {
        self.reviews
            .transition(id, None, actor, |r, now| {
                r.verify(actor, notes.as_deref(), now)
            })
            .await
    }

    pub async fn reject_review(
        &self,
        id: Uuid,
        reason: String,
        actor: &Actor,
    ) -> Result<Review, LifecycleError> {
        self.reviews
            .transition(id, None, actor, |r, now| r.reject(actor, &reason, now))
            .await
    }

    pub async fn flag_review(&self, id: Uuid, actor: &Actor) -> Result<Review, LifecycleError> {
        self.reviews
            .amend(id, actor, |r, now| r.flag(actor, now).map(|_| ()))
            .await
    }

    pub async fn set_review_visibility(
        &self,
        id: Uuid,
        status: ReviewStatus,
        actor: &Actor,
    ) -> Result<Review, LifecycleError> {
        self.reviews
            .amend(id, actor, |r, _| r.set_visibility(actor, status))
            .await
    }
}
