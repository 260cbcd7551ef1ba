//! # Transition Executor
//!
//! Applies a validated change to a stored record as one optimistic
//! compare-and-swap:
//!
//! 1. Load the record (`NotFound` if absent or soft-deleted).
//! 2. If the caller supplied the status it expects, compare it
//!    (`Conflict` on mismatch).
//! 3. Run the entity's validate-and-apply closure on a copy.
//! 4. Bump the version and write with
//!    `compare_and_swap(id, loaded_status, loaded_version, next)`. A miss
//!    means someone else wrote first (`Conflict`); nothing was written.
//! 5. On a status change, queue a [`TransitionEvent`].

use std::sync::Arc;

use safetrade_core::{Actor, EntityKind, LifecycleError, Timestamp};
use safetrade_state::{LifecycleStatus, Tracked};
use uuid::Uuid;

use crate::notify::{NotificationDispatcher, TransitionEvent};
use crate::repository::{Repository, RepositoryError};

pub struct TransitionExecutor<T: Tracked> {
    repo: Arc<dyn Repository<T>>,
    dispatcher: NotificationDispatcher,
}

impl<T: Tracked> Clone for TransitionExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<T: Tracked> std::fmt::Debug for TransitionExecutor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionExecutor")
            .field("entity", &<T::Status as LifecycleStatus>::ENTITY)
            .finish()
    }
}

impl<T: Tracked> TransitionExecutor<T> {
    pub fn new(repo: Arc<dyn Repository<T>>, dispatcher: NotificationDispatcher) -> Self {
        Self { repo, dispatcher }
    }

    pub fn repository(&self) -> &Arc<dyn Repository<T>> {
        &self.repo
    }

    /// Load a live record.
    pub async fn load(&self, id: Uuid) -> Result<T, LifecycleError> {
        match self.repo.load(id).await? {
            Some(record) if !record.is_deleted() => Ok(record),
            _ => Err(LifecycleError::not_found(
                <T::Status as LifecycleStatus>::ENTITY,
                id,
            )),
        }
    }

    /// Store a freshly created record.
    ///
    /// A held exclusive key is a `Conflict` on the record's transaction.
    pub async fn insert(&self, record: &T) -> Result<(), LifecycleError> {
        match self.repo.insert(record).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Exclusive(key)) => {
                let entity = <T::Status as LifecycleStatus>::ENTITY;
                tracing::warn!(%entity, id = %record.key(), %key, "exclusive key already held");
                Err(LifecycleError::conflict(
                    EntityKind::Transaction,
                    record.transaction_id(),
                    format!("another live {entity} already holds {key}"),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Undo an [`insert`](Self::insert) whose follow-up write failed.
    pub async fn discard(&self, record: &T) -> Result<(), LifecycleError> {
        let entity = <T::Status as LifecycleStatus>::ENTITY;
        if self.repo.remove(record.key(), record.version()).await? {
            tracing::info!(%entity, id = %record.key(), "uncommitted record discarded");
            Ok(())
        } else {
            Err(LifecycleError::conflict(
                entity,
                record.key(),
                "the record changed before it could be discarded",
            ))
        }
    }

    /// Run a status transition.
    ///
    /// `apply` receives a copy of the record and the transition time, and
    /// must validate and mutate it. It may fail; nothing is written then.
    pub async fn transition<F>(
        &self,
        id: Uuid,
        expected_status: Option<T::Status>,
        actor: &Actor,
        apply: F,
    ) -> Result<T, LifecycleError>
    where
        F: FnOnce(&mut T, Timestamp) -> Result<(), LifecycleError> + Send,
    {
        let entity = <T::Status as LifecycleStatus>::ENTITY;
        let current = self.load(id).await?;
        let from = current.status();

        if let Some(expected) = expected_status {
            if expected != from {
                metrics::counter!("safetrade_transition_conflicts_total", "entity" => entity.as_str())
                    .increment(1);
                tracing::warn!(%entity, %id, %expected, actual = %from, "stale expected status");
                return Err(LifecycleError::conflict(
                    entity,
                    id,
                    format!("expected {expected} but the record is {from}"),
                ));
            }
        }

        let now = Timestamp::now();
        let mut next = current.clone();
        apply(&mut next, now)?;
        next.touch(now);

        let swapped = self
            .repo
            .compare_and_swap(id, from, current.version(), &next)
            .await?;
        if !swapped {
            metrics::counter!("safetrade_transition_conflicts_total", "entity" => entity.as_str())
                .increment(1);
            tracing::warn!(%entity, %id, %from, version = current.version(), "concurrent modification");
            return Err(LifecycleError::conflict(
                entity,
                id,
                "the record changed since it was read; reload and retry",
            ));
        }

        let to = next.status();
        if from != to {
            metrics::counter!(
                "safetrade_transitions_total",
                "entity" => entity.as_str(),
                "to" => to.as_str()
            )
            .increment(1);
            tracing::info!(%entity, %id, %from, %to, actor = %actor, version = next.version(), "transition committed");
            self.dispatcher
                .dispatch(TransitionEvent::for_record(&next, from, to, actor, now));
        } else {
            tracing::debug!(%entity, %id, version = next.version(), "record amended");
        }
        Ok(next)
    }

    /// Run a non-status edit through the same load/CAS path.
    ///
    /// An amendment that happens to move the status (a review crossing the
    /// flag threshold) still emits its event.
    pub async fn amend<F>(&self, id: Uuid, actor: &Actor, apply: F) -> Result<T, LifecycleError>
    where
        F: FnOnce(&mut T, Timestamp) -> Result<(), LifecycleError> + Send,
    {
        self.transition(id, None, actor, apply).await
    }

    /// Write `prior` back over `committed` as a newer version.
    ///
    /// Used when a composite operation committed this record but its
    /// follow-up write on another record failed.
    pub async fn revert(&self, committed: &T, prior: &T, actor: &Actor) -> Result<T, LifecycleError> {
        let entity = <T::Status as LifecycleStatus>::ENTITY;
        let id = committed.key();
        let now = Timestamp::now();
        let mut restored = prior.clone();
        while restored.version() <= committed.version() {
            restored.touch(now);
        }

        let swapped = self
            .repo
            .compare_and_swap(id, committed.status(), committed.version(), &restored)
            .await?;
        if !swapped {
            return Err(LifecycleError::conflict(
                entity,
                id,
                "the record changed before it could be reverted",
            ));
        }

        let (from, to) = (committed.status(), restored.status());
        tracing::warn!(%entity, %id, %from, %to, version = restored.version(), "transition reverted");
        if from != to {
            self.dispatcher
                .dispatch(TransitionEvent::for_record(&restored, from, to, actor, now));
        }
        Ok(restored)
    }

    pub async fn list(&self) -> Result<Vec<T>, LifecycleError> {
        Ok(self.repo.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::repository::MemoryRepository;
    use rust_decimal::Decimal;
    use safetrade_core::{Currency, UserId, VehicleId};
    use safetrade_state::{
        FeeSchedule, NewTransaction, ReferenceCodes, Transaction, TransactionCommand,
        TransactionStatus,
    };
    use std::time::Duration;

    fn transaction() -> Transaction {
        let input = NewTransaction {
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            vehicle_id: VehicleId::new(),
            dealer_id: None,
            amount: Decimal::new(3_200_000, 2),
            currency: Currency::eur(),
            escrow_account_iban: None,
            notes: None,
        };
        let codes = ReferenceCodes {
            transaction_code: "AS24-TXN-2026-EXEC01".to_string(),
            payment_reference: "AS24-REF-EXEC00000001".to_string(),
        };
        Transaction::create(input, codes, &FeeSchedule::default(), Timestamp::now()).unwrap()
    }

    async fn setup() -> (TransitionExecutor<Transaction>, Arc<RecordingNotifier>, Transaction) {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::spawn(notifier.clone(), 16);
        let repo: Arc<dyn Repository<Transaction>> = Arc::new(MemoryRepository::new());
        let exec = TransitionExecutor::new(repo, dispatcher);
        let t = transaction();
        exec.insert(&t).await.unwrap();
        (exec, notifier, t)
    }

    fn to(status: TransactionStatus) -> TransactionCommand {
        TransactionCommand::to(status)
    }

    #[tokio::test]
    async fn test_transition_commits_and_notifies() {
        let (exec, notifier, t) = setup().await;
        let seller = Actor::seller(t.seller_id);
        let cmd = to(TransactionStatus::AwaitingBankTransfer);
        let next = exec
            .transition(t.id.0, Some(TransactionStatus::Pending), &seller, |r, now| {
                r.apply(&cmd, &seller, now)
            })
            .await
            .unwrap();
        assert_eq!(next.status, TransactionStatus::AwaitingBankTransfer);
        assert_eq!(next.version, 2);

        for _ in 0..100 {
            if !notifier.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from, "pending");
        assert_eq!(events[0].to, "awaiting_bank_transfer");
    }

    #[tokio::test]
    async fn test_stale_expected_status_is_conflict() {
        let (exec, _, t) = setup().await;
        let admin = Actor::admin(UserId::new());
        let cmd = to(TransactionStatus::AwaitingBankTransfer);
        let err = exec
            .transition(t.id.0, Some(TransactionStatus::Delivered), &admin, |r, now| {
                r.apply(&cmd, &admin, now)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict { .. }));
        assert_eq!(exec.load(t.id.0).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_rejected_apply_writes_nothing() {
        let (exec, _, t) = setup().await;
        let admin = Actor::admin(UserId::new());
        let cmd = to(TransactionStatus::PaymentVerified);
        let err = exec
            .transition(t.id.0, None, &admin, |r, now| r.apply(&cmd, &admin, now))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        let stored = exec.load(t.id.0).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.version, 1);
    }

    /// Lets another writer land between every load and swap.
    struct RacingRepository {
        inner: MemoryRepository<Transaction>,
    }

    #[async_trait::async_trait]
    impl Repository<Transaction> for RacingRepository {
        async fn load(&self, id: Uuid) -> Result<Option<Transaction>, RepositoryError> {
            self.inner.load(id).await
        }

        async fn insert(&self, record: &Transaction) -> Result<(), RepositoryError> {
            self.inner.insert(record).await
        }

        async fn remove(&self, id: Uuid, expected_version: u64) -> Result<bool, RepositoryError> {
            self.inner.remove(id, expected_version).await
        }

        async fn compare_and_swap(
            &self,
            id: Uuid,
            expected_status: TransactionStatus,
            expected_version: u64,
            next: &Transaction,
        ) -> Result<bool, RepositoryError> {
            if let Some(mut other) = self.inner.load(id).await? {
                let status = other.status;
                other.version += 1;
                self.inner
                    .compare_and_swap(id, status, other.version - 1, &other)
                    .await?;
            }
            self.inner
                .compare_and_swap(id, expected_status, expected_version, next)
                .await
        }

        async fn list(&self) -> Result<Vec<Transaction>, RepositoryError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_conflict() {
        let repo = Arc::new(RacingRepository {
            inner: MemoryRepository::new(),
        });
        let exec = TransitionExecutor::new(repo.clone(), NotificationDispatcher::disabled());
        let t = transaction();
        exec.insert(&t).await.unwrap();

        let admin = Actor::admin(UserId::new());
        let cmd = to(TransactionStatus::AwaitingBankTransfer);
        let err = exec
            .transition(t.id.0, None, &admin, |r, now| r.apply(&cmd, &admin, now))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict { .. }));
        let stored = repo.inner.load(t.id.0).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_revert_restores_prior_record_at_newer_version() {
        let (exec, _, t) = setup().await;
        let seller = Actor::seller(t.seller_id);
        let cmd = to(TransactionStatus::AwaitingBankTransfer);
        let committed = exec
            .transition(t.id.0, None, &seller, |r, now| r.apply(&cmd, &seller, now))
            .await
            .unwrap();

        let restored = exec.revert(&committed, &t, &Actor::system()).await.unwrap();
        assert_eq!(restored.status, TransactionStatus::Pending);
        assert_eq!(restored.version, 3);
        assert!(restored.transition_log.is_empty());

        // A second revert from the stale copy misses the swap.
        let err = exec.revert(&committed, &t, &Actor::system()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_discard_removes_uncommitted_insert() {
        let (exec, _, t) = setup().await;
        exec.discard(&t).await.unwrap();
        assert!(matches!(
            exec.load(t.id.0).await,
            Err(LifecycleError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_and_deleted_are_not_found() {
        let (exec, _, t) = setup().await;
        let admin = Actor::admin(UserId::new());
        assert!(matches!(
            exec.load(Uuid::new_v4()).await,
            Err(LifecycleError::NotFound { .. })
        ));
        exec.transition(t.id.0, None, &admin, |r, now| {
            r.apply(&to(TransactionStatus::Cancelled).with_reason("duplicate listing"), &admin, now)
        })
        .await
        .unwrap();
        exec.amend(t.id.0, &admin, |r, now| r.soft_delete(&admin, now))
            .await
            .unwrap();
        assert!(matches!(
            exec.load(t.id.0).await,
            Err(LifecycleError::NotFound { .. })
        ));
    }
}
