//! # Repositories
//!
//! Storage behind the executor. The only write path for an existing record
//! is [`Repository::compare_and_swap`], which succeeds only while the stored
//! status and version still match what the caller loaded.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use safetrade_core::{LifecycleError, TransactionId};
use safetrade_state::Tracked;
use thiserror::Error;
use uuid::Uuid;

/// Storage failures. Never carries a lifecycle rule violation.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The backing database rejected or failed the query.
    #[error("database error: {0}")]
    Database(String),
    /// A stored row could not be decoded into a record.
    #[error("record decoding failed: {0}")]
    Decode(String),
    /// A record with this key already exists.
    #[error("duplicate key {0}")]
    Duplicate(Uuid),
    /// Another live record already holds this exclusive key.
    #[error("exclusive key {0} is already held")]
    Exclusive(String),
}

impl From<RepositoryError> for LifecycleError {
    fn from(e: RepositoryError) -> Self {
        LifecycleError::Storage(e.to_string())
    }
}

#[async_trait]
pub trait Repository<T: Tracked>: Send + Sync {
    /// Fetch a record, including soft-deleted ones.
    async fn load(&self, id: Uuid) -> Result<Option<T>, RepositoryError>;

    /// Store a new record. Fails with [`RepositoryError::Exclusive`] when a
    /// live record already holds its [`Tracked::exclusive_key`].
    async fn insert(&self, record: &T) -> Result<(), RepositoryError>;

    /// Drop a record that was inserted but never committed anywhere else.
    /// Only matches while the stored version is still `expected_version`.
    async fn remove(&self, id: Uuid, expected_version: u64) -> Result<bool, RepositoryError>;

    /// Replace the record with `next` if its stored status and version are
    /// still `expected_status` and `expected_version`.
    ///
    /// Returns `Ok(false)` when the predicate did not match (no write).
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected_status: T::Status,
        expected_version: u64,
        next: &T,
    ) -> Result<bool, RepositoryError>;

    /// All records that are not soft-deleted.
    async fn list(&self) -> Result<Vec<T>, RepositoryError>;

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<T>, RepositoryError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.transaction_id() == transaction_id)
            .collect())
    }
}

// ─── In-memory ───────────────────────────────────────────────────────

/// Thread-safe, cloneable in-memory repository.
///
/// The lock is never held across an `.await`. The CAS predicate and the
/// write happen under one write lock.
#[derive(Debug)]
pub struct MemoryRepository<T> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T> Clone for MemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Tracked> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<T: Tracked> Repository<T> for MemoryRepository<T> {
    async fn load(&self, id: Uuid) -> Result<Option<T>, RepositoryError> {
        Ok(self.data.read().get(&id).cloned())
    }

    async fn insert(&self, record: &T) -> Result<(), RepositoryError> {
        let mut guard = self.data.write();
        let key = record.key();
        if guard.contains_key(&key) {
            return Err(RepositoryError::Duplicate(key));
        }
        if let Some(exclusive) = record.exclusive_key() {
            let held = guard
                .values()
                .any(|r| !r.is_deleted() && r.exclusive_key().as_ref() == Some(&exclusive));
            if held {
                return Err(RepositoryError::Exclusive(exclusive));
            }
        }
        guard.insert(key, record.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid, expected_version: u64) -> Result<bool, RepositoryError> {
        let mut guard = self.data.write();
        match guard.get(&id) {
            Some(current) if current.version() == expected_version => {
                guard.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected_status: T::Status,
        expected_version: u64,
        next: &T,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.data.write();
        match guard.get_mut(&id) {
            Some(current)
                if current.status() == expected_status
                    && current.version() == expected_version =>
            {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        Ok(self
            .data
            .read()
            .values()
            .filter(|r| !r.is_deleted())
            .cloned()
            .collect())
    }
}
