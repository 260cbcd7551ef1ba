//! Generic SQLx repository over one lifecycle table.

use std::marker::PhantomData;

use async_trait::async_trait;
use safetrade_core::TransactionId;
use safetrade_lifecycle::{Repository, RepositoryError};
use safetrade_state::{LifecycleStatus, Tracked};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Table-backed [`Repository`]. `table` is always one of the fixed names
/// from [`super::repositories`]; it is never user input.
pub struct PgRepository<T> {
    pool: PgPool,
    table: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> PgRepository<T> {
    pub fn new(pool: PgPool, table: &'static str) -> Self {
        Self {
            pool,
            table,
            _record: PhantomData,
        }
    }
}

fn database(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn encode<T: Serialize>(record: &T) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(record)
        .map_err(|e| RepositoryError::Decode(format!("failed to serialize record: {e}")))
}

fn decode<T: DeserializeOwned>(id: Uuid, document: serde_json::Value) -> Result<T, RepositoryError> {
    serde_json::from_value(document)
        .map_err(|e| RepositoryError::Decode(format!("corrupt document for {id}: {e}")))
}

fn version_column(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::Database(format!("version {version} exceeds BIGINT")))
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    document: serde_json::Value,
}

#[async_trait]
impl<T> Repository<T> for PgRepository<T>
where
    T: Tracked + Serialize + DeserializeOwned,
{
    async fn load(&self, id: Uuid) -> Result<Option<T>, RepositoryError> {
        let sql = format!("SELECT id, document FROM {} WHERE id = $1", self.table);
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;
        row.map(|r| decode(r.id, r.document)).transpose()
    }

    async fn insert(&self, record: &T) -> Result<(), RepositoryError> {
        let sql = format!(
            "INSERT INTO {} (id, transaction_id, status, version, deleted, document)
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(record.key())
            .bind(record.transaction_id().0)
            .bind(record.status().as_str())
            .bind(version_column(record.version())?)
            .bind(record.is_deleted())
            .bind(encode(record)?)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                match db.constraint() {
                    Some(index) if index.starts_with("uq_") => Err(RepositoryError::Exclusive(
                        record.exclusive_key().unwrap_or_else(|| index.to_string()),
                    )),
                    _ => Err(RepositoryError::Duplicate(record.key())),
                }
            }
            Err(e) => Err(database(e)),
        }
    }

    async fn remove(&self, id: Uuid, expected_version: u64) -> Result<bool, RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE id = $1 AND version = $2", self.table);
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(version_column(expected_version)?)
            .execute(&self.pool)
            .await
            .map_err(database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected_status: T::Status,
        expected_version: u64,
        next: &T,
    ) -> Result<bool, RepositoryError> {
        let sql = format!(
            "UPDATE {} SET status = $4, version = $5, deleted = $6, document = $7, updated_at = now()
             WHERE id = $1 AND status = $2 AND version = $3",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(expected_status.as_str())
            .bind(version_column(expected_version)?)
            .bind(next.status().as_str())
            .bind(version_column(next.version())?)
            .bind(next.is_deleted())
            .bind(encode(next)?)
            .execute(&self.pool)
            .await
            .map_err(database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        let sql = format!(
            "SELECT id, document FROM {} WHERE NOT deleted ORDER BY created_at",
            self.table
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        rows.into_iter().map(|r| decode(r.id, r.document)).collect()
    }

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<T>, RepositoryError> {
        let sql = format!(
            "SELECT id, document FROM {} WHERE transaction_id = $1 AND NOT deleted ORDER BY created_at",
            self.table
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(transaction_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        rows.into_iter().map(|r| decode(r.id, r.document)).collect()
    }
}
