//! Explicit transaction lifecycle.
//!
//! A transaction is begun against the shared pool and ends exactly once,
//! via `commit` or `rollback`. The coordinator never decides which terminal
//! call to make; the caller orchestrating the business operation does. The
//! executor only participates in a transaction passed to it.
//!
//! Cancellation safety: dropping an unfinished `ProcTransaction` (an
//! abandoned request future, a panic) rolls the underlying transaction back
//! through the driver's drop semantics.

use crate::db::pool::{self, DbPool};
use crate::error::{ApiError, ApiResult};
use sqlx::{MySql, Postgres, Transaction};
use tracing::{info, warn};

/// Backend-specific transaction wrapper.
pub(crate) enum DbTransaction {
    Postgres(Transaction<'static, Postgres>),
    MySql(Transaction<'static, MySql>),
}

/// An explicit unit of work bound to one connection from the pool.
pub struct ProcTransaction {
    /// `None` once the transaction has been committed or rolled back.
    inner: Option<DbTransaction>,
    id: String,
}

impl ProcTransaction {
    /// Begin a new transaction against the shared pool.
    pub async fn begin() -> ApiResult<Self> {
        let pool = pool::acquire().await?;
        let id = generate_transaction_id();

        let inner = match pool {
            DbPool::Postgres(pool) => DbTransaction::Postgres(
                pool.begin()
                    .await
                    .map_err(|e| ApiError::transaction(e.to_string(), &id))?,
            ),
            DbPool::MySql(pool) => DbTransaction::MySql(
                pool.begin()
                    .await
                    .map_err(|e| ApiError::transaction(e.to_string(), &id))?,
            ),
        };

        info!(transaction_id = %id, "Transaction started");

        Ok(Self {
            inner: Some(inner),
            id,
        })
    }

    /// Identifier used in logs and error context.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the transaction has already been committed or rolled back.
    pub fn is_completed(&self) -> bool {
        self.inner.is_none()
    }

    /// End the transaction successfully. Fails with a transaction error if
    /// the transaction already ended or the underlying commit fails.
    pub async fn commit(&mut self) -> ApiResult<()> {
        let tx = self.take_active()?;
        match tx {
            DbTransaction::Postgres(tx) => tx.commit().await,
            DbTransaction::MySql(tx) => tx.commit().await,
        }
        .map_err(|e| ApiError::transaction(e.to_string(), &self.id))?;

        info!(transaction_id = %self.id, "Transaction committed");
        Ok(())
    }

    /// End the transaction unsuccessfully, discarding its effects. Fails
    /// under the same conditions as `commit`.
    pub async fn rollback(&mut self) -> ApiResult<()> {
        let tx = self.take_active()?;
        match tx {
            DbTransaction::Postgres(tx) => tx.rollback().await,
            DbTransaction::MySql(tx) => tx.rollback().await,
        }
        .map_err(|e| ApiError::transaction(e.to_string(), &self.id))?;

        info!(transaction_id = %self.id, "Transaction rolled back");
        Ok(())
    }

    /// Access the live transaction for statement execution.
    pub(crate) fn active(&mut self) -> ApiResult<&mut DbTransaction> {
        let id = self.id.clone();
        self.inner
            .as_mut()
            .ok_or_else(|| ApiError::transaction("Transaction already completed", id))
    }

    fn take_active(&mut self) -> ApiResult<DbTransaction> {
        self.inner
            .take()
            .ok_or_else(|| ApiError::transaction("Transaction already completed", &self.id))
    }
}

impl Drop for ProcTransaction {
    fn drop(&mut self) {
        if self.inner.is_some() {
            // The inner sqlx transaction rolls back when dropped.
            warn!(
                transaction_id = %self.id,
                "Transaction dropped without commit or rollback; rolling back"
            );
        }
    }
}

impl std::fmt::Debug for ProcTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcTransaction")
            .field("id", &self.id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_transaction() -> ProcTransaction {
        ProcTransaction {
            inner: None,
            id: generate_transaction_id(),
        }
    }

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32); // "tx_" + 32 hex chars
    }

    #[tokio::test]
    async fn test_commit_after_completion_fails() {
        let mut tx = completed_transaction();
        assert!(tx.is_completed());

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, ApiError::Transaction { .. }));
    }

    #[tokio::test]
    async fn test_rollback_after_completion_fails() {
        let mut tx = completed_transaction();
        let err = tx.rollback().await.unwrap_err();
        assert!(matches!(err, ApiError::Transaction { .. }));
    }

    #[test]
    fn test_active_after_completion_fails() {
        let mut tx = completed_transaction();
        assert!(tx.active().is_err());
    }
}
