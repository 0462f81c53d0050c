//! Transactions with async closures and after-commit scheduling.
//!
//! Set `QUILL_DEBUG=true` to enable transaction debug logging.
//!
//! A transaction is entered with [`Db::transaction`]. The closure receives a
//! [`TransactionContext`] that queries run in through
//! [`Query::exec_in`](crate::Query::exec_in). The adapter commits when the
//! closure returns `Ok` and rolls back when it returns `Err`.
//!
//! Nested scopes opened with [`TransactionContext::transaction`] share the
//! physical transaction: they bump the transaction id and nothing else.
//! After-commit hooks queued anywhere inside run only once the outermost
//! scope has committed, and are dropped on rollback.
//!
//! # Isolation Levels
//!
//! ```rust
//! use quill_query::IsolationLevel;
//!
//! assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
//! assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
//! ```
//!
//! # Transaction Configuration
//!
//! ```rust
//! use quill_query::{TransactionConfig, IsolationLevel};
//!
//! let config = TransactionConfig::new().isolation(IsolationLevel::Serializable);
//! assert_eq!(config.isolation, IsolationLevel::Serializable);
//! ```
//!
//! # Transaction Usage (requires async runtime)
//!
//! ```rust,ignore
//! let user = db
//!     .transaction(|tx| async move {
//!         let user = users.insert(data)?.take().exec_in(&tx).await?;
//!         posts.insert(post)?.exec_in(&tx).await?;
//!         Ok(user)
//!     })
//!     .await?;
//! ```

use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, warn};

use crate::adapter::{Adapter, BoxFuture};
use crate::db::Db;
use crate::error::{QueryError, QueryResult};
use crate::raw::RawSql;
use crate::value::Row;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted - allows dirty reads.
    ReadUncommitted,
    /// Read committed - prevents dirty reads.
    #[default]
    ReadCommitted,
    /// Repeatable read - prevents non-repeatable reads.
    RepeatableRead,
    /// Serializable - highest isolation level.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL clause for this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read-write access (default).
    #[default]
    ReadWrite,
    /// Read-only access.
    ReadOnly,
}

impl AccessMode {
    /// Get the SQL clause for this access mode.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        }
    }
}

/// Configuration for a transaction, handed to the adapter when it opens one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionConfig {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Access mode.
    pub access_mode: AccessMode,
    /// Whether to defer constraint checking.
    pub deferrable: bool,
}

impl TransactionConfig {
    /// Create a new transaction config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Make the transaction read-only.
    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    /// Make the transaction deferrable.
    pub fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }

    /// Generate the BEGIN statement for adapters that issue it themselves.
    pub fn to_begin_sql(&self) -> String {
        let mut parts = vec!["BEGIN", "ISOLATION LEVEL", self.isolation.as_sql(), self.access_mode.as_sql()];

        // PostgreSQL only honors DEFERRABLE for SERIALIZABLE READ ONLY.
        if self.deferrable
            && self.isolation == IsolationLevel::Serializable
            && self.access_mode == AccessMode::ReadOnly
        {
            parts.push("DEFERRABLE");
        }

        parts.join(" ")
    }
}

/// Work to start once the outermost transaction has committed.
pub(crate) struct AfterCommitJob(BoxFuture<'static, ()>);

impl AfterCommitJob {
    pub(crate) fn new(job: impl Future<Output = ()> + Send + 'static) -> Self {
        Self(Box::pin(job))
    }

    /// Start the job on the runtime without waiting for it.
    pub(crate) fn spawn(self) {
        tokio::spawn(self.0);
    }
}

/// State shared by every scope of one physical transaction.
struct TransactionState {
    after_commit: Mutex<Vec<AfterCommitJob>>,
}

impl TransactionState {
    fn new() -> Self {
        Self {
            after_commit: Mutex::new(Vec::new()),
        }
    }

    fn take_jobs(&self) -> Vec<AfterCommitJob> {
        std::mem::take(&mut *self.after_commit.lock())
    }
}

/// Handle to an open transaction.
///
/// Cloning is cheap; clones refer to the same transaction and scope.
#[derive(Clone)]
pub struct TransactionContext {
    db: Db,
    adapter: Arc<dyn Adapter>,
    id: u32,
    state: Arc<TransactionState>,
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("pending_after_commit", &self.state.after_commit.lock().len())
            .finish()
    }
}

impl TransactionContext {
    /// Scope depth: 0 for the outermost scope, incremented by each nested one.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Check if this is the outermost scope.
    pub fn is_outermost(&self) -> bool {
        self.id == 0
    }

    /// The database the transaction was opened on.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// The connection-bound adapter statements of this transaction go through.
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Open a nested scope in the same physical transaction.
    ///
    /// No statement is sent: an error returned from `f` propagates to the
    /// outermost scope, which rolls the whole transaction back.
    pub async fn transaction<T, F, Fut>(&self, f: F) -> QueryResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        let nested = Self {
            id: self.id + 1,
            ..self.clone()
        };
        let span = tracing::debug_span!("transaction", transaction_id = nested.id);
        f(nested).instrument(span).await
    }

    /// Run raw SQL inside the transaction.
    pub async fn raw(&self, sql: impl Into<RawSql>) -> QueryResult<Vec<Row>> {
        let sql = sql.into().to_sql()?;
        let result = self
            .adapter
            .query(&sql)
            .await
            .map_err(|e| QueryError::database(e, &sql.text, &sql.values))?;
        Ok(result.rows)
    }

    /// Queue work for after the outermost commit.
    pub(crate) fn defer(&self, job: AfterCommitJob) {
        self.state.after_commit.lock().push(job);
    }
}

impl Db {
    /// Run `f` in a transaction with the configured default isolation.
    pub async fn transaction<T, F, Fut>(&self, f: F) -> QueryResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut + Send,
        Fut: Future<Output = QueryResult<T>> + Send,
        T: Send,
    {
        self.transaction_with(self.config().transaction_config(), f).await
    }

    /// Run `f` in a transaction with an explicit configuration.
    ///
    /// Commits when `f` returns `Ok`, then starts every queued after-commit
    /// job. Rolls back and drops the queued jobs when `f` returns `Err`.
    pub async fn transaction_with<T, F, Fut>(&self, config: TransactionConfig, f: F) -> QueryResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut + Send,
        Fut: Future<Output = QueryResult<T>> + Send,
        T: Send,
    {
        let state = Arc::new(TransactionState::new());
        let span = tracing::debug_span!(
            "transaction",
            transaction_id = 0u32,
            isolation = config.isolation.as_sql()
        );
        let mut output: Option<T> = None;
        let started = Instant::now();

        let result = {
            let slot = &mut output;
            let db = self.clone();
            let scope_state = state.clone();
            self.adapter()
                .transaction(
                    &config,
                    Box::new(move |adapter: Arc<dyn Adapter>| {
                        let scope: BoxFuture<'_, QueryResult<()>> = Box::pin(
                            async move {
                                let tx = TransactionContext {
                                    db,
                                    adapter,
                                    id: 0,
                                    state: scope_state,
                                };
                                *slot = Some(f(tx).await?);
                                Ok(())
                            }
                            .instrument(span),
                        );
                        scope
                    }),
                )
                .await
        };

        match result {
            Ok(()) => {
                let jobs = state.take_jobs();
                debug!(
                    elapsed_us = started.elapsed().as_micros() as u64,
                    after_commit = jobs.len(),
                    "Transaction committed"
                );
                for job in jobs {
                    job.spawn();
                }
                output.ok_or_else(|| QueryError::transaction("adapter committed without running the transaction scope"))
            }
            Err(e) => {
                let dropped = state.take_jobs().len();
                warn!(error = %e, dropped_after_commit = dropped, "Transaction rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingAdapter, db_with};

    #[test]
    fn test_isolation_level() {
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }

    #[test]
    fn test_access_mode() {
        assert_eq!(AccessMode::ReadWrite.as_sql(), "READ WRITE");
        assert_eq!(AccessMode::ReadOnly.as_sql(), "READ ONLY");
    }

    #[test]
    fn test_transaction_config_builder() {
        let config = TransactionConfig::new()
            .isolation(IsolationLevel::Serializable)
            .read_only()
            .deferrable();

        assert_eq!(config.isolation, IsolationLevel::Serializable);
        assert_eq!(config.access_mode, AccessMode::ReadOnly);
        assert!(config.deferrable);
        assert_eq!(
            config.to_begin_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY DEFERRABLE"
        );
    }

    #[test]
    fn test_begin_sql() {
        assert_eq!(
            TransactionConfig::new().to_begin_sql(),
            "BEGIN ISOLATION LEVEL READ COMMITTED READ WRITE"
        );
        let sql = TransactionConfig::new()
            .isolation(IsolationLevel::Serializable)
            .read_only()
            .deferrable()
            .to_begin_sql();
        assert!(sql.ends_with("READ ONLY DEFERRABLE"));
    }

    #[tokio::test]
    async fn test_nested_scopes_share_one_transaction() {
        let adapter = RecordingAdapter::new();
        let db = db_with(adapter.clone());

        let ids = db
            .transaction(|tx| async move {
                let outer = tx.id();
                let inner = tx.transaction(|inner| async move { Ok(inner.id()) }).await?;
                Ok((outer, inner))
            })
            .await
            .unwrap();

        assert_eq!(ids, (0, 1));
        assert_eq!(adapter.transactions(), 1);
    }

    #[tokio::test]
    async fn test_error_rolls_back_and_propagates() {
        let adapter = RecordingAdapter::new();
        let db = db_with(adapter.clone());

        let err = db
            .transaction(|tx| async move {
                tx.raw("INSERT INTO logs DEFAULT VALUES").await?;
                Err::<(), _>(QueryError::invalid_data("boom"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.message, "boom");
        assert_eq!(adapter.rollbacks(), 1);
    }
}
