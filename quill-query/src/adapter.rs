//! The database adapter boundary.
//!
//! An adapter owns connections and the wire protocol. The engine hands it
//! compiled statements and reads back either records or row arrays. For
//! transactions the adapter runs a scope with a connection-bound adapter and
//! commits or rolls back depending on the scope's result.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{BoxError, QueryResult};
use crate::sql::Sql;
use crate::transaction::TransactionConfig;
use crate::value::{Row, Value};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type of adapter calls.
pub type AdapterResult<T> = Result<T, BoxError>;

/// Body of a transaction, run by [`Adapter::transaction`] with the
/// transaction-bound adapter.
pub type TransactionScope<'a> =
    Box<dyn FnOnce(Arc<dyn Adapter>) -> BoxFuture<'a, QueryResult<()>> + Send + 'a>;

/// Description of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Column name as returned by the database.
    pub name: String,
}

impl FieldInfo {
    /// Create a field description.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Rows as records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordsResult {
    /// Returned rows.
    pub rows: Vec<Row>,
    /// Affected (writes) or returned (reads) row count.
    pub row_count: u64,
    /// Result columns.
    pub fields: Vec<FieldInfo>,
}

/// Rows as arrays, positionally matching `fields`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArraysResult {
    /// Returned rows.
    pub rows: Vec<Vec<Value>>,
    /// Affected (writes) or returned (reads) row count.
    pub row_count: u64,
    /// Result columns.
    pub fields: Vec<FieldInfo>,
}

impl From<RecordsResult> for ArraysResult {
    fn from(result: RecordsResult) -> Self {
        let fields = if result.fields.is_empty() {
            result
                .rows
                .first()
                .map(|row| row.keys().map(FieldInfo::new).collect())
                .unwrap_or_default()
        } else {
            result.fields
        };
        Self {
            rows: result.rows.into_iter().map(|row| row.into_values().collect()).collect(),
            row_count: result.row_count,
            fields,
        }
    }
}

/// A database adapter.
///
/// Implementations must be cheap to share; the engine holds them as
/// `Arc<dyn Adapter>`. Savepoints are not required: the engine tracks
/// nested transaction scopes itself and only calls
/// [`transaction`](Adapter::transaction) for the outermost one.
pub trait Adapter: Send + Sync {
    /// Run a statement and return its rows as records.
    fn query<'a>(&'a self, sql: &'a Sql) -> BoxFuture<'a, AdapterResult<RecordsResult>>;

    /// Run a statement and return its rows as arrays.
    fn arrays<'a>(&'a self, sql: &'a Sql) -> BoxFuture<'a, AdapterResult<ArraysResult>>;

    /// Begin a transaction, run `scope` with a connection-bound adapter, then
    /// commit if the scope succeeded or roll back if it failed. The scope's
    /// error is returned unchanged after rollback.
    fn transaction<'a>(
        &'a self,
        config: &'a TransactionConfig,
        scope: TransactionScope<'a>,
    ) -> BoxFuture<'a, QueryResult<()>>;
}
