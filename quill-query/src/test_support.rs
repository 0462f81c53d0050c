//! Shared fixtures for unit tests: a recording adapter and a small schema.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::adapter::{Adapter, AdapterResult, ArraysResult, BoxFuture, RecordsResult, TransactionScope};
use crate::db::Db;
use crate::error::QueryResult;
use crate::query::Query;
use crate::relations::JoinTable;
use crate::sql::Sql;
use crate::table::TableDef;
use crate::transaction::TransactionConfig;
use crate::value::{Row, Value};

#[derive(Default)]
struct Recorded {
    statements: Mutex<Vec<String>>,
    committed: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, RecordsResult)>>,
    failures: Mutex<Vec<String>>,
    transactions: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// An in-memory adapter that records every statement it receives.
///
/// Responses are chosen by the first registered pattern contained in the
/// statement text; statements without a match return nothing. Statements
/// sent inside a transaction are only moved to [`committed`](Self::committed)
/// when it commits.
#[derive(Clone, Default)]
pub(crate) struct RecordingAdapter {
    inner: Arc<Recorded>,
    staged: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingAdapter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer statements containing `pattern` with `rows`.
    pub(crate) fn on(&self, pattern: &str, rows: Vec<Row>) {
        let result = records(rows);
        self.inner.responses.lock().push((pattern.to_string(), result));
    }

    /// Answer statements containing `pattern` with a bare row count.
    pub(crate) fn on_count(&self, pattern: &str, row_count: u64) {
        let result = RecordsResult {
            row_count,
            ..RecordsResult::default()
        };
        self.inner.responses.lock().push((pattern.to_string(), result));
    }

    /// Fail statements containing `pattern`.
    pub(crate) fn fail_on(&self, pattern: &str) {
        self.inner.failures.lock().push(pattern.to_string());
    }

    /// Every statement sent, with transaction boundaries as `BEGIN`, `COMMIT` and `ROLLBACK`.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.inner.statements.lock().clone()
    }

    /// Statements that ran outside a transaction or in a committed one.
    pub(crate) fn committed(&self) -> Vec<String> {
        self.inner.committed.lock().clone()
    }

    pub(crate) fn transactions(&self) -> usize {
        self.inner.transactions.load(Ordering::SeqCst)
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    fn respond(&self, sql: &Sql) -> AdapterResult<RecordsResult> {
        self.inner.statements.lock().push(sql.text.clone());
        if self.inner.failures.lock().iter().any(|p| sql.text.contains(p.as_str())) {
            return Err(format!("statement rejected: {}", sql.text).into());
        }
        match &self.staged {
            Some(staged) => staged.lock().push(sql.text.clone()),
            None => self.inner.committed.lock().push(sql.text.clone()),
        }
        let responses = self.inner.responses.lock();
        Ok(responses
            .iter()
            .find(|(pattern, _)| sql.text.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }
}

impl Adapter for RecordingAdapter {
    fn query<'a>(&'a self, sql: &'a Sql) -> BoxFuture<'a, AdapterResult<RecordsResult>> {
        Box::pin(async move { self.respond(sql) })
    }

    fn arrays<'a>(&'a self, sql: &'a Sql) -> BoxFuture<'a, AdapterResult<ArraysResult>> {
        Box::pin(async move { self.respond(sql).map(ArraysResult::from) })
    }

    fn transaction<'a>(
        &'a self,
        _config: &'a TransactionConfig,
        scope: TransactionScope<'a>,
    ) -> BoxFuture<'a, QueryResult<()>> {
        Box::pin(async move {
            self.inner.transactions.fetch_add(1, Ordering::SeqCst);
            self.inner.statements.lock().push("BEGIN".to_string());
            let staged = Arc::new(Mutex::new(Vec::new()));
            let scoped = Self {
                inner: self.inner.clone(),
                staged: Some(staged.clone()),
            };
            match scope(Arc::new(scoped)).await {
                Ok(()) => {
                    self.inner.statements.lock().push("COMMIT".to_string());
                    self.inner.committed.lock().extend(staged.lock().drain(..));
                    Ok(())
                }
                Err(e) => {
                    self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
                    self.inner.statements.lock().push("ROLLBACK".to_string());
                    Err(e)
                }
            }
        })
    }
}

pub(crate) fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub(crate) fn records(rows: Vec<Row>) -> RecordsResult {
    RecordsResult {
        row_count: rows.len() as u64,
        rows,
        fields: Vec::new(),
    }
}

fn schema(builder: crate::db::DbBuilder) -> Db {
    builder
        .table(
            TableDef::new("users")
                .columns(["id", "name", "email"])
                .has_many("posts", "posts", "id", "author_id")
                .has_one("profile", "profiles", "id", "user_id"),
        )
        .table(TableDef::new("profiles").columns(["id", "user_id", "bio"]))
        .table(
            TableDef::new("posts")
                .columns(["id", "title", "author_id"])
                .belongs_to("author", "users", "author_id", "id")
                .has_and_belongs_to_many("tags", "tags", JoinTable::new("post_tags", "post_id", "tag_id")),
        )
        .table(TableDef::new("tags").columns(["id", "name"]))
        .build()
        .unwrap()
}

pub(crate) fn db() -> Db {
    schema(Db::builder(RecordingAdapter::new()))
}

pub(crate) fn db_with(adapter: Arc<RecordingAdapter>) -> Db {
    schema(Db::builder(adapter))
}

pub(crate) fn users(db: &Db) -> Query {
    db.table("users").unwrap()
}

/// The single statement a query compiles to.
pub(crate) fn sql(query: &Query) -> Sql {
    query.to_sql().unwrap().as_single().unwrap().clone()
}

pub(crate) fn sql_text(query: &Query) -> String {
    sql(query).text
}
