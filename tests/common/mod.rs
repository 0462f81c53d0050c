//! Shared helpers for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use quill::{
    Adapter, AdapterResult, ArraysResult, BoxFuture, Db, JoinTable, QueryResult, RecordsResult, Row, Sql,
    TableDef, TransactionConfig, TransactionScope, Value,
};

#[derive(Default)]
struct Shared {
    log: Mutex<Vec<String>>,
    committed: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, RecordsResult)>>,
    failures: Mutex<Vec<String>>,
    begins: Mutex<Vec<String>>,
    rollbacks: AtomicUsize,
}

/// In-memory adapter. It records statements, answers them from registered
/// patterns and keeps statements of a transaction staged until commit.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    shared: Arc<Shared>,
    staged: Option<Arc<Mutex<Vec<String>>>>,
}

impl MemoryAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer statements containing `pattern` with `rows`.
    pub fn on(&self, pattern: &str, rows: Vec<Row>) {
        let result = RecordsResult {
            row_count: rows.len() as u64,
            rows,
            fields: Vec::new(),
        };
        self.shared.responses.lock().push((pattern.to_string(), result));
    }

    /// Answer statements containing `pattern` with an affected-row count.
    pub fn on_count(&self, pattern: &str, row_count: u64) {
        let result = RecordsResult {
            row_count,
            ..RecordsResult::default()
        };
        self.shared.responses.lock().push((pattern.to_string(), result));
    }

    /// Reject statements containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.shared.failures.lock().push(pattern.to_string());
    }

    /// Every statement sent, with `BEGIN`, `COMMIT` and `ROLLBACK` markers.
    pub fn log(&self) -> Vec<String> {
        self.shared.log.lock().clone()
    }

    /// Statements whose effects survived: standalone or committed.
    pub fn committed(&self) -> Vec<String> {
        self.shared.committed.lock().clone()
    }

    /// `BEGIN` statements of every opened transaction.
    pub fn begins(&self) -> Vec<String> {
        self.shared.begins.lock().clone()
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    fn answer(&self, sql: &Sql) -> AdapterResult<RecordsResult> {
        self.shared.log.lock().push(sql.text.clone());
        if self.shared.failures.lock().iter().any(|p| sql.text.contains(p.as_str())) {
            return Err(format!("rejected: {}", sql.text).into());
        }
        match &self.staged {
            Some(staged) => staged.lock().push(sql.text.clone()),
            None => self.shared.committed.lock().push(sql.text.clone()),
        }
        Ok(self
            .shared
            .responses
            .lock()
            .iter()
            .find(|(pattern, _)| sql.text.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }
}

impl Adapter for MemoryAdapter {
    fn query<'a>(&'a self, sql: &'a Sql) -> BoxFuture<'a, AdapterResult<RecordsResult>> {
        Box::pin(async move { self.answer(sql) })
    }

    fn arrays<'a>(&'a self, sql: &'a Sql) -> BoxFuture<'a, AdapterResult<ArraysResult>> {
        Box::pin(async move { self.answer(sql).map(ArraysResult::from) })
    }

    fn transaction<'a>(
        &'a self,
        config: &'a TransactionConfig,
        scope: TransactionScope<'a>,
    ) -> BoxFuture<'a, QueryResult<()>> {
        Box::pin(async move {
            let begin = config.to_begin_sql();
            self.shared.begins.lock().push(begin);
            self.shared.log.lock().push("BEGIN".to_string());
            let staged = Arc::new(Mutex::new(Vec::new()));
            let scoped = Self {
                shared: self.shared.clone(),
                staged: Some(staged.clone()),
            };
            let result = scope(Arc::new(scoped)).await;
            match &result {
                Ok(()) => {
                    self.shared.log.lock().push("COMMIT".to_string());
                    self.shared.committed.lock().extend(staged.lock().drain(..));
                }
                Err(_) => {
                    self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
                    self.shared.log.lock().push("ROLLBACK".to_string());
                }
            }
            result
        })
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Blog schema: users with posts and a profile, posts with an author and tags.
pub fn blog(adapter: Arc<MemoryAdapter>) -> Db {
    Db::builder(adapter)
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
        .expect("blog schema is valid")
}

pub fn text(query: &quill::Query) -> String {
    query.to_sql().unwrap().as_single().unwrap().text.clone()
}
