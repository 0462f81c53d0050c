//! The database handle: adapter, configuration and the table registry.
//!
//! ```rust,ignore
//! let db = Db::builder(adapter)
//!     .config(QueryConfig::from_env()?)
//!     .table(TableDef::new("users").has_many("posts", "posts", "id", "author_id"))
//!     .table(TableDef::new("posts"))
//!     .build()?;
//!
//! let recent = db.table("posts")?.order_by(OrderItem::desc("id")).limit(10);
//! ```

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use crate::adapter::Adapter;
use crate::config::QueryConfig;
use crate::error::{AfterCommitError, QueryError, QueryResult};
use crate::query::Query;
use crate::raw::RawSql;
use crate::relations::RelationKind;
use crate::table::TableDef;
use crate::value::Row;

/// Receives after-commit hook failures.
pub type AfterCommitErrorHandler = Arc<dyn Fn(&AfterCommitError) + Send + Sync>;

struct DbInner {
    adapter: Arc<dyn Adapter>,
    config: QueryConfig,
    tables: IndexMap<String, Arc<TableDef>>,
    after_commit_error: Option<AfterCommitErrorHandler>,
}

/// Entry point for building queries. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("tables", &self.inner.tables.keys().collect::<Vec<_>>())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Db {
    /// Start building a database handle around an adapter.
    pub fn builder(adapter: Arc<dyn Adapter>) -> DbBuilder {
        DbBuilder {
            adapter,
            config: QueryConfig::default(),
            tables: Vec::new(),
            after_commit_error: None,
        }
    }

    /// A fresh query on a registered table.
    pub fn table(&self, name: &str) -> QueryResult<Query> {
        let table = self.table_def(name).ok_or_else(|| {
            QueryError::invalid_query(format!("table '{}' is not registered", name))
                .with_table(name)
                .with_suggestion("Register the table with DbBuilder::table")
        })?;
        Ok(Query::new(self.clone(), table.clone()))
    }

    /// A query on a table that has no registered definition, such as a join table.
    pub fn unregistered_table(&self, name: &str) -> Query {
        match self.table_def(name) {
            Some(table) => Query::new(self.clone(), table.clone()),
            None => Query::new(
                self.clone(),
                Arc::new(TableDef::new(name).primary_key(Vec::<String>::new())),
            ),
        }
    }

    /// Look up a table definition.
    pub fn table_def(&self, name: &str) -> Option<&Arc<TableDef>> {
        self.inner.tables.get(name)
    }

    /// The adapter statements outside transactions go through.
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.inner.adapter
    }

    /// Engine configuration.
    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Run raw SQL outside any transaction.
    pub async fn raw(&self, sql: impl Into<RawSql>) -> QueryResult<Vec<Row>> {
        let sql = sql.into().to_sql()?;
        debug!(sql = %sql.text, params = sql.values.len(), "Running raw statement");
        let result = self
            .inner
            .adapter
            .query(&sql)
            .await
            .map_err(|e| QueryError::database(e, &sql.text, &sql.values))?;
        Ok(result.rows)
    }

    /// Report an after-commit failure through the database-level handler,
    /// or the error log when none is registered.
    pub(crate) fn report_after_commit_error(&self, err: &AfterCommitError) {
        match &self.inner.after_commit_error {
            Some(handler) => handler(err),
            None => {
                for status in err.rejected() {
                    error!(
                        table = %err.table,
                        hook = status.name.as_deref().unwrap_or("<unnamed>"),
                        outcome = ?status.outcome,
                        "After-commit hook failed"
                    );
                }
            }
        }
    }
}

/// Builder for [`Db`].
pub struct DbBuilder {
    adapter: Arc<dyn Adapter>,
    config: QueryConfig,
    tables: Vec<TableDef>,
    after_commit_error: Option<AfterCommitErrorHandler>,
}

impl DbBuilder {
    /// Set the engine configuration.
    pub fn config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a table.
    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    /// Handle after-commit failures of queries that do not catch them.
    pub fn on_after_commit_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&AfterCommitError) + Send + Sync + 'static,
    {
        self.after_commit_error = Some(Arc::new(handler));
        self
    }

    /// Validate the configuration and relation targets, then build.
    pub fn build(self) -> QueryResult<Db> {
        self.config.validate()?;

        let mut tables: IndexMap<String, Arc<TableDef>> = IndexMap::new();
        for table in self.tables {
            if tables.contains_key(table.name()) {
                return Err(QueryError::invalid_query(format!(
                    "table '{}' is registered twice",
                    table.name()
                )));
            }
            tables.insert(table.name().to_string(), Arc::new(table));
        }

        for table in tables.values() {
            for relation in table.relations() {
                if !tables.contains_key(&relation.target) {
                    return Err(QueryError::unknown_relation(table.name(), &relation.name).with_help(
                        format!("target table '{}' is not registered", relation.target),
                    ));
                }
                if let RelationKind::BelongsTo { foreign_key, .. } = &relation.kind
                    && !table.has_column(foreign_key)
                {
                    return Err(QueryError::invalid_column(
                        format!("{}.{}", table.name(), foreign_key),
                        format!("foreign key of relation '{}' is not a column", relation.name),
                    ));
                }
            }
        }

        debug!(tables = tables.len(), "Database handle built");
        Ok(Db {
            inner: Arc::new(DbInner {
                adapter: self.adapter,
                config: self.config,
                tables,
                after_commit_error: self.after_commit_error,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use crate::test_support::RecordingAdapter;

    #[test]
    fn test_unknown_relation_target_rejected() {
        let err = Db::builder(RecordingAdapter::new())
            .table(TableDef::new("users").has_many("posts", "posts", "id", "author_id"))
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownRelation);
    }

    #[test]
    fn test_belongs_to_fk_must_be_column() {
        let err = Db::builder(RecordingAdapter::new())
            .table(TableDef::new("users"))
            .table(
                TableDef::new("posts")
                    .columns(["title"])
                    .belongs_to("author", "users", "author_id", "id"),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidColumn);
    }

    #[test]
    fn test_unregistered_table_lookup() {
        let db = Db::builder(RecordingAdapter::new())
            .table(TableDef::new("users"))
            .build()
            .unwrap();
        assert!(db.table("users").is_ok());
        assert!(db.table("ghosts").is_err());
        assert!(db.unregistered_table("user_roles").table().primary_keys().is_empty());
    }
}
