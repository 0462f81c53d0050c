//! The query descriptor and its chain methods.
//!
//! A [`Query`] is a cheap handle around a shared, immutable [`QueryState`].
//! Every public chain method takes `&self` and returns a new handle; the
//! state is copied on write, so the receiver never changes and can be reused
//! as a base for any number of derived queries. Each clause family lives in
//! its own module as an `impl Query` block, with `*_mut` variants that edit a
//! handle in place once it is already owned.
//!
//! ```rust,ignore
//! let users = db.table("users")?;
//! let active = users.r#where(("active", true));
//! let admins = active.r#where(("role", "admin"));
//!
//! // `users` and `active` are unchanged.
//! assert!(active.to_sql()?.as_single().unwrap().text.contains("\"active\""));
//! ```

mod conditions;
mod hooks;
mod join;
mod read;
mod select;
mod write;

pub use join::{Join, JoinOn, JoinTarget, OnBuilder};
pub use select::{Cte, CteBody, FromSource};
pub use write::{ConflictAction, Data, OnConflict, OnConflictBuilder, TruncateOptions, WriteValue};

use std::fmt;
use std::sync::Arc;

use crate::db::{AfterCommitErrorHandler, Db};
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::hooks::QueryHooks;
use crate::nested::NestedPlan;
use crate::parse::Parsers;
use crate::relations::RelationLoad;
use crate::table::TableDef;
use crate::types::{OrderItem, QueryKind, ReturnType, SelectItem, UnionKind, WindowDef};
use crate::value::Value;

/// Rows and columns of a pending insert.
#[derive(Debug, Clone, Default)]
pub(crate) struct InsertPayload {
    /// Column list, the union of every row's keys in first-seen order.
    pub columns: Vec<String>,
    /// One entry per row, aligned with `columns`.
    pub rows: Vec<Vec<WriteValue>>,
}

/// Every clause of one query.
#[derive(Clone)]
pub(crate) struct QueryState {
    pub table: Arc<TableDef>,
    pub kind: QueryKind,
    pub alias: Option<String>,
    pub from: Option<FromSource>,
    pub with: Vec<Cte>,

    pub select: Vec<SelectItem>,
    pub distinct: Option<Vec<String>>,
    pub and: Vec<Filter>,
    pub or: Vec<Vec<Filter>>,
    pub joins: Vec<Join>,
    pub group: Vec<String>,
    pub having: Vec<Filter>,
    pub windows: Vec<WindowDef>,
    pub order: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub unions: Vec<(UnionKind, Query)>,

    pub insert: InsertPayload,
    pub update: Vec<(String, WriteValue)>,
    pub on_conflict: Option<OnConflict>,
    pub truncate: TruncateOptions,
    pub all_rows: bool,

    pub return_type: Option<ReturnType>,
    pub value_default: Option<Value>,
    pub parsers: Parsers,
    pub hooks: QueryHooks,
    pub loads: Vec<RelationLoad>,
    pub nested: NestedPlan,
    pub wrap_in_transaction: bool,
    pub none: bool,
    pub log: Option<bool>,
    pub after_commit_error: Option<AfterCommitErrorHandler>,
}

impl QueryState {
    fn new(table: Arc<TableDef>) -> Self {
        Self {
            parsers: table.parsers(),
            hooks: table.hooks().clone(),
            table,
            kind: QueryKind::Select,
            alias: None,
            from: None,
            with: Vec::new(),
            select: Vec::new(),
            distinct: None,
            and: Vec::new(),
            or: Vec::new(),
            joins: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            windows: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            unions: Vec::new(),
            insert: InsertPayload::default(),
            update: Vec::new(),
            on_conflict: None,
            truncate: TruncateOptions::default(),
            all_rows: false,
            return_type: None,
            value_default: None,
            loads: Vec::new(),
            nested: NestedPlan::default(),
            wrap_in_transaction: false,
            none: false,
            log: None,
            after_commit_error: None,
        }
    }

    /// Check if any condition restricts the rows.
    pub fn has_conditions(&self) -> bool {
        !self.and.is_empty() || self.or.iter().any(|group| !group.is_empty())
    }

    /// Condition groups, OR-combined; conditions in a group are AND-combined.
    pub fn condition_groups(&self) -> Vec<&[Filter]> {
        let mut groups: Vec<&[Filter]> = Vec::new();
        if !self.and.is_empty() {
            groups.push(&self.and);
        }
        groups.extend(self.or.iter().filter(|g| !g.is_empty()).map(Vec::as_slice));
        groups
    }
}

/// A query on one table.
#[derive(Clone)]
pub struct Query {
    db: Db,
    state: Arc<QueryState>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.state.table.name())
            .field("kind", &self.state.kind)
            .field("return_type", &self.return_type())
            .finish()
    }
}

impl Query {
    /// Create a query on `table`, seeded with the table's parsers and hooks.
    pub fn new(db: Db, table: Arc<TableDef>) -> Self {
        Self {
            db,
            state: Arc::new(QueryState::new(table)),
        }
    }

    /// Check if two handles share the same descriptor.
    pub fn ptr_eq(&self, other: &Query) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// The database this query runs against.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// The table definition.
    pub fn table(&self) -> &TableDef {
        &self.state.table
    }

    /// Statement kind.
    pub fn kind(&self) -> QueryKind {
        self.state.kind
    }

    /// Name columns are qualified with: the alias, the FROM source, or the table name.
    pub fn alias_or_name(&self) -> &str {
        if let Some(alias) = &self.state.alias {
            return alias;
        }
        match &self.state.from {
            Some(source) => source.name(),
            None => self.state.table.name(),
        }
    }

    /// Check if the descriptor restricts rows.
    pub fn has_conditions(&self) -> bool {
        self.state.has_conditions()
    }

    pub(crate) fn state(&self) -> &QueryState {
        &self.state
    }

    /// Mutable access to the descriptor, copying it if it is shared.
    pub(crate) fn state_mut(&mut self) -> &mut QueryState {
        Arc::make_mut(&mut self.state)
    }

    /// Clone the handle and edit the clone.
    pub(crate) fn with(&self, f: impl FnOnce(&mut QueryState)) -> Query {
        let mut query = self.clone();
        f(query.state_mut());
        query
    }

    /// Clone the handle and edit the clone, failing without side effects.
    pub(crate) fn try_with(&self, f: impl FnOnce(&mut Query) -> QueryResult<()>) -> QueryResult<Query> {
        let mut query = self.clone();
        f(&mut query)?;
        Ok(query)
    }

    /// Set the statement kind once.
    pub(crate) fn set_kind(&mut self, kind: QueryKind) -> QueryResult<()> {
        let current = self.state.kind;
        if current != QueryKind::Select && current != kind {
            return Err(QueryError::invalid_query(format!(
                "query is already a {} and cannot become a {}",
                current.as_str(),
                kind.as_str()
            ))
            .with_table(self.state.table.name()));
        }
        self.state_mut().kind = kind;
        Ok(())
    }

    /// Force the query to run inside a transaction.
    pub fn wrap_in_transaction(&self) -> Query {
        if self.state.wrap_in_transaction {
            return self.clone();
        }
        self.with(|s| s.wrap_in_transaction = true)
    }

    /// Log this query's statements at info level, regardless of configuration.
    pub fn log(&self, enabled: bool) -> Query {
        self.with(|s| s.log = Some(enabled))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{db, users};

    #[test]
    fn test_public_methods_do_not_mutate_receiver() {
        let db = db();
        let base = users(&db);
        let before = base.to_sql().unwrap();

        let derived = base.r#where(("name", "Ann")).order_by("id").limit(3);

        assert_eq!(base.to_sql().unwrap(), before);
        assert_ne!(derived.to_sql().unwrap(), before);
        assert!(!base.ptr_eq(&derived));
    }

    #[test]
    fn test_mut_variants_edit_in_place() {
        let db = db();
        let mut query = users(&db);
        query.where_mut(("name", "Ann"));
        assert!(query.has_conditions());
    }

    #[test]
    fn test_kind_is_set_once() {
        let db = db();
        let q = users(&db).find(1).delete().unwrap();
        let err = q.insert(crate::Data::new().set("name", "x")).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::InvalidQuery);
    }

    #[test]
    fn test_wrap_in_transaction_is_idempotent() {
        let db = db();
        let q = users(&db).wrap_in_transaction();
        assert!(q.wrap_in_transaction().ptr_eq(&q));
    }
}
