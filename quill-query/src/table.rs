//! Table definitions: columns, primary keys, relations and table-level hooks.
//!
//! ```rust
//! use quill_query::{TableDef, JoinTable};
//!
//! let posts = TableDef::new("posts")
//!     .columns(["id", "title", "author_id"])
//!     .belongs_to("author", "users", "author_id", "id")
//!     .has_and_belongs_to_many("tags", "tags", JoinTable::new("post_tags", "post_id", "tag_id"));
//!
//! assert!(posts.relation("author").is_some());
//! assert!(posts.has_column("title"));
//! assert!(!posts.has_column("body"));
//! ```

use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::QueryResult;
use crate::hooks::{Hook, HookContext, HookEvent, QueryHooks};
use crate::parse::{ParseFn, Parsers};
use crate::relations::{JoinTable, Relation, RelationKind};
use crate::value::Value;

/// A column of a table.
#[derive(Clone)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Parse function applied to values read from this column.
    pub parse: Option<ParseFn>,
}

impl fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDef")
            .field("name", &self.name)
            .field("parse", &self.parse.is_some())
            .finish()
    }
}

/// Static description of a table, shared by every query on it.
///
/// A table without declared columns accepts any column name.
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    schema: Option<String>,
    primary_keys: Vec<String>,
    columns: IndexMap<String, ColumnDef>,
    relations: IndexMap<String, Arc<Relation>>,
    hooks: QueryHooks,
}

impl TableDef {
    /// Create a table definition with primary key `id`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            primary_keys: vec!["id".to_string()],
            columns: IndexMap::new(),
            relations: IndexMap::new(),
            hooks: QueryHooks::default(),
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the primary key columns.
    pub fn primary_key(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.primary_keys = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a column.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.columns.insert(name.clone(), ColumnDef { name, parse: None });
        self
    }

    /// Declare several columns.
    pub fn columns(self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        names.into_iter().fold(self, |table, name| table.column(name))
    }

    /// Declare a column with a parse function for values read from it.
    pub fn column_parsed<F>(mut self, name: impl Into<String>, parse: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        self.columns.insert(
            name.clone(),
            ColumnDef {
                name,
                parse: Some(Arc::new(parse)),
            },
        );
        self
    }

    /// Declare a belongs-to relation: this table's `foreign_key` references `target.primary_key`.
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        self.add_relation(Relation::new(
            name,
            target,
            RelationKind::BelongsTo {
                foreign_key: foreign_key.into(),
                primary_key: primary_key.into(),
            },
        ))
    }

    /// Declare a has-one relation: `target.foreign_key` references this table's `primary_key`.
    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        primary_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.add_relation(Relation::new(
            name,
            target,
            RelationKind::HasOne {
                primary_key: primary_key.into(),
                foreign_key: foreign_key.into(),
            },
        ))
    }

    /// Declare a has-many relation: `target.foreign_key` references this table's `primary_key`.
    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        primary_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.add_relation(Relation::new(
            name,
            target,
            RelationKind::HasMany {
                primary_key: primary_key.into(),
                foreign_key: foreign_key.into(),
            },
        ))
    }

    /// Declare a many-to-many relation through a join table.
    pub fn has_and_belongs_to_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        join: JoinTable,
    ) -> Self {
        self.add_relation(Relation::new(name, target, RelationKind::HasAndBelongsToMany(join)))
    }

    /// Declare a relation.
    pub fn add_relation(mut self, relation: Relation) -> Self {
        self.relations.insert(relation.name.clone(), Arc::new(relation));
        self
    }

    /// Register a table-level hook; it seeds every query on this table.
    pub fn hook(mut self, event: HookEvent, hook: Hook) -> Self {
        self.hooks.push(event, hook);
        self
    }

    /// Register a table-level hook that needs `columns` in the statement's result.
    pub fn hook_select(
        mut self,
        event: HookEvent,
        columns: impl IntoIterator<Item = impl Into<String>>,
        hook: Hook,
    ) -> Self {
        self.hooks.push_select(event, columns);
        self.hooks.push(event, hook);
        self
    }

    /// Register a table-level before-create hook.
    pub fn before_create<F, Fut>(self, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<()>> + Send + 'static,
    {
        self.hook(HookEvent::BeforeCreate, Hook::new(f))
    }

    /// Register a table-level after-create hook.
    pub fn after_create<F, Fut>(self, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<()>> + Send + 'static,
    {
        self.hook(HookEvent::AfterCreate, Hook::new(f))
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema, if set.
    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Primary key columns.
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    /// First primary key column.
    pub fn primary_key_column(&self) -> &str {
        self.primary_keys.first().map(String::as_str).unwrap_or("id")
    }

    /// Check if a column exists. Tables without declared columns accept any name.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.is_empty() || self.columns.contains_key(name) || self.primary_keys.iter().any(|pk| pk == name)
    }

    /// Check if columns are declared.
    pub fn declares_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Declared columns.
    pub fn column_defs(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.values()
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&Arc<Relation>> {
        self.relations.get(name)
    }

    /// All relations, in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &Arc<Relation>> {
        self.relations.values()
    }

    /// Table-level hooks.
    pub fn hooks(&self) -> &QueryHooks {
        &self.hooks
    }

    /// Parsers seeded into every query on this table.
    pub(crate) fn parsers(&self) -> Parsers {
        let mut parsers = Parsers::default();
        for column in self.columns.values() {
            if let Some(parse) = &column.parse {
                parsers.set_column(column.name.clone(), parse.clone());
            }
        }
        parsers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeclared_columns_accept_anything() {
        let table = TableDef::new("events");
        assert!(table.has_column("anything"));
        assert!(!table.declares_columns());
    }

    #[test]
    fn test_primary_key_counts_as_column() {
        let table = TableDef::new("users").primary_key(["uuid"]).columns(["name"]);
        assert!(table.has_column("uuid"));
        assert!(table.has_column("name"));
        assert!(!table.has_column("id"));
        assert_eq!(table.primary_key_column(), "uuid");
    }

    #[test]
    fn test_relations_are_indexed_by_name() {
        let table = TableDef::new("users")
            .has_many("posts", "posts", "id", "author_id")
            .has_one("profile", "profiles", "id", "user_id");
        let names: Vec<_> = table.relations().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["posts", "profile"]);
        assert!(table.relation("posts").is_some_and(|r| r.is_many()));
        assert!(table.relation("comments").is_none());
    }

    #[test]
    fn test_column_parsers_seed_query_parsers() {
        let table = TableDef::new("users").column_parsed("active", |v| Value::Bool(v.as_i64() == Some(1)));
        let parsers = table.parsers();
        assert!(parsers.column("active").is_some());
    }
}
