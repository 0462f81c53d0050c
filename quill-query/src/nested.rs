//! Nested write operations for managing relations in a single mutation.
//!
//! A write payload key that names a relation carries a [`NestedWrite`]. At
//! construction time the payload is split: belongs-to writes are prepended,
//! because they produce the foreign key the parent row needs, and every
//! other relation is appended, because it needs the parent's key. Both
//! phases run concurrently across relations, inside the parent's
//! transaction.
//!
//! # Example
//!
//! ```rust,ignore
//! use quill_query::{Data, Filter, NestedWrite};
//!
//! // Create a post with a new author and two existing tags.
//! let post = posts
//!     .insert(
//!         Data::new()
//!             .set("title", "Hello")
//!             .set("author", NestedWrite::create(Data::new().set("name", "Ann")))
//!             .set("tags", NestedWrite::connect([Filter::eq("name", "rust"), Filter::eq("name", "sql")])),
//!     )?
//!     .select(["id"])
//!     .take()
//!     .exec()
//!     .await?;
//!
//! // Detach one post from a user.
//! users
//!     .find(1)
//!     .update(Data::new().set("posts", NestedWrite::disconnect_one(Filter::eq("id", 10))))?
//!     .exec()
//!     .await?;
//! ```

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use crate::adapter::BoxFuture;
use crate::db::Db;
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::parse::QueryOutput;
use crate::query::{Data, Query, WriteValue};
use crate::relations::{JoinTable, Relation, RelationKind};
use crate::transaction::TransactionContext;
use crate::types::QueryKind;
use crate::value::{Row, Value};

/// A nested write on one relation.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedWrite {
    /// Create new related records.
    Create(Vec<Data>),
    /// Connect the first record matching each filter, creating it from the
    /// paired data when none matches.
    ConnectOrCreate(Vec<(Filter, Data)>),
    /// Connect existing records.
    Connect(Vec<Filter>),
    /// Disconnect records from the relation; empty disconnects all of them.
    Disconnect(Vec<Filter>),
    /// Set the relation to exactly these records (disconnect all others).
    Set(Vec<Filter>),
    /// Delete related records; empty deletes all of them.
    Delete(Vec<Filter>),
    /// Update related records matching each filter.
    Update(Vec<(Filter, Data)>),
}

impl NestedWrite {
    /// Create one related record.
    pub fn create(data: Data) -> Self {
        Self::Create(vec![data])
    }

    /// Create several related records.
    pub fn create_many(data: impl IntoIterator<Item = Data>) -> Self {
        Self::Create(data.into_iter().collect())
    }

    /// Connect the record matching `filter`.
    pub fn connect_one(filter: impl Into<Filter>) -> Self {
        Self::Connect(vec![filter.into()])
    }

    /// Connect the records matching `filters`; each filter must match at least one record.
    pub fn connect(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Connect(filters.into_iter().collect())
    }

    /// Connect the record matching `filter`, or create it from `data`.
    pub fn connect_or_create(filter: impl Into<Filter>, data: Data) -> Self {
        Self::ConnectOrCreate(vec![(filter.into(), data)])
    }

    /// Disconnect the record matching `filter`.
    pub fn disconnect_one(filter: impl Into<Filter>) -> Self {
        Self::Disconnect(vec![filter.into()])
    }

    /// Disconnect the records matching any of `filters`.
    pub fn disconnect(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Disconnect(filters.into_iter().collect())
    }

    /// Disconnect every related record; for belongs-to, clear the foreign key.
    pub fn disconnect_all() -> Self {
        Self::Disconnect(Vec::new())
    }

    /// Replace the related records with the ones matching `filters`.
    pub fn set(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Set(filters.into_iter().collect())
    }

    /// Delete the related records matching any of `filters`.
    pub fn delete(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Delete(filters.into_iter().collect())
    }

    /// Delete every related record.
    pub fn delete_all() -> Self {
        Self::Delete(Vec::new())
    }

    /// Update the related records matching `filter`.
    pub fn update(filter: impl Into<Filter>, data: Data) -> Self {
        Self::Update(vec![(filter.into(), data)])
    }

    /// Operation name, used in errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::ConnectOrCreate(_) => "connect_or_create",
            Self::Connect(_) => "connect",
            Self::Disconnect(_) => "disconnect",
            Self::Set(_) => "set",
            Self::Delete(_) => "delete",
            Self::Update(_) => "update",
        }
    }

    /// Check that the relation kind supports this operation in a statement
    /// of `kind`, and that the payload has the right shape.
    pub(crate) fn validate(&self, relation: &Relation, kind: QueryKind) -> QueryResult<()> {
        let on_insert = kind == QueryKind::Insert;
        let allowed = match &relation.kind {
            RelationKind::BelongsTo { .. } if on_insert => {
                matches!(self, Self::Create(_) | Self::Connect(_) | Self::ConnectOrCreate(_))
            }
            RelationKind::BelongsTo { .. } => {
                matches!(self, Self::Create(_) | Self::Connect(_) | Self::Disconnect(_))
            }
            _ if on_insert => {
                matches!(self, Self::Create(_) | Self::Connect(_) | Self::ConnectOrCreate(_))
            }
            RelationKind::HasOne { .. } | RelationKind::HasMany { .. } => true,
            RelationKind::HasAndBelongsToMany(_) => !matches!(self, Self::Delete(_) | Self::Update(_)),
        };
        if !allowed {
            return Err(QueryError::unsupported_nested(&relation.name, self.name())
                .with_context(format!("nested {} on {}", kind.as_str(), relation.kind.as_str())));
        }

        let single = matches!(relation.kind, RelationKind::BelongsTo { .. } | RelationKind::HasOne { .. });
        let too_many = |n: usize| single && n > 1;
        let shape_error = |message: &str| {
            Err(QueryError::invalid_data(format!("relation '{}': {}", relation.name, message))
                .with_field(&relation.name))
        };

        match self {
            Self::Create(rows) => {
                if rows.is_empty() {
                    return shape_error("create needs at least one record");
                }
                if too_many(rows.len()) {
                    return shape_error("create takes exactly one record");
                }
                rows.iter().try_for_each(|data| check_create_data(relation, data))
            }
            Self::Connect(filters) => {
                if filters.is_empty() || filters.iter().any(Filter::is_none) {
                    return shape_error("connect needs a filter per record");
                }
                if too_many(filters.len()) {
                    return shape_error("connect takes exactly one filter");
                }
                Ok(())
            }
            Self::ConnectOrCreate(pairs) => {
                if pairs.is_empty() || pairs.iter().any(|(f, _)| f.is_none()) {
                    return shape_error("connect_or_create needs a filter per record");
                }
                if too_many(pairs.len()) {
                    return shape_error("connect_or_create takes exactly one record");
                }
                pairs.iter().try_for_each(|(_, data)| check_create_data(relation, data))
            }
            Self::Update(pairs) => pairs.iter().try_for_each(|(_, data)| check_flat(relation, data)),
            Self::Disconnect(_) | Self::Set(_) | Self::Delete(_) => Ok(()),
        }
    }
}

fn check_flat(relation: &Relation, data: &Data) -> QueryResult<()> {
    if data.has_relation_values() {
        return Err(QueryError::nesting_too_deep(&relation.name));
    }
    Ok(())
}

fn check_create_data(relation: &Relation, data: &Data) -> QueryResult<()> {
    check_flat(relation, data)?;
    match data
        .iter()
        .find(|(_, v)| matches!(v, WriteValue::Increment(_) | WriteValue::Decrement(_)))
    {
        Some((key, _)) => Err(QueryError::invalid_data("increment and decrement are only valid in updates")
            .with_field(key)),
        None => Ok(()),
    }
}

/// A nested write bound to the parent row(s) it belongs to.
#[derive(Debug, Clone)]
pub(crate) struct NestedItem {
    pub relation: Arc<Relation>,
    /// Parent row index for inserts; `None` applies to every parent row.
    pub row: Option<usize>,
    pub write: NestedWrite,
}

impl NestedItem {
    pub(crate) fn new(relation: Arc<Relation>, row: Option<usize>, write: NestedWrite) -> Self {
        Self { relation, row, write }
    }
}

/// Nested writes of one statement, split by when they run.
#[derive(Debug, Clone, Default)]
pub(crate) struct NestedPlan {
    /// Run before the parent statement; produce foreign keys for it.
    pub prepend: Vec<NestedItem>,
    /// Run after the parent statement, keyed by the parent rows.
    pub append: Vec<NestedItem>,
}

impl NestedPlan {
    pub(crate) fn extend(&mut self, items: impl IntoIterator<Item = NestedItem>) {
        for item in items {
            if item.relation.is_prepend() {
                self.prepend.push(item);
            } else {
                self.append.push(item);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.prepend.is_empty() && self.append.is_empty()
    }
}

fn expect_value(output: QueryOutput, table: &str) -> QueryResult<Value> {
    output.into_value().ok_or_else(|| QueryError::not_found(table))
}

/// Resolve prepended belongs-to writes and substitute the produced keys
/// into the parent statement. Creates on the same relation are batched
/// into one insert.
pub(crate) async fn run_prepend(query: &Query, tx: &TransactionContext) -> QueryResult<Query> {
    let items = query.state().nested.prepend.clone();
    if items.is_empty() {
        return Ok(query.clone());
    }
    let db = query.db();

    // Group creates by relation; everything else resolves on its own.
    let mut creates: Vec<(Arc<Relation>, Vec<usize>)> = Vec::new();
    let mut singles: Vec<usize> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if matches!(item.write, NestedWrite::Create(_)) {
            match creates.iter_mut().find(|(r, _)| r.name == item.relation.name) {
                Some((_, indices)) => indices.push(index),
                None => creates.push((item.relation.clone(), vec![index])),
            }
        } else {
            singles.push(index);
        }
    }

    let mut jobs: Vec<BoxFuture<'_, QueryResult<Vec<(usize, Value)>>>> = Vec::new();
    for (relation, indices) in creates {
        let items = &items;
        jobs.push(Box::pin(async move {
            let target = db.table(&relation.target)?;
            let rows = indices.iter().flat_map(|&i| match &items[i].write {
                NestedWrite::Create(rows) => rows.clone(),
                _ => Vec::new(),
            });
            let keys = target
                .insert_many(rows)?
                .pluck(relation.target_key())
                .exec_in(tx)
                .await?
                .into_pluck();
            if keys.len() != indices.len() {
                return Err(QueryError::internal(format!(
                    "nested create on '{}' returned {} keys for {} records",
                    relation.name,
                    keys.len(),
                    indices.len()
                )));
            }
            Ok(indices.into_iter().zip(keys).collect())
        }));
    }
    for index in singles {
        let item = &items[index];
        jobs.push(Box::pin(async move {
            let value = resolve_belongs_to(db, item, tx).await?;
            Ok(vec![(index, value)])
        }));
    }

    let resolved = try_join_all(jobs).await?;

    let mut query = query.clone();
    let state = query.state_mut();
    for (index, value) in resolved.into_iter().flatten() {
        let item = &items[index];
        let foreign_key = item.relation.source_key();
        match (state.kind, item.row) {
            (QueryKind::Insert, Some(row)) => {
                let column = state
                    .insert
                    .columns
                    .iter()
                    .position(|c| c == foreign_key)
                    .ok_or_else(|| QueryError::internal(format!("missing foreign key column {}", foreign_key)))?;
                if let Some(slot) = state.insert.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
                    *slot = WriteValue::Value(value);
                }
            }
            _ => match state.update.iter_mut().find(|(c, _)| c == foreign_key) {
                Some(entry) => entry.1 = WriteValue::Value(value),
                None => state.update.push((foreign_key.to_string(), WriteValue::Value(value))),
            },
        }
    }
    state.nested.prepend.clear();
    debug!(table = %state.table.name(), resolved = items.len(), "Resolved prepended relation writes");
    Ok(query)
}

async fn resolve_belongs_to(db: &Db, item: &NestedItem, tx: &TransactionContext) -> QueryResult<Value> {
    let relation = &item.relation;
    let target = db.table(&relation.target)?;
    let key = relation.target_key();
    match &item.write {
        NestedWrite::Connect(filters) => {
            let output = target.r#where(Filter::or(filters.clone())).get(key).exec_in(tx).await?;
            expect_value(output, &relation.target)
        }
        NestedWrite::ConnectOrCreate(pairs) => {
            let (filter, data) = pairs
                .first()
                .ok_or_else(|| QueryError::invalid_data("connect_or_create needs a record"))?;
            let found = target.r#where(filter.clone()).get_optional(key).exec_in(tx).await?;
            match found.into_value() {
                Some(value) => Ok(value),
                None => {
                    let output = target.insert(data.clone())?.get(key).exec_in(tx).await?;
                    expect_value(output, &relation.target)
                }
            }
        }
        other => Err(QueryError::unsupported_nested(&relation.name, other.name())),
    }
}

/// Run appended writes for the parent rows the statement returned.
pub(crate) async fn run_append(query: &Query, rows: &[Row], tx: &TransactionContext) -> QueryResult<()> {
    let state = query.state();
    if state.nested.append.is_empty() {
        return Ok(());
    }
    let db = query.db();
    let kind = state.kind;

    let jobs = state.nested.append.iter().map(|item| {
        let parents: Vec<&Row> = match item.row {
            Some(index) => rows.get(index).into_iter().collect(),
            None => rows.iter().collect(),
        };
        let keys: Vec<Value> = parents
            .into_iter()
            .filter_map(|row| row.get(item.relation.source_key()).cloned())
            .filter(|key| !key.is_null())
            .collect();
        async move {
            if keys.is_empty() {
                return Ok(());
            }
            match &item.relation.kind {
                RelationKind::HasOne { foreign_key, .. } => {
                    write_has(db, &item.relation, foreign_key, &keys, &item.write, kind, true, tx).await
                }
                RelationKind::HasMany { foreign_key, .. } => {
                    write_has(db, &item.relation, foreign_key, &keys, &item.write, kind, false, tx).await
                }
                RelationKind::HasAndBelongsToMany(join) => {
                    write_many_to_many(db, &item.relation, join, &keys, &item.write, tx).await
                }
                RelationKind::BelongsTo { .. } => Err(QueryError::internal("belongs-to writes are prepended")),
            }
        }
    });
    try_join_all(jobs).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
/// A connect filter matched no record of the relation's target.
fn missing_target(relation: &Relation) -> QueryError {
    QueryError::not_found(&relation.target).with_context(format!("connecting '{}'", relation.name))
}

async fn write_has(
    db: &Db,
    relation: &Relation,
    foreign_key: &str,
    keys: &[Value],
    write: &NestedWrite,
    kind: QueryKind,
    one: bool,
    tx: &TransactionContext,
) -> QueryResult<()> {
    let target = db.table(&relation.target)?;
    let owned = || target.where_in(foreign_key, keys.to_vec());
    let unlink = || async {
        owned()
            .update(Data::new().set(foreign_key, Value::Null))?
            .exec_in(tx)
            .await
    };
    let link = |filter: Filter, key: Value| {
        let target = target.clone();
        async move {
            target
                .r#where(filter)
                .update(Data::new().set(foreign_key, key))?
                .exec_in(tx)
                .await
        }
    };

    match write {
        NestedWrite::Create(rows) => {
            if one && kind == QueryKind::Update {
                unlink().await?;
            }
            let rows = keys
                .iter()
                .flat_map(|key| rows.iter().map(move |data| data.clone().set(foreign_key, key.clone())));
            target.insert_many(rows)?.exec_in(tx).await?;
        }
        NestedWrite::Connect(filters) => {
            if one && kind == QueryKind::Update {
                unlink().await?;
            }
            for key in keys {
                for filter in filters {
                    if link(filter.clone(), key.clone()).await?.row_count() == 0 {
                        return Err(missing_target(relation));
                    }
                }
            }
        }
        NestedWrite::ConnectOrCreate(pairs) => {
            for key in keys {
                for (filter, data) in pairs {
                    let linked = link(filter.clone(), key.clone()).await?.row_count();
                    if linked == 0 {
                        target
                            .insert(data.clone().set(foreign_key, key.clone()))?
                            .exec_in(tx)
                            .await?;
                    }
                }
            }
        }
        NestedWrite::Disconnect(filters) => {
            owned()
                .r#where(Filter::or(filters.clone()))
                .update(Data::new().set(foreign_key, Value::Null))?
                .exec_in(tx)
                .await?;
        }
        NestedWrite::Set(filters) => {
            unlink().await?;
            if !filters.is_empty() {
                for key in keys {
                    link(Filter::or(filters.clone()), key.clone()).await?;
                }
            }
        }
        NestedWrite::Delete(filters) => {
            owned().r#where(Filter::or(filters.clone())).delete()?.exec_in(tx).await?;
        }
        NestedWrite::Update(pairs) => {
            for (filter, data) in pairs {
                owned().r#where(filter.clone()).update(data.clone())?.exec_in(tx).await?;
            }
        }
    }
    Ok(())
}

async fn write_many_to_many(
    db: &Db,
    relation: &Relation,
    join: &JoinTable,
    keys: &[Value],
    write: &NestedWrite,
    tx: &TransactionContext,
) -> QueryResult<()> {
    let target = db.table(&relation.target)?;
    let links = db.unregistered_table(&join.table);
    let link_rows = |key: &Value, ids: &[Value]| -> Vec<Data> {
        ids.iter()
            .map(|id| {
                Data::new()
                    .set(join.foreign_key.as_str(), key.clone())
                    .set(join.association_foreign_key.as_str(), id.clone())
            })
            .collect()
    };
    let matching_ids = |filters: &[Filter]| {
        target
            .r#where(Filter::or(filters.to_vec()))
            .pluck(&join.association_primary_key)
    };

    match write {
        NestedWrite::Create(rows) => {
            for key in keys {
                let ids = target
                    .insert_many(rows.clone())?
                    .pluck(&join.association_primary_key)
                    .exec_in(tx)
                    .await?
                    .into_pluck();
                links.insert_many(link_rows(key, &ids))?.exec_in(tx).await?;
            }
        }
        NestedWrite::Connect(filters) => {
            let mut ids: Vec<Value> = Vec::new();
            for filter in filters {
                let found = matching_ids(std::slice::from_ref(filter)).exec_in(tx).await?.into_pluck();
                if found.is_empty() {
                    return Err(missing_target(relation));
                }
                for id in found {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            let rows = keys.iter().flat_map(|key| link_rows(key, &ids));
            links.insert_many(rows)?.exec_in(tx).await?;
        }
        NestedWrite::ConnectOrCreate(pairs) => {
            let mut ids = Vec::with_capacity(pairs.len());
            for (filter, data) in pairs {
                let found = target
                    .r#where(filter.clone())
                    .get_optional(&join.association_primary_key)
                    .exec_in(tx)
                    .await?
                    .into_value();
                let id = match found {
                    Some(id) => id,
                    None => expect_value(
                        target
                            .insert(data.clone())?
                            .get(&join.association_primary_key)
                            .exec_in(tx)
                            .await?,
                        &relation.target,
                    )?,
                };
                ids.push(id);
            }
            let rows = keys.iter().flat_map(|key| link_rows(key, &ids));
            links.insert_many(rows)?.exec_in(tx).await?;
        }
        NestedWrite::Disconnect(filters) => {
            let mut unlink = links.where_in(&join.foreign_key, keys.to_vec());
            if !filters.is_empty() {
                let ids = target
                    .r#where(Filter::or(filters.clone()))
                    .select([join.association_primary_key.as_str()]);
                unlink = unlink.where_in_query(&join.association_foreign_key, ids);
            }
            unlink.delete()?.exec_in(tx).await?;
        }
        NestedWrite::Set(filters) => {
            links.where_in(&join.foreign_key, keys.to_vec()).delete()?.exec_in(tx).await?;
            if !filters.is_empty() {
                let ids = matching_ids(filters).exec_in(tx).await?.into_pluck();
                let rows = keys.iter().flat_map(|key| link_rows(key, &ids));
                links.insert_many(rows)?.exec_in(tx).await?;
            }
        }
        NestedWrite::Delete(_) | NestedWrite::Update(_) => {
            return Err(QueryError::unsupported_nested(&relation.name, write.name()));
        }
    }
    Ok(())
}
