//! Write statements: insert, update, delete, truncate and their payloads.
//!
//! Payloads are ordered maps of column to [`WriteValue`]. A key naming a
//! relation instead of a column carries a [`NestedWrite`]; the payload is
//! split at construction time into column values and nested operations, so
//! every shape error surfaces before anything is sent.

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::nested::{NestedItem, NestedWrite};
use crate::raw::RawSql;
use crate::relations::RelationKind;
use crate::types::QueryKind;
use crate::value::{Row, Value};

use super::Query;

/// A value to write into one column.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    /// A bound value.
    Value(Value),
    /// A raw SQL expression.
    Raw(RawSql),
    /// `DEFAULT`.
    Default,
    /// `column + value`; update only.
    Increment(Value),
    /// `column - value`; update only.
    Decrement(Value),
    /// A nested write on the relation named by the key.
    Relation(NestedWrite),
}

impl WriteValue {
    /// `column + by`.
    pub fn increment(by: impl Into<Value>) -> Self {
        Self::Increment(by.into())
    }

    /// `column - by`.
    pub fn decrement(by: impl Into<Value>) -> Self {
        Self::Decrement(by.into())
    }

    /// Number of parameters this value binds.
    pub(crate) fn param_estimate(&self) -> usize {
        match self {
            Self::Value(_) | Self::Increment(_) | Self::Decrement(_) => 1,
            Self::Raw(raw) => raw.param_estimate(),
            Self::Default | Self::Relation(_) => 0,
        }
    }
}

macro_rules! impl_write_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for WriteValue {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

impl_write_value_from!(Value, bool, i32, i64, u32, usize, f64, String, &str, serde_json::Value, Row);

impl<T: Into<Value>> From<Option<T>> for WriteValue {
    fn from(value: Option<T>) -> Self {
        Self::Value(value.map(Into::into).unwrap_or(Value::Null))
    }
}

impl From<RawSql> for WriteValue {
    fn from(raw: RawSql) -> Self {
        Self::Raw(raw)
    }
}

impl From<NestedWrite> for WriteValue {
    fn from(write: NestedWrite) -> Self {
        Self::Relation(write)
    }
}

/// An ordered write payload.
///
/// ```rust
/// use quill_query::{Data, WriteValue};
///
/// let data = Data::new()
///     .set("name", "Ann")
///     .set("visits", WriteValue::increment(1))
///     .set("email", None::<String>);
/// assert_eq!(data.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    entries: IndexMap<String, WriteValue>,
}

impl Data {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing an existing entry in place.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<WriteValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<WriteValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Value of a key.
    pub fn get(&self, key: &str) -> Option<&WriteValue> {
        self.entries.get(key)
    }

    /// Check if a key is set.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no key is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WriteValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check if any value is a nested relation write.
    pub(crate) fn has_relation_values(&self) -> bool {
        self.entries.values().any(|v| matches!(v, WriteValue::Relation(_)))
    }
}

impl<K: Into<String>, V: Into<WriteValue>> FromIterator<(K, V)> for Data {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for Data {
    type Item = (String, WriteValue);
    type IntoIter = indexmap::map::IntoIter<String, WriteValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl From<Row> for Data {
    fn from(row: Row) -> Self {
        row.into_iter().collect()
    }
}

/// What to do when an insert hits a unique conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    /// `DO NOTHING`.
    Ignore,
    /// `DO UPDATE SET col = excluded.col` for the listed columns, or for
    /// every inserted column outside the conflict target when empty.
    Merge(Vec<String>),
    /// `DO UPDATE SET` explicit values.
    Set(Vec<(String, WriteValue)>),
}

/// `ON CONFLICT` clause of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Conflict target columns; empty means any constraint.
    pub target: Vec<String>,
    /// Action.
    pub action: ConflictAction,
}

/// Builder returned by [`Query::on_conflict`].
#[derive(Debug, Clone)]
pub struct OnConflictBuilder {
    query: Query,
    target: Vec<String>,
}

impl OnConflictBuilder {
    fn finish(self, action: ConflictAction) -> Query {
        let clause = OnConflict {
            target: self.target,
            action,
        };
        self.query.with(|s| s.on_conflict = Some(clause))
    }

    /// `DO NOTHING`.
    pub fn ignore(self) -> Query {
        self.finish(ConflictAction::Ignore)
    }

    /// Overwrite every inserted column except the conflict target.
    pub fn merge(self) -> Query {
        self.finish(ConflictAction::Merge(Vec::new()))
    }

    /// Overwrite the listed columns with the inserted values.
    pub fn merge_columns(self, columns: impl IntoIterator<Item = impl Into<String>>) -> Query {
        self.finish(ConflictAction::Merge(columns.into_iter().map(Into::into).collect()))
    }

    /// Set explicit values.
    pub fn set(self, data: Data) -> QueryResult<Query> {
        let table = self.query.table();
        let mut values = Vec::with_capacity(data.len());
        for (column, value) in data {
            if matches!(value, WriteValue::Relation(_)) {
                return Err(QueryError::invalid_data("on_conflict set cannot carry relation writes")
                    .with_field(column));
            }
            if !table.has_column(&column) {
                return Err(unknown_column(table.name(), &column));
            }
            values.push((column, value));
        }
        Ok(self.finish(ConflictAction::Set(values)))
    }
}

/// Options of `TRUNCATE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncateOptions {
    /// `RESTART IDENTITY`.
    pub restart_identity: bool,
    /// `CASCADE`.
    pub cascade: bool,
}

fn unknown_column(table: &str, column: &str) -> QueryError {
    QueryError::invalid_column(format!("{}.{}", table, column), "no such column").with_table(table)
}

impl Query {
    /// Insert one row.
    pub fn insert(&self, data: Data) -> QueryResult<Query> {
        self.insert_many([data])
    }

    /// Insert several rows. The column list is the union of every row's
    /// keys; keys missing from a row are written as `DEFAULT`. Inserting no
    /// rows resolves to an empty result without a statement.
    pub fn insert_many(&self, rows: impl IntoIterator<Item = Data>) -> QueryResult<Query> {
        self.try_with(|query| {
            query.set_kind(QueryKind::Insert)?;
            let rows: Vec<Data> = rows.into_iter().collect();
            if rows.is_empty() {
                query.state_mut().none = true;
                return Ok(());
            }

            let table = query.state().table.clone();
            let mut columns: Vec<String> = Vec::new();
            let mut values: Vec<IndexMap<String, WriteValue>> = Vec::with_capacity(rows.len());
            let mut nested: Vec<NestedItem> = Vec::new();

            for (index, data) in rows.into_iter().enumerate() {
                let mut row = IndexMap::new();
                for (key, value) in data {
                    if let Some(relation) = table.relation(&key) {
                        let write = relation_write(&key, value)?;
                        write.validate(relation, QueryKind::Insert)?;
                        if let RelationKind::BelongsTo { foreign_key, .. } = &relation.kind {
                            row.insert(foreign_key.clone(), WriteValue::Default);
                        }
                        nested.push(NestedItem::new(relation.clone(), Some(index), write));
                        continue;
                    }
                    column_write(&table, &key, &value, QueryKind::Insert)?;
                    row.insert(key, value);
                }
                for key in row.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
                values.push(row);
            }

            let state = query.state_mut();
            state.insert.rows = values
                .into_iter()
                .map(|mut row| {
                    columns
                        .iter()
                        .map(|c| row.shift_remove(c).unwrap_or(WriteValue::Default))
                        .collect()
                })
                .collect();
            state.insert.columns = columns;
            state.nested.extend(nested);
            if !state.nested.is_empty() {
                state.wrap_in_transaction = true;
            }
            Ok(())
        })
    }

    /// Update the matched rows. Fails with `UnconditionalWrite` unless the
    /// query has conditions or [`all_rows`](Self::all_rows) was called.
    pub fn update(&self, data: Data) -> QueryResult<Query> {
        self.try_with(|query| {
            query.set_kind(QueryKind::Update)?;
            query.check_conditional("update")?;

            let table = query.state().table.clone();
            let mut set: Vec<(String, WriteValue)> = Vec::new();
            let mut nested: Vec<NestedItem> = Vec::new();
            for (key, value) in data {
                if let Some(relation) = table.relation(&key) {
                    let write = relation_write(&key, value)?;
                    write.validate(relation, QueryKind::Update)?;
                    match (&relation.kind, &write) {
                        (RelationKind::BelongsTo { foreign_key, .. }, NestedWrite::Disconnect(_)) => {
                            set.push((foreign_key.clone(), WriteValue::Value(Value::Null)));
                        }
                        _ => nested.push(NestedItem::new(relation.clone(), None, write)),
                    }
                    continue;
                }
                column_write(&table, &key, &value, QueryKind::Update)?;
                set.push((key, value));
            }

            let state = query.state_mut();
            for (column, value) in set {
                match state.update.iter_mut().find(|(c, _)| *c == column) {
                    Some(entry) => entry.1 = value,
                    None => state.update.push((column, value)),
                }
            }
            state.nested.extend(nested);
            if !state.nested.is_empty() {
                state.wrap_in_transaction = true;
            }
            Ok(())
        })
    }

    /// Increment a column of the matched rows.
    pub fn increment(&self, column: &str, by: impl Into<Value>) -> QueryResult<Query> {
        self.update(Data::new().set(column, WriteValue::increment(by)))
    }

    /// Decrement a column of the matched rows.
    pub fn decrement(&self, column: &str, by: impl Into<Value>) -> QueryResult<Query> {
        self.update(Data::new().set(column, WriteValue::decrement(by)))
    }

    /// Delete the matched rows. Fails with `UnconditionalWrite` unless the
    /// query has conditions or [`all_rows`](Self::all_rows) was called.
    pub fn delete(&self) -> QueryResult<Query> {
        self.try_with(|query| {
            query.set_kind(QueryKind::Delete)?;
            query.check_conditional("delete")
        })
    }

    /// Add an `ON CONFLICT` clause to an insert.
    pub fn on_conflict(&self, target: impl IntoIterator<Item = impl Into<String>>) -> OnConflictBuilder {
        OnConflictBuilder {
            query: self.clone(),
            target: target.into_iter().map(Into::into).collect(),
        }
    }

    /// `TRUNCATE` the table.
    pub fn truncate(&self) -> QueryResult<Query> {
        self.truncate_with(TruncateOptions::default())
    }

    /// `TRUNCATE` with options.
    pub fn truncate_with(&self, options: TruncateOptions) -> QueryResult<Query> {
        self.try_with(|query| {
            query.set_kind(QueryKind::Truncate)?;
            query.state_mut().truncate = options;
            Ok(())
        })
    }

    /// Read the table's column metadata from `information_schema.columns`.
    pub fn column_info(&self) -> QueryResult<Query> {
        self.try_with(|query| query.set_kind(QueryKind::ColumnInfo))
    }

    pub(crate) fn check_conditional(&self, operation: &str) -> QueryResult<()> {
        let state = self.state();
        if state.has_conditions() || state.all_rows {
            Ok(())
        } else {
            Err(QueryError::unconditional_write(operation, state.table.name()))
        }
    }
}

fn relation_write(key: &str, value: WriteValue) -> QueryResult<NestedWrite> {
    match value {
        WriteValue::Relation(write) => Ok(write),
        _ => Err(QueryError::invalid_data(format!("'{}' is a relation and takes a nested write", key))
            .with_field(key)),
    }
}

fn column_write(table: &crate::TableDef, key: &str, value: &WriteValue, kind: QueryKind) -> QueryResult<()> {
    match value {
        WriteValue::Relation(_) => return Err(QueryError::unknown_relation(table.name(), key)),
        WriteValue::Increment(_) | WriteValue::Decrement(_) if kind == QueryKind::Insert => {
            return Err(QueryError::invalid_data("increment and decrement are only valid in updates")
                .with_field(key));
        }
        _ => {}
    }
    if !table.has_column(key) {
        return Err(unknown_column(table.name(), key));
    }
    Ok(())
}
