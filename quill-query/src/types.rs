//! Common types used in query building.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::query::Query;
use crate::raw::RawSql;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Null handling in sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsOrder {
    /// Nulls appear first in the results.
    First,
    /// Nulls appear last in the results.
    Last,
}

impl NullsOrder {
    /// Get the SQL clause for this null order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// What an ORDER BY item sorts on.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    /// A column reference or a select alias.
    Column(String),
    /// A raw SQL expression.
    Raw(RawSql),
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    /// Sort expression.
    pub target: OrderTarget,
    /// Direction.
    pub order: SortOrder,
    /// Null placement.
    pub nulls: Option<NullsOrder>,
}

impl OrderItem {
    /// Ascending order on a column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            target: OrderTarget::Column(column.into()),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    /// Descending order on a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            target: OrderTarget::Column(column.into()),
            order: SortOrder::Desc,
            nulls: None,
        }
    }

    /// Order on a raw expression.
    pub fn raw(sql: impl Into<RawSql>) -> Self {
        Self {
            target: OrderTarget::Raw(sql.into()),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    /// Set null placement.
    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

impl From<&str> for OrderItem {
    fn from(column: &str) -> Self {
        Self::asc(column)
    }
}

impl From<(&str, SortOrder)> for OrderItem {
    fn from((column, order): (&str, SortOrder)) -> Self {
        Self {
            target: OrderTarget::Column(column.to_string()),
            order,
            nulls: None,
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    /// COUNT
    Count,
    /// SUM
    Sum,
    /// AVG
    Avg,
    /// MIN
    Min,
    /// MAX
    Max,
}

impl AggregateFn {
    /// SQL function name.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// One item of the select list (or RETURNING list for writes).
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// A column reference: `name`, `alias.name`, `*` or `alias.*`.
    Column(String),
    /// A column reference under another name.
    Aliased {
        /// Column reference.
        column: String,
        /// Output name.
        alias: String,
    },
    /// A raw SQL expression.
    Raw {
        /// Expression.
        sql: RawSql,
        /// Output name.
        alias: Option<String>,
    },
    /// An aggregate call, optionally over a named window.
    Aggregate {
        /// Function.
        func: AggregateFn,
        /// Argument; `None` means `*`.
        column: Option<String>,
        /// Aggregate over distinct values.
        distinct: bool,
        /// Output name.
        alias: Option<String>,
        /// Named window for `OVER`.
        over: Option<String>,
    },
    /// A scalar or JSON sub-select.
    SubQuery {
        /// The sub-query.
        query: Box<Query>,
        /// Output name.
        alias: String,
    },
}

impl SelectItem {
    /// The key this item has in a result row, if it is predictable.
    pub fn output_key(&self) -> Option<&str> {
        match self {
            Self::Column(c) if c == "*" || c.ends_with(".*") => None,
            Self::Column(c) => Some(c.rsplit('.').next().unwrap_or(c)),
            Self::Aliased { alias, .. } | Self::SubQuery { alias, .. } => Some(alias),
            Self::Raw { alias, .. } => alias.as_deref(),
            Self::Aggregate { func, alias, .. } => Some(alias.as_deref().unwrap_or(func.as_sql())),
        }
    }

    /// Check if this item yields `column` in each row.
    pub(crate) fn covers(&self, column: &str) -> bool {
        match self {
            Self::Column(c) if c == "*" || c.ends_with(".*") => true,
            _ => self.output_key() == Some(column),
        }
    }
}

impl From<&str> for SelectItem {
    fn from(column: &str) -> Self {
        Self::Column(column.to_string())
    }
}

impl From<String> for SelectItem {
    fn from(column: String) -> Self {
        Self::Column(column)
    }
}

impl From<RawSql> for SelectItem {
    fn from(sql: RawSql) -> Self {
        Self::Raw { sql, alias: None }
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// INNER JOIN
    Inner,
    /// LEFT JOIN
    Left,
    /// RIGHT JOIN
    Right,
    /// FULL JOIN
    Full,
}

impl JoinKind {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
        }
    }
}

/// Set operations combining select statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnionKind {
    /// UNION
    Union,
    /// UNION ALL
    UnionAll,
    /// INTERSECT
    Intersect,
    /// INTERSECT ALL
    IntersectAll,
    /// EXCEPT
    Except,
    /// EXCEPT ALL
    ExceptAll,
}

impl UnionKind {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Union => "UNION",
            Self::UnionAll => "UNION ALL",
            Self::Intersect => "INTERSECT",
            Self::IntersectAll => "INTERSECT ALL",
            Self::Except => "EXCEPT",
            Self::ExceptAll => "EXCEPT ALL",
        }
    }
}

/// A named window for `WINDOW name AS (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDef {
    /// Window name.
    pub name: String,
    /// PARTITION BY columns.
    pub partition_by: Vec<String>,
    /// ORDER BY items.
    pub order: Vec<OrderItem>,
}

impl WindowDef {
    /// Create an empty window.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_by: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Add PARTITION BY columns.
    pub fn partition_by(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.partition_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add an ORDER BY item.
    pub fn order_by(mut self, item: impl Into<OrderItem>) -> Self {
        self.order.push(item.into());
        self
    }
}

/// Statement kind of a query descriptor. Set once per descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryKind {
    /// SELECT
    #[default]
    Select,
    /// INSERT
    Insert,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
    /// TRUNCATE
    Truncate,
    /// Read column metadata from `information_schema`.
    ColumnInfo,
}

impl QueryKind {
    /// Check if this kind writes rows.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    /// Lowercase name, used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Truncate => "truncate",
            Self::ColumnInfo => "column_info",
        }
    }
}

/// Shape of the value a query resolves to. Also decides SQL shape: one-row
/// types add `LIMIT 1` to selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// Every row as a record.
    All,
    /// The first row, if any.
    One,
    /// The first row, or a not-found error.
    OneOrThrow,
    /// Every row as an array of values.
    Rows,
    /// The first column of every row.
    Pluck,
    /// The first column of the first row, if any.
    Value,
    /// The first column of the first row, or a not-found error.
    ValueOrThrow,
    /// The number of affected rows.
    RowCount,
    /// Nothing.
    Void,
}

impl ReturnType {
    /// Check if at most one row is consumed.
    pub fn is_single(&self) -> bool {
        matches!(
            self,
            Self::One | Self::OneOrThrow | Self::Value | Self::ValueOrThrow
        )
    }

    /// Check if the result can be read from row arrays.
    pub(crate) fn prefers_arrays(&self) -> bool {
        matches!(
            self,
            Self::Rows | Self::Pluck | Self::Value | Self::ValueOrThrow
        )
    }
}
