//! Filter types for building WHERE, HAVING and join conditions.
//!
//! ```rust
//! use quill_query::Filter;
//!
//! let adults = Filter::gte("age", 18).and_then(Filter::is_not_null("email"));
//! assert!(!adults.is_none());
//!
//! // A tuple is shorthand for equality.
//! let by_name: Filter = ("name", "Ann").into();
//! assert_eq!(by_name, Filter::eq("name", "Ann"));
//! ```

use crate::query::Query;
use crate::raw::RawSql;
use crate::value::Value;

/// Column-to-column comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl CompareOp {
    /// SQL operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// A condition tree.
#[derive(Debug, Clone, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison; equality with NULL compiles to `IS NULL`.
    Equals(String, Value),
    /// Not equals comparison; inequality with NULL compiles to `IS NOT NULL`.
    NotEquals(String, Value),

    /// Less than comparison.
    Lt(String, Value),
    /// Less than or equal comparison.
    Lte(String, Value),
    /// Greater than comparison.
    Gt(String, Value),
    /// Greater than or equal comparison.
    Gte(String, Value),

    /// In a list of values.
    In(String, Vec<Value>),
    /// Not in a list of values.
    NotIn(String, Vec<Value>),

    /// Contains (LIKE %value%).
    Contains(String, String),
    /// Starts with (LIKE value%).
    StartsWith(String, String),
    /// Ends with (LIKE %value).
    EndsWith(String, String),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Compare two columns.
    Columns(String, CompareOp, String),
    /// Raw SQL condition.
    Raw(RawSql),
    /// `EXISTS (subquery)`; the sub-query may reference outer columns.
    Exists(Box<Query>),
    /// `column IN (subquery)`.
    InQuery(String, Box<Query>),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl PartialEq for Filter {
    // Sub-queries compare by descriptor identity.
    fn eq(&self, other: &Self) -> bool {
        use Filter::*;
        match (self, other) {
            (None, None) => true,
            (Equals(a, x), Equals(b, y))
            | (NotEquals(a, x), NotEquals(b, y))
            | (Lt(a, x), Lt(b, y))
            | (Lte(a, x), Lte(b, y))
            | (Gt(a, x), Gt(b, y))
            | (Gte(a, x), Gte(b, y)) => a == b && x == y,
            (In(a, x), In(b, y)) | (NotIn(a, x), NotIn(b, y)) => a == b && x == y,
            (Contains(a, x), Contains(b, y))
            | (StartsWith(a, x), StartsWith(b, y))
            | (EndsWith(a, x), EndsWith(b, y)) => a == b && x == y,
            (IsNull(a), IsNull(b)) | (IsNotNull(a), IsNotNull(b)) => a == b,
            (Columns(a, op, c), Columns(b, op2, d)) => a == b && op == op2 && c == d,
            (Raw(a), Raw(b)) => a == b,
            (Exists(a), Exists(b)) => a.ptr_eq(b),
            (InQuery(a, x), InQuery(b, y)) => a == b && x.ptr_eq(y),
            (And(a), And(b)) | (Or(a), Or(b)) => a == b,
            (Not(a), Not(b)) => a == b,
            _ => false,
        }
    }
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn none() -> Self {
        Self::None
    }

    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals(column.into(), value.into())
    }

    /// `column <> value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals(column.into(), value.into())
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(column.into(), value.into())
    }

    /// `column <= value`
    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte(column.into(), value.into())
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(column.into(), value.into())
    }

    /// `column >= value`
    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(column.into(), value.into())
    }

    /// `column IN (values)`
    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    /// `column NOT IN (values)`
    pub fn not_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::NotIn(column.into(), values.into_iter().map(Into::into).collect())
    }

    /// `column LIKE %value%`
    pub fn contains(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Contains(column.into(), value.into())
    }

    /// `column LIKE value%`
    pub fn starts_with(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::StartsWith(column.into(), value.into())
    }

    /// `column LIKE %value`
    pub fn ends_with(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::EndsWith(column.into(), value.into())
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::IsNotNull(column.into())
    }

    /// Compare two columns.
    pub fn columns(left: impl Into<String>, op: CompareOp, right: impl Into<String>) -> Self {
        Self::Columns(left.into(), op, right.into())
    }

    /// Raw SQL condition.
    pub fn raw(sql: impl Into<RawSql>) -> Self {
        Self::Raw(sql.into())
    }

    /// `EXISTS (query)`
    pub fn exists(query: Query) -> Self {
        Self::Exists(Box::new(query))
    }

    /// `column IN (query)`
    pub fn in_query(column: impl Into<String>, query: Query) -> Self {
        Self::InQuery(column.into(), Box::new(query))
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.pop().unwrap_or_default(),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.pop().unwrap_or_default(),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Combine with another filter using OR.
    pub fn or_else(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            _ => Self::Or(vec![self, other]),
        }
    }

    /// Top-level `column = value` pairs, used to seed inserts from conditions.
    pub(crate) fn equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            Self::Equals(col, value) => vec![(col.as_str(), value)],
            Self::And(filters) => filters.iter().flat_map(Filter::equalities).collect(),
            _ => Vec::new(),
        }
    }
}

impl<V: Into<Value>> From<(&str, V)> for Filter {
    fn from((column, value): (&str, V)) -> Self {
        Self::eq(column, value)
    }
}

impl From<RawSql> for Filter {
    fn from(sql: RawSql) -> Self {
        Self::Raw(sql)
    }
}
