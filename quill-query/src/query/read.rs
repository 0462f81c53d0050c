//! Return types, read helpers and result parsers.
//!
//! Return-type setters are idempotent: when the descriptor already has the
//! requested type, the same handle comes back without a copy.

use std::sync::Arc;

use crate::filter::Filter;
use crate::types::{AggregateFn, QueryKind, ReturnType, SelectItem};
use crate::value::Value;

use super::Query;

impl Query {
    /// The return type execution will shape results into.
    ///
    /// Without an explicit type, writes that select nothing resolve to the
    /// affected-row count, `TRUNCATE` to nothing, and everything else to all
    /// rows.
    pub fn return_type(&self) -> ReturnType {
        let state = self.state();
        match state.return_type {
            Some(return_type) => return_type,
            None if state.kind.is_write() && state.select.is_empty() => ReturnType::RowCount,
            None if state.kind == QueryKind::Truncate => ReturnType::Void,
            None => ReturnType::All,
        }
    }

    fn set_return_type(&self, return_type: ReturnType) -> Query {
        if self.state().return_type == Some(return_type) {
            return self.clone();
        }
        self.with(|s| s.return_type = Some(return_type))
    }

    /// Resolve to every row.
    pub fn all(&self) -> Query {
        self.set_return_type(ReturnType::All)
    }

    /// Resolve to the first row, failing with `RecordNotFound` when there is none.
    pub fn take(&self) -> Query {
        self.set_return_type(ReturnType::OneOrThrow)
    }

    /// Resolve to the first row, if any.
    pub fn take_optional(&self) -> Query {
        self.set_return_type(ReturnType::One)
    }

    /// Resolve to every row as an array of values.
    pub fn rows(&self) -> Query {
        self.set_return_type(ReturnType::Rows)
    }

    /// Resolve to the first selected column of the first row, if any.
    pub fn value(&self) -> Query {
        self.set_return_type(ReturnType::Value)
    }

    /// Resolve to the first selected column of the first row, failing with
    /// `RecordNotFound` when there is no row.
    pub fn value_or_throw(&self) -> Query {
        self.set_return_type(ReturnType::ValueOrThrow)
    }

    /// Resolve to the number of affected rows.
    pub fn row_count(&self) -> Query {
        self.set_return_type(ReturnType::RowCount)
    }

    /// Resolve to nothing.
    pub fn void(&self) -> Query {
        self.set_return_type(ReturnType::Void)
    }

    /// Value returned by `value`-typed queries that match no row.
    pub fn value_or(&self, default: impl Into<Value>) -> Query {
        let default = default.into();
        self.with(|s| s.value_default = Some(default))
    }

    /// One column of every row.
    pub fn pluck(&self, column: &str) -> Query {
        self.reselect(vec![SelectItem::from(column)]).set_return_type(ReturnType::Pluck)
    }

    /// One column of the first row, failing with `RecordNotFound` when there is none.
    pub fn get(&self, column: &str) -> Query {
        self.reselect(vec![SelectItem::from(column)])
            .set_return_type(ReturnType::ValueOrThrow)
    }

    /// One column of the first row, if any.
    pub fn get_optional(&self, column: &str) -> Query {
        self.reselect(vec![SelectItem::from(column)]).set_return_type(ReturnType::Value)
    }

    /// The row with primary key `id`, failing with `RecordNotFound` when it is missing.
    pub fn find(&self, id: impl Into<Value>) -> Query {
        self.r#where(Filter::eq(self.table().primary_key_column().to_string(), id))
            .take()
    }

    /// The row with primary key `id`, if any.
    pub fn find_optional(&self, id: impl Into<Value>) -> Query {
        self.r#where(Filter::eq(self.table().primary_key_column().to_string(), id))
            .take_optional()
    }

    /// The row with a composite primary key, one value per key column.
    pub fn find_composite(&self, ids: Vec<Value>) -> crate::QueryResult<Query> {
        Ok(self.r#where(self.primary_key_filter(ids)?).take())
    }

    /// The first row matching `filter`, failing with `RecordNotFound` when there is none.
    pub fn find_by(&self, filter: impl Into<Filter>) -> Query {
        self.r#where(filter).take()
    }

    /// The first row matching `filter`, if any.
    pub fn find_by_optional(&self, filter: impl Into<Filter>) -> Query {
        self.r#where(filter).take_optional()
    }

    /// Whether any row matches.
    pub fn exists(&self) -> Query {
        self.reselect(vec![SelectItem::Raw {
            sql: "true".into(),
            alias: Some("exists".to_string()),
        }])
        .with(|s| {
            s.order.clear();
            s.value_default = Some(Value::Bool(false));
            s.parsers.set_value(Arc::new(|_| Value::Bool(true)));
        })
        .set_return_type(ReturnType::Value)
    }

    fn aggregate(&self, func: AggregateFn, column: Option<&str>, distinct: bool) -> Query {
        self.reselect(vec![SelectItem::Aggregate {
            func,
            column: column.map(str::to_string),
            distinct,
            alias: None,
            over: None,
        }])
        .with(|s| s.order.clear())
        .set_return_type(ReturnType::Value)
    }

    /// `count(*)` of matching rows; 0 when nothing matches.
    pub fn count(&self) -> Query {
        self.aggregate(AggregateFn::Count, None, false)
            .value_or(0)
            .parse_value(|v| match v.as_i64() {
                Some(n) => Value::Int(n),
                None => v,
            })
    }

    /// `count(DISTINCT column)` of matching rows.
    pub fn count_distinct(&self, column: &str) -> Query {
        self.aggregate(AggregateFn::Count, Some(column), true).value_or(0)
    }

    /// `sum(column)`.
    pub fn sum(&self, column: &str) -> Query {
        self.aggregate(AggregateFn::Sum, Some(column), false)
    }

    /// `avg(column)`.
    pub fn avg(&self, column: &str) -> Query {
        self.aggregate(AggregateFn::Avg, Some(column), false)
    }

    /// `min(column)`.
    pub fn min(&self, column: &str) -> Query {
        self.aggregate(AggregateFn::Min, Some(column), false)
    }

    /// `max(column)`.
    pub fn max(&self, column: &str) -> Query {
        self.aggregate(AggregateFn::Max, Some(column), false)
    }

    /// Parse values of a result column.
    pub fn parse<F>(&self, column: impl Into<String>, f: F) -> Query
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let column = column.into();
        self.with(|s| s.parsers.set_column(column, Arc::new(f)))
    }

    /// Parse the single value extracted by `value`, `get` and `pluck`-style
    /// queries. Takes precedence over the column parser of that column.
    pub fn parse_value<F>(&self, f: F) -> Query
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.with(|s| s.parsers.set_value(Arc::new(f)))
    }
}
