//! Select list, sources and the clauses that shape a read.

use crate::filter::Filter;
use crate::raw::RawSql;
use crate::types::{AggregateFn, OrderItem, SelectItem, SortOrder, UnionKind, WindowDef};

use super::Query;

/// Body of a common table expression.
#[derive(Debug, Clone)]
pub enum CteBody {
    /// A query.
    Query(Box<Query>),
    /// Raw SQL.
    Raw(RawSql),
}

/// A named `WITH` entry.
#[derive(Debug, Clone)]
pub struct Cte {
    /// Name the rest of the statement refers to.
    pub name: String,
    /// Defining statement.
    pub body: CteBody,
}

/// Where rows are read from when it is not the table itself.
#[derive(Debug, Clone)]
pub enum FromSource {
    /// A CTE declared with [`Query::with_cte`].
    Cte(String),
    /// An aliased sub-query.
    Query {
        /// The sub-query.
        query: Box<Query>,
        /// Alias.
        alias: String,
    },
}

impl FromSource {
    /// Name columns of this source are qualified with.
    pub fn name(&self) -> &str {
        match self {
            Self::Cte(name) => name,
            Self::Query { alias, .. } => alias,
        }
    }
}

impl Query {
    /// Add items to the select list. On writes, the list becomes `RETURNING`.
    pub fn select<I, S>(&self, items: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        let mut query = self.clone();
        query.select_mut(items);
        query
    }

    /// In-place variant of [`select`](Self::select).
    pub fn select_mut<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.state_mut().select.extend(items.into_iter().map(Into::into));
    }

    /// Select a column under another name.
    pub fn select_as(&self, column: impl Into<String>, alias: impl Into<String>) -> Query {
        self.select([SelectItem::Aliased {
            column: column.into(),
            alias: alias.into(),
        }])
    }

    /// Select a raw expression under a name.
    pub fn select_raw(&self, sql: impl Into<RawSql>, alias: impl Into<String>) -> Query {
        self.select([SelectItem::Raw {
            sql: sql.into(),
            alias: Some(alias.into()),
        }])
    }

    /// Select a scalar sub-query under a name. The sub-query may reference
    /// this query's columns.
    pub fn select_subquery(&self, query: Query, alias: impl Into<String>) -> Query {
        self.select([SelectItem::SubQuery {
            query: Box::new(query),
            alias: alias.into(),
        }])
    }

    /// Select an aggregate.
    pub fn select_aggregate(&self, func: AggregateFn, column: Option<&str>, alias: Option<&str>) -> Query {
        self.select([SelectItem::Aggregate {
            func,
            column: column.map(str::to_string),
            distinct: false,
            alias: alias.map(str::to_string),
            over: None,
        }])
    }

    /// Select an aggregate over a named window.
    pub fn select_window(
        &self,
        func: AggregateFn,
        column: Option<&str>,
        window: impl Into<String>,
        alias: impl Into<String>,
    ) -> Query {
        self.select([SelectItem::Aggregate {
            func,
            column: column.map(str::to_string),
            distinct: false,
            alias: Some(alias.into()),
            over: Some(window.into()),
        }])
    }

    /// Replace the select list.
    pub(crate) fn reselect(&self, items: Vec<SelectItem>) -> Query {
        self.with(|s| s.select = items)
    }

    /// `SELECT DISTINCT`.
    pub fn distinct(&self) -> Query {
        self.with(|s| s.distinct = Some(Vec::new()))
    }

    /// `SELECT DISTINCT ON (columns)`.
    pub fn distinct_on(&self, columns: impl IntoIterator<Item = impl Into<String>>) -> Query {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.with(|s| s.distinct = Some(columns))
    }

    /// Alias the main table; columns are then qualified with the alias.
    pub fn alias(&self, alias: impl Into<String>) -> Query {
        let alias = alias.into();
        self.with(|s| s.alias = Some(alias))
    }

    /// Add a CTE defined by a query.
    pub fn with_cte(&self, name: impl Into<String>, query: Query) -> Query {
        let cte = Cte {
            name: name.into(),
            body: CteBody::Query(Box::new(query)),
        };
        self.with(|s| s.with.push(cte))
    }

    /// Add a CTE defined by raw SQL.
    pub fn with_raw_cte(&self, name: impl Into<String>, sql: impl Into<RawSql>) -> Query {
        let cte = Cte {
            name: name.into(),
            body: CteBody::Raw(sql.into()),
        };
        self.with(|s| s.with.push(cte))
    }

    /// Read from a CTE instead of the table.
    pub fn from_cte(&self, name: impl Into<String>) -> Query {
        let name = name.into();
        self.with(|s| s.from = Some(FromSource::Cte(name)))
    }

    /// Read from an aliased sub-query instead of the table.
    pub fn from_query(&self, query: Query, alias: impl Into<String>) -> Query {
        let source = FromSource::Query {
            query: Box::new(query),
            alias: alias.into(),
        };
        self.with(|s| s.from = Some(source))
    }

    /// Add `GROUP BY` columns.
    pub fn group_by(&self, columns: impl IntoIterator<Item = impl Into<String>>) -> Query {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.with(|s| s.group.extend(columns))
    }

    /// Add a `HAVING` condition; several are AND-combined.
    pub fn having(&self, filter: impl Into<Filter>) -> Query {
        let filter = filter.into();
        if filter.is_none() {
            return self.clone();
        }
        self.with(|s| s.having.push(filter))
    }

    /// Declare a named window.
    pub fn window(&self, window: WindowDef) -> Query {
        self.with(|s| s.windows.push(window))
    }

    /// Add an `ORDER BY` item.
    pub fn order_by(&self, item: impl Into<OrderItem>) -> Query {
        let mut query = self.clone();
        query.order_by_mut(item);
        query
    }

    /// In-place variant of [`order_by`](Self::order_by).
    pub fn order_by_mut(&mut self, item: impl Into<OrderItem>) {
        self.state_mut().order.push(item.into());
    }

    /// Descending `ORDER BY` on a column.
    pub fn order_by_desc(&self, column: &str) -> Query {
        self.order_by((column, SortOrder::Desc))
    }

    /// Set `LIMIT`.
    pub fn limit(&self, limit: u64) -> Query {
        self.with(|s| s.limit = Some(limit))
    }

    /// Set `OFFSET`.
    pub fn offset(&self, offset: u64) -> Query {
        self.with(|s| s.offset = Some(offset))
    }

    /// Combine with another select using a set operation. This query's
    /// `ORDER BY`, `LIMIT` and `OFFSET` apply to the combined result.
    pub fn union_with(&self, kind: UnionKind, other: Query) -> Query {
        self.with(|s| s.unions.push((kind, other)))
    }

    /// `UNION`.
    pub fn union(&self, other: Query) -> Query {
        self.union_with(UnionKind::Union, other)
    }

    /// `UNION ALL`.
    pub fn union_all(&self, other: Query) -> Query {
        self.union_with(UnionKind::UnionAll, other)
    }
}
