//! Joins.
//!
//! ```rust,ignore
//! // Column pairs compare with `=`.
//! let q = posts.join("users", ("users.id", "posts.author_id"));
//!
//! // Anything else goes through `OnBuilder`.
//! let q = posts.left_join_on(JoinTarget::table("users").alias("u"), |on| {
//!     on.on("u.id", "posts.author_id").r#where(("u.active", true))
//! });
//!
//! // Conditions derived from a declared relation.
//! let q = posts.join_relation("author")?;
//! ```

use crate::error::{QueryError, QueryResult};
use crate::filter::{CompareOp, Filter};
use crate::relations::RelationKind;
use crate::types::JoinKind;

use super::Query;

/// What a join reads from.
#[derive(Debug, Clone)]
pub enum JoinTarget {
    /// A table or CTE, optionally aliased.
    Table {
        /// Table or CTE name.
        name: String,
        /// Alias.
        alias: Option<String>,
    },
    /// An aliased sub-query.
    Query {
        /// The sub-query.
        query: Box<Query>,
        /// Alias.
        alias: String,
    },
}

impl JoinTarget {
    /// A table or CTE.
    pub fn table(name: impl Into<String>) -> Self {
        Self::Table {
            name: name.into(),
            alias: None,
        }
    }

    /// An aliased sub-query.
    pub fn query(query: Query, alias: impl Into<String>) -> Self {
        Self::Query {
            query: Box::new(query),
            alias: alias.into(),
        }
    }

    /// Alias a table target.
    pub fn alias(self, alias: impl Into<String>) -> Self {
        match self {
            Self::Table { name, .. } => Self::Table {
                name,
                alias: Some(alias.into()),
            },
            Self::Query { query, .. } => Self::Query {
                query,
                alias: alias.into(),
            },
        }
    }

    /// Name the joined columns are qualified with.
    pub fn reference_name(&self) -> &str {
        match self {
            Self::Table { name, alias } => alias.as_deref().unwrap_or(name),
            Self::Query { alias, .. } => alias,
        }
    }
}

impl From<&str> for JoinTarget {
    fn from(name: &str) -> Self {
        Self::table(name)
    }
}

/// A join condition.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOn(pub(crate) Filter);

impl From<(&str, &str)> for JoinOn {
    fn from((left, right): (&str, &str)) -> Self {
        Self(Filter::columns(left, CompareOp::Eq, right))
    }
}

impl From<Filter> for JoinOn {
    fn from(filter: Filter) -> Self {
        Self(filter)
    }
}

impl From<OnBuilder> for JoinOn {
    fn from(builder: OnBuilder) -> Self {
        Self(builder.filter)
    }
}

/// Builds a join condition.
#[derive(Debug, Clone, Default)]
pub struct OnBuilder {
    filter: Filter,
}

impl OnBuilder {
    /// AND `left = right`.
    pub fn on(self, left: &str, right: &str) -> Self {
        self.on_op(left, CompareOp::Eq, right)
    }

    /// AND a column comparison.
    pub fn on_op(self, left: &str, op: CompareOp, right: &str) -> Self {
        self.r#where(Filter::columns(left, op, right))
    }

    /// OR `left = right`.
    pub fn or_on(self, left: &str, right: &str) -> Self {
        Self {
            filter: self.filter.or_else(Filter::columns(left, CompareOp::Eq, right)),
        }
    }

    /// AND any condition, e.g. a value comparison on the joined table.
    pub fn r#where(self, filter: impl Into<Filter>) -> Self {
        Self {
            filter: self.filter.and_then(filter.into()),
        }
    }
}

/// One join of a query.
#[derive(Debug, Clone)]
pub struct Join {
    /// Join kind.
    pub kind: JoinKind,
    /// Joined source.
    pub target: JoinTarget,
    /// Condition.
    pub on: Filter,
}

impl Query {
    /// Add a join.
    pub fn join_with(&self, kind: JoinKind, target: impl Into<JoinTarget>, on: impl Into<JoinOn>) -> Query {
        let join = Join {
            kind,
            target: target.into(),
            on: on.into().0,
        };
        self.with(|s| s.joins.push(join))
    }

    /// `JOIN`.
    pub fn join(&self, target: impl Into<JoinTarget>, on: impl Into<JoinOn>) -> Query {
        self.join_with(JoinKind::Inner, target, on)
    }

    /// `LEFT JOIN`.
    pub fn left_join(&self, target: impl Into<JoinTarget>, on: impl Into<JoinOn>) -> Query {
        self.join_with(JoinKind::Left, target, on)
    }

    /// `RIGHT JOIN`.
    pub fn right_join(&self, target: impl Into<JoinTarget>, on: impl Into<JoinOn>) -> Query {
        self.join_with(JoinKind::Right, target, on)
    }

    /// `FULL JOIN`.
    pub fn full_join(&self, target: impl Into<JoinTarget>, on: impl Into<JoinOn>) -> Query {
        self.join_with(JoinKind::Full, target, on)
    }

    /// `JOIN` with a condition built by `f`.
    pub fn join_on<F>(&self, target: impl Into<JoinTarget>, f: F) -> Query
    where
        F: FnOnce(OnBuilder) -> OnBuilder,
    {
        self.join_with(JoinKind::Inner, target, f(OnBuilder::default()))
    }

    /// `LEFT JOIN` with a condition built by `f`.
    pub fn left_join_on<F>(&self, target: impl Into<JoinTarget>, f: F) -> Query
    where
        F: FnOnce(OnBuilder) -> OnBuilder,
    {
        self.join_with(JoinKind::Left, target, f(OnBuilder::default()))
    }

    /// `JOIN` a declared relation. The target is aliased with the relation
    /// name; many-to-many relations join the join table first.
    pub fn join_relation(&self, name: &str) -> QueryResult<Query> {
        self.join_relation_with(JoinKind::Inner, name)
    }

    /// `LEFT JOIN` a declared relation.
    pub fn left_join_relation(&self, name: &str) -> QueryResult<Query> {
        self.join_relation_with(JoinKind::Left, name)
    }

    fn join_relation_with(&self, kind: JoinKind, name: &str) -> QueryResult<Query> {
        let relation = self
            .table()
            .relation(name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_relation(self.table().name(), name))?;
        let source = self.alias_or_name().to_string();
        let target = JoinTarget::table(relation.target.as_str()).alias(relation.name.as_str());
        let column = |table: &str, column: &str| format!("{}.{}", table, column);

        Ok(match &relation.kind {
            RelationKind::BelongsTo {
                foreign_key,
                primary_key,
            } => self.join_with(
                kind,
                target,
                (
                    column(&relation.name, primary_key).as_str(),
                    column(&source, foreign_key).as_str(),
                ),
            ),
            RelationKind::HasOne {
                primary_key,
                foreign_key,
            }
            | RelationKind::HasMany {
                primary_key,
                foreign_key,
            } => self.join_with(
                kind,
                target,
                (
                    column(&relation.name, foreign_key).as_str(),
                    column(&source, primary_key).as_str(),
                ),
            ),
            RelationKind::HasAndBelongsToMany(join) => self
                .join_with(
                    kind,
                    join.table.as_str(),
                    (
                        column(&join.table, &join.foreign_key).as_str(),
                        column(&source, &join.primary_key).as_str(),
                    ),
                )
                .join_with(
                    kind,
                    target,
                    (
                        column(&relation.name, &join.association_primary_key).as_str(),
                        column(&join.table, &join.association_foreign_key).as_str(),
                    ),
                ),
        })
    }
}
