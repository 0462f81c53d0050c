//! Name resolution for one statement level.
//!
//! A scope lists the references a statement can qualify columns with: the
//! main source first, then every join. Sub-queries get a child scope whose
//! parent is the enclosing statement, so correlated references resolve.

use smallvec::SmallVec;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::query::{JoinTarget, Query};
use crate::sql::{quote_column, quote_identifier};
use crate::table::TableDef;

#[derive(Debug)]
pub(crate) struct Source {
    pub name: String,
    /// Definition to validate columns against; `None` for CTEs, sub-queries
    /// and tables the database does not know.
    table: Option<Arc<TableDef>>,
}

impl Source {
    fn check(&self, column: &str) -> QueryResult<()> {
        match &self.table {
            Some(table) if !table.has_column(column) => Err(QueryError::invalid_column(
                format!("{}.{}", self.name, column),
                "no such column",
            )
            .with_table(table.name())),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Scope<'p> {
    sources: SmallVec<[Source; 4]>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    /// Scope of `query`, nested in `parent` when it is a sub-query.
    pub(crate) fn for_query(query: &Query, parent: Option<&'p Scope<'p>>) -> QueryResult<Self> {
        let state = query.state();
        let is_cte = |name: &str| state.with.iter().any(|cte| cte.name == name);

        let mut scope = Scope {
            sources: SmallVec::new(),
            parent,
        };
        let main_table = match &state.from {
            None => Some(state.table.clone()),
            Some(_) => None,
        };
        scope.add(query.alias_or_name(), main_table)?;

        for join in &state.joins {
            let table = match &join.target {
                JoinTarget::Table { name, .. } if !is_cte(name) => query.db().table_def(name).cloned(),
                _ => None,
            };
            scope.add(join.target.reference_name(), table)?;
        }
        Ok(scope)
    }

    fn add(&mut self, name: &str, table: Option<Arc<TableDef>>) -> QueryResult<()> {
        if self.sources.iter().any(|s| s.name == name) {
            return Err(QueryError::invalid_column(
                name,
                "table reference appears more than once; alias one of them",
            ));
        }
        self.sources.push(Source {
            name: name.to_string(),
            table,
        });
        Ok(())
    }

    /// Name unqualified columns are qualified with.
    pub(crate) fn main_name(&self) -> &str {
        self.sources.first().map(|s| s.name.as_str()).unwrap_or_default()
    }

    fn find(&self, name: &str) -> Option<&Source> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.parent.and_then(|p| p.find(name)))
    }

    /// Resolve and quote a column reference. Unqualified names belong to
    /// the main source; qualified ones must name a source of this scope or
    /// of an enclosing one.
    pub(crate) fn column(&self, reference: &str) -> QueryResult<String> {
        match reference.split_once('.') {
            None if reference == "*" => Ok("*".to_string()),
            None => {
                let main = self
                    .sources
                    .first()
                    .ok_or_else(|| QueryError::internal("scope without a main source"))?;
                main.check(reference)?;
                Ok(format!("{}.{}", quote_identifier(&main.name), quote_identifier(reference)))
            }
            Some((qualifier, column)) => {
                let source = self.find(qualifier).ok_or_else(|| {
                    QueryError::invalid_column(reference, format!("'{}' is not a table in this query", qualifier))
                        .with_suggestion(format!("join '{}' or qualify with '{}'", qualifier, self.main_name()))
                })?;
                if column != "*" {
                    source.check(column)?;
                }
                Ok(quote_column(reference))
            }
        }
    }
}
