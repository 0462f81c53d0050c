//! Compiles query descriptors into parameterized PostgreSQL statements.
//!
//! Every value is bound as a positional `$N` parameter. Sub-queries, CTEs
//! and raw fragments render into the enclosing statement's builder, so one
//! statement has a single parameter sequence. Compilation is pure: it never
//! changes the descriptor and reports construction problems as errors.
//!
//! ```rust,ignore
//! let sql = users.r#where(("name", "Ann")).select(["id"]).to_sql()?;
//! assert_eq!(
//!     sql.as_single().unwrap().text,
//!     r#"SELECT "users"."id" FROM "users" WHERE "users"."name" = $1"#
//! );
//! ```

mod conditions;
mod insert;
mod scope;
mod select;
mod write;

pub(crate) use insert::needs_batch;
pub(crate) use scope::Scope;

use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::query::Query;
use crate::sql::{CompiledSql, SqlBuilder};
use crate::types::QueryKind;

/// Render any statement kind into `out`. `parent` is the scope of the
/// enclosing statement when `query` is a sub-query.
pub(crate) fn render_statement(query: &Query, out: &mut SqlBuilder, parent: Option<&Scope<'_>>) -> QueryResult<()> {
    let state = query.state();
    if state.on_conflict.is_some() && state.kind != QueryKind::Insert {
        return Err(QueryError::invalid_query("on_conflict only applies to inserts").with_table(state.table.name()));
    }
    match state.kind {
        QueryKind::Select => select::render_select(query, out, parent),
        QueryKind::Insert => insert::render_insert(query, 0..state.insert.rows.len(), out, parent),
        QueryKind::Update => write::render_update(query, out, parent),
        QueryKind::Delete => write::render_delete(query, out, parent),
        QueryKind::Truncate => write::render_truncate(query, out),
        QueryKind::ColumnInfo => write::render_column_info(query, out),
    }
}

impl Query {
    /// Compile to SQL. Inserts over the parameter limit compile to a batch.
    pub fn to_sql(&self) -> QueryResult<CompiledSql> {
        let compiled = match self.kind() {
            QueryKind::Insert => insert::compile_insert(self)?,
            _ => {
                let mut out = SqlBuilder::new();
                render_statement(self, &mut out, None)?;
                CompiledSql::Single(out.build())
            }
        };
        trace!(
            table = %self.table().name(),
            kind = self.kind().as_str(),
            statements = compiled.statements().len(),
            "Compiled query"
        );
        Ok(compiled)
    }
}
