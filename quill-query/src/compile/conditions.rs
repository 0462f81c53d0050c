//! Rendering of filter trees and the WHERE clause.

use crate::error::QueryResult;
use crate::filter::Filter;
use crate::query::QueryState;
use crate::sql::SqlBuilder;
use crate::value::Value;

use super::Scope;

/// Escape LIKE wildcards so the value matches literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn render_compare(out: &mut SqlBuilder, scope: &Scope<'_>, column: &str, op: &str, value: &Value) -> QueryResult<()> {
    out.push(scope.column(column)?).push(" ").push(op).push(" ").push_param(value.clone());
    Ok(())
}

fn render_list(out: &mut SqlBuilder, scope: &Scope<'_>, column: &str, op: &str, values: &[Value]) -> QueryResult<()> {
    out.push(scope.column(column)?).push(" ").push(op).push(" (");
    out.push_list(values, ", ", |b, v| {
        b.push_param(v.clone());
    });
    out.push(")");
    Ok(())
}

fn render_like(out: &mut SqlBuilder, scope: &Scope<'_>, column: &str, pattern: String) -> QueryResult<()> {
    out.push(scope.column(column)?).push(" LIKE ").push_param(pattern);
    Ok(())
}

/// Render one filter. Nested AND and OR lists are parenthesized.
pub(crate) fn render_filter(filter: &Filter, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    match filter {
        Filter::None => {
            out.push("TRUE");
        }
        Filter::Equals(column, Value::Null) | Filter::IsNull(column) => {
            out.push(scope.column(column)?).push(" IS NULL");
        }
        Filter::NotEquals(column, Value::Null) | Filter::IsNotNull(column) => {
            out.push(scope.column(column)?).push(" IS NOT NULL");
        }
        Filter::Equals(column, value) => render_compare(out, scope, column, "=", value)?,
        Filter::NotEquals(column, value) => render_compare(out, scope, column, "<>", value)?,
        Filter::Lt(column, value) => render_compare(out, scope, column, "<", value)?,
        Filter::Lte(column, value) => render_compare(out, scope, column, "<=", value)?,
        Filter::Gt(column, value) => render_compare(out, scope, column, ">", value)?,
        Filter::Gte(column, value) => render_compare(out, scope, column, ">=", value)?,
        Filter::In(column, values) if values.is_empty() => {
            scope.column(column)?;
            out.push("FALSE");
        }
        Filter::NotIn(column, values) if values.is_empty() => {
            scope.column(column)?;
            out.push("TRUE");
        }
        Filter::In(column, values) => render_list(out, scope, column, "IN", values)?,
        Filter::NotIn(column, values) => render_list(out, scope, column, "NOT IN", values)?,
        Filter::Contains(column, value) => render_like(out, scope, column, format!("%{}%", escape_like(value)))?,
        Filter::StartsWith(column, value) => render_like(out, scope, column, format!("{}%", escape_like(value)))?,
        Filter::EndsWith(column, value) => render_like(out, scope, column, format!("%{}", escape_like(value)))?,
        Filter::Columns(left, op, right) => {
            out.push(scope.column(left)?)
                .push(" ")
                .push(op.as_sql())
                .push(" ")
                .push(scope.column(right)?);
        }
        Filter::Raw(raw) => {
            out.push("(");
            raw.render(out)?;
            out.push(")");
        }
        Filter::Exists(query) => {
            out.push("EXISTS (");
            super::render_statement(query, out, Some(scope))?;
            out.push(")");
        }
        Filter::InQuery(column, query) => {
            out.push(scope.column(column)?).push(" IN (");
            super::render_statement(query, out, Some(scope))?;
            out.push(")");
        }
        Filter::And(filters) => {
            out.push("(");
            render_joined(filters, " AND ", scope, out)?;
            out.push(")");
        }
        Filter::Or(filters) => {
            out.push("(");
            render_joined(filters, " OR ", scope, out)?;
            out.push(")");
        }
        Filter::Not(inner) => {
            out.push("NOT (");
            render_top(inner, scope, out)?;
            out.push(")");
        }
    }
    Ok(())
}

fn render_joined(filters: &[Filter], sep: &str, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        render_filter(filter, scope, out)?;
    }
    Ok(())
}

/// Render a filter that stands alone in its clause; a top-level list needs
/// no parentheses.
pub(crate) fn render_top(filter: &Filter, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    match filter {
        Filter::And(filters) => render_joined(filters, " AND ", scope, out),
        Filter::Or(filters) => render_joined(filters, " OR ", scope, out),
        other => render_filter(other, scope, out),
    }
}

/// ` WHERE ...` from the AND-group and the OR-groups, if any.
pub(crate) fn render_where(state: &QueryState, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    let groups = state.condition_groups();
    if groups.is_empty() {
        return Ok(());
    }
    out.push(" WHERE ");
    if let [group] = groups.as_slice() {
        return render_joined(group, " AND ", scope, out);
    }
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            out.push(" OR ");
        }
        if group.len() > 1 {
            out.push("(");
            render_joined(group, " AND ", scope, out)?;
            out.push(")");
        } else {
            render_joined(group, " AND ", scope, out)?;
        }
    }
    Ok(())
}
