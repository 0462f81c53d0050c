//! SELECT statements, and the clauses shared with writes: CTEs, the source
//! table and the select list.

use crate::error::QueryResult;
use crate::query::{CteBody, FromSource, JoinTarget, Query, QueryState};
use crate::sql::{SqlBuilder, quote_column, quote_identifier};
use crate::table::TableDef;
use crate::types::{OrderItem, OrderTarget, SelectItem, WindowDef};

use super::conditions::{render_top, render_where};
use super::{Scope, render_statement};

/// ` WITH "name" AS (...), ...` prefix, without the leading space.
pub(crate) fn render_ctes(state: &QueryState, out: &mut SqlBuilder) -> QueryResult<()> {
    if state.with.is_empty() {
        return Ok(());
    }
    out.push("WITH ");
    for (i, cte) in state.with.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.push_identifier(&cte.name).push(" AS (");
        match &cte.body {
            CteBody::Query(query) => render_statement(query, out, None)?,
            CteBody::Raw(raw) => raw.render(out)?,
        }
        out.push(")");
    }
    out.push(" ");
    Ok(())
}

/// The table, schema-qualified when the definition names a schema.
pub(crate) fn render_table(table: &TableDef, out: &mut SqlBuilder) {
    if let Some(schema) = table.schema_name() {
        out.push_identifier(schema).push(".");
    }
    out.push_identifier(table.name());
}

fn render_alias(alias: Option<&str>, out: &mut SqlBuilder) {
    if let Some(alias) = alias {
        out.push(" AS ").push_identifier(alias);
    }
}

/// Output names the select list defines, which ORDER BY and GROUP BY may
/// reference directly.
fn select_aliases(state: &QueryState) -> Vec<&str> {
    state
        .select
        .iter()
        .filter_map(|item| match item {
            SelectItem::Column(_) => None,
            other => other.output_key(),
        })
        .collect()
}

pub(crate) fn render_select_item(item: &SelectItem, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    match item {
        SelectItem::Column(column) => {
            out.push(scope.column(column)?);
        }
        SelectItem::Aliased { column, alias } => {
            out.push(scope.column(column)?).push(" AS ").push_identifier(alias);
        }
        SelectItem::Raw { sql, alias } => {
            sql.render(out)?;
            render_alias(alias.as_deref(), out);
        }
        SelectItem::Aggregate {
            func,
            column,
            distinct,
            over,
            ..
        } => {
            out.push(func.as_sql()).push("(");
            if *distinct {
                out.push("DISTINCT ");
            }
            match column {
                Some(column) => out.push(scope.column(column)?),
                None => out.push("*"),
            };
            out.push(")");
            if let Some(window) = over {
                out.push(" OVER ").push_identifier(window);
            }
            render_alias(item.output_key(), out);
        }
        SelectItem::SubQuery { query, alias } => {
            out.push("(");
            render_statement(query, out, Some(scope))?;
            out.push(") AS ").push_identifier(alias);
        }
    }
    Ok(())
}

/// The select list, or `*` when nothing is selected.
pub(crate) fn render_select_list(state: &QueryState, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    if state.select.is_empty() {
        if state.joins.is_empty() {
            out.push("*");
        } else {
            out.push_identifier(scope.main_name()).push(".*");
        }
        return Ok(());
    }
    for (i, item) in state.select.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        render_select_item(item, scope, out)?;
    }
    Ok(())
}

/// ` RETURNING ...` for writes that select something.
pub(crate) fn render_returning(state: &QueryState, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    if state.select.is_empty() {
        return Ok(());
    }
    out.push(" RETURNING ");
    render_select_list(state, scope, out)
}

fn render_from(query: &Query, out: &mut SqlBuilder) -> QueryResult<()> {
    let state = query.state();
    out.push(" FROM ");
    match &state.from {
        None => render_table(&state.table, out),
        Some(FromSource::Cte(name)) => {
            out.push_identifier(name);
        }
        Some(FromSource::Query { query, alias }) => {
            out.push("(");
            render_statement(query, out, None)?;
            out.push(") AS ").push_identifier(alias);
            return Ok(());
        }
    }
    render_alias(state.alias.as_deref(), out);
    Ok(())
}

fn render_joins(state: &QueryState, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    for join in &state.joins {
        out.push(" ").push(join.kind.as_sql()).push(" ");
        match &join.target {
            JoinTarget::Table { name, alias } => {
                out.push_identifier(name);
                render_alias(alias.as_deref(), out);
            }
            JoinTarget::Query { query, alias } => {
                out.push("(");
                render_statement(query, out, None)?;
                out.push(") AS ").push_identifier(alias);
            }
        }
        out.push(" ON ");
        if join.on.is_none() {
            out.push("TRUE");
        } else {
            render_top(&join.on, scope, out)?;
        }
    }
    Ok(())
}

/// A column reference in GROUP BY or ORDER BY: a select alias, or a
/// resolved column. Combined selects only see output names.
fn render_sort_column(
    column: &str,
    aliases: &[&str],
    combined: bool,
    scope: &Scope<'_>,
    out: &mut SqlBuilder,
) -> QueryResult<()> {
    if aliases.contains(&column) {
        out.push_identifier(column);
    } else if combined {
        out.push(quote_column(column));
    } else {
        out.push(scope.column(column)?);
    }
    Ok(())
}

fn render_order_items(
    items: &[OrderItem],
    aliases: &[&str],
    combined: bool,
    scope: &Scope<'_>,
    out: &mut SqlBuilder,
) -> QueryResult<()> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        match &item.target {
            OrderTarget::Column(column) => render_sort_column(column, aliases, combined, scope, out)?,
            OrderTarget::Raw(raw) => raw.render(out)?,
        }
        out.push(" ").push(item.order.as_sql());
        if let Some(nulls) = item.nulls {
            out.push(" ").push(nulls.as_sql());
        }
    }
    Ok(())
}

fn render_window(window: &WindowDef, scope: &Scope<'_>, out: &mut SqlBuilder) -> QueryResult<()> {
    out.push_identifier(&window.name).push(" AS (");
    if !window.partition_by.is_empty() {
        out.push("PARTITION BY ");
        for (i, column) in window.partition_by.iter().enumerate() {
            if i > 0 {
                out.push(", ");
            }
            out.push(scope.column(column)?);
        }
    }
    if !window.order.is_empty() {
        if !window.partition_by.is_empty() {
            out.push(" ");
        }
        out.push("ORDER BY ");
        render_order_items(&window.order, &[], false, scope, out)?;
    }
    out.push(")");
    Ok(())
}

/// A complete SELECT, including set operations and the row limit one-row
/// return types imply.
pub(crate) fn render_select(query: &Query, out: &mut SqlBuilder, parent: Option<&Scope<'_>>) -> QueryResult<()> {
    let state = query.state();
    let scope = Scope::for_query(query, parent)?;
    let aliases = select_aliases(state);

    render_ctes(state, out)?;
    out.push("SELECT ");
    match &state.distinct {
        Some(columns) if columns.is_empty() => {
            out.push("DISTINCT ");
        }
        Some(columns) => {
            out.push("DISTINCT ON (");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    out.push(", ");
                }
                out.push(scope.column(column)?);
            }
            out.push(") ");
        }
        None => {}
    }
    render_select_list(state, &scope, out)?;
    render_from(query, out)?;
    render_joins(state, &scope, out)?;
    render_where(state, &scope, out)?;

    if !state.group.is_empty() {
        out.push(" GROUP BY ");
        for (i, column) in state.group.iter().enumerate() {
            if i > 0 {
                out.push(", ");
            }
            render_sort_column(column, &aliases, false, &scope, out)?;
        }
    }
    if !state.having.is_empty() {
        out.push(" HAVING ");
        for (i, filter) in state.having.iter().enumerate() {
            if i > 0 {
                out.push(" AND ");
            }
            super::conditions::render_filter(filter, &scope, out)?;
        }
    }
    if !state.windows.is_empty() {
        out.push(" WINDOW ");
        for (i, window) in state.windows.iter().enumerate() {
            if i > 0 {
                out.push(", ");
            }
            render_window(window, &scope, out)?;
        }
    }

    let combined = !state.unions.is_empty();
    for (kind, other) in &state.unions {
        out.push(" ").push(kind.as_sql()).push(" (");
        render_statement(other, out, None)?;
        out.push(")");
    }

    if !state.order.is_empty() {
        out.push(" ORDER BY ");
        render_order_items(&state.order, &aliases, combined, &scope, out)?;
    }
    let limit = match state.limit {
        Some(limit) => Some(limit),
        None if query.return_type().is_single() => Some(1),
        None => None,
    };
    if let Some(limit) = limit {
        out.push(format!(" LIMIT {}", limit));
    }
    if let Some(offset) = state.offset {
        out.push(format!(" OFFSET {}", offset));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{db, sql_text, users};
    use crate::{Filter, JoinTarget, TableDef};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_explicit_limit_wins_over_single_row_limit() {
        let db = db();
        let q = users(&db).limit(5).take();
        assert_eq!(sql_text(&q), r#"SELECT * FROM "users" LIMIT 5"#);
    }

    #[test]
    fn test_distinct_on() {
        let db = db();
        let q = users(&db).distinct_on(["email"]).select(["email", "id"]);
        assert_eq!(
            sql_text(&q),
            r#"SELECT DISTINCT ON ("users"."email") "users"."email", "users"."id" FROM "users""#
        );
    }

    #[test]
    fn test_schema_qualified_table() {
        let adapter = crate::test_support::RecordingAdapter::new();
        let db = crate::Db::builder(adapter)
            .table(TableDef::new("events").schema("audit"))
            .build()
            .unwrap();
        let q = db.table("events").unwrap().select(["kind"]);
        assert_eq!(sql_text(&q), r#"SELECT "events"."kind" FROM "audit"."events""#);
    }

    #[test]
    fn test_correlated_subquery_select() {
        let db = db();
        let counts = db
            .table("posts")
            .unwrap()
            .select_aggregate(crate::AggregateFn::Count, None, None)
            .r#where(Filter::columns("posts.author_id", crate::CompareOp::Eq, "users.id"));
        let q = users(&db).select(["name"]).select_subquery(counts, "posts_count");
        assert_eq!(
            sql_text(&q),
            r#"SELECT "users"."name", (SELECT count(*) AS "count" FROM "posts" WHERE "posts"."author_id" = "users"."id") AS "posts_count" FROM "users""#
        );
    }

    #[test]
    fn test_from_subquery() {
        let db = db();
        let inner = users(&db).select(["id", "name"]).r#where(Filter::gt("id", 3));
        let q = users(&db).from_query(inner, "u").select(["u.name"]).r#where(("u.id", 5));
        let compiled = crate::test_support::sql(&q);
        assert_eq!(
            compiled.text,
            r#"SELECT "u"."name" FROM (SELECT "users"."id", "users"."name" FROM "users" WHERE "users"."id" > $1) AS "u" WHERE "u"."id" = $2"#
        );
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_join_without_condition() {
        let db = db();
        let q = users(&db).join(JoinTarget::table("tags"), Filter::none()).select(["tags.name"]);
        assert_eq!(
            sql_text(&q),
            r#"SELECT "tags"."name" FROM "users" JOIN "tags" ON TRUE"#
        );
    }

    #[test]
    fn test_raw_order() {
        let db = db();
        let q = users(&db).order_by(crate::OrderItem::raw("random()"));
        assert_eq!(sql_text(&q), r#"SELECT * FROM "users" ORDER BY random() ASC"#);
    }
}
