//! UPDATE, DELETE, TRUNCATE and the column metadata read.

use crate::error::{QueryError, QueryResult};
use crate::query::{Query, WriteValue};
use crate::sql::{SqlBuilder, quote_identifier};

use super::Scope;
use super::conditions::render_where;
use super::select::{render_ctes, render_returning, render_select, render_table};

/// Right-hand side of `"column" = ...`. Increments reference the current
/// value, qualified with `qualifier` where the column would be ambiguous.
pub(crate) fn render_set_value(
    value: &WriteValue,
    column: &str,
    qualifier: Option<&str>,
    out: &mut SqlBuilder,
) -> QueryResult<()> {
    let current = || match qualifier {
        Some(table) => format!("{}.{}", quote_identifier(table), quote_identifier(column)),
        None => quote_identifier(column),
    };
    match value {
        WriteValue::Value(value) => {
            out.push_param(value.clone());
        }
        WriteValue::Raw(raw) => raw.render(out)?,
        WriteValue::Default => {
            out.push("DEFAULT");
        }
        WriteValue::Increment(by) => {
            out.push(current()).push(" + ").push_param(by.clone());
        }
        WriteValue::Decrement(by) => {
            out.push(current()).push(" - ").push_param(by.clone());
        }
        WriteValue::Relation(_) => {
            return Err(QueryError::internal(format!(
                "relation write left in column '{}'",
                column
            )));
        }
    }
    Ok(())
}

fn reject_joins(query: &Query) -> QueryResult<()> {
    let state = query.state();
    if state.joins.is_empty() {
        Ok(())
    } else {
        Err(QueryError::invalid_query(format!("joins are not supported on {}", state.kind.as_str()))
            .with_table(state.table.name()))
    }
}

fn render_target(query: &Query, out: &mut SqlBuilder) {
    let state = query.state();
    render_table(&state.table, out);
    if let Some(alias) = &state.alias {
        out.push(" AS ").push_identifier(alias);
    }
}

/// `UPDATE ... SET ...`. An update whose payload held only relation writes
/// reads the matched rows instead, so appended writes get their keys.
pub(crate) fn render_update(query: &Query, out: &mut SqlBuilder, parent: Option<&Scope<'_>>) -> QueryResult<()> {
    let state = query.state();
    reject_joins(query)?;
    query.check_conditional("update")?;
    if state.update.is_empty() {
        return render_select(query, out, parent);
    }
    let scope = Scope::for_query(query, parent)?;

    render_ctes(state, out)?;
    out.push("UPDATE ");
    render_target(query, out);
    out.push(" SET ");
    for (i, (column, value)) in state.update.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.push_identifier(column).push(" = ");
        render_set_value(value, column, None, out)?;
    }
    render_where(state, &scope, out)?;
    render_returning(state, &scope, out)
}

pub(crate) fn render_delete(query: &Query, out: &mut SqlBuilder, parent: Option<&Scope<'_>>) -> QueryResult<()> {
    let state = query.state();
    reject_joins(query)?;
    query.check_conditional("delete")?;
    let scope = Scope::for_query(query, parent)?;

    render_ctes(state, out)?;
    out.push("DELETE FROM ");
    render_target(query, out);
    render_where(state, &scope, out)?;
    render_returning(state, &scope, out)
}

pub(crate) fn render_truncate(query: &Query, out: &mut SqlBuilder) -> QueryResult<()> {
    let state = query.state();
    out.push("TRUNCATE ");
    render_table(&state.table, out);
    if state.truncate.restart_identity {
        out.push(" RESTART IDENTITY");
    }
    if state.truncate.cascade {
        out.push(" CASCADE");
    }
    Ok(())
}

pub(crate) fn render_column_info(query: &Query, out: &mut SqlBuilder) -> QueryResult<()> {
    let table = &query.state().table;
    out.push(
        "SELECT column_name, data_type, column_default, is_nullable \
         FROM information_schema.columns WHERE table_schema = ",
    )
    .push_param(table.schema_name().unwrap_or("public"))
    .push(" AND table_name = ")
    .push_param(table.name())
    .push(" ORDER BY ordinal_position");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{db, sql_text, users};
    use crate::{Data, ErrorCode, Filter, NestedWrite};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_update_returning() {
        let db = db();
        let q = users(&db)
            .find(1)
            .update(Data::new().set("name", "x"))
            .unwrap()
            .select(["id", "name"]);
        assert_eq!(
            sql_text(&q),
            r#"UPDATE "users" SET "name" = $1 WHERE "users"."id" = $2 RETURNING "users"."id", "users"."name""#
        );
    }

    #[test]
    fn test_relation_only_update_reads_rows() {
        let db = db();
        let q = users(&db)
            .r#where(("id", 1))
            .update(Data::new().set("posts", NestedWrite::disconnect_all()))
            .unwrap()
            .select(["id"]);
        assert_eq!(
            sql_text(&q),
            r#"SELECT "users"."id" FROM "users" WHERE "users"."id" = $1"#
        );
    }

    #[test]
    fn test_joins_rejected_on_writes() {
        let db = db();
        let err = users(&db)
            .join("posts", ("posts.author_id", "users.id"))
            .r#where(("posts.title", "x"))
            .delete()
            .unwrap()
            .to_sql()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidQuery);
    }

    #[test]
    fn test_delete_with_or_groups() {
        let db = db();
        let q = users(&db)
            .r#where(Filter::lt("id", 3))
            .or_where(("name", "x"))
            .delete()
            .unwrap();
        assert_eq!(
            sql_text(&q),
            r#"DELETE FROM "users" WHERE "users"."id" < $1 OR "users"."name" = $2"#
        );
    }

    #[test]
    fn test_column_info_schema() {
        let db = db();
        let compiled = crate::test_support::sql(&users(&db).column_info().unwrap());
        assert_eq!(
            compiled.text,
            "SELECT column_name, data_type, column_default, is_nullable FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position"
        );
    }
}
