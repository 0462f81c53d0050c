//! INSERT statements and parameter-limit batching.
//!
//! When the values of one insert would exceed the adapter's bind parameter
//! limit, rows are split greedily into consecutive statements. Every batch
//! repeats the clauses outside `VALUES` and numbers its parameters from `$1`.

use std::ops::Range;

use crate::error::{QueryError, QueryResult};
use crate::query::{ConflictAction, Query, WriteValue};
use crate::sql::{CompiledSql, SqlBuilder};

use super::Scope;
use super::select::{render_ctes, render_returning, render_table};

fn render_write_value(value: &WriteValue, column: &str, out: &mut SqlBuilder) -> QueryResult<()> {
    match value {
        WriteValue::Value(value) => {
            out.push_param(value.clone());
        }
        WriteValue::Raw(raw) => raw.render(out)?,
        WriteValue::Default => {
            out.push("DEFAULT");
        }
        WriteValue::Increment(_) | WriteValue::Decrement(_) => {
            return Err(QueryError::invalid_data("increment and decrement are only valid in updates")
                .with_field(column));
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

/// Render the insert with the rows in `rows`.
pub(crate) fn render_insert(
    query: &Query,
    rows: Range<usize>,
    out: &mut SqlBuilder,
    parent: Option<&Scope<'_>>,
) -> QueryResult<()> {
    let state = query.state();
    if !state.joins.is_empty() {
        return Err(QueryError::invalid_query("joins are not supported on insert").with_table(state.table.name()));
    }
    let scope = Scope::for_query(query, parent)?;
    let payload = &state.insert;
    let rows = payload.rows.get(rows).unwrap_or_default();

    render_ctes(state, out)?;
    out.push("INSERT INTO ");
    render_table(&state.table, out);
    if let Some(alias) = &state.alias {
        out.push(" AS ").push_identifier(alias);
    }

    if payload.columns.is_empty() {
        if rows.len() <= 1 {
            out.push(" DEFAULT VALUES");
        } else {
            out.push(" VALUES ");
            out.push_list(rows, ", ", |b, _| {
                b.push("(DEFAULT)");
            });
        }
    } else {
        out.push(" (");
        out.push_list(&payload.columns, ", ", |b, column| {
            b.push_identifier(column);
        });
        out.push(") VALUES ");
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                out.push(", ");
            }
            out.push("(");
            for (j, (column, value)) in payload.columns.iter().zip(row).enumerate() {
                if j > 0 {
                    out.push(", ");
                }
                render_write_value(value, column, out)?;
            }
            out.push(")");
        }
    }

    if let Some(conflict) = &state.on_conflict {
        out.push(" ON CONFLICT");
        if !conflict.target.is_empty() {
            out.push(" (");
            out.push_list(&conflict.target, ", ", |b, column| {
                b.push_identifier(column);
            });
            out.push(")");
        }
        match &conflict.action {
            ConflictAction::Ignore => {
                out.push(" DO NOTHING");
            }
            ConflictAction::Merge(columns) => {
                let merged: Vec<&String> = if columns.is_empty() {
                    payload.columns.iter().filter(|c| !conflict.target.contains(c)).collect()
                } else {
                    columns.iter().collect()
                };
                if merged.is_empty() {
                    out.push(" DO NOTHING");
                } else {
                    out.push(" DO UPDATE SET ");
                    out.push_list(&merged, ", ", |b, column| {
                        b.push_identifier(column).push(" = excluded.").push_identifier(column);
                    });
                }
            }
            ConflictAction::Set(values) => {
                out.push(" DO UPDATE SET ");
                for (i, (column, value)) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(", ");
                    }
                    out.push_identifier(column).push(" = ");
                    super::write::render_set_value(value, column, Some(scope.main_name()), out)?;
                }
            }
        }
    }

    render_returning(state, &scope, out)
}

fn row_estimate(row: &[WriteValue]) -> usize {
    row.iter().map(WriteValue::param_estimate).sum()
}

/// Row ranges of each batch, or `None` when the insert fits one statement.
pub(crate) fn batch_plan(query: &Query) -> QueryResult<Option<Vec<Range<usize>>>> {
    let state = query.state();
    let rows = &state.insert.rows;
    let limit = query.db().config().max_bind_params;
    let estimates: Vec<usize> = rows.iter().map(|row| row_estimate(row)).collect();
    let total: usize = estimates.iter().sum();
    if rows.len() <= 1 || total <= limit {
        return Ok(None);
    }

    // Parameters bound outside VALUES, measured from a one-row statement.
    let mut probe = SqlBuilder::new();
    render_insert(query, 0..1, &mut probe, None)?;
    let overhead = probe.param_count().saturating_sub(estimates[0]);
    if total + overhead <= limit {
        return Ok(None);
    }
    let budget = limit.saturating_sub(overhead);

    let mut batches = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (index, &estimate) in estimates.iter().enumerate() {
        if estimate > budget {
            return Err(QueryError::invalid_query(format!(
                "row {} binds {} parameters, more than the limit of {}",
                index, estimate, budget
            ))
            .with_table(state.table.name()));
        }
        if used + estimate > budget {
            batches.push(start..index);
            start = index;
            used = 0;
        }
        used += estimate;
    }
    batches.push(start..rows.len());
    Ok(Some(batches))
}

/// Check if executing this insert takes more than one statement.
pub(crate) fn needs_batch(query: &Query) -> bool {
    matches!(batch_plan(query), Ok(Some(batches)) if batches.len() > 1)
}

pub(crate) fn compile_insert(query: &Query) -> QueryResult<CompiledSql> {
    let rows = query.state().insert.rows.len();
    match batch_plan(query)? {
        Some(batches) if batches.len() > 1 => {
            let batch = batches
                .into_iter()
                .map(|range| {
                    let mut out = SqlBuilder::new();
                    render_insert(query, range, &mut out, None)?;
                    Ok(out.build())
                })
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(CompiledSql::Batch { batch })
        }
        _ => {
            let mut out = SqlBuilder::new();
            render_insert(query, 0..rows, &mut out, None)?;
            Ok(CompiledSql::Single(out.build()))
        }
    }
}
