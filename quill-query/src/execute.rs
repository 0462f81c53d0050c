//! Query execution.
//!
//! One execution runs these steps in order:
//!
//! 1. before-hooks;
//! 2. prepended belongs-to writes, whose keys are substituted into the statement;
//! 3. compile and send;
//! 4. parse, then load relations;
//! 5. appended has-* writes;
//! 6. after-hooks, when rows were affected;
//! 7. queue after-commit hooks.
//!
//! Columns added for hooks, relation loads or appended writes are stripped
//! before the result is shaped into the query's return type.
//!
//! A query that needs a transaction (nested writes, batched inserts or an
//! explicit [`wrap_in_transaction`](Query::wrap_in_transaction)) opens one
//! unless it runs inside a [`TransactionContext`] already.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, warn};

use crate::adapter::{Adapter, BoxFuture};
use crate::compile;
use crate::error::{AfterCommitError, HookStatus, QueryError, QueryResult};
use crate::hooks::{HookContext, run_phase, run_settled};
use crate::nested;
use crate::parse::{QueryOutput, parse_records, shape_arrays, shape_count, shape_rows};
use crate::query::{Data, Query};
use crate::relations::loader::load_relations;
use crate::sql::Sql;
use crate::transaction::{AfterCommitJob, TransactionContext};
use crate::types::QueryKind;
use crate::value::Row;

/// Columns the statement must return beyond the caller's select list.
fn hidden_columns(query: &Query) -> Vec<String> {
    let state = query.state();
    if state.select.is_empty() && !state.kind.is_write() {
        return Vec::new();
    }
    let wanted = state
        .hooks
        .selects(state.kind)
        .into_iter()
        .chain(state.loads.iter().map(|load| load.relation.source_key().to_string()))
        .chain(state.nested.append.iter().map(|item| item.relation.source_key().to_string()));

    let mut hidden: Vec<String> = Vec::new();
    for column in wanted {
        if !state.select.iter().any(|item| item.covers(&column)) && !hidden.contains(&column) {
            hidden.push(column);
        }
    }
    hidden
}

fn log_statement(query: &Query, sql: &Sql, elapsed: Duration, rows: u64) {
    let config = query.db().config();
    let table = query.table().name();
    let elapsed_us = elapsed.as_micros() as u64;

    debug!(table = %table, sql = %sql.text, params = sql.values.len(), elapsed_us, rows, "Executed statement");
    crate::quill_debug!(values = ?sql.values, "Statement parameters");
    if query.state().log.unwrap_or(config.log_queries) {
        info!(table = %table, sql = %sql.text, params = sql.values.len(), elapsed_us, rows, "Query");
    }
    if elapsed >= config.slow_query_threshold() {
        warn!(
            table = %table,
            sql = %sql.text,
            elapsed_ms = elapsed.as_millis() as u64,
            threshold_ms = config.slow_query_threshold_ms,
            "Slow query"
        );
    }
}

/// After-commit hooks with everything they need, as a detached job.
fn after_commit_job(query: &Query, rows: &Arc<Vec<Row>>) -> Option<AfterCommitJob> {
    let state = query.state();
    let hooks = state.hooks.after_commit(state.kind);
    if hooks.is_empty() {
        return None;
    }
    let ctx = HookContext {
        query: query.clone(),
        rows: rows.clone(),
        transaction: None,
    };
    let handler = state.after_commit_error.clone();
    Some(AfterCommitJob::new(async move {
        let statuses = run_settled(&hooks, &ctx).await;
        if !statuses.iter().any(HookStatus::is_rejected) {
            return;
        }
        let err = AfterCommitError {
            table: ctx.query.table().name().to_string(),
            result: ctx.rows.clone(),
            statuses,
        };
        match handler {
            Some(handler) => handler(&err),
            None => ctx.query.db().report_after_commit_error(&err),
        }
    }))
}

impl Query {
    /// Execute outside any transaction; one is opened if the query needs it.
    pub async fn exec(&self) -> QueryResult<QueryOutput> {
        self.run(None).await
    }

    /// Execute inside `tx`. After-commit hooks wait for the outermost commit.
    pub async fn exec_in(&self, tx: &TransactionContext) -> QueryResult<QueryOutput> {
        self.run(Some(tx)).await
    }

    /// Check if executing this query takes a transaction.
    pub fn needs_transaction(&self) -> bool {
        let state = self.state();
        state.wrap_in_transaction
            || !state.nested.is_empty()
            || (!state.loads.is_empty() && state.hooks.has_after(state.kind))
            || (state.kind == QueryKind::Insert && compile::needs_batch(self))
    }

    pub(crate) fn run<'a>(&'a self, tx: Option<&'a TransactionContext>) -> BoxFuture<'a, QueryResult<QueryOutput>> {
        let span = tracing::debug_span!(
            "query",
            table = %self.table().name(),
            kind = self.kind().as_str(),
            transaction_id = tx.map(TransactionContext::id)
        );
        Box::pin(
            async move {
                let state = self.state();
                if state.none {
                    debug!("Query matches nothing, skipping statement");
                    return QueryOutput::empty(self.return_type(), state.value_default.as_ref(), self.table().name());
                }
                match tx {
                    Some(tx) => {
                        let (output, job) = self.execute(Some(tx)).await?;
                        if let Some(job) = job {
                            tx.defer(job);
                        }
                        Ok(output)
                    }
                    None if self.needs_transaction() => {
                        let config = self.db().config().transaction_config();
                        let query = self.clone();
                        self.db()
                            .transaction_with(config, move |tx| async move {
                                let (output, job) = query.execute(Some(&tx)).await?;
                                if let Some(job) = job {
                                    tx.defer(job);
                                }
                                Ok(output)
                            })
                            .await
                    }
                    None => {
                        let (output, job) = self.execute(None).await?;
                        if let Some(job) = job {
                            job.spawn();
                        }
                        Ok(output)
                    }
                }
            }
            .instrument(span),
        )
    }

    async fn execute(&self, tx: Option<&TransactionContext>) -> QueryResult<(QueryOutput, Option<AfterCommitJob>)> {
        let kind = self.kind();
        let return_type = self.return_type();
        let table = self.table().name().to_string();
        let bare_write = kind.is_write() && self.state().select.is_empty();

        let before = self.state().hooks.before(kind);
        if !before.is_empty() {
            let ctx = HookContext {
                query: self.clone(),
                rows: Arc::new(Vec::new()),
                transaction: tx.cloned(),
            };
            run_phase(&before, &ctx).await?;
        }

        let mut query = match tx {
            Some(tx) => nested::run_prepend(self, tx).await?,
            None => self.clone(),
        };
        let hidden = hidden_columns(&query);
        if !hidden.is_empty() {
            query.select_mut(hidden.iter().map(String::as_str));
        }
        let append = !query.state().nested.append.is_empty();
        if append && return_type.is_single() {
            // Appended writes need every parent row; the caller's shape is applied at the end.
            query = query.all();
        }

        let compiled = query.to_sql()?;
        let adapter: &Arc<dyn Adapter> = match tx {
            Some(tx) => tx.adapter(),
            None => query.db().adapter(),
        };
        let state = query.state();

        let use_arrays = return_type.prefers_arrays()
            && hidden.is_empty()
            && state.loads.is_empty()
            && !append
            && !bare_write
            && !state.hooks.has_after(kind);
        if let (true, Some(sql)) = (use_arrays, compiled.as_single()) {
            let started = Instant::now();
            let result = adapter
                .arrays(sql)
                .await
                .map_err(|e| QueryError::database(e, &sql.text, &sql.values).with_table(&table))?;
            log_statement(&query, sql, started.elapsed(), result.row_count);
            let output = shape_arrays(return_type, result, &state.parsers, state.value_default.as_ref(), &table)?;
            return Ok((output, None));
        }

        let mut rows: Vec<Row> = Vec::new();
        let mut row_count = 0;
        for sql in compiled.statements() {
            let started = Instant::now();
            let result = adapter
                .query(sql)
                .await
                .map_err(|e| QueryError::database(e, &sql.text, &sql.values).with_table(&table))?;
            log_statement(&query, sql, started.elapsed(), result.row_count);
            let (parsed, count) = parse_records(result, &state.parsers);
            rows.extend(parsed);
            row_count += count;
        }

        load_relations(&query, &mut rows, tx).await?;

        if append {
            let tx = tx.ok_or_else(|| QueryError::internal("appended relation writes need a transaction"))?;
            nested::run_append(&query, &rows, tx).await?;
        }

        let rows = Arc::new(rows);
        let after = state.hooks.after(kind, row_count > 0);
        if !after.is_empty() {
            let ctx = HookContext {
                query: query.clone(),
                rows: rows.clone(),
                transaction: tx.cloned(),
            };
            run_phase(&after, &ctx).await?;
        }
        let job = if kind.is_write() && row_count > 0 {
            after_commit_job(&query, &rows)
        } else {
            None
        };

        let mut rows = Arc::try_unwrap(rows).unwrap_or_else(|shared| (*shared).clone());
        if !hidden.is_empty() {
            for row in rows.iter_mut() {
                for column in &hidden {
                    row.shift_remove(column);
                }
            }
        }

        let output = if bare_write {
            shape_count(return_type, row_count, &state.parsers, &table)?
        } else {
            shape_rows(return_type, rows, row_count, &state.parsers, state.value_default.as_ref(), &table)?
        };
        Ok((output, job))
    }

    /// Update the single row this query matches, or insert `create` when
    /// none matches. Equality conditions of the query are copied into the
    /// inserted row.
    ///
    /// Fails with `NotUnique` when the update matched more than one row; the
    /// update is rolled back. Resolves to the written row when the query
    /// selects columns, and to nothing otherwise.
    pub async fn upsert(&self, update: Data, create: Data) -> QueryResult<QueryOutput> {
        let query = self.clone();
        self.db()
            .transaction(move |tx| async move { query.upsert_in(&tx, update, create).await })
            .await
    }

    /// [`upsert`](Self::upsert) inside an existing transaction.
    pub async fn upsert_in(&self, tx: &TransactionContext, update: Data, create: Data) -> QueryResult<QueryOutput> {
        let state = self.state();
        let selects = !state.select.is_empty();
        let table = state.table.name().to_string();

        let updated = self.update(update)?.all().exec_in(tx).await?;
        let matched = updated.row_count();
        if matched > 1 {
            return Err(QueryError::not_unique(&table, matched));
        }
        if matched == 1 {
            debug!(table = %table, "Upsert updated an existing row");
            return Ok(if selects { QueryOutput::One(updated.into_row()) } else { QueryOutput::Void });
        }

        let mut data = Data::new();
        if state.or.is_empty() {
            for filter in &state.and {
                for (column, value) in filter.equalities() {
                    let column = column.rsplit('.').next().unwrap_or(column);
                    data.insert(column, value.clone());
                }
            }
        }
        for (column, value) in create {
            data.insert(column, value);
        }

        let insert = Query::new(self.db().clone(), state.table.clone())
            .with(|s| {
                s.select = state.select.clone();
                s.hooks = state.hooks.clone();
            })
            .insert(data)?;
        debug!(table = %table, "Upsert inserted a new row");
        if selects {
            Ok(QueryOutput::One(insert.take().exec_in(tx).await?.into_row()))
        } else {
            insert.exec_in(tx).await?;
            Ok(QueryOutput::Void)
        }
    }
}
