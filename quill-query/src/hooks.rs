//! Query lifecycle hooks.
//!
//! Hooks are registered per event and kept in registration order. All hooks
//! of one phase are started in that order and run concurrently; the next
//! phase starts only after every hook of the previous one has settled.
//! After-commit hooks run once the outermost transaction has committed, off
//! the caller's path.

use futures::future::join_all;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::adapter::BoxFuture;
use crate::error::{HookOutcome, HookStatus, QueryResult};
use crate::query::Query;
use crate::transaction::TransactionContext;
use crate::types::QueryKind;
use crate::value::Row;

/// Hook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Before any statement.
    BeforeQuery,
    /// After any statement.
    AfterQuery,
    /// Before an insert.
    BeforeCreate,
    /// After an insert that created rows.
    AfterCreate,
    /// After the transaction containing an insert committed.
    AfterCreateCommit,
    /// Before an update.
    BeforeUpdate,
    /// After an update that changed rows.
    AfterUpdate,
    /// After the transaction containing an update committed.
    AfterUpdateCommit,
    /// Before a delete.
    BeforeDelete,
    /// After a delete that removed rows.
    AfterDelete,
    /// After the transaction containing a delete committed.
    AfterDeleteCommit,
}

impl HookEvent {
    fn before_for(kind: QueryKind) -> Option<Self> {
        match kind {
            QueryKind::Insert => Some(Self::BeforeCreate),
            QueryKind::Update => Some(Self::BeforeUpdate),
            QueryKind::Delete => Some(Self::BeforeDelete),
            _ => None,
        }
    }

    fn after_for(kind: QueryKind) -> Option<Self> {
        match kind {
            QueryKind::Insert => Some(Self::AfterCreate),
            QueryKind::Update => Some(Self::AfterUpdate),
            QueryKind::Delete => Some(Self::AfterDelete),
            _ => None,
        }
    }

    fn commit_for(kind: QueryKind) -> Option<Self> {
        match kind {
            QueryKind::Insert => Some(Self::AfterCreateCommit),
            QueryKind::Update => Some(Self::AfterUpdateCommit),
            QueryKind::Delete => Some(Self::AfterDeleteCommit),
            _ => None,
        }
    }
}

/// What a hook receives.
#[derive(Clone)]
pub struct HookContext {
    /// The query being executed.
    pub query: Query,
    /// Rows returned by the statement; empty for before-hooks.
    pub rows: Arc<Vec<Row>>,
    /// The transaction the statement runs in. `None` for after-commit hooks
    /// and for statements outside a transaction.
    pub transaction: Option<TransactionContext>,
}

type HookFn = dyn Fn(HookContext) -> BoxFuture<'static, QueryResult<()>> + Send + Sync;

/// A registered hook.
#[derive(Clone)]
pub struct Hook {
    name: Option<String>,
    func: Arc<HookFn>,
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish()
    }
}

impl Hook {
    /// Create an unnamed hook.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<()>> + Send + 'static,
    {
        Self {
            name: None,
            func: Arc::new(move |ctx: HookContext| {
                let fut: BoxFuture<'static, QueryResult<()>> = Box::pin(func(ctx));
                fut
            }),
        }
    }

    /// Create a named hook; the name shows up in after-commit error reports.
    pub fn named<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<()>> + Send + 'static,
    {
        let mut hook = Self::new(func);
        hook.name = Some(name.into());
        hook
    }

    /// Hook name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn call(&self, ctx: HookContext) -> BoxFuture<'static, QueryResult<()>> {
        (self.func)(ctx)
    }
}

/// Hooks of a table or query, in registration order.
#[derive(Clone, Default)]
pub struct QueryHooks {
    entries: Vec<(HookEvent, Hook)>,
    selects: Vec<(HookEvent, String)>,
}

impl fmt::Debug for QueryHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHooks")
            .field("hooks", &self.entries.len())
            .field("selects", &self.selects)
            .finish()
    }
}

impl QueryHooks {
    /// Register a hook for an event.
    pub fn push(&mut self, event: HookEvent, hook: Hook) {
        self.entries.push((event, hook));
    }

    /// Request columns in the statement's result for hooks of `event`.
    pub fn push_select(&mut self, event: HookEvent, columns: impl IntoIterator<Item = impl Into<String>>) {
        for column in columns {
            let column = column.into();
            if !self.selects.iter().any(|(e, c)| *e == event && *c == column) {
                self.selects.push((event, column));
            }
        }
    }

    /// Append another set of hooks after these.
    pub fn extend(&mut self, other: &QueryHooks) {
        self.entries.extend(other.entries.iter().cloned());
        for (event, column) in &other.selects {
            self.push_select(*event, [column.clone()]);
        }
    }

    /// Check if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching(&self, events: &[Option<HookEvent>]) -> Vec<Hook> {
        self.entries
            .iter()
            .filter(|(event, _)| events.contains(&Some(*event)))
            .map(|(_, hook)| hook.clone())
            .collect()
    }

    /// Hooks to run before a statement of `kind`.
    pub(crate) fn before(&self, kind: QueryKind) -> Vec<Hook> {
        self.matching(&[Some(HookEvent::BeforeQuery), HookEvent::before_for(kind)])
    }

    /// Hooks to run after a statement of `kind`; write hooks only when rows were affected.
    pub(crate) fn after(&self, kind: QueryKind, affected: bool) -> Vec<Hook> {
        let write = if affected { HookEvent::after_for(kind) } else { None };
        self.matching(&[Some(HookEvent::AfterQuery), write])
    }

    /// Hooks to run after commit of a statement of `kind`.
    pub(crate) fn after_commit(&self, kind: QueryKind) -> Vec<Hook> {
        self.matching(&[HookEvent::commit_for(kind)])
    }

    /// Check if any after-hook of `kind` is registered.
    pub(crate) fn has_after(&self, kind: QueryKind) -> bool {
        !self.after(kind, true).is_empty() || !self.after_commit(kind).is_empty()
    }

    /// Columns requested by after and after-commit hooks of `kind`.
    pub(crate) fn selects(&self, kind: QueryKind) -> Vec<String> {
        let events = [HookEvent::after_for(kind), HookEvent::commit_for(kind)];
        let mut columns: Vec<String> = Vec::new();
        for (event, column) in &self.selects {
            if events.contains(&Some(*event)) && !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        columns
    }
}

/// Run one phase: start every hook in order, wait for all of them to settle,
/// then report the first failure.
pub(crate) async fn run_phase(hooks: &[Hook], ctx: &HookContext) -> QueryResult<()> {
    if hooks.is_empty() {
        return Ok(());
    }
    let results = join_all(hooks.iter().map(|hook| hook.call(ctx.clone()))).await;
    results.into_iter().collect()
}

/// Run after-commit hooks, collecting every hook's settle status.
pub(crate) async fn run_settled(hooks: &[Hook], ctx: &HookContext) -> Vec<HookStatus> {
    let results = join_all(hooks.iter().map(|hook| hook.call(ctx.clone()))).await;
    hooks
        .iter()
        .zip(results)
        .map(|(hook, result)| HookStatus {
            name: hook.name.clone(),
            outcome: match result {
                Ok(()) => HookOutcome::Fulfilled,
                Err(e) => HookOutcome::Rejected(e),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Hook {
        Hook::new(|_| async { Ok(()) })
    }

    #[test]
    fn test_phase_selection_keeps_registration_order() {
        let mut hooks = QueryHooks::default();
        hooks.push(HookEvent::BeforeCreate, Hook::named("a", |_| async { Ok(()) }));
        hooks.push(HookEvent::BeforeQuery, Hook::named("b", |_| async { Ok(()) }));
        hooks.push(HookEvent::BeforeUpdate, Hook::named("c", |_| async { Ok(()) }));
        hooks.push(HookEvent::BeforeCreate, Hook::named("d", |_| async { Ok(()) }));

        let names: Vec<_> = hooks
            .before(QueryKind::Insert)
            .iter()
            .map(|h| h.name().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "d"]);
    }

    #[test]
    fn test_after_write_hooks_need_affected_rows() {
        let mut hooks = QueryHooks::default();
        hooks.push(HookEvent::AfterUpdate, noop());
        hooks.push(HookEvent::AfterQuery, noop());
        assert_eq!(hooks.after(QueryKind::Update, true).len(), 2);
        assert_eq!(hooks.after(QueryKind::Update, false).len(), 1);
        assert!(hooks.has_after(QueryKind::Update));
    }

    #[test]
    fn test_selects_deduplicate() {
        let mut hooks = QueryHooks::default();
        hooks.push_select(HookEvent::AfterCreate, ["id", "email"]);
        hooks.push_select(HookEvent::AfterCreateCommit, ["id"]);
        hooks.push_select(HookEvent::AfterCreate, ["id"]);
        assert_eq!(hooks.selects(QueryKind::Insert), ["id", "email"]);
        assert!(hooks.selects(QueryKind::Delete).is_empty());
    }
}
