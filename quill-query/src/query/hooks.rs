//! Query-level hooks. They run after the table-level hooks of the same event.

use std::future::Future;
use std::sync::Arc;

use crate::error::{AfterCommitError, QueryResult};
use crate::hooks::{Hook, HookContext, HookEvent};

use super::Query;

macro_rules! hook_methods {
    ($($(#[$doc:meta])* $name:ident => [$($event:ident),+];)*) => {
        $(
            $(#[$doc])*
            pub fn $name<F, Fut>(&self, f: F) -> Query
            where
                F: Fn(HookContext) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = QueryResult<()>> + Send + 'static,
            {
                self.hook_for(&[$(HookEvent::$event),+], Vec::new(), Hook::new(f))
            }
        )*
    };
}

macro_rules! hook_select_methods {
    ($($(#[$doc:meta])* $name:ident => [$($event:ident),+];)*) => {
        $(
            $(#[$doc])*
            pub fn $name<F, Fut>(&self, columns: impl IntoIterator<Item = impl Into<String>>, f: F) -> Query
            where
                F: Fn(HookContext) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = QueryResult<()>> + Send + 'static,
            {
                let columns = columns.into_iter().map(Into::into).collect();
                self.hook_for(&[$(HookEvent::$event),+], columns, Hook::new(f))
            }
        )*
    };
}

impl Query {
    /// Register a hook for one or more events. `columns` are added to the
    /// statement's result for after-hooks and stripped from the caller's
    /// result if the caller did not select them.
    pub fn hook_for(&self, events: &[HookEvent], columns: Vec<String>, hook: Hook) -> Query {
        self.with(|s| {
            for event in events {
                s.hooks.push_select(*event, columns.iter().cloned());
                s.hooks.push(*event, hook.clone());
            }
        })
    }

    hook_methods! {
        /// Run before the statement, whatever its kind.
        before_query => [BeforeQuery];
        /// Run after the statement, whatever its kind.
        after_query => [AfterQuery];
        /// Run before an insert.
        before_create => [BeforeCreate];
        /// Run after an insert that created rows.
        after_create => [AfterCreate];
        /// Run once the transaction containing the insert has committed.
        after_create_commit => [AfterCreateCommit];
        /// Run before an update.
        before_update => [BeforeUpdate];
        /// Run after an update that changed rows.
        after_update => [AfterUpdate];
        /// Run once the transaction containing the update has committed.
        after_update_commit => [AfterUpdateCommit];
        /// Run before a delete.
        before_delete => [BeforeDelete];
        /// Run after a delete that removed rows.
        after_delete => [AfterDelete];
        /// Run once the transaction containing the delete has committed.
        after_delete_commit => [AfterDeleteCommit];
        /// Run before an insert or an update.
        before_save => [BeforeCreate, BeforeUpdate];
        /// Run after an insert or an update that affected rows.
        after_save => [AfterCreate, AfterUpdate];
        /// Run once the transaction containing the insert or update has committed.
        after_save_commit => [AfterCreateCommit, AfterUpdateCommit];
    }

    hook_select_methods! {
        /// [`after_create`](Self::after_create) with columns it needs in the result.
        after_create_select => [AfterCreate];
        /// [`after_create_commit`](Self::after_create_commit) with columns it needs in the result.
        after_create_commit_select => [AfterCreateCommit];
        /// [`after_update`](Self::after_update) with columns it needs in the result.
        after_update_select => [AfterUpdate];
        /// [`after_update_commit`](Self::after_update_commit) with columns it needs in the result.
        after_update_commit_select => [AfterUpdateCommit];
        /// [`after_delete`](Self::after_delete) with columns it needs in the result.
        after_delete_select => [AfterDelete];
        /// [`after_delete_commit`](Self::after_delete_commit) with columns it needs in the result.
        after_delete_commit_select => [AfterDeleteCommit];
        /// [`after_save`](Self::after_save) with columns it needs in the result.
        after_save_select => [AfterCreate, AfterUpdate];
        /// [`after_save_commit`](Self::after_save_commit) with columns it needs in the result.
        after_save_commit_select => [AfterCreateCommit, AfterUpdateCommit];
    }

    /// Handle after-commit hook failures of this query instead of the
    /// database-level handler.
    pub fn catch_after_commit_error<F>(&self, handler: F) -> Query
    where
        F: Fn(&AfterCommitError) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.with(|s| s.after_commit_error = Some(handler))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{db, users};
    use crate::types::QueryKind;

    #[test]
    fn test_save_hooks_cover_create_and_update() {
        let db = db();
        let q = users(&db).before_save(|_| async { Ok(()) });
        assert_eq!(q.state().hooks.before(QueryKind::Insert).len(), 1);
        assert_eq!(q.state().hooks.before(QueryKind::Update).len(), 1);
        assert!(q.state().hooks.before(QueryKind::Delete).is_empty());
    }

    #[test]
    fn test_hook_select_columns_are_recorded() {
        let db = db();
        let q = users(&db).after_update_commit_select(["email"], |_| async { Ok(()) });
        assert_eq!(q.state().hooks.selects(QueryKind::Update), ["email"]);
        assert!(q.state().hooks.selects(QueryKind::Insert).is_empty());
    }

    #[test]
    fn test_hooks_do_not_leak_into_base() {
        let db = db();
        let base = users(&db);
        let _hooked = base.after_query(|_| async { Ok(()) });
        assert!(base.state().hooks.is_empty());
    }
}
