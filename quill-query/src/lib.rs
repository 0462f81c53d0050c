//! # quill-query
//!
//! Query construction, SQL compilation and transactional execution for the
//! Quill ORM.
//!
//! This crate provides:
//! - Immutable query descriptors with copy-on-write chain methods
//! - Parameterized PostgreSQL compilation with insert batching
//! - Lifecycle hooks, including hooks that run after commit
//! - Nested relation writes executed atomically with the parent write
//! - Relation loading and result shaping per return type
//!
//! ## Building Queries
//!
//! Every chain method returns a new query; the receiver is never changed.
//!
//! ```rust,ignore
//! use quill_query::{Db, Filter, OrderItem, TableDef};
//!
//! let db = Db::builder(adapter)
//!     .table(TableDef::new("users").columns(["id", "name", "age"]))
//!     .build()?;
//!
//! let users = db.table("users")?;
//! let adults = users.r#where(Filter::gte("age", 18)).order_by(OrderItem::desc("age"));
//!
//! let sql = adults.select(["name"]).to_sql()?;
//! assert_eq!(
//!     sql.as_single().unwrap().text,
//!     r#"SELECT "users"."name" FROM "users" WHERE "users"."age" >= $1 ORDER BY "users"."age" DESC"#
//! );
//! ```
//!
//! ## Filters
//!
//! ```rust
//! use quill_query::{Filter, Value};
//!
//! let filter = Filter::and([
//!     Filter::eq("active", true),
//!     Filter::or([Filter::eq("role", "admin"), Filter::eq("role", "owner")]),
//! ]);
//! assert!(!filter.is_none());
//!
//! let from_tuple: Filter = ("email", "a@example.com").into();
//! assert_eq!(from_tuple, Filter::Equals("email".into(), Value::from("a@example.com")));
//! ```
//!
//! ## Raw SQL
//!
//! ```rust
//! use quill_query::raw;
//!
//! let frag = raw!("age > {} AND name = {}", 18, "Ann");
//! assert_eq!(frag.text(), "age > $1 AND name = $2");
//! ```
//!
//! ## Executing
//!
//! ```rust,ignore
//! // Standalone: a transaction is opened when the query needs one.
//! let count = users.count().exec().await?.into_value();
//!
//! // Inside a transaction: pass the context explicitly.
//! db.transaction(|tx| async move {
//!     let id = users.insert(Data::new().set("name", "Ann"))?.get("id").exec_in(&tx).await?;
//!     posts.insert(Data::new().set("author_id", id.into_value()))?.exec_in(&tx).await?;
//!     Ok(())
//! })
//! .await?;
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use quill_query::{QueryError, ErrorCode};
//!
//! let err = QueryError::not_found("users");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! ```

pub mod adapter;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod logging;
pub mod nested;
pub mod parse;
pub mod query;
pub mod raw;
pub mod relations;
pub mod sql;
pub mod table;
pub mod transaction;
pub mod types;
pub mod value;

mod compile;
mod execute;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{Adapter, AdapterResult, ArraysResult, BoxFuture, FieldInfo, RecordsResult, TransactionScope};
pub use config::{DEFAULT_MAX_BIND_PARAMS, QueryConfig, QueryConfigBuilder};
pub use db::{AfterCommitErrorHandler, Db, DbBuilder};
pub use error::{
    AfterCommitError, BoxError, ErrorCode, ErrorContext, HookOutcome, HookStatus, QueryError, QueryResult,
};
pub use filter::{CompareOp, Filter};
pub use hooks::{Hook, HookContext, HookEvent, QueryHooks};
pub use nested::NestedWrite;
pub use parse::{ParseFn, Parsers, QueryOutput};
pub use query::{
    ConflictAction, Cte, CteBody, Data, FromSource, Join, JoinOn, JoinTarget, OnBuilder, OnConflict,
    OnConflictBuilder, Query, TruncateOptions, WriteValue,
};
pub use raw::RawSql;
pub use relations::{JoinTable, Relation, RelationKind, RelationLoad};
pub use sql::{CompiledSql, Sql, SqlBuilder};
pub use table::{ColumnDef, TableDef};
pub use transaction::{AccessMode, IsolationLevel, TransactionConfig, TransactionContext};
pub use types::{
    AggregateFn, JoinKind, NullsOrder, OrderItem, OrderTarget, QueryKind, ReturnType, SelectItem, SortOrder,
    UnionKind, WindowDef,
};
pub use value::{Row, Value};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::adapter::Adapter;
    pub use crate::db::Db;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::filter::Filter;
    pub use crate::nested::NestedWrite;
    pub use crate::parse::QueryOutput;
    pub use crate::query::{Data, Query, WriteValue};
    pub use crate::raw;
    pub use crate::raw::RawSql;
    pub use crate::table::TableDef;
    pub use crate::transaction::{IsolationLevel, TransactionConfig, TransactionContext};
    pub use crate::types::{OrderItem, SortOrder};
    pub use crate::value::{Row, Value};
}
