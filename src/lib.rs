//! # Quill
//!
//! A relational query builder runtime for Rust.
//!
//! Quill provides:
//! - Immutable query chains that can be reused as bases for other queries
//! - Parameterized PostgreSQL statements, batched when they outgrow the bind limit
//! - Nested relation writes that commit or roll back with their parent
//! - Lifecycle hooks, including hooks deferred until after commit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quill::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> QueryResult<()> {
//!     let db = Db::builder(adapter)
//!         .table(
//!             TableDef::new("users")
//!                 .columns(["id", "name", "email"])
//!                 .has_many("posts", "posts", "id", "author_id"),
//!         )
//!         .table(TableDef::new("posts").columns(["id", "title", "author_id"]))
//!         .build()?;
//!
//!     let id = db
//!         .table("users")?
//!         .insert(
//!             Data::new()
//!                 .set("name", "Ann")
//!                 .set("posts", NestedWrite::create(Data::new().set("title", "Hello"))),
//!         )?
//!         .get("id")
//!         .exec()
//!         .await?
//!         .into_value();
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use quill_query::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use quill_query::prelude::*;
}
