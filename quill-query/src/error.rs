//! Error types for query construction, compilation and execution.
//!
//! Error codes follow a pattern: Q{category}{number}
//! - 1xxx: Query errors (not found, not unique, invalid column, ...)
//! - 2xxx: Construction errors (unconditional writes, bad payloads)
//! - 3xxx: Relation errors
//! - 4xxx: Transaction errors
//! - 5xxx: Execution errors (database, raw SQL variables)
//! - 9xxx: Internal errors
//!
//! ```rust
//! use quill_query::{QueryError, ErrorCode};
//!
//! let err = QueryError::not_found("users");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert!(err.to_string().contains("users"));
//! ```

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::value::{Row, Value};

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Boxed error produced by an adapter.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Query errors (1xxx)
    /// Record not found (Q1001).
    RecordNotFound = 1001,
    /// Multiple records matched when one was expected (Q1002).
    NotUnique = 1002,
    /// Unknown or ambiguous column reference (Q1003).
    InvalidColumn = 1003,
    /// Invalid combination of clauses (Q1004).
    InvalidQuery = 1004,

    // Construction errors (2xxx)
    /// Update or delete without conditions (Q2001).
    UnconditionalWrite = 2001,
    /// Invalid write payload (Q2002).
    InvalidData = 2002,

    // Relation errors (3xxx)
    /// Relation not declared on the table (Q3001).
    UnknownRelation = 3001,
    /// Relation payload nested deeper than one level (Q3002).
    NestingTooDeep = 3002,
    /// Nested operation not supported by the relation kind (Q3003).
    UnsupportedNestedWrite = 3003,

    // Transaction errors (4xxx)
    /// Transaction failed (Q4001).
    TransactionFailed = 4001,

    // Execution errors (5xxx)
    /// Error reported by the database adapter (Q5001).
    DatabaseError = 5001,
    /// Raw SQL references a variable with no value (Q5002).
    MissingVariable = 5002,

    // Internal errors (9xxx)
    /// Internal error (Q9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "Q1001").
    pub fn code(&self) -> String {
        format!("Q{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Record not found",
            Self::NotUnique => "Multiple records found",
            Self::InvalidColumn => "Invalid column reference",
            Self::InvalidQuery => "Invalid query",
            Self::UnconditionalWrite => "Update or delete without conditions",
            Self::InvalidData => "Invalid write payload",
            Self::UnknownRelation => "Unknown relation",
            Self::NestingTooDeep => "Nested relation write too deep",
            Self::UnsupportedNestedWrite => "Unsupported nested write",
            Self::TransactionFailed => "Transaction failed",
            Self::DatabaseError => "Database error",
            Self::MissingVariable => "Missing raw SQL variable",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The table involved.
    pub table: Option<String>,
    /// The column or relation involved.
    pub field: Option<String>,
    /// The SQL text (if available).
    pub sql: Option<String>,
    /// Values bound to the SQL text.
    pub values: Vec<Value>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<BoxError>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.context.table = Some(table.into());
        self
    }

    /// Set the column or relation.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL text and its bound values.
    pub fn with_sql(mut self, sql: impl Into<String>, values: &[Value]) -> Self {
        self.context.sql = Some(sql.into());
        self.context.values = values.to_vec();
        self
    }

    /// Set the source error.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    // ============== Constructor Functions ==============

    /// Create a not found error.
    pub fn not_found(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", table),
        )
        .with_table(&table)
        .with_suggestion("Use take_optional() or get_optional() to get None instead of an error")
    }

    /// Create a not unique error.
    pub fn not_unique(table: impl Into<String>, matched: u64) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::NotUnique,
            format!("Expected at most one {} record but {} matched", table, matched),
        )
        .with_table(&table)
        .with_suggestion("Add more specific conditions to narrow down to a single record")
    }

    /// Create an error for an update or delete with no conditions.
    pub fn unconditional_write(operation: impl Into<String>, table: impl Into<String>) -> Self {
        let operation = operation.into();
        let table = table.into();
        Self::new(
            ErrorCode::UnconditionalWrite,
            format!("Refusing to {} every row of {} without conditions", operation, table),
        )
        .with_context(&operation)
        .with_table(&table)
        .with_suggestion("Add a where_ condition before the write")
        .with_suggestion("Call all_rows() to explicitly target every row")
    }

    /// Create an error for an unknown or ambiguous column reference.
    pub fn invalid_column(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        let reference = reference.into();
        Self::new(
            ErrorCode::InvalidColumn,
            format!("Cannot resolve column `{}`: {}", reference, reason.into()),
        )
        .with_field(reference)
    }

    /// Create an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidQuery, message)
    }

    /// Create an invalid write payload error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidData, message)
    }

    /// Create an unknown relation error.
    pub fn unknown_relation(table: impl Into<String>, relation: impl Into<String>) -> Self {
        let table = table.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::UnknownRelation,
            format!("Table {} has no relation named {}", table, relation),
        )
        .with_table(table)
        .with_field(relation)
    }

    /// Create an error for a relation payload nested inside another one.
    pub fn nesting_too_deep(relation: impl Into<String>) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::NestingTooDeep,
            format!("Nested write into {} contains another relation payload", relation),
        )
        .with_field(relation)
        .with_help("Nested writes are supported one relation level deep; issue the inner write separately")
    }

    /// Create an error for a nested operation the relation kind does not support.
    pub fn unsupported_nested(relation: impl Into<String>, operation: impl Into<String>) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::UnsupportedNestedWrite,
            format!("Relation {} does not support nested {}", relation, operation.into()),
        )
        .with_field(relation)
    }

    /// Create a missing raw SQL variable error.
    pub fn missing_variable(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let name = name.into();
        let sql = sql.into();
        Self::new(
            ErrorCode::MissingVariable,
            format!("Raw SQL references ${} but no value was provided", name),
        )
        .with_field(name)
        .with_sql(sql, &[])
    }

    /// Wrap an adapter error, keeping the statement that produced it.
    pub fn database(source: BoxError, sql: &str, values: &[Value]) -> Self {
        Self::new(ErrorCode::DatabaseError, format!("Database error: {}", source))
            .with_sql(sql, values)
            .with_source(source)
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TransactionFailed,
            format!("Transaction error: {}", message.into()),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message.into()))
    }

    // ============== Error Checks ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a multiplicity error.
    pub fn is_not_unique(&self) -> bool {
        self.code == ErrorCode::NotUnique
    }

    /// Check if this error was raised while building the query, before any SQL was sent.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UnconditionalWrite
                | ErrorCode::InvalidData
                | ErrorCode::InvalidColumn
                | ErrorCode::InvalidQuery
                | ErrorCode::UnknownRelation
                | ErrorCode::NestingTooDeep
                | ErrorCode::UnsupportedNestedWrite
                | ErrorCode::MissingVariable
        )
    }

    /// Check if this error came from the adapter.
    pub fn is_database_error(&self) -> bool {
        self.code == ErrorCode::DatabaseError
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref table) = self.context.table {
            output.push_str(&format!("  → Table: {}\n", table));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }

        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                format!("{}...", &sql[..sql.floor_char_boundary(200)])
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
            if !self.context.values.is_empty() {
                output.push_str(&format!("  → Values: {} bound\n", self.context.values.len()));
            }
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

/// Settle status of one after-commit hook.
#[derive(Debug)]
pub enum HookOutcome {
    /// The hook completed.
    Fulfilled,
    /// The hook failed.
    Rejected(QueryError),
}

/// Per-hook result attached to an [`AfterCommitError`].
#[derive(Debug)]
pub struct HookStatus {
    /// Hook name, when one was given at registration.
    pub name: Option<String>,
    /// How the hook settled.
    pub outcome: HookOutcome,
}

impl HookStatus {
    /// Check if the hook failed.
    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, HookOutcome::Rejected(_))
    }
}

/// One or more after-commit hooks failed.
///
/// The transaction that triggered them is already committed; this error
/// carries the committed rows so handlers can compensate.
#[derive(Error, Debug)]
#[error("{} of {} after-commit hooks failed on {table}", self.rejected().count(), self.statuses.len())]
pub struct AfterCommitError {
    /// Table the committed write targeted.
    pub table: String,
    /// Rows returned by the committed statement.
    pub result: Arc<Vec<Row>>,
    /// Settle status of every hook in the batch, in registration order.
    pub statuses: Vec<HookStatus>,
}

impl AfterCommitError {
    /// Iterate over the failed hooks.
    pub fn rejected(&self) -> impl Iterator<Item = &HookStatus> {
        self.statuses.iter().filter(|s| s.is_rejected())
    }
}
