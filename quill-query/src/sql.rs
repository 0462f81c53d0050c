//! SQL text assembly: identifier quoting, positional parameters and the
//! compiled statement shapes handed to the adapter.

use serde::Serialize;
use std::fmt;

use crate::value::Value;

/// Quote an identifier, doubling any embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Quote a possibly qualified column reference (`table.column`, `column` or `*`).
pub fn quote_column(reference: &str) -> String {
    match reference.split_once('.') {
        Some((table, "*")) => format!("{}.*", quote_identifier(table)),
        Some((table, column)) => format!("{}.{}", quote_identifier(table), quote_identifier(column)),
        None if reference == "*" => "*".to_string(),
        None => quote_identifier(reference),
    }
}

/// Positional placeholder for the 1-based parameter `index`.
#[inline]
pub fn placeholder(index: usize) -> String {
    format!("${}", index)
}

/// One parameterized statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Sql {
    /// Statement text with `$N` placeholders.
    pub text: String,
    /// Bound values; `values[i]` binds `$(i + 1)`.
    pub values: Vec<Value>,
}

impl Sql {
    /// Create a statement.
    pub fn new(text: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            values,
        }
    }
}

impl fmt::Display for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Output of the compiler: a single statement, or a batch when the bound
/// values would exceed the adapter's parameter limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompiledSql {
    /// One statement.
    Single(Sql),
    /// Statements to run sequentially inside one transaction.
    Batch {
        /// The statements, in execution order.
        batch: Vec<Sql>,
    },
}

impl CompiledSql {
    /// Check if this is a batch.
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch { .. })
    }

    /// All statements, in execution order.
    pub fn statements(&self) -> &[Sql] {
        match self {
            Self::Single(sql) => std::slice::from_ref(sql),
            Self::Batch { batch } => batch,
        }
    }

    /// The single statement, if this is not a batch.
    pub fn as_single(&self) -> Option<&Sql> {
        match self {
            Self::Single(sql) => Some(sql),
            Self::Batch { .. } => None,
        }
    }
}

/// Incremental builder for one statement.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    text: String,
    values: Vec<Value>,
}

impl SqlBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push literal SQL.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.text.push_str(sql.as_ref());
        self
    }

    /// Bind a value and push its placeholder.
    pub fn push_param(&mut self, value: impl Into<Value>) -> &mut Self {
        self.values.push(value.into());
        let index = self.values.len();
        self.text.push_str(&placeholder(index));
        self
    }

    /// Push a quoted identifier.
    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        self.text.push_str(&quote_identifier(name));
        self
    }

    /// Push items separated by `sep`, rendering each with `f`.
    pub fn push_list<T, F>(&mut self, items: &[T], sep: &str, mut f: F) -> &mut Self
    where
        F: FnMut(&mut Self, &T),
    {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.text.push_str(sep);
            }
            f(self, item);
        }
        self
    }

    /// Number of values bound so far.
    pub fn param_count(&self) -> usize {
        self.values.len()
    }

    /// Index the next bound value will get.
    pub fn next_param_index(&self) -> usize {
        self.values.len() + 1
    }

    /// Current text.
    pub fn sql(&self) -> &str {
        &self.text
    }

    /// Finish the statement.
    pub fn build(self) -> Sql {
        Sql {
            text: self.text,
            values: self.values,
        }
    }
}
