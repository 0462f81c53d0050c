//! Raw SQL fragments with positional and named variables.
//!
//! A fragment may reference its own positional values as `$1`, `$2`, ... and
//! named variables as `$name`. `$$name` inserts `name` as a quoted identifier.
//! When the fragment is embedded into a larger statement every reference is
//! renumbered into the statement's positional sequence, so fragments compose
//! freely.
//!
//! ```rust
//! use quill_query::{RawSql, SqlBuilder};
//!
//! let raw = RawSql::new("age > $min AND $$kind = $1")
//!     .bind("admin")
//!     .var("min", 18);
//!
//! let mut out = SqlBuilder::new();
//! out.push("SELECT * FROM users WHERE id = ").push_param(7).push(" AND ");
//! raw.render(&mut out).unwrap();
//!
//! let sql = out.build();
//! assert_eq!(sql.text, "SELECT * FROM users WHERE id = $1 AND age > $2 AND \"kind\" = $3");
//! assert_eq!(sql.values.len(), 3);
//! ```
//!
//! Values are always bound, never interpolated:
//!
//! ```rust
//! use quill_query::raw;
//!
//! let malicious = "'; DROP TABLE users; --";
//! let sql = raw!("SELECT * FROM users WHERE name = {}", malicious).to_sql().unwrap();
//! assert_eq!(sql.values.len(), 1);
//! assert!(!sql.text.contains("DROP TABLE"));
//! ```

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::error::{QueryError, QueryResult};
use crate::sql::{Sql, SqlBuilder, placeholder};
use crate::value::Value;

/// A raw SQL fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSql {
    text: String,
    values: Vec<Value>,
    vars: IndexMap<String, Value>,
}

impl RawSql {
    /// Create a fragment from literal text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Append literal SQL.
    pub fn push(mut self, sql: impl AsRef<str>) -> Self {
        self.text.push_str(sql.as_ref());
        self
    }

    /// Add a positional value referenced as `$N` in the text.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Append a placeholder and bind a value to it.
    pub fn push_bind(mut self, sql: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.text.push_str(sql.as_ref());
        self.values.push(value.into());
        self.text.push_str(&placeholder(self.values.len()));
        self
    }

    /// Set a named variable referenced as `$name`.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Set several named variables.
    pub fn vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in vars {
            self.vars.insert(k.into(), v.into());
        }
        self
    }

    /// The fragment text as written.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Check if the fragment has no text.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Upper bound of the parameters this fragment binds.
    pub(crate) fn param_estimate(&self) -> usize {
        self.values.len() + self.vars.len()
    }

    /// Render this fragment as a standalone statement.
    pub fn to_sql(&self) -> QueryResult<Sql> {
        let mut out = SqlBuilder::new();
        self.render(&mut out)?;
        Ok(out.build())
    }

    /// Render the fragment into `out`, renumbering every reference into
    /// `out`'s positional sequence.
    ///
    /// Quoted literals and quoted identifiers are copied verbatim.
    pub fn render(&self, out: &mut SqlBuilder) -> QueryResult<()> {
        let text = self.text.as_str();
        let bytes = text.as_bytes();
        let mut positional: Vec<Option<usize>> = vec![None; self.values.len()];
        let mut named: HashMap<&str, usize> = HashMap::new();
        let mut start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                quote @ (b'\'' | b'"') => {
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == quote {
                            if bytes.get(i + 1) == Some(&quote) {
                                i += 2;
                                continue;
                            }
                            break;
                        }
                        i += 1;
                    }
                    i += 1;
                }
                b'$' => {
                    out.push(&text[start..i]);
                    let next = bytes.get(i + 1).copied();
                    if next == Some(b'$') && bytes.get(i + 2).is_some_and(|b| is_ident_start(*b)) {
                        let end = scan_ident(bytes, i + 2);
                        out.push_identifier(&text[i + 2..end]);
                        i = end;
                    } else if next.is_some_and(|b| b.is_ascii_digit()) {
                        let end = scan_while(bytes, i + 1, |b| b.is_ascii_digit());
                        let n: usize = text[i + 1..end].parse().unwrap_or(0);
                        let slot = n.checked_sub(1).and_then(|k| positional.get_mut(k)).ok_or_else(|| {
                            QueryError::invalid_query(format!(
                                "raw SQL references ${} but only {} values are bound",
                                n,
                                self.values.len()
                            ))
                            .with_sql(text, &self.values)
                        })?;
                        bind_once(out, slot, &self.values[n - 1]);
                        i = end;
                    } else if next.is_some_and(is_ident_start) {
                        let end = scan_ident(bytes, i + 1);
                        let name = &text[i + 1..end];
                        let value = self
                            .vars
                            .get(name)
                            .ok_or_else(|| QueryError::missing_variable(name, text))?;
                        let mut slot = named.get(name).copied();
                        bind_once(out, &mut slot, value);
                        if let Some(index) = slot {
                            named.insert(name, index);
                        }
                        i = end;
                    } else {
                        out.push("$");
                        i += 1;
                    }
                    start = i;
                }
                _ => i += 1,
            }
        }
        out.push(&text[start.min(text.len())..]);
        Ok(())
    }
}

fn bind_once(out: &mut SqlBuilder, slot: &mut Option<usize>, value: &Value) {
    match slot {
        Some(index) => {
            out.push(placeholder(*index));
        }
        None => {
            *slot = Some(out.next_param_index());
            out.push_param(value.clone());
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn scan_ident(bytes: &[u8], from: usize) -> usize {
    scan_while(bytes, from, |b| b.is_ascii_alphanumeric() || b == b'_')
}

fn scan_while(bytes: &[u8], from: usize, pred: impl Fn(u8) -> bool) -> usize {
    let mut end = from;
    while end < bytes.len() && pred(bytes[end]) {
        end += 1;
    }
    end
}

impl From<&str> for RawSql {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for RawSql {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Build a [`RawSql`] fragment, binding each argument to a `{}` slot.
///
/// ```rust
/// use quill_query::raw;
///
/// let frag = raw!("age > {} AND name = {}", 18, "Ann");
/// assert_eq!(frag.text(), "age > $1 AND name = $2");
/// ```
#[macro_export]
macro_rules! raw {
    ($sql:expr) => {
        $crate::raw::RawSql::new($sql)
    };
    ($sql:expr, $($arg:expr),+ $(,)?) => {{
        let mut parts = $sql.split("{}");
        let mut frag = $crate::raw::RawSql::new(parts.next().unwrap_or_default());
        $(
            frag = frag.push_bind("", $arg);
            frag = frag.push(parts.next().unwrap_or_default());
        )+
        frag
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_values_are_renumbered() {
        let raw = RawSql::new("a = $1 OR b = $1 OR c = $2").bind(1).bind(2);
        let mut out = SqlBuilder::new();
        out.push_param("x").push(" AND ");
        raw.render(&mut out).unwrap();
        let sql = out.build();
        assert_eq!(sql.text, "$1 AND a = $2 OR b = $2 OR c = $3");
        assert_eq!(sql.values, vec![Value::from("x"), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_named_variables_bind_once() {
        let sql = RawSql::new("x = $v OR y = $v").var("v", 5).to_sql().unwrap();
        assert_eq!(sql.text, "x = $1 OR y = $1");
        assert_eq!(sql.values, vec![Value::Int(5)]);
    }

    #[test]
    fn test_missing_variable() {
        let err = RawSql::new("x = $nope").to_sql().unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::MissingVariable);
    }

    #[test]
    fn test_positional_out_of_range() {
        assert!(RawSql::new("x = $2").bind(1).to_sql().is_err());
        assert!(RawSql::new("x = $0").to_sql().is_err());
    }

    #[test]
    fn test_quoted_text_is_left_alone() {
        let sql = RawSql::new("note = '$price' AND \"$col\" = $1 AND cost = '$$'")
            .bind(3)
            .to_sql()
            .unwrap();
        assert_eq!(sql.text, "note = '$price' AND \"$col\" = $1 AND cost = '$$'");
    }

    #[test]
    fn test_identifier_reference() {
        let sql = RawSql::new("$$order DESC").to_sql().unwrap();
        assert_eq!(sql.text, "\"order\" DESC");
    }

    #[test]
    fn test_bare_dollar_and_casts() {
        let sql = RawSql::new("$1::int + $ 1").bind(4).to_sql().unwrap();
        assert_eq!(sql.text, "$1::int + $ 1");
    }

    #[test]
    fn test_raw_macro() {
        let frag = raw!("SELECT {} + {}", 1, 2);
        let sql = frag.to_sql().unwrap();
        assert_eq!(sql.text, "SELECT $1 + $2");
        assert_eq!(sql.values, vec![Value::Int(1), Value::Int(2)]);
    }
}
