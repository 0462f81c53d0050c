//! Result parsing: per-column parse functions and shaping raw adapter
//! results into the value a query's return type promises.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::{ArraysResult, RecordsResult};
use crate::error::{QueryError, QueryResult};
use crate::types::ReturnType;
use crate::value::{Row, Value};

/// A function turning a raw column value into its application value.
pub type ParseFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Parse functions of a query.
///
/// Column parsers are keyed by result-column name. The value parser applies
/// to the single value extracted by `value`-style return types and takes
/// precedence over the column parser of that column.
#[derive(Clone, Default)]
pub struct Parsers {
    columns: IndexMap<String, ParseFn>,
    value: Option<ParseFn>,
}

impl fmt::Debug for Parsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parsers")
            .field("columns", &self.columns.keys().collect::<Vec<_>>())
            .field("value", &self.value.is_some())
            .finish()
    }
}

impl Parsers {
    /// Register a parser for a result column.
    pub fn set_column(&mut self, column: impl Into<String>, parse: ParseFn) {
        self.columns.insert(column.into(), parse);
    }

    /// Register the parser for extracted single values.
    pub fn set_value(&mut self, parse: ParseFn) {
        self.value = Some(parse);
    }

    /// Parser registered for a column.
    pub fn column(&self, column: &str) -> Option<&ParseFn> {
        self.columns.get(column)
    }

    /// Parser registered for extracted values.
    pub fn value(&self) -> Option<&ParseFn> {
        self.value.as_ref()
    }

    /// Check if no parser is registered.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.value.is_none()
    }

    /// Apply column parsers to a record in place.
    pub fn parse_row(&self, row: &mut Row) {
        if self.columns.is_empty() {
            return;
        }
        for (key, value) in row.iter_mut() {
            if let Some(parse) = self.columns.get(key) {
                *value = parse(std::mem::take(value));
            }
        }
    }

    /// Apply column parsers to an array row, using `fields` to name positions.
    pub fn parse_array(&self, fields: &[String], row: &mut [Value]) {
        if self.columns.is_empty() {
            return;
        }
        for (value, name) in row.iter_mut().zip(fields) {
            if let Some(parse) = self.columns.get(name) {
                *value = parse(std::mem::take(value));
            }
        }
    }

    /// Parse an extracted single value from column `field`: the column
    /// parser first, then the value parser, as records are parsed.
    pub fn parse_value(&self, field: Option<&str>, value: Value) -> Value {
        let value = match field.and_then(|f| self.columns.get(f)) {
            Some(parse) => parse(value),
            None => value,
        };
        self.parse_extracted(value)
    }

    /// Apply only the value parser; column parsers already ran on the record.
    pub(crate) fn parse_extracted(&self, value: Value) -> Value {
        match &self.value {
            Some(parse) => parse(value),
            None => value,
        }
    }
}

/// What a query resolves to, one variant per return type.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Every row as a record.
    All(Vec<Row>),
    /// At most one record.
    One(Option<Row>),
    /// Every row as an array.
    Rows(Vec<Vec<Value>>),
    /// One column of every row.
    Pluck(Vec<Value>),
    /// A single value.
    Value(Option<Value>),
    /// Affected row count.
    RowCount(u64),
    /// Nothing.
    Void,
}

impl QueryOutput {
    /// Records, for `All` and `One` outputs.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::All(rows) => rows,
            Self::One(row) => row.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// The single record of a `One` output, or the first of `All`.
    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::One(row) => row,
            Self::All(rows) => rows.into_iter().next(),
            _ => None,
        }
    }

    /// Array rows of a `Rows` output.
    pub fn into_arrays(self) -> Vec<Vec<Value>> {
        match self {
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// Values of a `Pluck` output.
    pub fn into_pluck(self) -> Vec<Value> {
        match self {
            Self::Pluck(values) => values,
            _ => Vec::new(),
        }
    }

    /// The value of a `Value` output; `RowCount` converts to an integer.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => value,
            Self::RowCount(n) => Some(Value::Int(n as i64)),
            _ => None,
        }
    }

    /// Affected or returned row count.
    pub fn row_count(&self) -> u64 {
        match self {
            Self::RowCount(n) => *n,
            Self::All(rows) => rows.len() as u64,
            Self::One(row) => row.is_some() as u64,
            Self::Rows(rows) => rows.len() as u64,
            Self::Pluck(values) => values.len() as u64,
            Self::Value(value) => value.is_some() as u64,
            Self::Void => 0,
        }
    }

    /// Empty output for a return type, used when a query is known to match nothing.
    pub(crate) fn empty(return_type: ReturnType, default: Option<&Value>, table: &str) -> QueryResult<Self> {
        Ok(match return_type {
            ReturnType::All => Self::All(Vec::new()),
            ReturnType::One => Self::One(None),
            ReturnType::Rows => Self::Rows(Vec::new()),
            ReturnType::Pluck => Self::Pluck(Vec::new()),
            ReturnType::Value => Self::Value(default.cloned()),
            ReturnType::RowCount => Self::RowCount(0),
            ReturnType::Void => Self::Void,
            ReturnType::OneOrThrow | ReturnType::ValueOrThrow => {
                return Err(QueryError::not_found(table));
            }
        })
    }
}

/// Shape parsed records into the output for `return_type`.
///
/// `rows` are already parsed by [`Parsers::parse_row`]; extracted values
/// only go through the value parser.
pub(crate) fn shape_rows(
    return_type: ReturnType,
    rows: Vec<Row>,
    row_count: u64,
    parsers: &Parsers,
    default: Option<&Value>,
    table: &str,
) -> QueryResult<QueryOutput> {
    Ok(match return_type {
        ReturnType::All => QueryOutput::All(rows),
        ReturnType::One => QueryOutput::One(rows.into_iter().next()),
        ReturnType::OneOrThrow => match rows.into_iter().next() {
            Some(row) => QueryOutput::One(Some(row)),
            None => return Err(QueryError::not_found(table)),
        },
        ReturnType::Rows => QueryOutput::Rows(
            rows.into_iter().map(|row| row.into_values().collect()).collect(),
        ),
        ReturnType::Pluck => QueryOutput::Pluck(
            rows.into_iter()
                .filter_map(|row| row.into_iter().next())
                .map(|(_, value)| parsers.parse_extracted(value))
                .collect(),
        ),
        ReturnType::Value | ReturnType::ValueOrThrow => {
            let first = rows.into_iter().next().and_then(|row| row.into_iter().next());
            match first {
                Some((_, value)) => QueryOutput::Value(Some(parsers.parse_extracted(value))),
                None if return_type == ReturnType::ValueOrThrow => {
                    return Err(QueryError::not_found(table));
                }
                None => QueryOutput::Value(default.cloned()),
            }
        }
        ReturnType::RowCount => QueryOutput::RowCount(row_count),
        ReturnType::Void => QueryOutput::Void,
    })
}

/// Shape an array result. Only array-friendly return types reach here.
pub(crate) fn shape_arrays(
    return_type: ReturnType,
    result: ArraysResult,
    parsers: &Parsers,
    default: Option<&Value>,
    table: &str,
) -> QueryResult<QueryOutput> {
    let fields: Vec<String> = result.fields.iter().map(|f| f.name.clone()).collect();
    let first_field = fields.first().map(String::as_str);
    Ok(match return_type {
        ReturnType::Rows => {
            let mut rows = result.rows;
            for row in rows.iter_mut() {
                parsers.parse_array(&fields, row);
            }
            QueryOutput::Rows(rows)
        }
        ReturnType::Pluck => QueryOutput::Pluck(
            result
                .rows
                .into_iter()
                .filter_map(|row| row.into_iter().next())
                .map(|value| parsers.parse_value(first_field, value))
                .collect(),
        ),
        ReturnType::Value | ReturnType::ValueOrThrow => {
            match result.rows.into_iter().next().and_then(|row| row.into_iter().next()) {
                Some(value) => QueryOutput::Value(Some(parsers.parse_value(first_field, value))),
                None if return_type == ReturnType::ValueOrThrow => {
                    return Err(QueryError::not_found(table));
                }
                None => QueryOutput::Value(default.cloned()),
            }
        }
        other => {
            return Err(QueryError::internal(format!(
                "return type {:?} cannot be read from row arrays",
                other
            )));
        }
    })
}

/// Parse a record result in place and hand back its rows.
pub(crate) fn parse_records(result: RecordsResult, parsers: &Parsers) -> (Vec<Row>, u64) {
    let mut rows = result.rows;
    for row in rows.iter_mut() {
        parsers.parse_row(row);
    }
    (rows, result.row_count)
}

/// Shape a write statement that returned no columns: only the row count is known.
pub(crate) fn shape_count(
    return_type: ReturnType,
    row_count: u64,
    parsers: &Parsers,
    table: &str,
) -> QueryResult<QueryOutput> {
    Ok(match return_type {
        ReturnType::Void => QueryOutput::Void,
        ReturnType::Value => QueryOutput::Value(Some(parsers.parse_value(None, Value::Int(row_count as i64)))),
        ReturnType::ValueOrThrow | ReturnType::OneOrThrow if row_count == 0 => {
            return Err(QueryError::not_found(table));
        }
        ReturnType::ValueOrThrow => {
            QueryOutput::Value(Some(parsers.parse_value(None, Value::Int(row_count as i64))))
        }
        _ => QueryOutput::RowCount(row_count),
    })
}
