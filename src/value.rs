//! Type-erased row values.
//!
//! Rows are read as [`RawValue`]s, which may still carry raw byte sequences,
//! and handed to the destination as [`Value`]s, which cannot. The only ways
//! from one to the other are [`RawValue::normalize`] and
//! [`RawValue::normalize_lossy`], so a byte value from a scan never reaches
//! an insert.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::string::FromUtf8Error;

/// What to do with byte values that are not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Utf8Policy {
    /// Fail the row with a scan error
    #[default]
    Reject,
    /// Replace invalid sequences with U+FFFD
    Replace,
}

/// A scalar as decoded from a source row, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// SQL NULL
    Null,
    /// Signed integer
    Integer(i64),
    /// Unsigned integer (BIGINT UNSIGNED and friends)
    Unsigned(u64),
    /// Floating point
    Float(f64),
    /// Text
    Text(String),
    /// Raw byte sequence
    Bytes(Vec<u8>),
}

impl RawValue {
    /// Collapse byte sequences into text; every other kind passes through.
    ///
    /// Fails if the bytes are not valid UTF-8.
    pub fn normalize(self) -> Result<Value, FromUtf8Error> {
        Ok(match self {
            RawValue::Null => Value::Null,
            RawValue::Integer(v) => Value::Integer(v),
            RawValue::Unsigned(v) => Value::Unsigned(v),
            RawValue::Float(v) => Value::Float(v),
            RawValue::Text(s) => Value::Text(s),
            RawValue::Bytes(b) => Value::Text(String::from_utf8(b)?),
        })
    }

    /// Like [`normalize`](Self::normalize), but invalid UTF-8 is replaced
    /// with U+FFFD. The flag is true when a replacement happened.
    pub fn normalize_lossy(self) -> (Value, bool) {
        match self.normalize() {
            Ok(v) => (v, false),
            Err(e) => (
                Value::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
                true,
            ),
        }
    }
}

/// A scalar ready to be bound to a destination statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Signed integer
    Integer(i64),
    /// Unsigned integer
    Unsigned(u64),
    /// Floating point
    Float(f64),
    /// Text
    Text(String),
}

impl Value {
    /// Whether this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One source row, in source column order.
pub type Row = Vec<Value>;

/// A row after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    /// Normalized values
    pub values: Row,
    /// Indexes of columns whose bytes were lossily replaced
    pub replaced: Vec<usize>,
}

/// Normalize a whole row read from the source.
///
/// Under [`Utf8Policy::Reject`] the error is the index of the first column
/// holding invalid UTF-8.
pub fn normalize_row(
    raw: Vec<RawValue>,
    policy: Utf8Policy,
) -> std::result::Result<NormalizedRow, usize> {
    let mut values = Vec::with_capacity(raw.len());
    let mut replaced = Vec::new();

    for (idx, value) in raw.into_iter().enumerate() {
        match policy {
            Utf8Policy::Reject => values.push(value.normalize().map_err(|_| idx)?),
            Utf8Policy::Replace => {
                let (value, lossy) = value.normalize_lossy();
                if lossy {
                    replaced.push(idx);
                }
                values.push(value);
            }
        }
    }

    Ok(NormalizedRow { values, replaced })
}

/// Render a row as `col: value` pairs for echo logging.
pub fn describe_row(columns: &[String], row: &[Value]) -> String {
    columns
        .iter()
        .zip(row)
        .map(|(col, val)| format!("{}: {}", col, val))
        .collect::<Vec<_>>()
        .join(", ")
}
