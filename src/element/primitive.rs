//! Immutable primitive values.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{DocumentError, Result};

/// An immutable leaf value. Primitives never merge with one another: a
/// conflicting write simply replaces the whole value (last-writer-wins is
/// enforced one layer up, by [`crate::element::object::ElementRHT`] or
/// [`crate::util::rht::RHT`]).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Primitive {
    /// JSON `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Str(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// A point in time, stored as milliseconds since the Unix epoch.
    Date(i64),
}

impl Primitive {
    /// The name used in [`DocumentError::TypeMismatch`] and JSON rendering
    /// diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Bool(_) => "bool",
            Primitive::Int32(_) => "int32",
            Primitive::Int64(_) => "int64",
            Primitive::Float64(_) => "float64",
            Primitive::Str(_) => "string",
            Primitive::Bytes(_) => "bytes",
            Primitive::Date(_) => "date",
        }
    }

    /// View this primitive as a `&str`, or error.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Primitive::Str(s) => Ok(s),
            other => Err(DocumentError::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }

    /// View this primitive as an `i64`, widening from `i32` if needed.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Primitive::Int32(v) => Ok(*v as i64),
            Primitive::Int64(v) => Ok(*v),
            other => Err(DocumentError::TypeMismatch {
                expected: "int64",
                actual: other.type_name(),
            }),
        }
    }

    /// Render this value the way `to_sorted_json` expects.
    pub fn to_json(&self) -> String {
        match self {
            Primitive::Null => String::from("null"),
            Primitive::Bool(b) => String::from(if *b { "true" } else { "false" }),
            Primitive::Int32(v) => alloc::format!("{v}"),
            Primitive::Int64(v) => alloc::format!("{v}"),
            Primitive::Float64(v) => alloc::format!("{v}"),
            Primitive::Str(s) => json_quote(s),
            Primitive::Bytes(b) => json_quote(&base16(b)),
            Primitive::Date(ms) => alloc::format!("{ms}"),
        }
    }
}

fn json_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn base16(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&alloc::format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_json_escapes_quotes_and_backslashes() {
        let p = Primitive::Str(String::from("a\"b\\c"));
        assert_eq!(p.to_json(), r#""a\"b\\c""#);
    }

    #[test]
    fn type_mismatch_reports_both_types() {
        let p = Primitive::Bool(true);
        let err = p.as_str().unwrap_err();
        assert_eq!(
            err,
            DocumentError::TypeMismatch {
                expected: "string",
                actual: "bool"
            }
        );
    }

    #[test]
    fn int32_widens_to_i64() {
        assert_eq!(Primitive::Int32(7).as_i64().unwrap(), 7);
        assert_eq!(Primitive::Int64(7).as_i64().unwrap(), 7);
    }
}
