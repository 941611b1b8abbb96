//! Store argument and reply types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single command argument: string, bytes, or number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes as they go over the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Arg::Str(s) => s.as_bytes().to_vec(),
            Arg::Bytes(b) => b.clone(),
            Arg::Int(i) => i.to_string().into_bytes(),
            Arg::Float(f) => f.to_string().into_bytes(),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => f.write_str(s),
            Arg::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => f.write_str(s),
                Err(_) => write!(f, "0x{}", hex::encode(b)),
            },
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Str(value.clone())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Arg::Bytes(value)
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(value.to_vec())
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<usize> for Arg {
    fn from(value: usize) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

/// A store-native reply
///
/// `Error` only appears nested inside an array reply, for one failed element of an
/// `EXEC` result. Top-level command errors are `Err` replies instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Status(String),
    Okay,
    Array(Vec<Value>),
    Error(String),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// `OK` status reply, in either of its encodings.
    pub fn is_ok(&self) -> bool {
        match self {
            Value::Okay => true,
            Value::Status(s) => s == "OK",
            _ => false,
        }
    }

    /// UTF-8 text of a bulk or status reply.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Data(bytes) => String::from_utf8(bytes.clone()).ok(),
            Value::Status(s) => Some(s.clone()),
            Value::Okay => Some("OK".to_string()),
            _ => None,
        }
    }

    /// Integer reply, or a bulk reply holding a decimal integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Data(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Data(bytes.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("(nil)"),
            Value::Int(i) => write!(f, "(integer) {}", i),
            Value::Data(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "0x{}", hex::encode(bytes)),
            },
            Value::Status(s) => f.write_str(s),
            Value::Okay => f.write_str("OK"),
            Value::Array(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Error(message) => write!(f, "(error) {}", message),
        }
    }
}

impl From<redis::Value> for Value {
    fn from(value: redis::Value) -> Self {
        match value {
            redis::Value::Nil => Value::Nil,
            redis::Value::Int(i) => Value::Int(i),
            redis::Value::BulkString(bytes) => Value::Data(bytes),
            redis::Value::Array(values) | redis::Value::Set(values) => {
                Value::Array(values.into_iter().map(Value::from).collect())
            }
            redis::Value::Map(pairs) => Value::Array(
                pairs
                    .into_iter()
                    .flat_map(|(k, v)| [Value::from(k), Value::from(v)])
                    .collect(),
            ),
            redis::Value::SimpleString(s) => Value::Status(s),
            redis::Value::Okay => Value::Okay,
            redis::Value::Double(d) => Value::Data(d.to_string().into_bytes()),
            redis::Value::Boolean(b) => Value::Int(i64::from(b)),
            redis::Value::VerbatimString { text, .. } => Value::Data(text.into_bytes()),
            redis::Value::Attribute { data, .. } => Value::from(*data),
            redis::Value::ServerError(err) => Value::Error(server_error_message(&err)),
            other => Value::Data(format!("{:?}", other).into_bytes()),
        }
    }
}

/// `CODE detail`, the way the server phrased it.
pub(crate) fn server_error_message(err: &redis::ServerError) -> String {
    match err.details() {
        Some(details) => format!("{} {}", err.code(), details),
        None => err.code().to_string(),
    }
}
