//! Translated reply values and typed conversions

use crate::error::{DataAccessKind, RedisError, Result};
use crate::resp::Frame;
use std::collections::HashMap;
use std::hash::Hash;

/// A successful reply, independent of the wire format
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Status(String),
    Okay,
    Array(Vec<Value>),
}

/// Outcome of one command: a value or a translated failure
pub type CommandResult = std::result::Result<Value, RedisError>;

impl Value {
    /// Convert a raw frame. An error frame anywhere in it yields the server
    /// message as `Err` for the translator to classify.
    pub fn try_from_frame(frame: Frame) -> std::result::Result<Value, String> {
        Ok(match frame {
            Frame::Error(message) => return Err(message),
            Frame::Simple(s) if s == "OK" => Value::Okay,
            Frame::Simple(s) => Value::Status(s),
            Frame::Integer(n) => Value::Int(n),
            Frame::Bulk(None) | Frame::Array(None) => Value::Nil,
            Frame::Bulk(Some(data)) => Value::Data(data),
            Frame::Array(Some(items)) => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from_frame)
                    .collect::<std::result::Result<_, _>>()?,
            ),
        })
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Data(d) => Some(d),
            Value::Status(s) => Some(s.as_bytes()),
            Value::Okay => Some(b"OK"),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Data(d) => std::str::from_utf8(d).ok()?.parse().ok(),
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "integer",
            Value::Data(_) => "bulk string",
            Value::Status(_) => "status",
            Value::Okay => "OK",
            Value::Array(_) => "array",
        }
    }
}

fn conversion_error(value: &Value, target: &str) -> RedisError {
    RedisError::data_access(
        DataAccessKind::TypeConversion,
        format!("cannot convert {} reply to {}", value.kind_name(), target),
    )
}

/// Typed view of a [`Value`]
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(_: Value) -> Result<Self> {
        Ok(())
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Int(n) => Ok(*n != 0),
            Value::Okay => Ok(true),
            Value::Nil => Ok(false),
            Value::Data(d) if d == b"1" => Ok(true),
            Value::Data(d) if d == b"0" => Ok(false),
            _ => Err(conversion_error(&value, "bool")),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        value.as_int().ok_or_else(|| conversion_error(&value, "i64"))
    }
}

macro_rules! unsigned_from_value {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self> {
                value
                    .as_int()
                    .and_then(|n| <$t>::try_from(n).ok())
                    .ok_or_else(|| conversion_error(&value, stringify!($t)))
            }
        })*
    };
}

unsigned_from_value!(u64, usize, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        let parsed = match &value {
            Value::Int(n) => Some(*n as f64),
            Value::Data(d) => std::str::from_utf8(d).ok().and_then(parse_float),
            Value::Status(s) => parse_float(s),
            _ => None,
        };
        parsed.ok_or_else(|| conversion_error(&value, "f64"))
    }
}

fn parse_float(s: &str) -> Option<f64> {
    match s {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Data(d) => String::from_utf8(d).map_err(|_| {
                RedisError::data_access(DataAccessKind::TypeConversion, "reply is not valid UTF-8")
            }),
            Value::Status(s) => Ok(s),
            Value::Okay => Ok("OK".to_string()),
            Value::Int(n) => Ok(n.to_string()),
            other => Err(conversion_error(&other, "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Data(d) => Ok(d),
            Value::Status(s) => Ok(s.into_bytes()),
            Value::Okay => Ok(b"OK".to_vec()),
            Value::Int(n) => Ok(n.to_string().into_bytes()),
            other => Err(conversion_error(&other, "bytes")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            Value::Nil => Ok(Vec::new()),
            other => Err(conversion_error(&other, "array")),
        }
    }
}

/// Flat `[field, value, field, value, ...]` replies
impl<K, V> FromValue for HashMap<K, V>
where
    K: FromValue + Eq + Hash,
    V: FromValue,
{
    fn from_value(value: Value) -> Result<Self> {
        pairs(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

fn pairs(value: Value) -> Result<Vec<(Value, Value)>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Nil => return Ok(Vec::new()),
        other => return Err(conversion_error(&other, "pairs")),
    };
    if items.len() % 2 != 0 {
        return Err(RedisError::data_access(
            DataAccessKind::TypeConversion,
            format!("expected an even number of elements, got {}", items.len()),
        ));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
        out.push((a, b));
    }
    Ok(out)
}

/// Sorted set member with score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: Vec<u8>,
    pub score: f64,
}

/// Reply of `ZRANGE ... WITHSCORES`, in rank order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoredMembers(pub Vec<ScoredMember>);

impl ScoredMembers {
    pub fn into_inner(self) -> Vec<ScoredMember> {
        self.0
    }
}

impl std::ops::Deref for ScoredMembers {
    type Target = [ScoredMember];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromValue for ScoredMembers {
    fn from_value(value: Value) -> Result<Self> {
        pairs(value)?
            .into_iter()
            .map(|(member, score)| {
                Ok(ScoredMember {
                    member: Vec::<u8>::from_value(member)?,
                    score: f64::from_value(score)?,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(ScoredMembers)
    }
}
