//! Semantic values bound into statements and decoded from rows.
//!
//! Everything that crosses the driver boundary is a [`Value`]. Statement
//! templates never carry data; data flows through named parameters whose
//! values are `Value`s.

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// A value that can be bound as a parameter or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Unsigned integer value.
    UInt(u64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    /// Binary blob value.
    Bytes(Vec<u8>),
    /// Structured value, stored JSON encoded.
    Json(serde_json::Value),
    /// Sequence parameter, expanded into one placeholder per element.
    List(Vec<Value>),
}

impl Value {
    /// Encodes any serializable value as a JSON value. A JSON `null`
    /// becomes [`Value::Null`] so optional structured fields store SQL NULL.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(match serde_json::to_value(value)? {
            serde_json::Value::Null => Self::Null,
            json => Self::Json(json),
        })
    }

    /// Builds a list parameter from any iterator of convertible values.
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToValue,
    {
        Self::List(values.into_iter().map(|v| v.to_value()).collect())
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in conversion errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::List(_) => "list",
        }
    }

    /// Decodes a structured value into `T`.
    ///
    /// Text is parsed as JSON, which covers backends that hand JSON columns
    /// back as plain strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not valid JSON for `T`.
    pub fn decode_json<T: DeserializeOwned>(self) -> Result<T> {
        let json = match self {
            Self::Text(text) => serde_json::from_str(&text)?,
            other => other.into_json()?,
        };
        Ok(serde_json::from_value(json)?)
    }

    fn into_json(self) -> Result<serde_json::Value> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(b),
            Self::Int(n) => n.into(),
            Self::UInt(n) => n.into(),
            Self::Float(f) => f.into(),
            Self::Text(s) => serde_json::Value::String(s),
            Self::Timestamp(ts) => serde_json::to_value(ts)?,
            Self::Bytes(b) => b.into(),
            Self::Json(json) => json,
            Self::List(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(Self::into_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

/// Trait for types that can be converted to values.
pub trait ToValue {
    /// Converts to a `Value`.
    fn to_value(&self) -> Value;
}

/// Trait for types that can be read back from values.
pub trait FromValue: Sized {
    /// Converts from a `Value`, returning `None` when the variant does not fit.
    fn from_value(value: Value) -> Option<Self>;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            Value::Int(n) => Some(n != 0),
            Value::UInt(n) => Some(n != 0),
            _ => None,
        }
    }
}

macro_rules! signed_value {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }
            }

            impl FromValue for $t {
                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::Int(n) => Self::try_from(n).ok(),
                        Value::UInt(n) => Self::try_from(n).ok(),
                        Value::Bool(b) => Some(Self::from(b)),
                        _ => None,
                    }
                }
            }
        )*
    };
}

macro_rules! unsigned_value {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::UInt(u64::from(*self))
                }
            }

            impl FromValue for $t {
                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::Int(n) => Self::try_from(n).ok(),
                        Value::UInt(n) => Self::try_from(n).ok(),
                        Value::Bool(b) => Some(Self::from(b)),
                        _ => None,
                    }
                }
            }
        )*
    };
}

signed_value!(i8, i16, i32, i64);
unsigned_value!(u8, u16, u32, u64);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            Value::Int(n) => Some(n as Self),
            _ => None,
        }
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Option<Self> {
        f64::from_value(value).map(|f| f as Self)
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Timestamp(ts) => Some(ts),
            Value::Text(s) => Self::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f").ok(),
            _ => None,
        }
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Json(json) => Some(json),
            Value::Text(s) => serde_json::from_str(&s).ok(),
            _ => None,
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (*self).to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions() {
        assert_eq!(42_i32.to_value(), Value::Int(42));
        assert_eq!(7_u16.to_value(), Value::UInt(7));
        assert_eq!(i8::from_value(Value::Int(300)), None);
        assert_eq!(u32::from_value(Value::Int(-1)), None);
        assert_eq!(u64::from_value(Value::Int(5)), Some(5));
        assert_eq!(i64::from_value(Value::Text("5".into())), None);
    }

    #[test]
    fn test_bool_from_integer() {
        assert_eq!(bool::from_value(Value::Int(1)), Some(true));
        assert_eq!(bool::from_value(Value::Int(0)), Some(false));
    }

    #[test]
    fn test_option_round() {
        let none: Option<String> = None;
        assert_eq!(none.to_value(), Value::Null);
        assert_eq!(Option::<String>::from_value(Value::Null), Some(None));
        assert_eq!(
            Option::<String>::from_value(Value::Text("a".into())),
            Some(Some("a".into()))
        );
    }

    #[test]
    fn test_decode_json_from_text() {
        let value = Value::Text(r#"{"theme":"dark"}"#.into());
        let json: serde_json::Value = value.decode_json().unwrap();
        assert_eq!(json["theme"], "dark");
    }

    #[test]
    fn test_list_builder() {
        let list = Value::list([1_i64, 2, 3]);
        assert_eq!(
            list,
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_timestamp_from_text() {
        let ts = NaiveDateTime::from_value(Value::Text("2024-03-01 10:20:30.5".into()));
        assert!(ts.is_some());
    }
}
