//! The dynamic value that flows through statements: bound as arguments on
//! the way in, scanned out of rows on the way back.

use crate::OrmError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I64(_) => "integer",
            Value::F64(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::I64(v as i64)
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F64(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Conversion out of a scanned [`Value`] into a field's type. The derive
/// macro generates calls to this for every entity field.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, OrmError>;
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, OrmError> {
        match value {
            Value::I64(v) => Ok(v),
            Value::Bool(v) => Ok(v as i64),
            other => Err(conversion(&other, "i64")),
        }
    }
}

macro_rules! from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, OrmError> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| OrmError::ValueConversion {
                        from: "integer",
                        to: stringify!($ty),
                    })
                }
            }
        )*
    };
}

from_value_int!(i8, i16, i32, u8, u16, u32);

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, OrmError> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::I64(v) => Ok(v != 0),
            other => Err(conversion(&other, "bool")),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, OrmError> {
        match value {
            Value::F64(v) => Ok(v),
            // Integral values come back as integers from the driver.
            Value::I64(v) => Ok(v as f64),
            other => Err(conversion(&other, "f64")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, OrmError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, OrmError> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(conversion(&other, "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, OrmError> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::Text(v) => Ok(v.into_bytes()),
            other => Err(conversion(&other, "Vec<u8>")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, OrmError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn conversion(value: &Value, to: &'static str) -> OrmError {
    OrmError::ValueConversion {
        from: value.kind(),
        to,
    }
}
