pub mod json;

use crate::error::{Result, SabresError};
use crate::object::SabresObject;
use crate::sql::{quote_literal, SqlType};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a value: primitive kind, date, pointer to a class, or list of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Descriptor {
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    String,
    Date,
    Pointer { class: String },
    List { element: Box<Descriptor> },
}

impl Descriptor {
    pub fn pointer(class: impl Into<String>) -> Self {
        Descriptor::Pointer {
            class: class.into(),
        }
    }

    pub fn list(element: Descriptor) -> Self {
        Descriptor::List {
            element: Box::new(element),
        }
    }

    /// Column type used for this descriptor in a class table.
    pub fn sql_type(&self) -> SqlType {
        match self {
            Descriptor::Boolean
            | Descriptor::Byte
            | Descriptor::Short
            | Descriptor::Integer
            | Descriptor::Long
            | Descriptor::Date
            | Descriptor::Pointer { .. } => SqlType::Integer,
            Descriptor::Float | Descriptor::Double => SqlType::Real,
            Descriptor::String | Descriptor::List { .. } => SqlType::Text,
        }
    }

    /// The class a pointer column references.
    pub fn referenced_class(&self) -> Option<&str> {
        match self {
            Descriptor::Pointer { class } => Some(class),
            _ => None,
        }
    }

    /// Serialized form stored in the metadata table.
    pub fn to_metadata(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_metadata(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Boolean => write!(f, "Boolean"),
            Descriptor::Byte => write!(f, "Byte"),
            Descriptor::Short => write!(f, "Short"),
            Descriptor::Integer => write!(f, "Integer"),
            Descriptor::Long => write!(f, "Long"),
            Descriptor::Float => write!(f, "Float"),
            Descriptor::Double => write!(f, "Double"),
            Descriptor::String => write!(f, "String"),
            Descriptor::Date => write!(f, "Date"),
            Descriptor::Pointer { class } => write!(f, "Pointer<{class}>"),
            Descriptor::List { element } => write!(f, "List<{element}>"),
        }
    }
}

/// A single attribute value.
///
/// Build values through [`IntoValue`] (or [`Value::list`]) rather than the
/// variants directly: conversion validates list shape, rejects NaN and
/// truncates dates to the millisecond precision they are stored with.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
    Pointer(SabresObject),
    List(Vec<Value>),
}

impl Value {
    /// Build a list value. Elements must share one non-list descriptor.
    pub fn list(elements: Vec<Value>) -> Result<Value> {
        let elements = elements
            .into_iter()
            .map(Value::normalize)
            .collect::<Result<Vec<_>>>()?;
        let first = elements
            .first()
            .ok_or_else(|| {
                SabresError::Validation("List cannot be empty, its element type is unknown".into())
            })?
            .descriptor();
        if matches!(first, Descriptor::List { .. }) {
            return Err(SabresError::Validation(
                "List elements cannot themselves be lists".into(),
            ));
        }
        if let Some(other) = elements.iter().map(Value::descriptor).find(|d| *d != first) {
            return Err(SabresError::Validation(format!(
                "List elements must share one type, found {first} and {other}"
            )));
        }
        Ok(Value::List(elements))
    }

    /// Validate a value built from the variants directly.
    pub fn normalize(self) -> Result<Value> {
        match self {
            Value::Float(f) if f.is_nan() => {
                Err(SabresError::Validation("Float value cannot be NaN".into()))
            }
            Value::Double(d) if d.is_nan() => {
                Err(SabresError::Validation("Double value cannot be NaN".into()))
            }
            Value::String(s) if s.contains('\0') => Err(SabresError::Validation(
                "String value cannot contain a NUL character".into(),
            )),
            Value::Date(date) => Ok(Value::Date(truncate_to_millis(date))),
            Value::List(elements) => Value::list(elements),
            other => Ok(other),
        }
    }

    pub fn descriptor(&self) -> Descriptor {
        match self {
            Value::Boolean(_) => Descriptor::Boolean,
            Value::Byte(_) => Descriptor::Byte,
            Value::Short(_) => Descriptor::Short,
            Value::Integer(_) => Descriptor::Integer,
            Value::Long(_) => Descriptor::Long,
            Value::Float(_) => Descriptor::Float,
            Value::Double(_) => Descriptor::Double,
            Value::String(_) => Descriptor::String,
            Value::Date(_) => Descriptor::Date,
            Value::Pointer(object) => Descriptor::pointer(object.class_name()),
            // Lists are never empty once normalized
            Value::List(elements) => Descriptor::list(
                elements
                    .first()
                    .map(Value::descriptor)
                    .unwrap_or(Descriptor::String),
            ),
        }
    }

    /// SQL literal for this value.
    pub fn to_sql(&self) -> String {
        match self {
            Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Byte(n) => n.to_string(),
            Value::Short(n) => n.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Float(f) => real_literal(f64::from(*f), format!("{f:?}")),
            Value::Double(d) => real_literal(*d, format!("{d:?}")),
            Value::String(s) => quote_literal(s),
            Value::Date(date) => date.timestamp_millis().to_string(),
            Value::Pointer(object) => object.object_id().to_string(),
            Value::List(elements) => {
                let encoded: Vec<String> = elements.iter().map(Value::to_sql).collect();
                quote_literal(&encoded.join(", "))
            }
        }
    }

    /// Decode a non-null column value according to its descriptor.
    ///
    /// Pointer columns become detached instances built by `detached`. List
    /// descriptors are not stored inline and are rejected here.
    pub fn decode(
        descriptor: &Descriptor,
        raw: &SqlValue,
        column: &str,
        detached: &dyn Fn(&str, i64) -> Result<SabresObject>,
    ) -> Result<Value> {
        let mismatch = || SabresError::Decode {
            column: column.to_string(),
            reason: format!("stored value {raw:?} is not a {descriptor}"),
        };
        let out_of_range = |_| SabresError::Decode {
            column: column.to_string(),
            reason: format!("stored value {raw:?} is out of range for {descriptor}"),
        };

        let value = match (descriptor, raw) {
            (Descriptor::Boolean, SqlValue::Integer(i)) => Value::Boolean(*i != 0),
            (Descriptor::Byte, SqlValue::Integer(i)) => {
                Value::Byte(i8::try_from(*i).map_err(out_of_range)?)
            }
            (Descriptor::Short, SqlValue::Integer(i)) => {
                Value::Short(i16::try_from(*i).map_err(out_of_range)?)
            }
            (Descriptor::Integer, SqlValue::Integer(i)) => {
                Value::Integer(i32::try_from(*i).map_err(out_of_range)?)
            }
            (Descriptor::Long, SqlValue::Integer(i)) => Value::Long(*i),
            (Descriptor::Float, SqlValue::Real(f)) => Value::Float(*f as f32),
            (Descriptor::Float, SqlValue::Integer(i)) => Value::Float(*i as f32),
            (Descriptor::Double, SqlValue::Real(f)) => Value::Double(*f),
            (Descriptor::Double, SqlValue::Integer(i)) => Value::Double(*i as f64),
            (Descriptor::String, SqlValue::Text(s)) => Value::String(s.clone()),
            (Descriptor::Date, SqlValue::Integer(millis)) => {
                Value::Date(DateTime::from_timestamp_millis(*millis).ok_or_else(mismatch)?)
            }
            (Descriptor::Pointer { class }, SqlValue::Integer(id)) => {
                Value::Pointer(detached(class, *id)?)
            }
            _ => return Err(mismatch()),
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Byte(n) => write!(f, "{n}"),
            Value::Short(n) => write!(f, "{n}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(date) => write!(f, "{}", date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Pointer(object) => write!(f, "{}({})", object.class_name(), object.object_id()),
            Value::List(elements) => {
                let parts: Vec<String> = elements.iter().map(Value::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

fn truncate_to_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(date.timestamp_millis()).unwrap_or(date)
}

fn real_literal(value: f64, finite: String) -> String {
    if value.is_infinite() {
        // SQLite reads an overflowing literal as +/-Inf
        if value > 0.0 { "9e999" } else { "-9e999" }.to_string()
    } else {
        finite
    }
}

/// Conversion of raw Rust data into a validated [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Result<Value>;
}

impl IntoValue for Value {
    fn into_value(self) -> Result<Value> {
        self.normalize()
    }
}

macro_rules! into_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Result<Value> {
                    Value::$variant(self).normalize()
                }
            }
        )*
    };
}

into_value! {
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Integer,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime<Utc> => Date,
    SabresObject => Pointer,
}

impl IntoValue for &str {
    fn into_value(self) -> Result<Value> {
        Value::String(self.to_string()).normalize()
    }
}

impl IntoValue for &String {
    fn into_value(self) -> Result<Value> {
        Value::String(self.clone()).normalize()
    }
}

impl IntoValue for &SabresObject {
    fn into_value(self) -> Result<Value> {
        Ok(Value::Pointer(self.clone()))
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Result<Value> {
        let elements = self
            .into_iter()
            .map(IntoValue::into_value)
            .collect::<Result<Vec<_>>>()?;
        Value::list(elements)
    }
}

/// `None` is the absent value and is always rejected.
impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Result<Value> {
        match self {
            Some(value) => value.into_value(),
            None => Err(SabresError::Validation("Value cannot be null".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn no_pointers(class: &str, _id: i64) -> Result<SabresObject> {
        Err(SabresError::UnregisteredClass(class.to_string()))
    }

    #[test]
    fn test_descriptors_of_primitives() {
        assert_eq!(true.into_value().unwrap().descriptor(), Descriptor::Boolean);
        assert_eq!(7i8.into_value().unwrap().descriptor(), Descriptor::Byte);
        assert_eq!(7i16.into_value().unwrap().descriptor(), Descriptor::Short);
        assert_eq!(7i32.into_value().unwrap().descriptor(), Descriptor::Integer);
        assert_eq!(7i64.into_value().unwrap().descriptor(), Descriptor::Long);
        assert_eq!(1.5f32.into_value().unwrap().descriptor(), Descriptor::Float);
        assert_eq!(1.5f64.into_value().unwrap().descriptor(), Descriptor::Double);
        assert_eq!("x".into_value().unwrap().descriptor(), Descriptor::String);
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(Value::Boolean(true).to_sql(), "1");
        assert_eq!(Value::Boolean(false).to_sql(), "0");
        assert_eq!(Value::Short(-12).to_sql(), "-12");
        assert_eq!(Value::Double(2.0).to_sql(), "2.0");
        assert_eq!(Value::Float(0.25).to_sql(), "0.25");
        assert_eq!(Value::Double(f64::NEG_INFINITY).to_sql(), "-9e999");
        assert_eq!(Value::String("it's".into()).to_sql(), "'it''s'");

        let date = Utc.timestamp_millis_opt(1_420_070_400_123).unwrap();
        assert_eq!(Value::Date(date).to_sql(), "1420070400123");
    }

    #[test]
    fn test_list_literal_encodes_elements() {
        let list = vec!["a", "b'c"].into_value().unwrap();
        assert_eq!(list.to_sql(), "'''a'', ''b''''c'''");
        assert_eq!(list.descriptor(), Descriptor::list(Descriptor::String));
        assert_eq!(list.to_string(), "[a, b'c]");
    }

    #[test]
    fn test_rejects_unsupported_shapes() {
        let nested = Value::list(vec![Value::List(vec![Value::Integer(1)])]);
        assert!(matches!(nested, Err(SabresError::Validation(_))));

        let mixed = Value::list(vec![Value::Integer(1), Value::Long(2)]);
        assert!(matches!(mixed, Err(SabresError::Validation(_))));

        let empty: Vec<i32> = Vec::new();
        assert!(matches!(empty.into_value(), Err(SabresError::Validation(_))));

        let with_null = vec![Some(1), None].into_value();
        assert!(matches!(with_null, Err(SabresError::Validation(_))));

        assert!(matches!(f64::NAN.into_value(), Err(SabresError::Validation(_))));
    }

    #[test]
    fn test_rejects_nul_in_strings() {
        assert!(matches!("a\0b".into_value(), Err(SabresError::Validation(_))));
        assert!(matches!(
            "a\0b".to_string().into_value(),
            Err(SabresError::Validation(_))
        ));
        assert!(matches!(
            (&"a\0b".to_string()).into_value(),
            Err(SabresError::Validation(_))
        ));
        assert!(matches!(
            vec!["ok", "a\0b"].into_value(),
            Err(SabresError::Validation(_))
        ));
        assert!(matches!(
            Value::String("\0".into()).normalize(),
            Err(SabresError::Validation(_))
        ));
    }

    #[test]
    fn test_dates_truncate_to_millis() {
        let precise = Utc.timestamp_nanos(1_420_070_400_123_456_789);
        match precise.into_value().unwrap() {
            Value::Date(date) => assert_eq!(date.timestamp_millis(), 1_420_070_400_123),
            other => panic!("Expected Date, got {other:?}"),
        }
        assert_eq!(
            Value::Date(Utc.timestamp_millis_opt(1_420_070_400_123).unwrap()).to_string(),
            "2015-01-01T00:00:00.123Z"
        );
    }

    #[test]
    fn test_decode_by_descriptor() {
        let decode = |d: &Descriptor, raw: SqlValue| Value::decode(d, &raw, "col", &no_pointers);

        assert_eq!(decode(&Descriptor::Boolean, SqlValue::Integer(1)).unwrap(), Value::Boolean(true));
        assert_eq!(decode(&Descriptor::Byte, SqlValue::Integer(-3)).unwrap(), Value::Byte(-3));
        assert_eq!(decode(&Descriptor::Double, SqlValue::Integer(2)).unwrap(), Value::Double(2.0));
        assert_eq!(decode(&Descriptor::Float, SqlValue::Real(0.1f32 as f64)).unwrap(), Value::Float(0.1));
        assert_eq!(
            decode(&Descriptor::String, SqlValue::Text("hi".into())).unwrap(),
            Value::String("hi".into())
        );
        assert!(matches!(
            decode(&Descriptor::Byte, SqlValue::Integer(300)),
            Err(SabresError::Decode { .. })
        ));
        assert!(matches!(
            decode(&Descriptor::Integer, SqlValue::Text("1".into())),
            Err(SabresError::Decode { .. })
        ));
        assert!(matches!(
            decode(&Descriptor::pointer("Director"), SqlValue::Integer(1)),
            Err(SabresError::UnregisteredClass(_))
        ));
    }

    #[test]
    fn test_descriptor_metadata_and_display() {
        let descriptor = Descriptor::list(Descriptor::pointer("Actor"));
        let raw = descriptor.to_metadata().unwrap();
        assert_eq!(Descriptor::from_metadata(&raw).unwrap(), descriptor);
        assert_eq!(descriptor.to_string(), "List<Pointer<Actor>>");
        assert_eq!(descriptor.sql_type(), SqlType::Text);
        assert_eq!(Descriptor::Date.sql_type(), SqlType::Integer);
    }
}
