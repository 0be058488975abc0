use super::{Descriptor, Value};
use crate::error::{Result, SabresError};
use crate::object::SabresObject;
use chrono::{DateTime, SecondsFormat, Utc};

impl Value {
    /// Render as JSON. Pointers become `{"class": .., "objectId": ..}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Byte(n) => serde_json::Value::from(*n),
            Value::Short(n) => serde_json::Value::from(*n),
            Value::Integer(n) => serde_json::Value::from(*n),
            Value::Long(n) => serde_json::Value::from(*n),
            Value::Float(n) => float_to_json(f64::from(*n)),
            Value::Double(n) => float_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(date) => {
                serde_json::Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Pointer(object) => serde_json::json!({
                "class": object.class_name(),
                "objectId": object.object_id(),
            }),
            Value::List(elements) => {
                serde_json::Value::Array(elements.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Convert JSON input into a value.
    ///
    /// When the attribute already has a descriptor the input is coerced to it,
    /// otherwise the narrowest natural variant is inferred. Pointers are built
    /// as detached instances through `detached`.
    pub fn from_json(
        json: &serde_json::Value,
        descriptor: Option<&Descriptor>,
        detached: &dyn Fn(&str, i64) -> Result<SabresObject>,
    ) -> Result<Value> {
        match descriptor {
            Some(descriptor) => coerce(json, descriptor, detached),
            None => infer(json),
        }
    }
}

fn float_to_json(n: f64) -> serde_json::Value {
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn infer(json: &serde_json::Value) -> Result<Value> {
    match json {
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i32::try_from(i)
                    .map(Value::Integer)
                    .unwrap_or(Value::Long(i)))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Double(f))
            } else {
                Err(SabresError::Validation(format!("Unsupported number {n}")))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()).normalize(),
        serde_json::Value::Array(items) => {
            let elements = items.iter().map(infer).collect::<Result<Vec<_>>>()?;
            Value::list(elements)
        }
        serde_json::Value::Null => Err(SabresError::Validation("Value cannot be null".into())),
        serde_json::Value::Object(_) => Err(SabresError::Validation(
            "Objects are not a supported value type".into(),
        )),
    }
}

fn coerce(
    json: &serde_json::Value,
    descriptor: &Descriptor,
    detached: &dyn Fn(&str, i64) -> Result<SabresObject>,
) -> Result<Value> {
    let mismatch = || SabresError::Validation(format!("Expected a {descriptor} value, got {json}"));
    let integer = || json.as_i64().ok_or_else(mismatch);

    let value = match descriptor {
        Descriptor::Boolean => Value::Boolean(json.as_bool().ok_or_else(mismatch)?),
        Descriptor::Byte => Value::Byte(i8::try_from(integer()?).map_err(|_| mismatch())?),
        Descriptor::Short => Value::Short(i16::try_from(integer()?).map_err(|_| mismatch())?),
        Descriptor::Integer => Value::Integer(i32::try_from(integer()?).map_err(|_| mismatch())?),
        Descriptor::Long => Value::Long(integer()?),
        Descriptor::Float => Value::Float(json.as_f64().ok_or_else(mismatch)? as f32),
        Descriptor::Double => Value::Double(json.as_f64().ok_or_else(mismatch)?),
        Descriptor::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
        Descriptor::Date => match json {
            serde_json::Value::String(s) => Value::Date(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|_| mismatch())?
                    .with_timezone(&Utc),
            ),
            _ => Value::Date(DateTime::from_timestamp_millis(integer()?).ok_or_else(mismatch)?),
        },
        Descriptor::Pointer { class } => Value::Pointer(detached(class, integer()?)?),
        Descriptor::List { element } => {
            let items = json.as_array().ok_or_else(mismatch)?;
            let elements = items
                .iter()
                .map(|item| coerce(item, element, detached))
                .collect::<Result<Vec<_>>>()?;
            return Value::list(elements);
        }
    };
    value.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_pointers(class: &str, _id: i64) -> Result<SabresObject> {
        Err(SabresError::UnregisteredClass(class.to_string()))
    }

    #[test]
    fn test_infer() {
        assert_eq!(Value::from_json(&json!(true), None, &no_pointers).unwrap(), Value::Boolean(true));
        assert_eq!(Value::from_json(&json!(5), None, &no_pointers).unwrap(), Value::Integer(5));
        assert_eq!(
            Value::from_json(&json!(5_000_000_000i64), None, &no_pointers).unwrap(),
            Value::Long(5_000_000_000)
        );
        assert_eq!(Value::from_json(&json!(1.5), None, &no_pointers).unwrap(), Value::Double(1.5));
        assert_eq!(
            Value::from_json(&json!(["a", "b"]), None, &no_pointers).unwrap(),
            Value::List(vec![Value::String("a".into()), Value::String("b".into())])
        );
        assert!(Value::from_json(&json!(null), None, &no_pointers).is_err());
        assert!(Value::from_json(&json!({"a": 1}), None, &no_pointers).is_err());
    }

    #[test]
    fn test_coerce_to_descriptor() {
        assert_eq!(
            Value::from_json(&json!(5), Some(&Descriptor::Long), &no_pointers).unwrap(),
            Value::Long(5)
        );
        assert_eq!(
            Value::from_json(&json!(3), Some(&Descriptor::Double), &no_pointers).unwrap(),
            Value::Double(3.0)
        );
        assert!(Value::from_json(&json!(300), Some(&Descriptor::Byte), &no_pointers).is_err());
        assert!(Value::from_json(&json!("x"), Some(&Descriptor::Integer), &no_pointers).is_err());

        let date = Value::from_json(
            &json!("2015-01-01T00:00:00.123Z"),
            Some(&Descriptor::Date),
            &no_pointers,
        )
        .unwrap();
        assert_eq!(date.to_sql(), "1420070400123");
        assert_eq!(date.to_json(), json!("2015-01-01T00:00:00.123Z"));

        let list = Value::from_json(
            &json!([1, 2]),
            Some(&Descriptor::list(Descriptor::Short)),
            &no_pointers,
        )
        .unwrap();
        assert_eq!(list, Value::List(vec![Value::Short(1), Value::Short(2)]));
    }
}
