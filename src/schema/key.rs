//! Primary keys
//!
//! A root entity's key layout is the ordered list of its primary-key
//! components. Keys can be derived from a record (a JSON object, as a data
//! loader would hold it) or composed directly from component values; both
//! paths produce the same structural value.

use serde_json::{Map, Value};
use thiserror::Error;

use super::{PrimitiveId, PrimitiveKind, PropertyRef, TypeRef};

#[derive(Error, Debug, PartialEq)]
pub enum KeyError {
    #[error("record is missing key field '{field}'")]
    MissingField { field: String },

    #[error("key field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("key expects {expected} components, got {found}")]
    Arity { expected: usize, found: usize },
}

/// One key component; always a key-capable primitive
#[derive(Debug, Clone, PartialEq)]
pub struct KeyComponent {
    pub property: PropertyRef,
    pub name: String,
    pub primitive: PrimitiveId,
    pub kind: PrimitiveKind,
}

/// A single key component value
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Integer(i128),
    Float(f64),
    Bool(bool),
    String(String),
    /// Custom primitives keep their textual form
    Custom(String),
}

impl KeyValue {
    fn describe(&self) -> String {
        match self {
            KeyValue::Integer(v) => format!("integer {}", v),
            KeyValue::Float(v) => format!("float {}", v),
            KeyValue::Bool(v) => format!("bool {}", v),
            KeyValue::String(s) => format!("string {:?}", s),
            KeyValue::Custom(s) => format!("custom {:?}", s),
        }
    }
}

/// A primary key value of some entity
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub entity: TypeRef,
    pub values: Vec<KeyValue>,
}

/// Ordered primary key components of a root entity
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyLayout {
    pub entity: TypeRef,
    pub components: Vec<KeyComponent>,
}

impl PrimaryKeyLayout {
    pub fn arity(&self) -> usize {
        self.components.len()
    }

    /// Derive the key of a record
    pub fn key_of(&self, record: &Map<String, Value>) -> Result<PrimaryKey, KeyError> {
        let values = self
            .components
            .iter()
            .map(|component| {
                let value = record.get(&component.name).ok_or_else(|| KeyError::MissingField {
                    field: component.name.clone(),
                })?;
                from_json(component, value)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PrimaryKey {
            entity: self.entity,
            values,
        })
    }

    /// Rebuild a key from component values, in layout order
    pub fn compose(&self, values: Vec<KeyValue>) -> Result<PrimaryKey, KeyError> {
        if values.len() != self.arity() {
            return Err(KeyError::Arity {
                expected: self.arity(),
                found: values.len(),
            });
        }

        for (component, value) in self.components.iter().zip(&values) {
            check(component, value)?;
        }

        Ok(PrimaryKey {
            entity: self.entity,
            values,
        })
    }
}

fn expected_name(kind: PrimitiveKind) -> &'static str {
    match kind {
        k if k.is_integer() => "an integer in range",
        PrimitiveKind::Float | PrimitiveKind::Double => "a number",
        PrimitiveKind::Bool => "a bool",
        PrimitiveKind::String => "a string",
        _ => "a scalar",
    }
}

fn from_json(component: &KeyComponent, value: &Value) -> Result<KeyValue, KeyError> {
    let kind = component.kind;
    let converted = match kind {
        k if k.is_integer() => value
            .as_i64()
            .map(i128::from)
            .or_else(|| value.as_u64().map(i128::from))
            .map(KeyValue::Integer),
        PrimitiveKind::Float | PrimitiveKind::Double => value.as_f64().map(KeyValue::Float),
        PrimitiveKind::Bool => value.as_bool().map(KeyValue::Bool),
        PrimitiveKind::String => value.as_str().map(|s| KeyValue::String(s.to_string())),
        _ => Some(KeyValue::Custom(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
    };

    let converted = converted.ok_or_else(|| KeyError::TypeMismatch {
        field: component.name.clone(),
        expected: expected_name(kind),
        found: value.to_string(),
    })?;
    check(component, &converted)?;
    Ok(converted)
}

fn check(component: &KeyComponent, value: &KeyValue) -> Result<(), KeyError> {
    let kind = component.kind;
    let ok = match (kind.integer_range(), value) {
        (Some((min, max)), KeyValue::Integer(v)) => (min..=max).contains(v),
        (Some(_), _) => false,
        (None, value) => matches!(
            (kind, value),
            (PrimitiveKind::Float | PrimitiveKind::Double, KeyValue::Float(_))
                | (PrimitiveKind::Bool, KeyValue::Bool(_))
                | (PrimitiveKind::String, KeyValue::String(_))
                | (PrimitiveKind::Custom, KeyValue::Custom(_))
        ),
    };

    if ok {
        Ok(())
    } else {
        Err(KeyError::TypeMismatch {
            field: component.name.clone(),
            expected: expected_name(kind),
            found: value.describe(),
        })
    }
}
