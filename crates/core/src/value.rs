use std::{cmp::Ordering, fmt};

use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeSeq,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Predicate written in a dataset as a one-element sequence, e.g. `[notnull]`.
///
/// Tokens outside the supported set are kept verbatim and only rejected when a
/// comparison actually reaches them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Null,
    NotNull,
    Any,
    Other(String),
}

impl Placeholder {
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::NotNull => "notnull",
            Self::Any => "any",
            Self::Other(token) => token,
        }
    }
}

/// A single cell of a dataset row or of a fetched database row.
///
/// Unsigned 64-bit YAML scalars above `i64::MAX` are narrowed by truncation,
/// matching the documented dataset format.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Placeholder(Placeholder),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Ordering used for primary-key sorting. Values of the same primitive
    /// kind compare natively; any other pairing falls back to comparing the
    /// textual rendering, which keeps the sort total but is not transitive
    /// across mixed-kind key columns.
    #[must_use]
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Int(left), Self::Int(right)) => left.cmp(right),
            (Self::Float(left), Self::Float(right)) => {
                left.partial_cmp(right).unwrap_or(Ordering::Equal)
            }
            (Self::Str(left), Self::Str(right)) => left.cmp(right),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Placeholder(placeholder) => write!(f, "[{}]", placeholder.token()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Str(value) => serializer.serialize_str(value),
            Self::Placeholder(placeholder) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(placeholder.token())?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar or a one-element placeholder sequence")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Value, E> {
        Ok(Value::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Value, E> {
        Ok(Value::Int(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Value, E> {
        Ok(Value::Int(value as i64))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Value, E> {
        Ok(Value::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Value, E> {
        Ok(Value::Str(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Value, E> {
        Ok(Value::Str(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut elements: Vec<Value> = Vec::new();
        while let Some(element) = seq.next_element()? {
            elements.push(element);
        }
        if elements.len() != 1 {
            return Err(de::Error::custom(format!(
                "placeholder sequence must hold exactly one element, but holds {}",
                elements.len()
            )));
        }
        Ok(Value::Placeholder(placeholder_from(elements.remove(0))))
    }
}

fn placeholder_from(element: Value) -> Placeholder {
    match element {
        Value::Null => Placeholder::Null,
        Value::Str(token) => match token.as_str() {
            "null" => Placeholder::Null,
            "notnull" => Placeholder::NotNull,
            "any" => Placeholder::Any,
            _ => Placeholder::Other(token),
        },
        other => Placeholder::Other(other.to_string()),
    }
}
