//! ThingTalk values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Undefined,
    Boolean(bool),
    String(String),
    Number(f64),
    Currency {
        value: f64,
        code: String,
    },
    Measure {
        value: f64,
        unit: String,
    },
    Date(String),
    Time {
        hour: u8,
        minute: u8,
    },
    Location(String),
    Entity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(rename = "type")]
        entity_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display: Option<String>,
    },
    Enum(String),
    Array(Vec<Value>),
    VarRef(String),
    Computation {
        op: String,
        operands: Vec<Value>,
    },
}

// Numbers compare with `==` on f64; NaN never appears in dialogue states.
impl Eq for Value {}

fn hash_f64<H: Hasher>(value: f64, state: &mut H) {
    if value == 0.0 {
        0u64.hash(state);
    } else {
        value.to_bits().hash(state);
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined => {}
            Value::Boolean(b) => b.hash(state),
            Value::String(s) | Value::Date(s) | Value::Location(s) | Value::Enum(s) => {
                s.hash(state)
            }
            Value::VarRef(s) => s.hash(state),
            Value::Number(n) => hash_f64(*n, state),
            Value::Currency { value, code } => {
                hash_f64(*value, state);
                code.hash(state);
            }
            Value::Measure { value, unit } => {
                hash_f64(*value, state);
                unit.hash(state);
            }
            Value::Time { hour, minute } => {
                hour.hash(state);
                minute.hash(state);
            }
            Value::Entity {
                value,
                entity_type,
                display,
            } => {
                value.hash(state);
                entity_type.hash(state);
                display.hash(state);
            }
            Value::Array(values) => values.hash(state),
            Value::Computation { op, operands } => {
                op.hash(state);
                operands.hash(state);
            }
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn enumerated(s: impl Into<String>) -> Self {
        Value::Enum(s.into())
    }

    pub fn var_ref(name: impl Into<String>) -> Self {
        Value::VarRef(name.into())
    }

    pub fn entity(
        value: impl Into<String>,
        entity_type: impl Into<String>,
        display: Option<&str>,
    ) -> Self {
        Value::Entity {
            value: Some(value.into()),
            entity_type: entity_type.into(),
            display: display.map(str::to_string),
        }
    }

    /// An entity known only by name, to be resolved later.
    pub fn entity_by_name(entity_type: impl Into<String>, display: impl Into<String>) -> Self {
        Value::Entity {
            value: None,
            entity_type: entity_type.into(),
            display: Some(display.into()),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_var_ref(&self) -> bool {
        matches!(self, Value::VarRef(_))
    }

    pub fn is_constant(&self) -> bool {
        !matches!(
            self,
            Value::Undefined | Value::VarRef(_) | Value::Computation { .. }
        )
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Value::Entity { .. })
    }

    pub fn get_type(&self) -> Type {
        match self {
            Value::Undefined | Value::VarRef(_) => Type::Any,
            Value::Boolean(_) => Type::Boolean,
            Value::String(_) => Type::String,
            Value::Number(_) | Value::Computation { .. } => Type::Number,
            Value::Currency { .. } => Type::Currency,
            Value::Measure { unit, .. } => Type::Measure(unit.clone()),
            Value::Date(_) => Type::Date,
            Value::Time { .. } => Type::Time,
            Value::Location(_) => Type::Location,
            Value::Entity { entity_type, .. } => Type::Entity(entity_type.clone()),
            Value::Enum(e) => Type::Enum(vec![e.clone()]),
            Value::Array(values) => Type::array(
                values
                    .first()
                    .map(Value::get_type)
                    .unwrap_or(Type::Any),
            ),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) | Value::Currency { value: v, .. } | Value::Measure { value: v, .. } => {
                Some(*v)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Identity string of the value, used for result ids and comparison keys.
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Entity { value, display, .. } => value
                .clone()
                .or_else(|| display.clone())
                .unwrap_or_default(),
            Value::String(s) | Value::Enum(s) | Value::Date(s) | Value::Location(s) => s.clone(),
            Value::VarRef(s) => s.clone(),
            _ => self.to_display_string(),
        }
    }

    /// Human readable rendering, used when filling phrase placeholders.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "?".to_string(),
            Value::Boolean(b) => String::from(if *b { "yes" } else { "no" }),
            Value::String(s) | Value::Date(s) | Value::Location(s) | Value::VarRef(s) => s.clone(),
            Value::Enum(s) => s.replace('_', " "),
            Value::Number(n) => format_number(*n),
            Value::Currency { value, code } => format!("{} {}", format_number(*value), code.to_uppercase()),
            Value::Measure { value, unit } => format!("{} {}", format_number(*value), unit),
            Value::Time { hour, minute } => format!("{}:{:02}", hour, minute),
            Value::Entity { value, display, .. } => display
                .clone()
                .or_else(|| value.clone())
                .unwrap_or_default(),
            Value::Array(values) => values
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Computation { op, operands } => format!(
                "{}({})",
                op,
                operands
                    .iter()
                    .map(Value::to_display_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "$?"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Currency { value, code } => write!(f, "{}${}", format_number(*value), code),
            Value::Measure { value, unit } => write!(f, "{}{}", format_number(*value), unit),
            Value::Date(d) => write!(f, "new Date({:?})", d),
            Value::Time { hour, minute } => write!(f, "new Time({}, {})", hour, minute),
            Value::Location(l) => write!(f, "new Location({:?})", l),
            Value::Entity {
                value,
                entity_type,
                display,
            } => {
                match value {
                    Some(v) => write!(f, "{:?}^^{}", v, entity_type)?,
                    None => write!(f, "null^^{}", entity_type)?,
                }
                if let Some(d) = display {
                    write!(f, "({:?})", d)?;
                }
                Ok(())
            }
            Value::Enum(e) => write!(f, "enum {}", e),
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::VarRef(name) => write!(f, "{}", name),
            Value::Computation { op, operands } => {
                write!(f, "{}(", op)?;
                for (i, v) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_zero_hash_consistent_with_eq() {
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
        assert_eq!(hash_of(&Value::Number(0.0)), hash_of(&Value::Number(-0.0)));
    }

    #[test]
    fn test_key_and_display_strings() {
        let v = Value::entity("str:yelp:1", "com.yelp:restaurant", Some("Nola"));
        assert_eq!(v.to_key_string(), "str:yelp:1");
        assert_eq!(v.to_display_string(), "Nola");
        assert_eq!(v.get_type(), Type::entity("com.yelp:restaurant"));

        assert_eq!(Value::Number(3.0).to_display_string(), "3");
        assert_eq!(Value::Number(4.5).to_display_string(), "4.5");
        assert_eq!(Value::enumerated("very_cheap").to_display_string(), "very cheap");
        assert!(!Value::var_ref("id").is_constant());
        assert!(Value::Undefined.is_undefined());
    }

    #[test]
    fn test_serde_shape() {
        let v: Value = serde_json::from_str(r#"{"entity":{"value":"x","type":"t"}}"#).unwrap();
        assert_eq!(v, Value::entity("x", "t", None));
        let v: Value = serde_json::from_str(r#""undefined""#).unwrap();
        assert!(v.is_undefined());
    }
}
