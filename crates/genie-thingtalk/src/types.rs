//! ThingTalk value types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of a value or argument.
///
/// Serialized as its display form (`Entity(com.yelp:restaurant)`,
/// `Array(String)`, `Enum(cheap,moderate,expensive)`), which keeps schema
/// files short.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Type {
    Any,
    Boolean,
    String,
    Number,
    Currency,
    Date,
    Time,
    Location,
    Measure(String),
    Entity(String),
    Enum(Vec<String>),
    Array(Box<Type>),
}

impl Type {
    pub fn entity(kind: impl Into<String>) -> Self {
        Type::Entity(kind.into())
    }

    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    pub fn enumeration<S: Into<String>>(entries: impl IntoIterator<Item = S>) -> Self {
        Type::Enum(entries.into_iter().map(Into::into).collect())
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Type::Entity(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::String)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Number | Type::Currency | Type::Measure(_))
    }

    /// Element type for arrays, the type itself otherwise.
    pub fn elem(&self) -> &Type {
        match self {
            Type::Array(elem) => elem,
            other => other,
        }
    }

    /// Whether a value of this type can be stored where `to` is expected.
    pub fn is_assignable(&self, to: &Type) -> bool {
        if self == to {
            return true;
        }
        match (self, to) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Enum(from), Type::Enum(to)) => from.iter().all(|e| to.contains(e)),
            (Type::Array(from), Type::Array(to)) => from.is_assignable(to),
            (Type::Number, Type::Currency) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Boolean => write!(f, "Boolean"),
            Type::String => write!(f, "String"),
            Type::Number => write!(f, "Number"),
            Type::Currency => write!(f, "Currency"),
            Type::Date => write!(f, "Date"),
            Type::Time => write!(f, "Time"),
            Type::Location => write!(f, "Location"),
            Type::Measure(unit) => write!(f, "Measure({})", unit),
            Type::Entity(kind) => write!(f, "Entity({})", kind),
            Type::Enum(entries) => write!(f, "Enum({})", entries.join(",")),
            Type::Array(elem) => write!(f, "Array({})", elem),
        }
    }
}

impl FromStr for Type {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "Any" => return Ok(Type::Any),
            "Boolean" => return Ok(Type::Boolean),
            "String" => return Ok(Type::String),
            "Number" => return Ok(Type::Number),
            "Currency" => return Ok(Type::Currency),
            "Date" => return Ok(Type::Date),
            "Time" => return Ok(Type::Time),
            "Location" => return Ok(Type::Location),
            _ => {}
        }

        let (head, inner) = match (s.find('('), s.strip_suffix(')')) {
            (Some(open), Some(body)) => (&s[..open], &body[open + 1..]),
            _ => return Err(format!("Invalid type: {}", s)),
        };
        match head {
            "Measure" => Ok(Type::Measure(inner.to_string())),
            "Entity" => Ok(Type::Entity(inner.to_string())),
            "Enum" => Ok(Type::Enum(
                inner
                    .split(',')
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect(),
            )),
            "Array" => Ok(Type::Array(Box::new(inner.parse()?))),
            _ => Err(format!("Invalid type: {}", s)),
        }
    }
}

impl TryFrom<String> for Type {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Type> for String {
    fn from(value: Type) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let ty: Type = "Array(Entity(com.yelp:restaurant_cuisine))".parse().unwrap();
        assert_eq!(ty, Type::array(Type::entity("com.yelp:restaurant_cuisine")));
        assert_eq!(ty.to_string(), "Array(Entity(com.yelp:restaurant_cuisine))");

        let ty: Type = "Enum(cheap, moderate,expensive)".parse().unwrap();
        assert_eq!(ty, Type::enumeration(["cheap", "moderate", "expensive"]));
        assert!("Entity(".parse::<Type>().is_err());
        assert!("Frobnicate".parse::<Type>().is_err());
    }

    #[test]
    fn test_assignable() {
        let small = Type::enumeration(["cheap"]);
        let all = Type::enumeration(["cheap", "moderate"]);
        assert!(small.is_assignable(&all));
        assert!(!all.is_assignable(&small));
        assert!(Type::Any.is_assignable(&Type::String));
        assert!(!Type::String.is_assignable(&Type::entity("tt:email_address")));
        assert!(Type::array(small).is_assignable(&Type::array(all)));
    }

    #[test]
    fn test_yaml_form() {
        let ty: Type = serde_yaml::from_str("\"Measure(C)\"").unwrap();
        assert_eq!(ty, Type::Measure("C".into()));
    }
}
