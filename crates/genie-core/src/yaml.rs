//! YAML loading for fixture and configuration files.
//!
//! Documents are read into a generic tree and deserialized through
//! `serde_json`, so externally tagged enums can be written in map form
//! (`{ number: 4.5 }`) as well as with YAML tags.

use serde::de::DeserializeOwned;

use crate::Result;

pub fn from_str<T: DeserializeOwned>(content: &str) -> Result<T> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content)?;
    let tree = serde_json::to_value(doc)?;
    Ok(serde_json::from_value(tree)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum Cell {
        Number(f64),
        Enum(String),
        Entity { value: String, display: Option<String> },
    }

    #[test]
    fn test_map_form_enums() {
        let cells: BTreeMap<String, Cell> = from_str(
            "rating: { number: 4.5 }\n\
             count: { number: 3 }\n\
             price: { enum: cheap }\n\
             id: { entity: { value: r1, display: Il Fornaio } }\n",
        )
        .unwrap();
        assert_eq!(cells["rating"], Cell::Number(4.5));
        assert_eq!(cells["count"], Cell::Number(3.0));
        assert_eq!(cells["price"], Cell::Enum("cheap".to_string()));
        assert_eq!(
            cells["id"],
            Cell::Entity {
                value: "r1".to_string(),
                display: Some("Il Fornaio".to_string())
            }
        );
    }

    #[test]
    fn test_syntax_errors_surface() {
        let err = from_str::<BTreeMap<String, Cell>>("a: [").unwrap_err();
        assert!(matches!(err, crate::GenieError::Yaml(_)));
    }
}
