//! Phrase library data model

use genie_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phrases describing the results of a query function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPhrases {
    /// Describe the top result only.
    #[serde(default)]
    pub top: Vec<String>,
    /// Describe a list of results as one phrase.
    #[serde(default)]
    pub list: Vec<String>,
    /// Describe each result; concatenated for up to a handful of results.
    #[serde(default)]
    pub list_concat: Vec<String>,
}

impl ResultPhrases {
    pub fn is_empty(&self) -> bool {
        self.top.is_empty() && self.list.is_empty() && self.list_concat.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionPhrases {
    /// Canonical description of an invocation, with `${param}` placeholders.
    #[serde(default)]
    pub description: Vec<String>,
    #[serde(default)]
    pub result: ResultPhrases,
    #[serde(default)]
    pub empty: Vec<String>,
    /// Error messages keyed by error code.
    #[serde(default)]
    pub error: BTreeMap<String, Vec<String>>,
    /// Name of the function argument used to refer to results by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_param: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhraseLibrary {
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionPhrases>,
    /// Agent utterances keyed by agent context tag (`ctx_sys_greet`, ...).
    #[serde(default)]
    pub utterances: BTreeMap<String, Vec<String>>,
    /// Descriptions for notification sources keyed by app name.
    #[serde(default)]
    pub notifications: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl PhraseLibrary {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionPhrases> {
        self.functions.get(name)
    }

    pub fn utterances(&self, tag: &str) -> &[String] {
        self.utterances.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add entries of `other` that are not already present.
    pub fn merge(&mut self, other: PhraseLibrary) {
        for (name, phrases) in other.functions {
            self.functions.entry(name).or_insert(phrases);
        }
        for (tag, utterances) in other.utterances {
            self.utterances.entry(tag).or_insert(utterances);
        }
        for (app, phrases) in other.notifications {
            self.notifications.entry(app).or_insert(phrases);
        }
        for (key, value) in other.variables {
            self.variables.entry(key).or_insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YELP: &str = r#"
functions:
  com.yelp.restaurant:
    description: ["restaurants"]
    result:
      top: ["${id} is a ${price} restaurant"]
      list_concat: ["${id}"]
    empty: ["i could not find any restaurant"]
  com.yelp.make_reservation:
    description: ["a reservation at ${restaurant} for ${book_people} people"]
    error:
      no_table: ["there are no tables left at ${restaurant}"]
utterances:
  ctx_sys_end: ["alright, let me know if I can help you with anything else!"]
"#;

    #[test]
    fn test_from_yaml() {
        let library = PhraseLibrary::from_yaml(YELP).unwrap();
        let restaurant = library.function("com.yelp.restaurant").unwrap();
        assert_eq!(restaurant.result.top.len(), 1);
        assert!(restaurant.result.list.is_empty());
        assert!(!restaurant.result.is_empty());

        let action = library.function("com.yelp.make_reservation").unwrap();
        assert!(action.result.is_empty());
        assert_eq!(action.error["no_table"].len(), 1);
        assert_eq!(library.utterances("ctx_sys_end").len(), 1);
        assert!(library.utterances("ctx_sys_greet").is_empty());
    }

    #[test]
    fn test_merge_keeps_existing() {
        let mut library = PhraseLibrary::from_yaml(YELP).unwrap();
        let other = PhraseLibrary::from_yaml(
            "utterances:\n  ctx_sys_end: [\"goodbye\"]\n  ctx_sys_greet: [\"hi\"]\n",
        )
        .unwrap();
        library.merge(other);
        assert_eq!(library.utterances("ctx_sys_end")[0], "alright, let me know if I can help you with anything else!");
        assert_eq!(library.utterances("ctx_sys_greet")[0], "hi");
    }
}
