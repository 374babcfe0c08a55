//! Function library: schemas, follow-ups and phrases

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use genie_core::{GenieError, Result};
use genie_templates::{PhraseLibrary, PhraseLoader};
use genie_thingtalk::FunctionDef;

/// Only offer the follow-up when a result (or input) field has a given value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpCondition {
    pub name: String,
    pub value: String,
}

/// An action the agent offers after a query completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    /// Qualified name of the follow-up function.
    pub function: String,
    /// Input parameters copied from the last invocation of the same function.
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<FollowUpCondition>,
}

#[derive(Debug, Default, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    initial_function: Option<String>,
    #[serde(default)]
    functions: Vec<FunctionDef>,
    #[serde(default)]
    follow_ups: BTreeMap<String, FollowUp>,
    #[serde(default)]
    id_queries: BTreeMap<String, String>,
}

/// Everything the policy knows about the available skills.
#[derive(Debug, Clone, Default)]
pub struct Thingpedia {
    functions: BTreeMap<String, Arc<FunctionDef>>,
    follow_ups: BTreeMap<String, FollowUp>,
    id_queries: BTreeMap<String, String>,
    initial_function: Option<String>,
    phrases: PhraseLibrary,
}

impl Thingpedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: LibraryFile = genie_core::yaml::from_str(content)?;
        let mut library = Thingpedia::new();
        for function in file.functions {
            library.add_function(Arc::new(function));
        }
        for (name, follow_up) in file.follow_ups {
            library.add_follow_up(name, follow_up)?;
        }
        for (entity, query) in file.id_queries {
            library.add_id_query(entity, query)?;
        }
        if let Some(name) = file.initial_function {
            library.set_initial_function(name)?;
        }
        Ok(library)
    }

    /// Load the schema file at `path` and every phrase file on the loader's paths.
    pub fn load(path: impl AsRef<Path>, loader: &PhraseLoader) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut library = Self::from_yaml(&content)?;
        library.phrases = loader.load_all()?;
        debug!(
            path = %path.display(),
            functions = library.functions.len(),
            follow_ups = library.follow_ups.len(),
            "Loaded function library"
        );
        Ok(library)
    }

    pub fn with_phrases(mut self, phrases: PhraseLibrary) -> Self {
        self.phrases = phrases;
        self
    }

    pub fn add_function(&mut self, function: Arc<FunctionDef>) -> &mut Self {
        self.functions.insert(function.qualified_name(), function);
        self
    }

    pub fn add_follow_up(&mut self, from: impl Into<String>, follow_up: FollowUp) -> Result<&mut Self> {
        self.require(&follow_up.function)?;
        self.follow_ups.insert(from.into(), follow_up);
        Ok(self)
    }

    pub fn add_id_query(&mut self, entity_type: impl Into<String>, function: impl Into<String>) -> Result<&mut Self> {
        let function = function.into();
        self.require(&function)?;
        self.id_queries.insert(entity_type.into(), function);
        Ok(self)
    }

    pub fn set_initial_function(&mut self, name: impl Into<String>) -> Result<&mut Self> {
        let name = name.into();
        self.require(&name)?;
        self.initial_function = Some(name);
        Ok(self)
    }

    fn require(&self, name: &str) -> Result<()> {
        if self.functions.contains_key(name) {
            Ok(())
        } else {
            Err(GenieError::Config(format!("unknown function '{}'", name)))
        }
    }

    pub fn function(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionDef>> {
        self.functions.values()
    }

    pub fn follow_up(&self, name: &str) -> Option<(&FollowUp, &Arc<FunctionDef>)> {
        let follow_up = self.follow_ups.get(name)?;
        let schema = self.functions.get(&follow_up.function)?;
        Some((follow_up, schema))
    }

    /// The query listing entities of the given type, if any.
    pub fn id_query(&self, entity_type: &str) -> Option<&Arc<FunctionDef>> {
        self.id_queries
            .get(entity_type)
            .and_then(|name| self.functions.get(name))
    }

    pub fn initial_function(&self) -> Option<&Arc<FunctionDef>> {
        self.initial_function
            .as_deref()
            .and_then(|name| self.functions.get(name))
    }

    pub fn phrases(&self) -> &PhraseLibrary {
        &self.phrases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LIBRARY: &str = r#"
initial_function: com.yelp.restaurant
functions:
  - class_name: com.yelp
    name: restaurant
    function_type: query
    is_list: true
    args:
      - name: id
        type: Entity(com.yelp:restaurant)
        direction: out
        unique: true
      - name: price
        type: Enum(cheap,moderate,expensive)
        direction: out
  - class_name: com.yelp
    name: make_reservation
    function_type: action
    confirm: confirm
    args:
      - name: restaurant
        type: Entity(com.yelp:restaurant)
        direction: in_req
follow_ups:
  com.yelp.restaurant:
    function: com.yelp.make_reservation
id_queries:
  com.yelp:restaurant: com.yelp.restaurant
"#;

    #[test]
    fn test_from_yaml() {
        let library = Thingpedia::from_yaml(LIBRARY).unwrap();
        assert_eq!(library.functions().count(), 2);
        assert_eq!(
            library.initial_function().unwrap().qualified_name(),
            "com.yelp.restaurant"
        );
        let (follow_up, schema) = library.follow_up("com.yelp.restaurant").unwrap();
        assert!(follow_up.params.is_empty());
        assert!(schema.is_action());
        assert_eq!(
            library.id_query("com.yelp:restaurant").unwrap().name,
            "restaurant"
        );
        assert!(library.follow_up("com.yelp.make_reservation").is_none());
    }

    #[test]
    fn test_unknown_follow_up_rejected() {
        let yaml = "functions: []\nfollow_ups:\n  a.b:\n    function: a.c\n";
        let err = Thingpedia::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, GenieError::Config(_)));
    }

    #[test]
    fn test_load_with_phrases() {
        let temp = TempDir::new().unwrap();
        let phrases = temp.path().join("phrases");
        std::fs::create_dir(&phrases).unwrap();
        std::fs::write(temp.path().join("yelp.yaml"), LIBRARY).unwrap();
        std::fs::write(
            phrases.join("yelp.yaml"),
            "utterances:\n  ctx_sys_greet: [\"hello\"]\n",
        )
        .unwrap();

        let mut loader = PhraseLoader::new();
        loader.add_search_path(&phrases);
        let library = Thingpedia::load(temp.path().join("yelp.yaml"), &loader).unwrap();
        assert_eq!(library.phrases().utterances("ctx_sys_greet"), ["hello".to_string()]);
    }
}
