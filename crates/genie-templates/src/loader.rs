//! Phrase file loading

use genie_core::{GenieError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::library::PhraseLibrary;

/// Loads phrase libraries from YAML files found on a list of search paths.
pub struct PhraseLoader {
    search_paths: Vec<PathBuf>,
    variables: HashMap<String, String>,
}

impl PhraseLoader {
    pub fn new() -> Self {
        Self {
            search_paths: vec![PathBuf::from("phrases")],
            variables: HashMap::new(),
        }
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.search_paths.push(path.into());
        self
    }

    /// Variables are available to every phrase (e.g. `${agent_name}`).
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn get_variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|s| s.as_str())
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        for search_path in &self.search_paths {
            let mut path = search_path.clone();
            if !name.ends_with(".yaml") && !name.ends_with(".yml") {
                path.push(format!("{}.yaml", name));
            } else {
                path.push(name);
            }
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    pub fn load_file(&self, name: &str) -> Result<String> {
        let path = self.resolve(name).ok_or_else(|| {
            GenieError::Template(format!(
                "Phrase file '{}' not found in search paths: {:?}",
                name, self.search_paths
            ))
        })?;
        std::fs::read_to_string(&path)
            .map_err(|e| GenieError::Template(format!("Failed to read {}: {}", path.display(), e)))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Parse one phrase file. Loader variables are added to the library.
    pub fn load_library(&self, name: &str) -> Result<PhraseLibrary> {
        let content = self.load_file(name)?;
        let mut library = PhraseLibrary::from_yaml(&content)?;
        for (key, value) in &self.variables {
            library.variables.entry(key.clone()).or_insert_with(|| value.clone());
        }
        debug!(name, functions = library.functions.len(), "Loaded phrase library");
        Ok(library)
    }

    /// Merge every `.yaml` file of every search path. Earlier paths win on
    /// conflicting entries.
    pub fn load_all(&self) -> Result<PhraseLibrary> {
        let mut merged = PhraseLibrary::default();
        for search_path in &self.search_paths {
            let entries = match std::fs::read_dir(search_path) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")))
                .collect();
            files.sort();
            for file in files {
                let content = std::fs::read_to_string(&file)?;
                merged.merge(PhraseLibrary::from_yaml(&content)?);
            }
        }
        for (key, value) in &self.variables {
            merged.variables.insert(key.clone(), value.clone());
        }
        Ok(merged)
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for PhraseLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_phrase_file(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_auto_extension() {
        let temp_dir = TempDir::new().unwrap();
        create_phrase_file(temp_dir.path(), "yelp.yaml", "functions: {}");

        let mut loader = PhraseLoader::new();
        loader.add_search_path(temp_dir.path());

        assert_eq!(loader.load_file("yelp").unwrap(), "functions: {}");
        assert!(loader.exists("yelp.yaml"));
        assert!(!loader.exists("hotels"));
        assert!(loader.load_file("hotels").is_err());
    }

    #[test]
    fn test_load_all_priority() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        create_phrase_file(
            first.path(),
            "a.yaml",
            "utterances:\n  ctx_sys_greet: [\"first\"]\n",
        );
        create_phrase_file(
            second.path(),
            "b.yaml",
            "utterances:\n  ctx_sys_greet: [\"second\"]\n  ctx_sys_end: [\"bye\"]\n",
        );

        let mut loader = PhraseLoader::new();
        loader.add_search_path(first.path());
        loader.add_search_path(second.path());
        loader.set_variable("agent_name", "Genie");

        let library = loader.load_all().unwrap();
        assert_eq!(library.utterances["ctx_sys_greet"], vec!["first".to_string()]);
        assert_eq!(library.utterances["ctx_sys_end"], vec!["bye".to_string()]);
        assert_eq!(library.variables["agent_name"], "Genie");
    }
}
