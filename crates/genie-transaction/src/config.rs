//! Policy configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use genie_core::{DiagnosticsSink, FileSink, GenieError, NullSink, Result, TracingSink};

/// How a dialogue session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// The agent greets the user first.
    #[default]
    Normal,
    /// The user speaks first.
    NoWelcome,
    /// Resume a previous session without greeting.
    Resume,
    /// Greet a user that has never talked to the agent.
    UserFirstTime,
}

impl StartMode {
    pub fn greets(self) -> bool {
        matches!(self, StartMode::Normal | StartMode::UserFirstTime)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub start_mode: StartMode,

    /// Reject new requests on a different device while one is in progress.
    #[serde(default)]
    pub strict_multidomain: bool,

    /// Results described individually in a list phrase.
    #[serde(default = "default_max_list_length")]
    pub max_list_length: usize,

    /// Size of the process-wide context cache. Applied at startup with
    /// `ContextCache::global().set_capacity`.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Check edit scripts against directly built statements.
    #[serde(default = "default_verify_levenshtein")]
    pub verify_levenshtein: bool,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub phrases: PhrasesConfig,

    /// Seed for phrase choice sampling; deterministic first choice when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_max_list_length() -> usize {
    5
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_verify_levenshtein() -> bool {
    cfg!(debug_assertions)
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            start_mode: StartMode::Normal,
            strict_multidomain: false,
            max_list_length: default_max_list_length(),
            cache_capacity: default_cache_capacity(),
            verify_levenshtein: default_verify_levenshtein(),
            diagnostics: DiagnosticsConfig::default(),
            phrases: PhrasesConfig::default(),
            seed: None,
        }
    }
}

impl PolicyConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: PolicyConfig = genie_core::yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_list_length == 0 {
            return Err(GenieError::Config("max_list_length must be at least 1".into()));
        }
        if self.cache_capacity == 0 {
            return Err(GenieError::Config("cache_capacity must be at least 1".into()));
        }
        if self.diagnostics.kind == DiagnosticsKind::File && self.diagnostics.path.is_none() {
            return Err(GenieError::Config(
                "diagnostics.path is required for the file sink".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsKind {
    #[default]
    Tracing,
    File,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub kind: DiagnosticsKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl DiagnosticsConfig {
    pub fn build_sink(&self) -> Result<Arc<dyn DiagnosticsSink>> {
        match (self.kind, &self.path) {
            (DiagnosticsKind::Tracing, _) => Ok(Arc::new(TracingSink)),
            (DiagnosticsKind::None, _) => Ok(Arc::new(NullSink)),
            (DiagnosticsKind::File, Some(path)) => Ok(Arc::new(FileSink::new(path)?)),
            (DiagnosticsKind::File, None) => Err(GenieError::Config(
                "diagnostics.path is required for the file sink".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhrasesConfig {
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,
}

fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("phrases")]
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = PolicyConfig::from_yaml("{}").unwrap();
        assert_eq!(config.start_mode, StartMode::Normal);
        assert_eq!(config.max_list_length, 5);
        assert_eq!(config.cache_capacity, 4096);
        assert_eq!(config.diagnostics.kind, DiagnosticsKind::Tracing);
        assert_eq!(config.phrases.search_paths, vec![PathBuf::from("phrases")]);
    }

    #[test]
    fn test_parse_full() {
        let yaml = r#"
start_mode: no_welcome
strict_multidomain: true
max_list_length: 3
verify_levenshtein: true
diagnostics:
  kind: none
seed: 42
"#;
        let config = PolicyConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.start_mode, StartMode::NoWelcome);
        assert!(!config.start_mode.greets());
        assert!(config.strict_multidomain);
        assert_eq!(config.max_list_length, 3);
        assert_eq!(config.seed, Some(42));
        assert!(config.diagnostics.build_sink().is_ok());
    }

    #[test]
    fn test_file_sink_requires_path() {
        let err = PolicyConfig::from_yaml("diagnostics:\n  kind: file\n").unwrap_err();
        assert!(matches!(err, GenieError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("policy.yaml");
        let log = temp.path().join("levenshtein.jsonl");
        std::fs::write(
            &path,
            format!("diagnostics:\n  kind: file\n  path: {}\n", log.display()),
        )
        .unwrap();

        let config = PolicyConfig::from_file(&path).unwrap();
        assert_eq!(config.diagnostics.path.as_deref(), Some(log.as_path()));
        assert!(config.diagnostics.build_sink().is_ok());
    }
}
