//! Dialogue states

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::levenshtein::LevenshteinDelta;
use crate::statement::ExpressionStatement;
use crate::value::Value;

/// Results at or beyond this count are considered large.
pub const LARGE_RESULT_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    Proposed,
    Accepted,
    Confirmed,
}

impl ConfirmationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationState::Proposed => "proposed",
            ConfirmationState::Accepted => "accepted",
            ConfirmationState::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultItem {
    pub value: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, serde_json::Value>,
}

// `raw` mirrors `value` in native form; hashing `value` alone is enough.
impl Hash for ResultItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl ResultItem {
    pub fn new(value: BTreeMap<String, Value>) -> Self {
        Self {
            value,
            raw: BTreeMap::new(),
        }
    }

    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, Value)>) -> Self {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    pub fn id(&self) -> Option<&Value> {
        self.value.get("id")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResultList {
    pub results: Vec<ResultItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default)]
    pub more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ResultList {
    pub fn new(results: Vec<ResultItem>) -> Self {
        let count = results.len();
        Self {
            results,
            count: Some(count),
            more: false,
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_error(error: Value) -> Self {
        Self {
            error: Some(error),
            ..Self::empty()
        }
    }

    pub fn is_large(&self) -> bool {
        self.is_large_with(LARGE_RESULT_THRESHOLD)
    }

    pub fn is_large_with(&self, threshold: usize) -> bool {
        self.more || self.count.is_none_or(|c| c >= threshold)
    }

    pub fn top(&self) -> Option<&ResultItem> {
        self.results.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueHistoryItem {
    pub statement: Arc<ExpressionStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultList>,
    pub confirm: ConfirmationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levenshtein: Option<LevenshteinDelta>,
}

impl DialogueHistoryItem {
    pub fn new(statement: ExpressionStatement, confirm: ConfirmationState) -> Self {
        Self {
            statement: Arc::new(statement),
            results: None,
            confirm,
            levenshtein: None,
        }
    }

    pub fn with_results(mut self, results: ResultList) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_levenshtein(mut self, delta: Option<LevenshteinDelta>) -> Self {
        self.levenshtein = delta;
        self
    }

    pub fn is_executed(&self) -> bool {
        self.results.is_some()
    }

    /// Owning device of the statement.
    pub fn device(&self) -> Option<&str> {
        self.statement
            .last()
            .map(|e| e.schema().class_name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActParam {
    Name(String),
    Value(Value),
}

impl ActParam {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            ActParam::Name(name) => Some(name),
            ActParam::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ActParam::Value(v) => Some(v),
            ActParam::Name(_) => None,
        }
    }
}

impl fmt::Display for ActParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActParam::Name(name) => write!(f, "{}", name),
            ActParam::Value(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueState {
    pub policy: String,
    pub dialogue_act: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue_act_param: Option<Vec<ActParam>>,
    #[serde(default)]
    pub history: Vec<DialogueHistoryItem>,
}

impl DialogueState {
    pub fn new(
        policy: impl Into<String>,
        dialogue_act: impl Into<String>,
        dialogue_act_param: Option<Vec<ActParam>>,
    ) -> Self {
        Self {
            policy: policy.into(),
            dialogue_act: dialogue_act.into(),
            dialogue_act_param,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<DialogueHistoryItem>) -> Self {
        self.history = history;
        self
    }

    /// Parameter names of the dialogue act, skipping value parameters.
    pub fn act_param_names(&self) -> Vec<String> {
        self.dialogue_act_param
            .iter()
            .flatten()
            .filter_map(|p| p.as_name().map(str::to_string))
            .collect()
    }
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$dialogue @{}.{}", self.policy, self.dialogue_act)?;
        if let Some(params) = &self.dialogue_act_param {
            let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
            write!(f, "({})", params.join(", "))?;
        }
        writeln!(f, ";")?;
        for item in &self.history {
            write!(f, "{}", item.statement)?;
            if let Some(results) = &item.results {
                write!(f, " #[results={}]", results.results.len())?;
                if let Some(count) = results.count {
                    write!(f, " #[count={}]", count)?;
                }
                if results.more {
                    write!(f, " #[more=true]")?;
                }
                if let Some(error) = &results.error {
                    write!(f, " #[error={}]", error)?;
                }
            }
            writeln!(f, " #[confirm=enum {}];", item.confirm.as_str())?;
        }
        Ok(())
    }
}
