//! Information bags and proposal payloads passed between agent and user turns

use std::collections::BTreeMap;
use std::sync::Arc;

use genie_thingtalk::{BooleanExpression, FunctionDef, Invocation, ResultItem, Value};

/// A set of `parameter = value` facts about the results of one function.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotBag {
    pub schema: Arc<FunctionDef>,
    store: BTreeMap<String, Value>,
}

impl SlotBag {
    pub fn new(schema: Arc<FunctionDef>) -> Self {
        Self {
            schema,
            store: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.store.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.store.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.store.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.store.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.store.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Union of two bags on the same function; `None` on conflicting values.
    pub fn merge(a: &SlotBag, b: &SlotBag) -> Option<SlotBag> {
        if a.schema.qualified_name() != b.schema.qualified_name() {
            return None;
        }
        let mut merged = a.clone();
        for (name, value) in b.iter() {
            match merged.get(name) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => merged.set(name, value.clone()),
            }
        }
        Some(merged)
    }

    /// Add the fact expressed by an equality filter.
    ///
    /// Only `==` atoms on known, constant-valued parameters are accepted, and
    /// a parameter cannot be mentioned twice.
    pub fn check_and_add_slot(&self, filter: &BooleanExpression) -> Option<SlotBag> {
        let atom = filter.as_atom()?;
        if atom.operator != "==" || !atom.value.is_constant() {
            return None;
        }
        let arg = self.schema.get_argument(&atom.name)?;
        if arg.is_input() || self.has(&atom.name) {
            return None;
        }
        if !atom.value.get_type().is_assignable(&arg.ty) {
            return None;
        }
        Some(self.clone().with(atom.name.clone(), atom.value.clone()))
    }
}

/// The agent recommends the top result, optionally offering an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub top_result: ResultItem,
    pub info: Option<SlotBag>,
    pub action: Option<Invocation>,
    pub has_learn_more: bool,
    pub has_anything_else: bool,
}

/// The agent lists a few results, optionally offering an action.
#[derive(Debug, Clone, PartialEq)]
pub struct ListProposal {
    pub results: Vec<ResultItem>,
    pub info: Option<SlotBag>,
    pub action: Option<Invocation>,
    pub has_learn_more: bool,
}

/// What the agent just told the user, carried on the context of the reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAux {
    Recommendation(Recommendation),
    ListProposal(ListProposal),
    SlotBag(SlotBag),
    /// Parameters the agent asked about.
    Questions(Vec<String>),
}

impl AgentAux {
    pub fn as_recommendation(&self) -> Option<&Recommendation> {
        match self {
            AgentAux::Recommendation(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn as_list_proposal(&self) -> Option<&ListProposal> {
        match self {
            AgentAux::ListProposal(proposal) => Some(proposal),
            _ => None,
        }
    }

    pub fn as_slot_bag(&self) -> Option<&SlotBag> {
        match self {
            AgentAux::SlotBag(bag) => Some(bag),
            _ => None,
        }
    }

    pub fn as_questions(&self) -> Option<&[String]> {
        match self {
            AgentAux::Questions(questions) => Some(questions),
            _ => None,
        }
    }
}
