//! Function signatures

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgDirection {
    InReq,
    InOpt,
    Out,
}

fn default_filterable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArgumentDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    pub direction: ArgDirection,
    /// The argument identifies a single result (e.g. `id`).
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_filterable")]
    pub filterable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Filters on these arguments cannot be combined with a filter on this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflict_filter: Vec<String>,
    #[serde(default)]
    pub raw_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_values: Option<String>,
}

impl ArgumentDef {
    fn new(name: impl Into<String>, ty: Type, direction: ArgDirection) -> Self {
        Self {
            name: name.into(),
            ty,
            direction,
            unique: false,
            filterable: true,
            default: None,
            conflict_filter: Vec::new(),
            raw_mode: false,
            string_values: None,
        }
    }

    pub fn required(name: impl Into<String>, ty: Type) -> Self {
        Self::new(name, ty, ArgDirection::InReq)
    }

    pub fn optional(name: impl Into<String>, ty: Type) -> Self {
        Self::new(name, ty, ArgDirection::InOpt)
    }

    pub fn output(name: impl Into<String>, ty: Type) -> Self {
        Self::new(name, ty, ArgDirection::Out)
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_conflict_filter<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.conflict_filter = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_raw_mode(mut self, raw_mode: bool) -> Self {
        self.raw_mode = raw_mode;
        self
    }

    pub fn with_string_values(mut self, values: impl Into<String>) -> Self {
        self.string_values = Some(values.into());
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction != ArgDirection::Out
    }

    pub fn is_required(&self) -> bool {
        self.direction == ArgDirection::InReq
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    Query,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmMode {
    #[default]
    Auto,
    DisplayResult,
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionDef {
    pub class_name: String,
    pub name: String,
    pub function_type: FunctionType,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_monitorable: bool,
    #[serde(default)]
    pub no_filter: bool,
    #[serde(default)]
    pub confirm: ConfirmMode,
    /// Qualified names of related functions, used for follow-up questions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
    #[serde(default)]
    pub args: Vec<ArgumentDef>,
}

impl FunctionDef {
    pub fn new(class_name: impl Into<String>, name: impl Into<String>, function_type: FunctionType) -> Self {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            function_type,
            is_list: false,
            is_monitorable: false,
            no_filter: false,
            confirm: ConfirmMode::Auto,
            related: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn query(class_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(class_name, name, FunctionType::Query)
    }

    pub fn action(class_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(class_name, name, FunctionType::Action).with_confirm(ConfirmMode::Confirm)
    }

    pub fn with_list(mut self, is_list: bool) -> Self {
        self.is_list = is_list;
        self
    }

    pub fn with_monitorable(mut self, is_monitorable: bool) -> Self {
        self.is_monitorable = is_monitorable;
        self
    }

    pub fn with_no_filter(mut self, no_filter: bool) -> Self {
        self.no_filter = no_filter;
        self
    }

    pub fn with_confirm(mut self, confirm: ConfirmMode) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_related(mut self, related: impl Into<String>) -> Self {
        self.related.push(related.into());
        self
    }

    pub fn with_arg(mut self, arg: ArgumentDef) -> Self {
        self.args.push(arg);
        self
    }

    pub fn build(self) -> Arc<FunctionDef> {
        Arc::new(self)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class_name, self.name)
    }

    pub fn is_action(&self) -> bool {
        self.function_type == FunctionType::Action
    }

    pub fn is_query(&self) -> bool {
        self.function_type == FunctionType::Query
    }

    pub fn get_argument(&self, name: &str) -> Option<&ArgumentDef> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn get_argument_type(&self, name: &str) -> Option<&Type> {
        self.get_argument(name).map(|a| &a.ty)
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.get_argument(name).is_some()
    }

    pub fn iterate_arguments(&self) -> impl Iterator<Item = &ArgumentDef> {
        self.args.iter()
    }

    pub fn has_outputs(&self) -> bool {
        self.args.iter().any(|a| !a.is_input())
    }

    pub fn count_input_output(&self) -> (usize, usize) {
        let inputs = self.args.iter().filter(|a| a.is_input()).count();
        (inputs, self.args.len() - inputs)
    }

    /// Type of the `id` output, if the function returns identifiable results.
    pub fn id_type(&self) -> Option<&Type> {
        self.get_argument("id")
            .filter(|a| !a.is_input())
            .map(|a| &a.ty)
    }

    /// Output-restricted signature of a projection. Inputs and `id` stay.
    pub(crate) fn project(&self, names: &[String], computed: &[String]) -> FunctionDef {
        let mut clone = self.clone();
        clone
            .args
            .retain(|a| a.is_input() || a.name == "id" || names.contains(&a.name));
        for name in computed {
            if !clone.has_argument(name) {
                clone.args.push(ArgumentDef::output(name.clone(), Type::Number));
            }
        }
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let def = FunctionDef::query("com.yelp", "restaurant")
            .with_list(true)
            .with_arg(ArgumentDef::output("id", Type::entity("com.yelp:restaurant")).with_unique(true))
            .with_arg(ArgumentDef::output("rating", Type::Number))
            .with_arg(ArgumentDef::optional("near", Type::Location));

        assert_eq!(def.qualified_name(), "com.yelp.restaurant");
        assert_eq!(def.id_type(), Some(&Type::entity("com.yelp:restaurant")));
        assert_eq!(def.count_input_output(), (1, 2));
        assert!(def.has_outputs());

        let projected = def.project(&["rating".to_string()], &["distance".to_string()]);
        let names: Vec<&str> = projected.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "rating", "near", "distance"]);
    }

    #[test]
    fn test_actions_confirm_by_default() {
        let def = FunctionDef::action("com.yelp", "make_reservation");
        assert_eq!(def.confirm, ConfirmMode::Confirm);
        assert!(def.is_action());
    }
}
