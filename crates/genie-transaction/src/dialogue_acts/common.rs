//! Checks shared by the dialogue acts

use std::sync::Arc;

use genie_thingtalk::{
    ActParam, BooleanExpression, DialogueHistoryItem, Expression, FunctionDef, InputParam, Invocation,
    LevenshteinDelta, ResultItem, Type, Value,
};

use crate::ast_manip::is_same_function;
use crate::context_info::ContextInfo;
use crate::slot_bag::SlotBag;

/// A parameter of a function the agent or the user talks about.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSlot {
    pub schema: Arc<FunctionDef>,
    pub name: String,
    pub ty: Type,
    pub filterable: bool,
}

impl ParamSlot {
    pub fn new(schema: &Arc<FunctionDef>, name: &str) -> Option<Self> {
        let arg = schema.get_argument(name)?;
        Some(Self {
            schema: schema.clone(),
            name: name.to_string(),
            ty: arg.ty.clone(),
            filterable: arg.filterable,
        })
    }
}

/// A filter clause the user said, with the function it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSlot {
    pub schema: Arc<FunctionDef>,
    pub ty: Type,
    pub ast: BooleanExpression,
}

impl FilterSlot {
    /// `name <operator> value` on `schema`, if the parameter exists.
    pub fn atom(schema: &Arc<FunctionDef>, name: &str, operator: &str, value: Value) -> Option<Self> {
        let ty = schema.get_argument_type(name)?.clone();
        Some(Self {
            schema: schema.clone(),
            ty,
            ast: BooleanExpression::atom(name, operator, value),
        })
    }
}

/// An input parameter the user said, with the function it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct InputParamSlot {
    pub schema: Arc<FunctionDef>,
    pub param: InputParam,
}

pub fn question_names(questions: &[ParamSlot]) -> Vec<String> {
    questions.iter().map(|q| q.name.clone()).collect()
}

/// Whether what the agent said about the results (`info`) agrees with the
/// user's filter. Operators the bag cannot decide are accepted.
pub fn is_filter_compatible_with_info(info: &SlotBag, filter: &BooleanExpression) -> bool {
    match filter {
        BooleanExpression::True | BooleanExpression::DontCare { .. } => true,
        BooleanExpression::False => false,
        BooleanExpression::Or { operands } => operands.iter().any(|f| is_filter_compatible_with_info(info, f)),
        BooleanExpression::And { operands } => operands.iter().all(|f| is_filter_compatible_with_info(info, f)),
        BooleanExpression::Not { expr } => !is_filter_compatible_with_info(info, expr),
        BooleanExpression::External(_) | BooleanExpression::Compute(_) | BooleanExpression::Existential { .. } => {
            true
        }
        BooleanExpression::Atom(atom) => {
            let Some(known) = info.get(&atom.name) else {
                return false;
            };
            if !atom.value.is_constant() {
                return true;
            }
            match atom.operator.as_str() {
                "==" | "=~" => &atom.value == known,
                "contains" | "contains~" => known.as_array().is_some_and(|values| values.contains(&atom.value)),
                "in_array" | "in_array~" => atom.value.as_array().is_some_and(|values| values.contains(known)),
                ">=" => matches!((known.as_number(), atom.value.as_number()), (Some(k), Some(v)) if k >= v),
                "<=" => matches!((known.as_number(), atom.value.as_number()), (Some(k), Some(v)) if k <= v),
                _ => true,
            }
        }
    }
}

/// Whether the top result satisfies the filter, as far as can be told from
/// its values. Fields the result does not carry never match.
pub fn is_filter_compatible_with_result(result: &ResultItem, filter: &BooleanExpression) -> bool {
    match filter {
        BooleanExpression::True | BooleanExpression::DontCare { .. } => true,
        BooleanExpression::False => false,
        BooleanExpression::And { operands } => operands.iter().all(|f| is_filter_compatible_with_result(result, f)),
        BooleanExpression::Or { operands } => operands.iter().any(|f| is_filter_compatible_with_result(result, f)),
        BooleanExpression::Not { expr } => !is_filter_compatible_with_result(result, expr),
        BooleanExpression::External(_) | BooleanExpression::Compute(_) | BooleanExpression::Existential { .. } => {
            true
        }
        BooleanExpression::Atom(atom) => {
            let Some(value) = result.get(&atom.name) else {
                return false;
            };
            if let Value::Entity { display, .. } = value {
                return if atom.operator == "=~" {
                    display.as_deref() == atom.value.as_str()
                } else {
                    value.to_key_string() == atom.value.to_key_string()
                };
            }
            match atom.operator.as_str() {
                "==" | "=~" => value.to_key_string() == atom.value.to_key_string(),
                _ => true,
            }
        }
    }
}

/// Arrays match when the stated values are a subset of the result's.
pub fn is_slot_compatible_with_result(result: &ResultItem, name: &str, info_value: &Value) -> bool {
    let Some(value) = result.get(name) else {
        return false;
    };
    match (value, info_value) {
        (Value::Array(have), Value::Array(said)) => said.iter().all(|v| have.contains(v)),
        _ => value == info_value,
    }
}

pub fn is_info_phrase_compatible_with_result(result: &ResultItem, info: &SlotBag) -> bool {
    info.iter()
        .all(|(name, value)| is_slot_compatible_with_result(result, name, value))
}

/// Asking about `questions` is allowed: each is a filterable output of the table.
pub fn is_valid_search_question(table: &Expression, questions: &[ParamSlot]) -> bool {
    let schema = table.schema();
    questions.iter().all(|q| {
        is_same_function(&q.schema, schema)
            && schema
                .get_argument(&q.name)
                .is_some_and(|arg| !arg.is_input() && arg.filterable)
    })
}

/// Copy the defined parameters of `from` that `to` does not set.
pub fn add_parameters_from_context(to: &Invocation, from: &Invocation) -> Invocation {
    let mut merged = to.clone();
    for param in &from.in_params {
        if param.value.is_undefined() {
            continue;
        }
        if to.get_param(&param.name).is_some_and(|v| !v.is_undefined()) {
            continue;
        }
        merged.set_param(param.name.clone(), param.value.clone());
    }
    merged
}

/// The first argument of `action` that accepts the id of `top_result`.
pub fn find_chain_param(top_result: &ResultItem, action: &FunctionDef) -> Option<String> {
    let id_type = top_result.id()?.get_type();
    action
        .iterate_arguments()
        .find(|arg| arg.ty == id_type)
        .map(|arg| arg.name.clone())
}

/// The parameters the last agent act asked about, if it named any.
pub fn asked_params(ctx: &ContextInfo) -> Option<Vec<&str>> {
    ctx.state
        .dialogue_act_param
        .as_ref()
        .map(|params| params.iter().filter_map(ActParam::as_name).collect())
}

/// `action` can stand in for the pending action: same function, and the
/// chain parameter is left for a result to fill.
pub fn fits_pending_action(ctx: &ContextInfo, action: &Invocation) -> bool {
    let (Some(next_function), Some(next_info)) = (&ctx.next_function, &ctx.next_info) else {
        return true;
    };
    if !is_same_function(&action.schema, next_function) {
        return false;
    }
    match &next_info.chain_parameter {
        Some(chain) => next_info.chain_parameter_filled || action.get_param(chain).is_none(),
        None => true,
    }
}

/// The invocation of a history item that runs an action.
pub fn get_action_invocation(item: &DialogueHistoryItem) -> Option<&Invocation> {
    item.statement.last().filter(|e| e.is_action())?.as_invocation()
}

/// A filter applied directly to an invocation.
pub fn is_simple_filter_expression(table: &Expression) -> bool {
    table
        .as_filter()
        .is_some_and(|f| matches!(f.expression.as_ref(), Expression::Invocation(_)))
}

/// Edit script adding `filter` to the query on `schema`.
pub fn filter_delta(schema: &Arc<FunctionDef>, filter: BooleanExpression) -> LevenshteinDelta {
    LevenshteinDelta::continuing(Expression::filter(Invocation::new(schema.clone()).into(), filter)).optimize()
}

/// Edit script projecting the query on `schema` to `names`.
pub fn projection_delta(schema: &Arc<FunctionDef>, names: Vec<String>) -> LevenshteinDelta {
    LevenshteinDelta::continuing(Expression::projection(Invocation::new(schema.clone()).into(), names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    fn cheap() -> BooleanExpression {
        BooleanExpression::atom("price", "==", Value::enumerated("cheap"))
    }

    #[test]
    fn test_filter_compatible_with_info() {
        let info = SlotBag::new(restaurant_schema())
            .with("price", Value::enumerated("cheap"))
            .with("rating", Value::Number(4.5));
        assert!(is_filter_compatible_with_info(&info, &cheap()));
        assert!(!is_filter_compatible_with_info(&info, &BooleanExpression::not(cheap())));
        assert!(is_filter_compatible_with_info(
            &info,
            &BooleanExpression::atom("rating", ">=", Value::Number(4.0))
        ));
        assert!(!is_filter_compatible_with_info(
            &info,
            &BooleanExpression::atom("rating", "<=", Value::Number(4.0))
        ));
        // nothing was said about the area
        assert!(!is_filter_compatible_with_info(
            &info,
            &BooleanExpression::atom("area", "==", Value::enumerated("north"))
        ));
        let either = BooleanExpression::atom(
            "price",
            "in_array",
            Value::Array(vec![Value::enumerated("cheap"), Value::enumerated("moderate")]),
        );
        assert!(is_filter_compatible_with_info(&info, &either));
    }

    #[test]
    fn test_filter_compatible_with_result() {
        let result = restaurant_result("r1", "cheap", 4.0);
        assert!(is_filter_compatible_with_result(&result, &cheap()));
        assert!(!is_filter_compatible_with_result(&result, &BooleanExpression::not(cheap())));
        let by_name = BooleanExpression::atom("id", "=~", Value::string("Restaurant r1"));
        assert!(is_filter_compatible_with_result(&result, &by_name));
        let by_id = BooleanExpression::atom("id", "==", restaurant_entity("r2"));
        assert!(!is_filter_compatible_with_result(&result, &by_id));
        // comparisons are not checked
        let rated = BooleanExpression::atom("rating", ">=", Value::Number(5.0));
        assert!(is_filter_compatible_with_result(&result, &rated));
        let cuisine = BooleanExpression::atom("cuisine", "contains", Value::string("thai"));
        assert!(!is_filter_compatible_with_result(&result, &cuisine));
    }

    #[test]
    fn test_info_phrase_compatible_with_result() {
        let mut result = restaurant_result("r1", "cheap", 4.0);
        result.value.insert(
            "cuisine".to_string(),
            Value::Array(vec![Value::string("thai"), Value::string("chinese")]),
        );
        let info = SlotBag::new(restaurant_schema())
            .with("price", Value::enumerated("cheap"))
            .with("cuisine", Value::Array(vec![Value::string("thai")]));
        assert!(is_info_phrase_compatible_with_result(&result, &info));
        let wrong = info.clone().with("rating", Value::Number(3.0));
        assert!(!is_info_phrase_compatible_with_result(&result, &wrong));
    }

    #[test]
    fn test_valid_search_question() {
        let schema = restaurant_schema();
        let price = ParamSlot::new(&schema, "price").unwrap();
        let near = ParamSlot::new(&schema, "near").unwrap();
        assert!(is_valid_search_question(&restaurants(), &[price.clone()]));
        assert!(!is_valid_search_question(&restaurants(), &[price, near]));
        assert!(ParamSlot::new(&schema, "stars").is_none());
    }

    #[test]
    fn test_find_chain_param_and_context_params() {
        let result = restaurant_result("r1", "cheap", 4.0);
        assert_eq!(
            find_chain_param(&result, &reservation_schema()).as_deref(),
            Some("restaurant")
        );
        assert!(find_chain_param(&result, &hotel_schema()).is_none());

        let from = complete_reservation("r1");
        let to = reservation_invocation().with_param("book_people", Value::Number(6.0));
        let merged = add_parameters_from_context(&to, &from);
        assert_eq!(merged.get_param("book_people"), Some(&Value::Number(6.0)));
        assert_eq!(merged.get_param("restaurant"), Some(&restaurant_entity("r1")));
    }

    #[test]
    fn test_answers_to_pending_action() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        let ctx = ContextInfo::get(&state).unwrap();
        assert!(fits_pending_action(&ctx, &reservation_invocation()));
        assert_eq!(asked_params(&ctx), None);

        state.history.push(DialogueHistoryItem::new(
            statement(reservation_invocation()),
            genie_thingtalk::ConfirmationState::Accepted,
        ));
        state.dialogue_act_param = Some(vec![ActParam::Name("book_people".to_string())]);
        let ctx = ContextInfo::get(&state).unwrap();
        assert_eq!(asked_params(&ctx), Some(vec!["book_people"]));

        let people = Invocation::new(reservation_schema()).with_param("book_people", Value::Number(2.0));
        assert!(fits_pending_action(&ctx, &people));
        // the restaurant comes from the shown result
        let chosen = people.with_param("restaurant", restaurant_entity("r2"));
        assert!(!fits_pending_action(&ctx, &chosen));
        assert!(!fits_pending_action(&ctx, &Invocation::new(hotel_schema())));
    }

    #[test]
    fn test_simple_filter_expression() {
        let simple = Expression::filter(restaurants(), cheap());
        assert!(is_simple_filter_expression(&simple));
        let projected = Expression::filter(
            Expression::projection(restaurants(), vec!["price".to_string()]),
            cheap(),
        );
        assert!(!is_simple_filter_expression(&projected));
        assert!(!is_simple_filter_expression(&restaurants()));
    }
}
