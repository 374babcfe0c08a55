//! Classification of the current result and of the next pending statement

use genie_core::{GenieError, Result, ensure_invariant};
use genie_thingtalk::{
    DialogueHistoryItem, DialogueState, Expression, FunctionDef, Slot, SortDirection, Type, Value,
    computation_name,
};

/// The single extreme-valued result by some sortable field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgMinMax {
    pub field: String,
    pub direction: SortDirection,
}

fn is_unit_index(value: &Value) -> Option<bool> {
    match value.as_number() {
        Some(n) if n == 1.0 => Some(false),
        Some(n) if n == -1.0 => Some(true),
        _ => None,
    }
}

fn sort_field(value: &Value) -> String {
    match value {
        Value::VarRef(name) => name.clone(),
        other => computation_name(other),
    }
}

/// Recognize `index(sort(t), [±1])` and `slice(sort(t), ±1, 1)`.
///
/// A base of `-1` picks from the end, so the direction is inverted.
pub fn get_table_arg_min_max(table: &Expression) -> Option<ArgMinMax> {
    let (sort, inverted) = match table.strip_projections() {
        Expression::Index(index) => {
            if index.indices.len() != 1 {
                return None;
            }
            let Expression::Sort(sort) = index.expression.as_ref() else {
                return None;
            };
            (sort, is_unit_index(&index.indices[0])?)
        }
        Expression::Slice(slice) => {
            let Expression::Sort(sort) = slice.expression.as_ref() else {
                return None;
            };
            if slice.limit.as_number() != Some(1.0) {
                return None;
            }
            (sort, is_unit_index(&slice.base)?)
        }
        _ => return None,
    };

    let direction = if inverted {
        sort.direction.invert()
    } else {
        sort.direction
    };
    Some(ArgMinMax {
        field: sort_field(&sort.value),
        direction,
    })
}

/// Shape of the results of one executed history item.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultInfo {
    pub has_stream: bool,
    pub is_table: bool,
    pub is_question: bool,
    pub is_aggregation: bool,
    pub is_list: bool,
    pub arg_min_max: Option<ArgMinMax>,
    /// Sorted output names of the active projection.
    pub projection: Option<Vec<String>>,
    pub has_error: bool,
    pub has_empty_result: bool,
    pub has_single_result: bool,
    pub has_large_result: bool,
    pub id_type: Option<Type>,
}

impl ResultInfo {
    pub fn new(state: &DialogueState, item: &DialogueHistoryItem) -> Result<Self> {
        let Some(results) = item.results.as_ref() else {
            return Err(GenieError::invariant("result info requires an executed item"));
        };
        let stmt = &item.statement;
        let has_stream = stmt.stream().is_some();
        let last_is_query = stmt.last().is_some_and(|e| !e.is_action());
        let is_table = last_is_query && (!has_stream || state.dialogue_act == "notification");

        let mut info = ResultInfo {
            has_stream,
            is_table,
            is_question: false,
            is_aggregation: false,
            is_list: false,
            arg_min_max: None,
            projection: None,
            has_error: results.error.is_some(),
            has_empty_result: !has_stream && results.results.is_empty(),
            has_single_result: results.results.len() == 1,
            has_large_result: results.is_large(),
            id_type: None,
        };

        match stmt.last_query() {
            Some(table) if is_table => {
                info.is_question = matches!(
                    table,
                    Expression::Projection(_) | Expression::Index(_) | Expression::Aggregation(_)
                );
                info.is_aggregation = matches!(table, Expression::Aggregation(_));
                info.arg_min_max = get_table_arg_min_max(table);
                // picking the best of a sorted list still answers over the list
                info.is_list = stmt.schema().is_some_and(|s| s.is_list) || info.arg_min_max.is_some();
                info.projection = match table {
                    Expression::Projection(p) => {
                        let mut names = p.args.clone();
                        names.extend(p.computations.iter().enumerate().map(|(i, c)| {
                            p.aliases
                                .get(i)
                                .cloned()
                                .flatten()
                                .unwrap_or_else(|| computation_name(c))
                        }));
                        names.sort();
                        Some(names)
                    }
                    _ => None,
                };
            }
            _ => {
                if state.dialogue_act == "action_question" {
                    info.projection = Some(state.act_param_names());
                }
            }
        }

        info.id_type = stmt
            .last()
            .and_then(|e| e.schema().id_type())
            .cloned();
        Ok(info)
    }
}

/// What is still needed before the pending statement can run.
#[derive(Debug, Clone, PartialEq)]
pub struct NextStatementInfo {
    pub is_action: bool,
    pub is_complete: bool,
    /// Input of the action that can receive the id of the current result.
    pub chain_parameter: Option<String>,
    pub chain_parameter_filled: bool,
    pub missing_slots: Vec<Slot>,
}

fn find_chain_parameter(schema: &FunctionDef, id_type: &Type) -> Option<String> {
    schema
        .iterate_arguments()
        .find(|arg| arg.is_input() && &arg.ty == id_type)
        .map(|arg| arg.name.clone())
}

impl NextStatementInfo {
    pub fn new(
        current: Option<&DialogueHistoryItem>,
        result_info: Option<&ResultInfo>,
        next: &DialogueHistoryItem,
    ) -> Result<Self> {
        let stmt = &next.statement;
        let is_action = stmt.last_query().is_none();
        let missing_slots: Vec<Slot> = stmt
            .slots()
            .into_iter()
            .filter(|slot| !slot.info.is_device_selector && slot.value.is_undefined())
            .collect();

        let mut info = NextStatementInfo {
            is_action,
            is_complete: stmt.is_executable(),
            chain_parameter: None,
            chain_parameter_filled: false,
            missing_slots,
        };
        if !is_action {
            return Ok(info);
        }

        ensure_invariant!(
            stmt.expressions.len() == 1,
            "pending action must be a single expression: {}",
            stmt
        );
        let invocation = stmt.first().and_then(Expression::as_invocation);
        ensure_invariant!(
            invocation.is_some(),
            "pending action must be an invocation: {}",
            stmt
        );

        if let (Some(current), Some(result_info), Some(invocation)) = (current, result_info, invocation) {
            if result_info.is_table {
                let id_type = current
                    .statement
                    .schema()
                    .and_then(|s| s.id_type().cloned());
                if let Some(id_type) = id_type {
                    info.chain_parameter = find_chain_parameter(&invocation.schema, &id_type);
                    info.chain_parameter_filled = info
                        .chain_parameter
                        .as_deref()
                        .and_then(|name| invocation.get_param(name))
                        .is_some_and(|v| !v.is_undefined());
                }
            }
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use genie_thingtalk::{
        BooleanExpression, ConfirmationState, ExpressionStatement, Invocation, ResultList,
    };

    #[test]
    fn test_arg_min_max_slice_and_index() {
        let table = restaurants();
        let asc = Expression::slice(
            Expression::sort(table.clone(), Value::var_ref("price"), SortDirection::Asc),
            Value::Number(1.0),
            Value::Number(1.0),
        );
        let desc_from_end = Expression::slice(
            Expression::sort(table.clone(), Value::var_ref("price"), SortDirection::Desc),
            Value::Number(-1.0),
            Value::Number(1.0),
        );
        let expected = Some(ArgMinMax {
            field: "price".to_string(),
            direction: SortDirection::Asc,
        });
        assert_eq!(get_table_arg_min_max(&asc), expected);
        assert_eq!(get_table_arg_min_max(&desc_from_end), expected);

        let index = Expression::projection(
            Expression::index(
                Expression::sort(table.clone(), Value::var_ref("rating"), SortDirection::Desc),
                vec![Value::Number(1.0)],
            ),
            vec!["id".to_string()],
        );
        assert_eq!(
            get_table_arg_min_max(&index),
            Some(ArgMinMax {
                field: "rating".to_string(),
                direction: SortDirection::Desc,
            })
        );

        let two = Expression::slice(
            Expression::sort(table, Value::var_ref("price"), SortDirection::Asc),
            Value::Number(1.0),
            Value::Number(2.0),
        );
        assert_eq!(get_table_arg_min_max(&two), None);
    }

    #[test]
    fn test_result_info_table() {
        let table = Expression::projection(
            Expression::filter(
                restaurants(),
                BooleanExpression::atom("price", "==", Value::enumerated("cheap")),
            ),
            vec!["rating".to_string(), "area".to_string()],
        );
        let item = DialogueHistoryItem::new(ExpressionStatement::single(table), ConfirmationState::Confirmed)
            .with_results(ResultList::new(vec![restaurant_result("r1", "cheap", 4.0)]));
        let state = make_state("execute", vec![item.clone()]);

        let info = ResultInfo::new(&state, &item).unwrap();
        assert!(info.is_table);
        assert!(info.is_question);
        assert!(info.is_list);
        assert!(info.has_single_result);
        assert!(!info.has_large_result);
        assert!(!info.has_empty_result);
        assert_eq!(info.projection, Some(vec!["area".to_string(), "rating".to_string()]));
        assert_eq!(info.id_type, Some(Type::entity("com.yelp:restaurant")));
    }

    #[test]
    fn test_best_of_sorted_list_is_a_list_question() {
        let table = Expression::index(
            Expression::sort(restaurants(), Value::var_ref("rating"), SortDirection::Desc),
            vec![Value::Number(1.0)],
        );
        assert!(!table.schema().is_list);
        let item = DialogueHistoryItem::new(ExpressionStatement::single(table), ConfirmationState::Confirmed)
            .with_results(ResultList::new(vec![restaurant_result("r1", "cheap", 5.0)]));
        let state = make_state("execute", vec![item.clone()]);

        let info = ResultInfo::new(&state, &item).unwrap();
        assert!(info.is_question);
        assert!(info.is_list);
        assert!(info.arg_min_max.is_some());
    }

    #[test]
    fn test_result_info_action_error() {
        let action = Invocation::new(reservation_schema())
            .with_param("restaurant", restaurant_entity("r1"))
            .with_param("book_time", Value::Time { hour: 19, minute: 0 })
            .with_param("book_people", Value::Number(2.0));
        let item = DialogueHistoryItem::new(statement(action), ConfirmationState::Confirmed)
            .with_results(ResultList::with_error(Value::enumerated("no_table")));
        let state = make_state("execute", vec![item.clone()]);

        let info = ResultInfo::new(&state, &item).unwrap();
        assert!(!info.is_table);
        assert!(info.has_error);
        assert!(info.has_empty_result);
        assert_eq!(info.projection, None);
    }

    #[test]
    fn test_chain_parameter_unfilled() {
        let current = DialogueHistoryItem::new(
            ExpressionStatement::single(restaurants()),
            ConfirmationState::Confirmed,
        )
        .with_results(ResultList::new(vec![restaurant_result("r1", "cheap", 4.0)]));
        let next = DialogueHistoryItem::new(
            statement(reservation_invocation()),
            ConfirmationState::Accepted,
        );
        let state = make_state("execute", vec![current.clone(), next.clone()]);
        let result_info = ResultInfo::new(&state, &current).unwrap();

        let info = NextStatementInfo::new(Some(&current), Some(&result_info), &next).unwrap();
        assert!(info.is_action);
        assert!(!info.is_complete);
        assert_eq!(info.chain_parameter.as_deref(), Some("restaurant"));
        assert!(!info.chain_parameter_filled);
        let missing: Vec<&str> = info.missing_slots.iter().map(Slot::tag).collect();
        assert_eq!(missing, vec!["in_param.book_people", "in_param.book_time", "in_param.restaurant"]);
    }
}
