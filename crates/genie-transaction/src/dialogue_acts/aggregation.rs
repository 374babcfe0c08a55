//! Counting and summarizing results

use genie_core::Result;
use genie_thingtalk::{
    AggregationExpression, ConfirmationState, DialogueState, Expression, ExpressionStatement, Invocation,
    LevenshteinDelta, Value,
};

use crate::context_info::ContextInfo;
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::slot_bag::{AgentAux, SlotBag};
use crate::state_manip::{add_query, attach_levenshtein, make_simple_state};

pub const AGGREGATION_OPERATORS: &[&str] = &["count", "min", "max", "avg", "sum"];

fn current_aggregation(ctx: &ContextInfo) -> Option<&AggregationExpression> {
    let table = ctx.current()?.statement.last_query()?;
    match table.strip_projections() {
        Expression::Aggregation(agg) => Some(agg),
        _ => None,
    }
}

/// "There are 7 restaurants", "the average rating is 4.2".
///
/// The value goes in the info bag under the operator name, with the field
/// it was computed over.
pub fn make_aggregation_answer(ctx: &ContextInfo) -> Result<Option<AgentReply>> {
    let (Some(agg), Some(results)) = (current_aggregation(ctx), ctx.results()) else {
        return Ok(None);
    };
    let [result] = results else {
        return Ok(None);
    };
    let Some(value) = result.get(&agg.operator) else {
        return Ok(None);
    };

    let mut info = SlotBag::new(agg.schema.clone()).with(agg.operator.clone(), value.clone());
    if agg.operator != "count" {
        info.set("field", Value::string(agg.field.replace('_', " ")));
    }
    let state = make_simple_state(&ctx.state, "sys_display_result", Vec::new());
    make_agent_reply(
        ctx,
        state,
        Some(AgentAux::SlotBag(info)),
        None,
        ReplyOptions::with_num_results(1),
    )
    .map(Some)
}

/// "How many are there?": aggregate the current list query.
///
/// `count` takes no field; the other operators need a numeric output.
pub fn aggregation_question(ctx: &ContextInfo, operator: &str, field: Option<&str>) -> Option<DialogueState> {
    if !AGGREGATION_OPERATORS.contains(&operator) {
        return None;
    }
    let info = ctx.result_info.as_ref()?;
    if !info.is_table || !info.is_list || info.is_question {
        return None;
    }
    let current = ctx.current()?;
    let table = current.statement.last_query()?.strip_projections();
    let schema = table.schema();

    let field = match (operator, field) {
        ("count", None) => "*",
        ("count", Some(_)) => return None,
        (_, Some(field)) => {
            let arg = schema.get_argument(field)?;
            if arg.is_input() || !arg.ty.is_numeric() {
                return None;
            }
            field
        }
        (_, None) => return None,
    };

    let new_table = Expression::aggregation(table.clone(), field, operator);
    let delta = LevenshteinDelta::continuing(ExpressionStatement::single(Expression::aggregation(
        Invocation::new(ctx.current_table_function.as_ref()?.clone()).into(),
        field,
        operator,
    )));
    let state = add_query(ctx, "execute", ExpressionStatement::single(new_table), ConfirmationState::Accepted);
    Some(attach_levenshtein(state, delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use genie_thingtalk::{BooleanExpression, DialogueHistoryItem, ResultItem, ResultList, apply_levenshtein};

    fn aggregated(operator: &str, field: &str, value: Value) -> DialogueState {
        let table = Expression::aggregation(restaurants(), field, operator);
        make_state(
            "execute",
            vec![DialogueHistoryItem::new(statement(table), ConfirmationState::Confirmed)
                .with_results(ResultList::new(vec![ResultItem::from_pairs([(operator, value)])]))],
        )
    }

    #[test]
    fn test_count_answer() {
        let ctx = ContextInfo::get(&aggregated("count", "*", Value::Number(7.0))).unwrap();
        let reply = make_aggregation_answer(&ctx).unwrap().unwrap();
        assert_eq!(reply.state.dialogue_act, "sys_display_result");
        let info = reply.aux().and_then(AgentAux::as_slot_bag).unwrap();
        assert_eq!(info.get("count"), Some(&Value::Number(7.0)));
        assert!(!info.has("field"));
        assert_eq!(reply.values().get("count").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_average_answer() {
        let ctx = ContextInfo::get(&aggregated("avg", "rating", Value::Number(4.25))).unwrap();
        let reply = make_aggregation_answer(&ctx).unwrap().unwrap();
        let info = reply.aux().and_then(AgentAux::as_slot_bag).unwrap();
        assert_eq!(info.get("avg"), Some(&Value::Number(4.25)));
        assert_eq!(info.get("field"), Some(&Value::string("rating")));
    }

    #[test]
    fn test_no_answer_without_aggregation() {
        let ctx = ContextInfo::get(&search_state(vec![restaurant_result("r1", "cheap", 4.0)])).unwrap();
        assert!(make_aggregation_answer(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_aggregation_question() {
        let cheap = Expression::filter(restaurants(), BooleanExpression::atom("price", "==", Value::enumerated("cheap")));
        let state = search_state_for(
            cheap,
            vec![restaurant_result("r1", "cheap", 4.0), restaurant_result("r2", "cheap", 3.5)],
        );
        let ctx = ContextInfo::get(&state).unwrap();

        let new_state = aggregation_question(&ctx, "count", None).unwrap();
        let item = new_state.history.last().unwrap();
        let Some(Expression::Aggregation(agg)) = item.statement.last() else {
            panic!("expected an aggregation, got {}", item.statement);
        };
        assert_eq!(agg.operator, "count");
        assert_eq!(agg.field, "*");
        assert!(agg.expression.as_filter().is_some());

        let applied = apply_levenshtein(&state.history[0].statement, item.levenshtein.as_ref().unwrap());
        assert_eq!(&applied, item.statement.as_ref());

        assert!(aggregation_question(&ctx, "avg", Some("rating")).is_some());
        assert!(aggregation_question(&ctx, "avg", Some("price")).is_none());
        assert!(aggregation_question(&ctx, "avg", None).is_none());
        assert!(aggregation_question(&ctx, "median", Some("rating")).is_none());
    }
}
