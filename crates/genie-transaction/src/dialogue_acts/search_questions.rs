//! Search questions: the agent asks the user to narrow down the results

use genie_core::Result;
use genie_thingtalk::{ActParam, BooleanExpression, ConfirmationState, DialogueState, Expression, Invocation, Value};

use crate::ast_manip::{check_filter, find_filter_expression, is_same_function};
use crate::context_info::ContextInfo;
use crate::dialogue_acts::common::{
    FilterSlot, ParamSlot, asked_params, filter_delta, fits_pending_action, is_simple_filter_expression,
    is_valid_search_question, question_names,
};
use crate::dialogue_acts::refinement::{query_refinement, refine_filter_to_answer_question};
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::state_manip::{add_query, add_query_and_action, attach_levenshtein, make_simple_state};

/// Each question is a filterable output of the current query that its
/// filter does not already constrain.
pub fn is_good_search_question(ctx: &ContextInfo, questions: &[ParamSlot]) -> bool {
    let Some(table) = ctx.current().and_then(|item| item.statement.last_query()) else {
        return false;
    };
    if !is_valid_search_question(table, questions) {
        return false;
    }
    let Some(filter) = find_filter_expression(table) else {
        return false;
    };
    questions.iter().all(|q| !filter.filter.uses_param(&q.name))
}

/// Two values of one field the user could choose between ("cheap or
/// expensive?"). Both must occur among the current results.
pub fn check_filter_pair_for_disjunctive_question(
    ctx: &ContextInfo,
    f1: &FilterSlot,
    f2: &FilterSlot,
) -> Option<ParamSlot> {
    let (a1, a2) = (f1.ast.as_atom()?, f2.ast.as_atom()?);
    let current_function = ctx.current_function.as_ref()?;
    if !current_function.is_list
        || !is_same_function(current_function, &f1.schema)
        || !is_same_function(&f1.schema, &f2.schema)
    {
        return None;
    }
    if a1.name != a2.name || a1.value == a2.value {
        return None;
    }
    // enum values each carry only their own entry, so check against the declared type
    let declared = f1.schema.get_argument_type(&a1.name)?;
    if !a1.value.get_type().is_assignable(declared) || !a2.value.get_type().is_assignable(declared) {
        return None;
    }
    let slot = ParamSlot::new(&f1.schema, &a1.name)?;
    if !slot.filterable {
        return None;
    }

    let (mut good1, mut good2) = (false, false);
    for result in ctx.results()? {
        let value = result.get(&a1.name)?;
        good1 |= value == &a1.value;
        good2 |= value == &a2.value;
        if good1 && good2 {
            return Some(slot);
        }
    }
    None
}

pub fn make_search_question(ctx: &ContextInfo, questions: &[ParamSlot]) -> Result<Option<AgentReply>> {
    if !is_good_search_question(ctx, questions) {
        return Ok(None);
    }
    let params: Vec<ActParam> = question_names(questions).into_iter().map(ActParam::Name).collect();
    let (state, expected_type) = match questions {
        [] => (make_simple_state(&ctx.state, "sys_generic_search_question", Vec::new()), None),
        [question] => (
            make_simple_state(&ctx.state, "sys_search_question", params),
            Some(question.ty.clone()),
        ),
        _ => (make_simple_state(&ctx.state, "sys_search_question", params), None),
    };
    make_agent_reply(ctx, state, None, expected_type, ReplyOptions::default()).map(Some)
}

/// The table constrains at least one of the asked parameters.
pub fn is_query_answer_valid_for_question(table: &Expression, questions: &[&str]) -> bool {
    let Some(filter) = find_filter_expression(table) else {
        return false;
    };
    filter.filter.param_names().iter().any(|name| questions.contains(&name.as_str()))
}

/// The user answers with a full search, possibly followed by an action.
pub fn precise_search_question_answer(
    ctx: &ContextInfo,
    table: &Expression,
    action: Option<Invocation>,
) -> Option<DialogueState> {
    if let Some(questions) = asked_params(ctx) {
        if !is_query_answer_valid_for_question(table, &questions) {
            return None;
        }
    }
    let answer = table.as_filter()?;
    if !is_same_function(&answer.schema, ctx.current_function.as_ref()?) || !is_simple_filter_expression(table) {
        return None;
    }

    let current = ctx.current()?;
    let new_stmt = query_refinement(&current.statement, Some((&answer.filter, refine_filter_to_answer_question)), None)?;
    let delta = filter_delta(&answer.schema, answer.filter.clone());

    let Some(mut action) = action else {
        return Some(attach_levenshtein(
            add_query(ctx, "execute", new_stmt, ConfirmationState::Accepted),
            delta,
        ));
    };
    if !fits_pending_action(ctx, &action) {
        return None;
    }
    action.add_missing_required_params();
    let new_table = new_stmt.last_query()?.clone();
    let state = add_query_and_action(ctx, "execute", new_table, action, ConfirmationState::Accepted);
    Some(attach_levenshtein(state, delta))
}

/// A bare answer to a single search question.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchAnswer {
    Filter(FilterSlot),
    Value(Value),
    DontCare,
}

fn answered_param(filter: &BooleanExpression) -> Option<&str> {
    match filter {
        BooleanExpression::Atom(atom) => Some(&atom.name),
        BooleanExpression::DontCare { name } => Some(name),
        BooleanExpression::Not { expr } => answered_param(expr),
        // "cheap or moderate" on the same field
        BooleanExpression::And { operands } | BooleanExpression::Or { operands } => {
            let first = answered_param(operands.first()?)?;
            operands
                .iter()
                .all(|op| answered_param(op) == Some(first))
                .then_some(first)
        }
        _ => None,
    }
}

pub fn imprecise_search_question_answer(ctx: &ContextInfo, answer: SearchAnswer) -> Option<DialogueState> {
    let questions = asked_params(ctx)?;
    let [question] = questions[..] else {
        return None;
    };
    let current_function = ctx.current_function.as_ref()?;

    let answer = match answer {
        SearchAnswer::DontCare => FilterSlot {
            schema: current_function.clone(),
            ty: current_function.get_argument_type(question)?.clone(),
            ast: BooleanExpression::dont_care(question),
        },
        SearchAnswer::Value(value) => FilterSlot::atom(current_function, question, "==", value)?,
        SearchAnswer::Filter(slot) => {
            if answered_param(&slot.ast) != Some(question) {
                return None;
            }
            slot
        }
    };

    let current = ctx.current()?;
    if !check_filter(current.statement.last_query()?, &answer.ast) {
        return None;
    }
    let new_stmt = query_refinement(&current.statement, Some((&answer.ast, refine_filter_to_answer_question)), None)?;
    let state = add_query(ctx, "execute", new_stmt, ConfirmationState::Accepted);
    Some(attach_levenshtein(state, filter_delta(&answer.schema, answer.ast)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use genie_thingtalk::{DialogueHistoryItem, apply_levenshtein};

    fn cheap() -> BooleanExpression {
        BooleanExpression::atom("price", "==", Value::enumerated("cheap"))
    }

    fn cheap_restaurants() -> DialogueState {
        search_state_for(
            Expression::filter(restaurants(), cheap()),
            vec![
                restaurant_result("r1", "cheap", 4.0),
                restaurant_result("r2", "cheap", 3.5),
            ],
        )
    }

    fn asked(questions: &[&str]) -> DialogueState {
        let params = questions.iter().map(|q| ActParam::Name(q.to_string())).collect();
        make_simple_state(&cheap_restaurants(), "sys_search_question", params)
    }

    fn slot(name: &str) -> ParamSlot {
        ParamSlot::new(&restaurant_schema(), name).unwrap()
    }

    #[test]
    fn test_good_search_question() {
        let ctx = ContextInfo::get(&cheap_restaurants()).unwrap();
        assert!(is_good_search_question(&ctx, &[slot("area")]));
        // already constrained
        assert!(!is_good_search_question(&ctx, &[slot("price")]));
        // input parameter
        assert!(!is_good_search_question(&ctx, &[slot("near")]));

        // no filter to refine
        let ctx = ContextInfo::get(&search_state(vec![restaurant_result("r1", "cheap", 4.0)])).unwrap();
        assert!(!is_good_search_question(&ctx, &[slot("area")]));
    }

    #[test]
    fn test_make_search_question() {
        let ctx = ContextInfo::get(&cheap_restaurants()).unwrap();
        let reply = make_search_question(&ctx, &[slot("area")]).unwrap().unwrap();
        assert_eq!(reply.state.dialogue_act, "sys_search_question");
        assert_eq!(reply.state.act_param_names(), vec!["area".to_string()]);
        assert_eq!(reply.expected_type, restaurant_schema().get_argument_type("area").cloned());

        let generic = make_search_question(&ctx, &[]).unwrap().unwrap();
        assert_eq!(generic.state.dialogue_act, "sys_generic_search_question");
        assert_eq!(generic.main_tag(), "ctx_sys_search_question");

        let two = make_search_question(&ctx, &[slot("area"), slot("rating")]).unwrap().unwrap();
        assert!(two.expected_type.is_none());
    }

    #[test]
    fn test_disjunctive_question() {
        let mut state = cheap_restaurants();
        state.history[0].results = Some(genie_thingtalk::ResultList::new(vec![
            restaurant_result("r1", "cheap", 4.0),
            restaurant_result("r2", "expensive", 3.5),
        ]));
        let ctx = ContextInfo::get(&state).unwrap();
        let schema = restaurant_schema();
        let f1 = FilterSlot::atom(&schema, "price", "==", Value::enumerated("cheap")).unwrap();
        let f2 = FilterSlot::atom(&schema, "price", "==", Value::enumerated("expensive")).unwrap();
        let question = check_filter_pair_for_disjunctive_question(&ctx, &f1, &f2).unwrap();
        assert_eq!(question.name, "price");

        let f3 = FilterSlot::atom(&schema, "price", "==", Value::enumerated("moderate")).unwrap();
        assert!(check_filter_pair_for_disjunctive_question(&ctx, &f1, &f3).is_none());
        assert!(check_filter_pair_for_disjunctive_question(&ctx, &f1, &f1).is_none());

        // a value outside the declared enum is not a choice
        let f4 = FilterSlot::atom(&schema, "price", "==", Value::string("expensive")).unwrap();
        assert!(check_filter_pair_for_disjunctive_question(&ctx, &f1, &f4).is_none());
    }

    #[test]
    fn test_precise_answer() {
        let state = asked(&["area"]);
        let ctx = ContextInfo::get(&state).unwrap();
        let north = BooleanExpression::atom("area", "==", Value::enumerated("north"));
        let answer = Expression::filter(restaurants(), north.clone());

        let new_state = precise_search_question_answer(&ctx, &answer, None).unwrap();
        let item: &DialogueHistoryItem = &new_state.history[1];
        let filter = &item.statement.last_query().unwrap().as_filter().unwrap().filter;
        assert_eq!(filter, &BooleanExpression::and(vec![cheap(), north]));

        // the edit script rebuilds the same query
        let delta = item.levenshtein.as_ref().unwrap();
        assert_eq!(&apply_levenshtein(&ctx.current().unwrap().statement, delta), item.statement.as_ref());

        // answering something else
        let other = Expression::filter(restaurants(), BooleanExpression::atom("rating", "==", Value::Number(4.0)));
        assert!(precise_search_question_answer(&ctx, &other, None).is_none());
    }

    #[test]
    fn test_precise_answer_with_action() {
        let state = asked(&["area"]);
        let ctx = ContextInfo::get(&state).unwrap();
        let answer = Expression::filter(
            restaurants(),
            BooleanExpression::atom("area", "==", Value::enumerated("north")),
        );
        let action = Invocation::new(reservation_schema()).with_param("book_people", Value::Number(2.0));
        let new_state = precise_search_question_answer(&ctx, &answer, Some(action)).unwrap();
        assert_eq!(new_state.history.len(), 3);
        let booked = new_state.history[2].statement.last().unwrap().as_invocation().unwrap();
        assert_eq!(booked.get_param("restaurant"), Some(&Value::Undefined));
        assert_eq!(booked.get_param("book_people"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_imprecise_answer() {
        let ctx = ContextInfo::get(&asked(&["area"])).unwrap();
        let new_state =
            imprecise_search_question_answer(&ctx, SearchAnswer::Value(Value::enumerated("north"))).unwrap();
        let filter = &new_state.history[1].statement.last_query().unwrap().as_filter().unwrap().filter;
        assert!(filter.uses_param("area"));
        assert!(filter.uses_param("price"));

        let dont_care = imprecise_search_question_answer(&ctx, SearchAnswer::DontCare).unwrap();
        let filter = &dont_care.history[1].statement.last_query().unwrap().as_filter().unwrap().filter;
        assert!(filter.param_names().contains("area"));

        let schema = restaurant_schema();
        let wrong = FilterSlot::atom(&schema, "rating", ">=", Value::Number(4.0)).unwrap();
        assert!(imprecise_search_question_answer(&ctx, SearchAnswer::Filter(wrong)).is_none());

        let ctx = ContextInfo::get(&asked(&["area", "rating"])).unwrap();
        assert!(imprecise_search_question_answer(&ctx, SearchAnswer::DontCare).is_none());
    }
}
