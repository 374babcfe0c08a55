//! List proposals: the agent names a few results, and the user picks one

use genie_core::Result;
use genie_thingtalk::{
    BooleanExpression, ConfirmMode, ConfirmationState, DialogueState, Expression, Invocation, ResultItem, Value,
};

use crate::ast_manip::{find_filter_expression, get_invocation, is_same_function};
use crate::context_info::ContextInfo;
use crate::dialogue_acts::common::{find_chain_param, is_info_phrase_compatible_with_result};
use crate::dialogue_acts::refinement::{
    combine_preamble_and_request, proposal_reply, query_refinement, refine_filter_to_answer_question_or_change_filter,
};
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::slot_bag::{AgentAux, ListProposal, SlotBag};
use crate::state_manip::{add_action, add_action_param, add_query, make_simple_state};

/// One result described on its own ("the first one is cheap").
#[derive(Debug, Clone, PartialEq)]
pub struct DirectAnswer {
    pub index: usize,
    pub info: SlotBag,
}

fn is_sliced(ctx: &ContextInfo) -> bool {
    match ctx.current().and_then(|item| item.statement.last_query()) {
        Some(Expression::Slice(_)) => true,
        Some(Expression::Projection(p)) => matches!(p.expression.as_ref(), Expression::Slice(_)),
        _ => false,
    }
}

fn projection(ctx: &ContextInfo) -> Option<&Vec<String>> {
    ctx.result_info.as_ref()?.projection.as_ref()
}

fn pending_action(ctx: &ContextInfo) -> Option<Invocation> {
    if !ctx.next_info.as_ref()?.is_action {
        return None;
    }
    get_invocation(ctx.next()?).cloned()
}

/// Propose `results` by name, optionally describing what they share.
pub fn check_list_proposal(
    ctx: &ContextInfo,
    results: &[ResultItem],
    info: Option<&SlotBag>,
    has_learn_more: bool,
) -> Option<ListProposal> {
    let result_type = results.first()?.id()?.get_type();
    // a slice is proposed whole
    if is_sliced(ctx) && results.len() != ctx.results()?.len() {
        return None;
    }

    match info {
        Some(info) => {
            if info.schema.id_type() != Some(&result_type) {
                return None;
            }
            if projection(ctx).is_some_and(|names| !names.iter().all(|name| info.has(name))) {
                return None;
            }
            if !results.iter().all(|result| is_info_phrase_compatible_with_result(result, info)) {
                return None;
            }
        }
        None => {
            if projection(ctx).is_some() {
                return None;
            }
        }
    }

    Some(ListProposal {
        results: results.to_vec(),
        info: info.cloned(),
        action: pending_action(ctx),
        has_learn_more,
    })
}

/// Propose all current results through a description of them.
pub fn check_thingpedia_list_proposal(
    ctx: &ContextInfo,
    info: &SlotBag,
    additional_info: Option<&SlotBag>,
) -> Option<ListProposal> {
    if projection(ctx).is_some_and(|names| !names.iter().all(|name| info.has(name))) {
        return None;
    }
    let results = ctx.results()?;
    let info = match additional_info {
        Some(additional) => {
            if !results.iter().all(|result| is_info_phrase_compatible_with_result(result, additional)) {
                return None;
            }
            SlotBag::merge(info, additional)?
        }
        None => info.clone(),
    };
    Some(ListProposal {
        results: results.to_vec(),
        info: Some(info),
        action: pending_action(ctx),
        has_learn_more: false,
    })
}

/// Turn consecutive direct answers about the first results into a list.
pub fn make_list_proposal_from_direct_answers(ctx: &ContextInfo, answers: &[DirectAnswer]) -> Option<ListProposal> {
    let first = answers.first()?;
    if answers.iter().enumerate().any(|(i, answer)| answer.index != i) {
        return None;
    }
    let results = ctx.results()?;
    if is_sliced(ctx) && answers.len() != results.len() {
        return None;
    }
    // all answers mention the same fields
    let same_keys = answers
        .iter()
        .all(|answer| answer.info.keys().eq(first.info.keys()));
    if !same_keys {
        return None;
    }
    if projection(ctx).is_some_and(|names| !names.iter().all(|name| first.info.has(name))) {
        return None;
    }
    // a query by name is not answered with a list
    let table = ctx.current()?.statement.last_query()?;
    if find_filter_expression(table).is_some_and(|f| f.filter.uses_param("id")) {
        return None;
    }

    Some(ListProposal {
        results: results.iter().take(answers.len()).cloned().collect(),
        info: None,
        action: None,
        has_learn_more: false,
    })
}

fn recommend_act(count: usize) -> &'static str {
    match count {
        2 => "sys_recommend_two",
        3 => "sys_recommend_three",
        4 => "sys_recommend_four",
        _ => "sys_recommend_many",
    }
}

pub fn make_list_proposal_reply(ctx: &ContextInfo, proposal: ListProposal) -> Result<AgentReply> {
    let mut options = ReplyOptions::with_num_results(proposal.results.len());
    if proposal.action.is_some() || proposal.has_learn_more {
        options.end = Some(false);
    }
    let act = recommend_act(proposal.results.len());
    let state = match &proposal.action {
        Some(action) => add_action(ctx, act, action, ConfirmationState::Proposed),
        None => make_simple_state(&ctx.state, act, Vec::new()),
    };
    make_agent_reply(ctx, state, Some(AgentAux::ListProposal(proposal)), None, options)
}

pub fn make_display_result_reply_from_list(ctx: &ContextInfo, proposal: ListProposal) -> Result<AgentReply> {
    let mut options = ReplyOptions::with_num_results(proposal.results.len());
    if proposal.action.is_some() || proposal.has_learn_more {
        options.end = Some(false);
    }
    let state = make_simple_state(&ctx.state, "sys_display_result", Vec::new());
    make_agent_reply(ctx, state, Some(AgentAux::ListProposal(proposal)), None, options)
}

fn list_proposal(ctx: &ContextInfo) -> Option<&ListProposal> {
    ctx.aux.as_ref()?.as_list_proposal()
}

fn conjoin(ctx_filter: &BooleanExpression, refined: &BooleanExpression) -> Option<BooleanExpression> {
    Some(BooleanExpression::and(vec![ctx_filter.clone(), refined.clone()]).optimize())
}

/// Narrow the current query down to the named result.
fn select_by_name(ctx: &ContextInfo, name: &Value) -> Option<DialogueState> {
    let name_filter = BooleanExpression::atom("id", "==", name.clone());
    let new_stmt = query_refinement(&ctx.current()?.statement, Some((&name_filter, conjoin)), None)?;
    Some(add_query(ctx, "execute", new_stmt, ConfirmationState::Accepted))
}

/// The user picks one of the proposed results, possibly with an action.
pub fn positive_list_proposal_reply(
    ctx: &ContextInfo,
    name: &Value,
    accepted_action: Option<&Invocation>,
    must_have_action: bool,
) -> Option<DialogueState> {
    let proposal = list_proposal(ctx)?;
    if !proposal.results.iter().any(|result| result.id() == Some(name)) {
        return None;
    }

    let Some(accepted) = accepted_action.or(proposal.action.as_ref()) else {
        if must_have_action {
            return None;
        }
        return select_by_name(ctx, name);
    };
    if let Some(proposed) = &proposal.action {
        if !is_same_function(&proposed.schema, &accepted.schema) {
            return None;
        }
    }
    // "play X" on an auto-confirmed action is likely a new request
    if accepted.schema.confirm == ConfirmMode::Auto {
        return None;
    }
    let chain_param = find_chain_param(proposal.results.first()?, &accepted.schema)?;
    Some(add_action_param(
        ctx,
        "execute",
        accepted,
        &chain_param,
        name.clone(),
        ConfirmationState::Accepted,
    ))
}

/// "Book the second one": the name comes from the action's id parameter.
pub fn positive_list_proposal_reply_action_by_name(ctx: &ContextInfo, action: &Invocation) -> Option<DialogueState> {
    let proposal = list_proposal(ctx)?;
    let id_type = proposal.results.first()?.id()?.get_type();
    let mut accepted = action.clone();
    let param = accepted
        .in_params
        .iter_mut()
        .find(|p| action.schema.get_argument_type(&p.name) == Some(&id_type))?;
    let name = std::mem::replace(&mut param.value, Value::Undefined);
    positive_list_proposal_reply(ctx, &name, Some(&accepted), false)
}

pub fn negative_list_proposal_reply(
    ctx: &ContextInfo,
    preamble: Option<&Expression>,
    request: Option<&Expression>,
) -> Option<DialogueState> {
    let proposal = list_proposal(ctx)?;
    let preamble = match preamble {
        Some(expr) => Some(expr.as_filter()?),
        None => None,
    };
    let request = match request {
        Some(expr) => Some(expr.as_filter()?),
        None => None,
    };
    let proposal_type = proposal.results.first()?.id()?.get_type();
    let combined = combine_preamble_and_request(preamble, request, proposal.info.as_ref(), Some(&proposal_type))?;
    proposal_reply(
        ctx,
        &Expression::Filter(combined),
        refine_filter_to_answer_question_or_change_filter,
    )
}

/// "Tell me more about the first one": unlike a recommendation, this
/// narrows the query down to that result.
pub fn list_proposal_learn_more_reply(ctx: &ContextInfo, name: &Value) -> Option<DialogueState> {
    let proposal = list_proposal(ctx)?;
    if !proposal.results.iter().any(|result| result.id() == Some(name)) {
        return None;
    }
    select_by_name(ctx, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    fn results() -> Vec<ResultItem> {
        vec![
            restaurant_result("r1", "cheap", 4.0),
            restaurant_result("r2", "cheap", 3.5),
            restaurant_result("r3", "moderate", 4.5),
        ]
    }

    fn proposed(action: Option<Invocation>) -> AgentReply {
        let mut state = search_state(results());
        if let Some(action) = action {
            state.history.push(genie_thingtalk::DialogueHistoryItem::new(
                statement(action),
                ConfirmationState::Accepted,
            ));
        }
        let ctx = ContextInfo::get(&state).unwrap();
        let proposal = check_list_proposal(&ctx, &results()[..2], None, false).unwrap();
        make_list_proposal_reply(&ctx, proposal).unwrap()
    }

    #[test]
    fn test_check_list_proposal() {
        let ctx = ContextInfo::get(&search_state(results())).unwrap();
        let cheap = SlotBag::new(restaurant_schema()).with("price", Value::enumerated("cheap"));
        let proposal = check_list_proposal(&ctx, &results()[..2], Some(&cheap), true).unwrap();
        assert_eq!(proposal.results.len(), 2);
        assert!(proposal.has_learn_more);
        // the third result is not cheap
        assert!(check_list_proposal(&ctx, &results(), Some(&cheap), false).is_none());

        let hotels = SlotBag::new(hotel_schema()).with("stars", Value::Number(4.0));
        assert!(check_list_proposal(&ctx, &results()[..2], Some(&hotels), false).is_none());
    }

    #[test]
    fn test_sliced_list_proposal() {
        let sliced = Expression::slice(restaurants(), Value::Number(1.0), Value::Number(3.0));
        let ctx = ContextInfo::get(&search_state_for(sliced, results())).unwrap();
        assert!(check_list_proposal(&ctx, &results()[..2], None, false).is_none());
        assert!(check_list_proposal(&ctx, &results(), None, false).is_some());
    }

    #[test]
    fn test_thingpedia_list_proposal() {
        let ctx = ContextInfo::get(&search_state(results())).unwrap();
        let info = SlotBag::new(restaurant_schema()).with("area", Value::enumerated("centre"));
        let rated = SlotBag::new(restaurant_schema()).with("rating", Value::Number(4.0));
        assert!(check_thingpedia_list_proposal(&ctx, &info, None).is_some());
        // not every result has that rating
        assert!(check_thingpedia_list_proposal(&ctx, &info, Some(&rated)).is_none());
    }

    #[test]
    fn test_direct_answers() {
        let ctx = ContextInfo::get(&search_state(results())).unwrap();
        let answer = |index: usize, price: &str| DirectAnswer {
            index,
            info: SlotBag::new(restaurant_schema()).with("price", Value::enumerated(price)),
        };
        let proposal = make_list_proposal_from_direct_answers(&ctx, &[answer(0, "cheap"), answer(1, "cheap")]).unwrap();
        assert_eq!(proposal.results.len(), 2);
        assert!(make_list_proposal_from_direct_answers(&ctx, &[answer(1, "cheap")]).is_none());

        let mixed = DirectAnswer {
            index: 1,
            info: SlotBag::new(restaurant_schema()).with("rating", Value::Number(3.5)),
        };
        assert!(make_list_proposal_from_direct_answers(&ctx, &[answer(0, "cheap"), mixed]).is_none());
    }

    #[test]
    fn test_list_proposal_reply_acts() {
        let reply = proposed(None);
        assert_eq!(reply.state.dialogue_act, "sys_recommend_two");
        assert_eq!(reply.num_results, 2);
        assert_eq!(reply.main_tag(), "ctx_sys_recommend_many");
        assert_eq!(recommend_act(3), "sys_recommend_three");
        assert_eq!(recommend_act(7), "sys_recommend_many");

        let with_action = proposed(Some(reservation_invocation()));
        assert!(!with_action.end);
        assert!(with_action.aux().and_then(AgentAux::as_list_proposal).unwrap().action.is_some());
    }

    #[test]
    fn test_positive_reply_by_name() {
        let reply = proposed(None);
        let state = positive_list_proposal_reply(&reply.context, &restaurant_entity("r2"), None, false).unwrap();
        let filter = &state.history[1].statement.last_query().unwrap().as_filter().unwrap().filter;
        assert_eq!(filter, &BooleanExpression::atom("id", "==", restaurant_entity("r2")));

        assert!(positive_list_proposal_reply(&reply.context, &restaurant_entity("r3"), None, false).is_none());
        assert!(positive_list_proposal_reply(&reply.context, &restaurant_entity("r2"), None, true).is_none());
    }

    #[test]
    fn test_positive_reply_with_action() {
        let reply = proposed(Some(reservation_invocation()));
        let state = positive_list_proposal_reply(&reply.context, &restaurant_entity("r2"), None, false).unwrap();
        assert_eq!(state.dialogue_act, "execute");
        let action = state.history.last().unwrap().statement.last().unwrap().as_invocation().unwrap();
        assert_eq!(action.get_param("restaurant"), Some(&restaurant_entity("r2")));

        let by_name = Invocation::new(reservation_schema()).with_param("restaurant", restaurant_entity("r1"));
        let state = positive_list_proposal_reply_action_by_name(&reply.context, &by_name).unwrap();
        let action = state.history.last().unwrap().statement.last().unwrap().as_invocation().unwrap();
        assert_eq!(action.get_param("restaurant"), Some(&restaurant_entity("r1")));
    }

    #[test]
    fn test_learn_more_narrows_query() {
        let reply = proposed(None);
        let state = list_proposal_learn_more_reply(&reply.context, &restaurant_entity("r1")).unwrap();
        assert!(state.history[1].statement.last_query().unwrap().as_filter().unwrap().filter.uses_param("id"));
        assert!(list_proposal_learn_more_reply(&reply.context, &restaurant_entity("r3")).is_none());
    }

    #[test]
    fn test_negative_reply() {
        let reply = proposed(None);
        let request = Expression::filter(
            restaurants(),
            BooleanExpression::atom("area", "==", Value::enumerated("north")),
        );
        let state = negative_list_proposal_reply(&reply.context, None, Some(&request)).unwrap();
        assert_eq!(state.dialogue_act, "execute");
        assert!(negative_list_proposal_reply(&reply.context, None, None).is_none());
    }
}
