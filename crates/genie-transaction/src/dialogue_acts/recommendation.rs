//! Recommendations: the agent proposes the top result, and the user's replies

use genie_core::Result;
use genie_thingtalk::{
    ConfirmMode, ConfirmationState, DialogueHistoryItem, DialogueState, Expression, ExpressionStatement, Invocation,
    LevenshteinDelta, SortDirection, Value, apply_levenshtein,
};

use crate::ast_manip::{get_invocation, is_same_function};
use crate::context_info::ContextInfo;
use crate::dialogue_acts::common::{ParamSlot, find_chain_param, is_info_phrase_compatible_with_result};
use crate::dialogue_acts::refinement::{
    combine_preamble_and_request, proposal_reply, refine_filter_to_answer_question_or_change_filter,
};
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::slot_bag::{AgentAux, Recommendation, SlotBag};
use crate::state_manip::{TargetConfirm, attach_levenshtein, make_simple_state, make_target_state};

/// A sliced query ("the top 3") only recommends when it returned one result.
fn is_partial_slice(ctx: &ContextInfo) -> bool {
    let Some(table) = ctx.current().and_then(|item| item.statement.last_query()) else {
        return false;
    };
    let sliced = match table {
        Expression::Slice(_) => true,
        Expression::Projection(p) => matches!(p.expression.as_ref(), Expression::Slice(_)),
        _ => false,
    };
    sliced && ctx.results().map_or(0, <[_]>::len) != 1
}

fn pending_action(ctx: &ContextInfo) -> Option<Invocation> {
    if !ctx.next_info.as_ref()?.is_action {
        return None;
    }
    get_invocation(ctx.next()?).cloned()
}

fn recommend_top(ctx: &ContextInfo, info: Option<SlotBag>, action: Option<Invocation>) -> Option<Recommendation> {
    if is_partial_slice(ctx) {
        return None;
    }
    Some(Recommendation {
        top_result: ctx.results()?.first()?.clone(),
        info,
        action,
        has_learn_more: false,
        has_anything_else: false,
    })
}

/// Recommend the top result through an action on it ("would you like to book it?").
pub fn make_action_recommendation(ctx: &ContextInfo, action: &Invocation) -> Option<Recommendation> {
    if ctx.state.dialogue_act == "notification" {
        return None;
    }
    let rec = recommend_top(ctx, None, Some(action.clone()))?;
    let id = rec.top_result.id()?;
    match action.in_params.as_slice() {
        [param] if &param.value == id => Some(rec),
        _ => None,
    }
}

/// Recommend the top result by name.
pub fn make_recommendation(ctx: &ContextInfo, name: &Value) -> Option<Recommendation> {
    let rec = recommend_top(ctx, None, pending_action(ctx))?;
    if rec.top_result.id() != Some(name) {
        return None;
    }
    Some(rec)
}

/// Recommend the best result of an arg-min/max query ("the cheapest is ...").
pub fn make_arg_min_max_recommendation(
    ctx: &ContextInfo,
    name: &Value,
    base: &Expression,
    param: &ParamSlot,
    direction: SortDirection,
) -> Option<Recommendation> {
    let arg_min_max = ctx.result_info.as_ref()?.arg_min_max.as_ref()?;
    let current_function = ctx.current_function.as_ref()?;
    if !is_same_function(base.schema(), current_function) || !is_same_function(&param.schema, current_function) {
        return None;
    }
    if direction != arg_min_max.direction || param.name != arg_min_max.field {
        return None;
    }
    make_recommendation(ctx, name)
}

/// Recommend the top result by describing it.
pub fn make_thingpedia_recommendation(ctx: &ContextInfo, info: &SlotBag) -> Option<Recommendation> {
    let rec = recommend_top(ctx, Some(info.clone()), pending_action(ctx))?;
    if !is_info_phrase_compatible_with_result(&rec.top_result, info) {
        return None;
    }
    Some(rec)
}

fn covers_projection(ctx: &ContextInfo, bags: &[Option<&SlotBag>]) -> bool {
    let Some(projection) = ctx.result_info.as_ref().and_then(|info| info.projection.as_ref()) else {
        return true;
    };
    projection
        .iter()
        .all(|name| bags.iter().flatten().any(|bag| bag.has(name)))
}

/// Add what the agent says about the recommendation. Every projected field
/// the user asked about must be mentioned.
pub fn check_recommendation(ctx: &ContextInfo, rec: Recommendation, info: Option<&SlotBag>) -> Option<Recommendation> {
    if let Some(info) = info {
        if !is_info_phrase_compatible_with_result(&rec.top_result, info) {
            return None;
        }
    }
    if !covers_projection(ctx, &[info, rec.info.as_ref()]) {
        return None;
    }
    let merged = match (info, &rec.info) {
        (Some(info), Some(existing)) => Some(SlotBag::merge(info, existing)?),
        (Some(info), None) => Some(info.clone()),
        (None, existing) => existing.clone(),
    };
    Some(Recommendation { info: merged, ..rec })
}

/// Offer an action on the recommended result.
pub fn check_action_for_recommendation(
    ctx: &ContextInfo,
    rec: Recommendation,
    action: &Invocation,
) -> Option<Recommendation> {
    if ctx.state.dialogue_act == "notification" {
        return None;
    }
    let id_type = rec.top_result.id()?.get_type();
    if let Some(existing) = &rec.action {
        if !is_same_function(&existing.schema, &action.schema) {
            return None;
        }
    }
    if !action.schema.iterate_arguments().any(|arg| arg.is_input() && arg.ty == id_type) {
        return None;
    }
    Some(Recommendation {
        action: Some(action.clone()),
        ..rec
    })
}

/// The agent offers to tell more; an explicit offer replaces the action.
pub fn recommendation_set_learn_more(rec: Recommendation) -> Recommendation {
    Recommendation {
        action: None,
        has_learn_more: true,
        ..rec
    }
}

/// Describe the single result of a non-list query.
pub fn make_display_result(ctx: &ContextInfo, info: &SlotBag) -> Option<Recommendation> {
    let current_function = ctx.current_function.as_ref()?;
    if current_function.is_list || !is_same_function(current_function, &info.schema) {
        return None;
    }
    let top_result = ctx.results()?.first()?;
    if !is_info_phrase_compatible_with_result(top_result, info) {
        return None;
    }
    Some(Recommendation {
        top_result: top_result.clone(),
        info: Some(info.clone()),
        action: pending_action(ctx),
        has_learn_more: false,
        has_anything_else: false,
    })
}

pub fn combine_display_result(ctx: &ContextInfo, proposal: Recommendation, new_info: &SlotBag) -> Option<Recommendation> {
    // several results of a single-result query, e.g. from multiple devices
    let top_result = ctx.results()?.first()?;
    if !is_info_phrase_compatible_with_result(top_result, new_info) {
        return None;
    }
    let info = match &proposal.info {
        Some(old) => SlotBag::merge(old, new_info)?,
        None => new_info.clone(),
    };
    Some(Recommendation {
        info: Some(info),
        has_learn_more: false,
        ..proposal
    })
}

pub fn check_display_result(ctx: &ContextInfo, proposal: Option<Recommendation>) -> Option<Recommendation> {
    let proposal = proposal?;
    if !covers_projection(ctx, &[proposal.info.as_ref()]) {
        return None;
    }
    Some(proposal)
}

pub fn make_recommendation_reply(ctx: &ContextInfo, rec: Recommendation) -> Result<AgentReply> {
    let state = make_simple_state(&ctx.state, "sys_recommend_one", Vec::new());
    make_agent_reply(
        ctx,
        state,
        Some(AgentAux::Recommendation(rec)),
        None,
        ReplyOptions::with_num_results(1),
    )
}

pub fn make_display_result_reply(ctx: &ContextInfo, rec: Recommendation) -> Result<AgentReply> {
    let mut options = ReplyOptions::with_num_results(1);
    if rec.action.is_some() || rec.has_anything_else {
        options.end = Some(false);
    }
    let state = make_simple_state(&ctx.state, "sys_display_result", Vec::new());
    make_agent_reply(ctx, state, Some(AgentAux::Recommendation(rec)), None, options)
}

fn recommendation(ctx: &ContextInfo) -> Option<&Recommendation> {
    ctx.aux.as_ref()?.as_recommendation()
}

/// "No, I'd rather something moderately priced": the user refines instead.
pub fn negative_recommendation_reply(
    ctx: &ContextInfo,
    preamble: Option<&Expression>,
    request: Option<&Expression>,
) -> Option<DialogueState> {
    let rec = recommendation(ctx)?;
    let preamble = match preamble {
        Some(expr) => Some(expr.as_filter()?),
        None => None,
    };
    let request = match request {
        Some(expr) => Some(expr.as_filter()?),
        None => None,
    };
    let proposal_type = rec.top_result.id().map(Value::get_type);
    let combined = combine_preamble_and_request(preamble, request, rec.info.as_ref(), proposal_type.as_ref())?;
    proposal_reply(
        ctx,
        &Expression::Filter(combined),
        refine_filter_to_answer_question_or_change_filter,
    )
}

/// "Yes, book it": run the proposed or named action on the recommended result.
pub fn positive_recommendation_reply(
    ctx: &ContextInfo,
    accepted_action: Option<&Invocation>,
    name: Option<&Value>,
) -> Option<DialogueState> {
    let rec = recommendation(ctx)?;
    let id = rec.top_result.id()?;

    // accepting with no action on the table makes no sense
    let accepted = accepted_action.or(rec.action.as_ref())?;
    if let Some(proposed) = &rec.action {
        if !is_same_function(&proposed.schema, &accepted.schema) {
            return None;
        }
    }
    if let Some(name) = name {
        if name != id {
            return None;
        }
        // "play X" on an auto-confirmed action is likely a new request
        if accepted.schema.confirm == ConfirmMode::Auto {
            return None;
        }
    }
    let chain_param = find_chain_param(&rec.top_result, &accepted.schema)?;

    let mut invocation = accepted.clone();
    invocation.set_param(chain_param, id.clone());
    invocation.add_missing_required_params();
    let delta = LevenshteinDelta::continuing(Expression::from(invocation.clone())).optimize();
    let statement = match ctx.next() {
        Some(next) => apply_levenshtein(&next.statement, &delta),
        None => ExpressionStatement::single(invocation.into()),
    };

    let item = DialogueHistoryItem::new(statement, ConfirmationState::Accepted);
    let state = make_target_state(&ctx.state, "execute", Vec::new(), TargetConfirm::Accepted, vec![item]);
    Some(attach_levenshtein(state, delta))
}

/// "Thank you, that's all": only without pending work.
pub fn recommendation_cancel_reply(ctx: &ContextInfo, valid: bool) -> Option<DialogueState> {
    if !valid || ctx.next().is_some() {
        return None;
    }
    Some(make_simple_state(&ctx.state, "cancel", Vec::new()))
}

pub fn recommendation_learn_more_reply(ctx: &ContextInfo, name: Option<&Value>) -> Option<DialogueState> {
    let rec = recommendation(ctx)?;
    if let Some(name) = name {
        if rec.top_result.id() != Some(name) {
            return None;
        }
    }
    Some(make_simple_state(&ctx.state, "learn_more", Vec::new()))
}

/// "Again": re-run the current statement. Monitorable queries that worked
/// are better served by a notification.
pub fn repeat_command_reply(ctx: &ContextInfo) -> Option<DialogueState> {
    if ctx.next().is_some() {
        return None;
    }
    let current = ctx.current()?;
    if ctx.error().is_none() && ctx.current_function.as_ref()?.is_monitorable {
        return None;
    }
    let item = DialogueHistoryItem::new(current.statement.as_ref().clone(), ConfirmationState::Accepted);
    Some(make_target_state(&ctx.state, "execute", Vec::new(), TargetConfirm::Accepted, vec![item]))
}
