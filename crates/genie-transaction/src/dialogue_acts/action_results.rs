//! Reporting the outcome of an action, and the user's follow-ups to errors

use genie_core::Result;
use genie_thingtalk::{
    ActParam, ConfirmationState, DeviceSelector, DialogueHistoryItem, DialogueState, Expression, ExpressionStatement,
    Invocation, Value,
};

use crate::ast_manip::{get_invocation, is_same_function};
use crate::context_info::ContextInfo;
use crate::dialogue_acts::common::{ParamSlot, is_info_phrase_compatible_with_result, question_names};
use crate::dialogue_acts::slot_fill::SlotAnswer;
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::slot_bag::{AgentAux, SlotBag};
use crate::state_manip::{TargetConfirm, make_simple_state, make_target_state};

/// An error phrase of a function, keyed by the error code it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub code: String,
    pub bag: SlotBag,
}

fn success_reply(ctx: &ContextInfo, info: Option<SlotBag>, num_results: usize) -> Result<AgentReply> {
    let state = make_simple_state(&ctx.state, "sys_action_success", Vec::new());
    make_agent_reply(
        ctx,
        state,
        info.map(AgentAux::SlotBag),
        None,
        ReplyOptions::with_num_results(num_results),
    )
}

/// Success phrased by the library; correct by construction.
pub fn make_thingpedia_action_success_phrase(ctx: &ContextInfo, info: &SlotBag) -> Result<AgentReply> {
    success_reply(ctx, Some(info.clone()), 1)
}

pub fn make_generic_action_success_phrase(ctx: &ContextInfo) -> Result<AgentReply> {
    success_reply(ctx, None, 0)
}

fn device_name(selector: &DeviceSelector) -> Option<&Value> {
    selector
        .attributes
        .iter()
        .find(|attr| attr.name == "name")
        .map(|attr| &attr.value)
}

fn check_selector(executed: &DeviceSelector, described: &DeviceSelector) -> bool {
    if executed.all != described.all {
        return false;
    }
    match described.attributes.first() {
        Some(attr) if attr.name == "name" => device_name(executed) == Some(&attr.value),
        _ => true,
    }
}

/// Describe the action that just ran. Every constant the description
/// mentions must match what was executed or what it returned.
pub fn make_complete_action_success_phrase(
    ctx: &ContextInfo,
    action: &Expression,
    info: Option<&SlotBag>,
) -> Result<Option<AgentReply>> {
    let (Some(results), Some(executed), Some(described)) = (
        ctx.results(),
        ctx.current().and_then(get_invocation),
        action.as_invocation(),
    ) else {
        return Ok(None);
    };
    if !is_same_function(&executed.schema, &described.schema) || !check_selector(&executed.selector, &described.selector) {
        return Ok(None);
    }

    for param in &described.in_params {
        if param.value.is_undefined() {
            continue;
        }
        let old = executed.get_param(&param.name);
        let mut param_passing = false;
        match (old, &param.value) {
            (Some(Value::VarRef(old)), Value::VarRef(new)) => {
                if old != new {
                    return Ok(None);
                }
                param_passing = true;
            }
            (Some(_), Value::VarRef(_)) => return Ok(None),
            (Some(Value::VarRef(_)), _) => param_passing = true,
            (Some(old), new) => {
                if old != new {
                    return Ok(None);
                }
            }
            // outputs appended to describe the result are checked below
            (None, _) => {
                if described.schema.get_argument(&param.name).is_none_or(|arg| arg.is_input()) {
                    return Ok(None);
                }
            }
        }

        if param.value.is_var_ref() {
            continue;
        }
        // a constant nobody can vouch for is made up
        match results {
            [] if old.is_none() || param_passing => return Ok(None),
            [] => {}
            [top] => {
                if top.get(&param.name) != Some(&param.value) {
                    return Ok(None);
                }
            }
            _ => return Ok(None),
        }
    }

    if let Some(info) = info {
        if results.is_empty() || !results.iter().all(|r| is_info_phrase_compatible_with_result(r, info)) {
            return Ok(None);
        }
    }
    success_reply(ctx, info.cloned(), 1).map(Some)
}

/// The error phrase applies: same function, same code, and the parameters
/// it mentions are the ones the action ran with.
pub fn check_thingpedia_error_message(ctx: &ContextInfo, msg: &ErrorMessage) -> bool {
    let Some(current_function) = &ctx.current_function else {
        return false;
    };
    if !is_same_function(current_function, &msg.bag.schema) {
        return false;
    }
    if !matches!(ctx.error(), Some(Value::Enum(code)) if code == &msg.code) {
        return false;
    }
    let Some(action) = ctx.current().and_then(get_invocation) else {
        return false;
    };
    action
        .in_params
        .iter()
        .all(|param| msg.bag.get(&param.name).is_none_or(|value| value == &param.value))
}

/// The action the agent mentions while reporting an error is the one that failed.
pub fn check_action_error_message(ctx: &ContextInfo, action: &Invocation) -> bool {
    let Some(current_function) = &ctx.current_function else {
        return false;
    };
    if !is_same_function(current_function, &action.schema) {
        return false;
    }
    let Some(executed) = ctx.current().and_then(get_invocation) else {
        return false;
    };
    action
        .in_params
        .iter()
        .filter(|param| !param.value.is_undefined())
        .all(|param| executed.get_param(&param.name) == Some(&param.value))
}

/// Report the error, optionally asking to change some input parameters.
pub fn make_action_error_phrase(ctx: &ContextInfo, questions: &[ParamSlot]) -> Result<Option<AgentReply>> {
    let Some(schema) = &ctx.current_function else {
        return Ok(None);
    };
    let valid = questions.iter().all(|q| {
        is_same_function(schema, &q.schema) && schema.get_argument(&q.name).is_some_and(|arg| arg.is_input())
    });
    if !valid {
        return Ok(None);
    }

    let params: Vec<ActParam> = question_names(questions).into_iter().map(ActParam::Name).collect();
    let (state, expected_type) = match questions {
        [] => (make_simple_state(&ctx.state, "sys_action_error", Vec::new()), None),
        [question] => (
            make_simple_state(&ctx.state, "sys_action_error_question", params),
            schema.get_argument_type(&question.name).cloned(),
        ),
        _ => (make_simple_state(&ctx.state, "sys_action_error_question", params), None),
    };
    make_agent_reply(ctx, state, None, expected_type, ReplyOptions::default()).map(Some)
}

fn replace_action(ctx: &ContextInfo, action: Invocation) -> DialogueState {
    let item = DialogueHistoryItem::new(ExpressionStatement::single(action.into()), ConfirmationState::Accepted);
    make_target_state(&ctx.state, "execute", Vec::new(), TargetConfirm::Accepted, vec![item])
}

/// "Try 8 pm instead": re-run the failed action with one parameter changed.
pub fn action_error_change_param(ctx: &ContextInfo, answer: SlotAnswer) -> Option<DialogueState> {
    let schema = ctx.current_function.as_ref()?;
    let (name, value) = match answer {
        SlotAnswer::Value(value) => {
            let [question] = ctx.state.dialogue_act_param.as_deref()? else {
                return None;
            };
            let name = question.as_name()?;
            let arg = schema.get_argument(name)?;
            if !arg.is_input() || arg.ty != value.get_type() {
                return None;
            }
            (name.to_string(), value)
        }
        SlotAnswer::Param(slot) => {
            if !is_same_function(&slot.schema, schema) {
                return None;
            }
            (slot.param.name, slot.param.value)
        }
    };

    let mut action = ctx.current().and_then(get_invocation)?.clone();
    action.set_param(name, value);
    Some(replace_action(ctx, action))
}

/// "Try again": re-run the failed action asking every input anew.
pub fn action_error_retry(ctx: &ContextInfo) -> Option<DialogueState> {
    ctx.error()?;
    let mut action = ctx.current().and_then(get_invocation)?.clone();
    for param in &mut action.in_params {
        param.value = Value::Undefined;
    }
    action.add_missing_required_params();
    Some(replace_action(ctx, action))
}

/// The user asks about outputs of the action that just ran.
pub fn action_success_question(ctx: &ContextInfo, questions: &[ParamSlot]) -> Option<DialogueState> {
    let schema = ctx.current_function.as_ref()?;
    let valid = questions.iter().all(|q| {
        is_same_function(&q.schema, schema) && schema.get_argument(&q.name).is_some_and(|arg| !arg.is_input())
    });
    if !valid {
        return None;
    }
    let params = question_names(questions).into_iter().map(ActParam::Name).collect();
    Some(make_simple_state(&ctx.state, "action_question", params))
}
