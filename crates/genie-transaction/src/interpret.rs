//! Entry points outside the agent turn: UI answers, notifications, the
//! initial state and follow-ups

use genie_core::Result;
use genie_thingtalk::{
    ActParam, ConfirmationState, DialogueHistoryItem, DialogueState, Expression, ExpressionStatement, Invocation,
    ResultItem, ResultList, Value,
};
use tracing::trace;

use crate::ast_manip::{get_invocation, is_same_function};
use crate::context_info::{ContextInfo, POLICY_NAME};
use crate::dialogue_acts::action_confirm::{action_confirm_accept, action_confirm_reject};
use crate::dialogue_acts::search_questions::{SearchAnswer, imprecise_search_question_answer};
use crate::dialogue_acts::slot_fill::{SlotAnswer, imprecise_slot_fill_answer};
use crate::library::Thingpedia;
use crate::state_manip::{accept_all_proposed_statements, add_new_statement, make_simple_state};

/// Agent prompts asked by the executor itself, answered with a bare value.
const EXECUTOR_PROMPTS: &[&str] = &[
    "sys_resolve_contact",
    "sys_resolve_device",
    "sys_ask_phone_number",
    "sys_ask_email_address",
    "sys_resolve_location",
    "sys_resolve_time",
    "sys_configure_notifications",
];

/// Turn an answer given through the UI (a button, a yes/no) into the user
/// state of this turn. `None` when the answer does not fit the question.
pub fn interpret_answer(state: &DialogueState, answer: &Value) -> Result<Option<DialogueState>> {
    let ctx = ContextInfo::get(state)?;

    if let Value::Boolean(yes) = answer {
        let proposed = state
            .history
            .last()
            .is_some_and(|item| item.confirm == ConfirmationState::Proposed);
        if proposed {
            return Ok(if *yes {
                accept_all_proposed_statements(state)
            } else {
                Some(make_simple_state(state, "cancel", Vec::new()))
            });
        }
    }

    let act = state.dialogue_act.as_str();
    let new_state = match (act, answer) {
        ("sys_record_command", _) => Some(make_simple_state(state, "end", Vec::new())),
        ("sys_anything_else", Value::Boolean(true)) => Some(make_simple_state(state, "reinit", Vec::new())),
        ("sys_anything_else", Value::Boolean(false)) => Some(make_simple_state(state, "end", Vec::new())),
        ("sys_recommend_one" | "sys_recommend_two" | "sys_recommend_three" | "sys_recommend_four", Value::Boolean(true)) => {
            Some(make_simple_state(state, "learn_more", Vec::new()))
        }
        (
            "sys_recommend_one" | "sys_recommend_two" | "sys_recommend_three" | "sys_recommend_four"
            | "sys_display_result",
            Value::Boolean(false),
        ) => Some(make_simple_state(state, "cancel", Vec::new())),
        ("sys_slot_fill", value) => imprecise_slot_fill_answer(&ctx, SlotAnswer::Value(value.clone())),
        ("sys_search_question", value) => imprecise_search_question_answer(&ctx, SearchAnswer::Value(value.clone())),
        ("sys_confirm_action", Value::Boolean(true)) => action_confirm_accept(&ctx),
        ("sys_confirm_action", Value::Boolean(false)) => action_confirm_reject(&ctx),
        (prompt, value) if EXECUTOR_PROMPTS.contains(&prompt) => Some(make_simple_state(
            state,
            "answer",
            vec![ActParam::Value(value.clone())],
        )),
        _ => None,
    };
    if new_state.is_none() {
        trace!(act, "answer does not apply");
    }
    Ok(new_state)
}

fn notification_state(app_name: Option<&str>, statement: ExpressionStatement, results: ResultList) -> DialogueState {
    let params = app_name.map(|name| vec![ActParam::Value(Value::string(name))]);
    let item = DialogueHistoryItem::new(statement, ConfirmationState::Confirmed).with_results(results);
    DialogueState::new(POLICY_NAME, "notification", params).with_history(vec![item])
}

/// A state displaying one result of a monitored statement.
pub fn notification(app_name: Option<&str>, statement: ExpressionStatement, result: ResultItem) -> DialogueState {
    notification_state(app_name, statement, ResultList::new(vec![result]))
}

/// A state reporting that a monitored statement failed.
pub fn notify_error(app_name: Option<&str>, statement: ExpressionStatement, error: Value) -> DialogueState {
    notification_state(app_name, statement, ResultList::with_error(error))
}

/// The state before the user's first turn: the library's initial function,
/// with its required inputs still to fill.
pub fn initial_state(library: &Thingpedia) -> Option<DialogueState> {
    let function = library.initial_function()?;
    let mut invocation = Invocation::new(function.clone());
    invocation.add_missing_required_params();
    let item = DialogueHistoryItem::new(
        ExpressionStatement::single(invocation.into()),
        ConfirmationState::Accepted,
    );
    Some(DialogueState::new(POLICY_NAME, "init", None).with_history(vec![item]))
}

/// The action the library suggests after the current statement completes,
/// added to the state as accepted.
pub fn get_follow_up(state: &DialogueState, library: &Thingpedia) -> Result<Option<DialogueState>> {
    let ctx = ContextInfo::get(state)?;
    if ctx.next().is_some() {
        return Ok(None);
    }
    let (Some(current), Some(current_idx)) = (ctx.current(), ctx.current_idx) else {
        return Ok(None);
    };
    if current.statement.stream().is_some() {
        return Ok(None);
    }
    let Some(current_function) = current.statement.schema() else {
        return Ok(None);
    };
    let Some((follow_up, schema)) = library.follow_up(&current_function.qualified_name()) else {
        return Ok(None);
    };

    let top = ctx.results().and_then(|r| r.first());
    let action = get_invocation(current);

    if let Some(condition) = &follow_up.condition {
        let value = match top {
            Some(top) => top.get(&condition.name),
            None => action.and_then(|a| a.get_param(&condition.name)),
        };
        if value.is_none_or(|v| v.to_key_string() != condition.value) {
            return Ok(None);
        }
    }

    let mut invocation = Invocation::new(schema.clone());
    if !follow_up.params.is_empty() {
        // copy from the latest statement running the follow-up function
        let previous = state.history[..=current_idx]
            .iter()
            .rev()
            .find_map(|item| get_invocation(item).filter(|inv| is_same_function(&inv.schema, schema)));
        if let Some(previous) = previous {
            for param in previous.in_params.iter().filter(|p| follow_up.params.contains(&p.name)) {
                invocation.set_param(param.name.clone(), param.value.clone());
            }
        }
    }

    let id_type = current_function.get_argument_type("id");
    let top_id = top.and_then(ResultItem::id);
    for arg in schema.iterate_arguments().filter(|arg| arg.is_input()) {
        if invocation.get_param(&arg.name).is_some() {
            continue;
        }
        match (id_type, top_id) {
            (Some(id_type), Some(id)) if &arg.ty == id_type => invocation.set_param(arg.name.clone(), id.clone()),
            _ if arg.is_required() => invocation.set_param(arg.name.clone(), Value::Undefined),
            _ => {}
        }
    }

    let expression: Expression = invocation.into();
    Ok(Some(add_new_statement(
        state,
        "execute",
        Vec::new(),
        ConfirmationState::Accepted,
        vec![expression],
    )))
}
