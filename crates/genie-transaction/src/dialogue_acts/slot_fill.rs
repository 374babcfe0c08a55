//! Asking for and receiving missing action parameters

use std::sync::Arc;

use genie_core::Result;
use genie_thingtalk::{
    ActParam, ArgumentDef, ConfirmationState, DialogueHistoryItem, DialogueState, Invocation, Slot, Type, Value,
    visit_slots_mut,
};

use crate::ast_manip::is_same_function;
use crate::context_info::ContextInfo;
use crate::dialogue_acts::common::{InputParamSlot, ParamSlot, asked_params, fits_pending_action};
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::state_manip::{TargetConfirm, make_simple_state, make_target_state};

const FREE_TEXT: &[&str] = &["tt:short_free_text", "tt:long_free_text"];

/// The parameter a missing slot asks for: an input parameter, or the field
/// of a filter whose value is still undefined.
pub fn slot_question(slot: &Slot) -> Option<&str> {
    let tag = slot.tag();
    if slot.info.is_device_selector || slot.info.name == "$compute" {
        return None;
    }
    (tag.starts_with("in_param.") || tag.starts_with("filter.")).then_some(slot.info.name.as_str())
}

/// The question asks for the first missing parameter of its function.
pub fn is_good_slot_fill_question(ctx: &ContextInfo, question: &ParamSlot) -> bool {
    let Some(next_info) = &ctx.next_info else {
        return false;
    };
    let function = question.schema.qualified_name();
    next_info
        .missing_slots
        .iter()
        .find(|slot| slot.info.function == function)
        .and_then(slot_question)
        .is_some_and(|name| name == question.name)
}

/// Free-form string parameters bypass understanding of the next turn.
pub fn use_raw_mode(arg: &ArgumentDef) -> bool {
    if !arg.ty.is_string() {
        return false;
    }
    arg.raw_mode
        || arg
            .string_values
            .as_deref()
            .is_some_and(|values| FREE_TEXT.contains(&values))
}

pub fn make_slot_fill_question(ctx: &ContextInfo, questions: &[ParamSlot]) -> Result<Option<AgentReply>> {
    if questions.is_empty() || !questions.iter().all(|q| is_good_slot_fill_question(ctx, q)) {
        return Ok(None);
    }
    let params = questions.iter().map(|q| ActParam::Name(q.name.clone())).collect();
    let state = make_simple_state(&ctx.state, "sys_slot_fill", params);

    if let [question] = questions {
        let raw = question.schema.get_argument(&question.name).is_some_and(use_raw_mode);
        let options = ReplyOptions {
            raw,
            ..Default::default()
        };
        return make_agent_reply(ctx, state, None, Some(question.ty.clone()), options).map(Some);
    }
    make_agent_reply(ctx, state, None, None, ReplyOptions::default()).map(Some)
}

fn slot_fill_questions(ctx: &ContextInfo) -> Vec<&str> {
    asked_params(ctx).unwrap_or_default()
}

/// The user answers with a full invocation of the pending action.
pub fn precise_slot_fill_answer(ctx: &ContextInfo, answer: &Invocation) -> Option<DialogueState> {
    let questions = slot_fill_questions(ctx);
    if questions.is_empty() {
        return None;
    }
    let answered = questions
        .iter()
        .all(|q| answer.get_param(q).is_some_and(|v| !v.is_undefined()));
    if !answered {
        return None;
    }
    let next = ctx.next()?;
    if ctx.next_info.is_none() || ctx.next_function.is_none() || !fits_pending_action(ctx, answer) {
        return None;
    }

    let mut item = DialogueHistoryItem::new(next.statement.as_ref().clone(), ConfirmationState::Accepted);
    let invocation = Arc::make_mut(&mut item.statement).last_mut()?.invocation_mut()?;
    invocation.merge_params(&answer.in_params);
    Some(make_target_state(&ctx.state, "execute", Vec::new(), TargetConfirm::Accepted, vec![item]))
}

/// A bare value or parameter answering a single slot-fill question.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotAnswer {
    Value(Value),
    Param(InputParamSlot),
}

pub fn imprecise_slot_fill_answer(ctx: &ContextInfo, answer: SlotAnswer) -> Option<DialogueState> {
    let [question] = slot_fill_questions(ctx)[..] else {
        return None;
    };
    let (next, next_info, next_function) = (ctx.next()?, ctx.next_info.as_ref()?, ctx.next_function.as_ref()?);

    let missing = next_info
        .missing_slots
        .iter()
        .find(|slot| slot_question(slot) == Some(question))?;
    let (function, name, value) = match answer {
        SlotAnswer::Value(value) => {
            let value = match (&missing.info.ty, value) {
                (Type::Array(_), value @ Value::Array(_)) => value,
                (Type::Array(_), value) => Value::Array(vec![value]),
                (_, value) => value,
            };
            if !value.get_type().is_assignable(&missing.info.ty) {
                return None;
            }
            (missing.info.function.clone(), question.to_string(), value)
        }
        SlotAnswer::Param(given) => {
            if given.param.name != question || !is_same_function(&given.schema, next_function) {
                return None;
            }
            (given.schema.qualified_name(), given.param.name, given.param.value)
        }
    };
    if next_info.chain_parameter.as_deref() == Some(name.as_str()) {
        return None;
    }

    let tag = missing.tag();
    let mut item = DialogueHistoryItem::new(next.statement.as_ref().clone(), ConfirmationState::Accepted);
    for expr in &mut Arc::make_mut(&mut item.statement).expressions {
        visit_slots_mut(expr, &mut |info, slot_value| {
            if !info.is_device_selector && info.function == function && info.tag == tag && slot_value.is_undefined() {
                *slot_value = value.clone();
            }
        });
    }
    Some(make_target_state(&ctx.state, "execute", Vec::new(), TargetConfirm::Accepted, vec![item]))
}
