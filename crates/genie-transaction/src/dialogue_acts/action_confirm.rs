//! Confirming a complete action before running it

use genie_core::Result;
use genie_thingtalk::{ConfirmationState, DialogueState, Invocation, Type};

use crate::ast_manip::{get_invocation, is_same_function};
use crate::context_info::{ContextInfo, POLICY_NAME};
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::state_manip::{TargetConfirm, make_simple_state, make_target_state};

/// "Do you want me to book a table for 2 at 7 pm?"
///
/// Every parameter the agent mentions must be the one the pending action
/// will run with.
pub fn make_action_confirmation_phrase(ctx: &ContextInfo, action: &Invocation) -> Result<Option<AgentReply>> {
    let (Some(next), Some(next_info)) = (ctx.next(), ctx.next_info.as_ref()) else {
        return Ok(None);
    };
    let Some(pending) = get_invocation(next) else {
        return Ok(None);
    };
    if !next_info.is_complete || !is_same_function(&pending.schema, &action.schema) {
        return Ok(None);
    }
    let consistent = action
        .in_params
        .iter()
        .all(|param| pending.get_param(&param.name) == Some(&param.value));
    if !consistent {
        return Ok(None);
    }

    let state = make_simple_state(&ctx.state, "sys_confirm_action", Vec::new());
    make_agent_reply(ctx, state, None, Some(Type::Boolean), ReplyOptions::default()).map(Some)
}

/// The user says yes to the confirmation.
pub fn action_confirm_accept(ctx: &ContextInfo) -> Option<DialogueState> {
    let mut item = ctx.next()?.clone();
    item.confirm = ConfirmationState::Confirmed;
    Some(make_target_state(&ctx.state, "execute", Vec::new(), TargetConfirm::Confirmed, vec![item]))
}

/// The user says no: the action goes back to being a proposal, so the
/// agent can offer it again later.
pub fn action_confirm_reject(ctx: &ContextInfo) -> Option<DialogueState> {
    let next_idx = ctx.next_idx?;
    let mut item = ctx.state.history[next_idx].clone();
    item.confirm = ConfirmationState::Proposed;

    let mut history = ctx.state.history[..next_idx].to_vec();
    history.push(item);
    Some(DialogueState::new(POLICY_NAME, "cancel", None).with_history(history))
}
