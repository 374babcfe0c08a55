//! Agent replies

use std::collections::BTreeMap;
use std::sync::Arc;

use genie_core::{Result, ensure_invariant};
use genie_thingtalk::{ConfirmationState, DialogueState, Type};

use crate::context_info::ContextInfo;
use crate::context_tags::get_context_phrases_common;
use crate::slot_bag::AgentAux;

/// Acts after which the agent stops listening, unless work is pending.
const ENDING_ACTS: &[&str] = &[
    "sys_rule_enable_success",
    "sys_action_success",
    "sys_action_error",
    "sys_end",
    "sys_display_result",
];

#[derive(Debug, Clone, Default)]
pub struct ReplyOptions {
    /// Overrides the default end-of-interaction rule.
    pub end: Option<bool>,
    /// Take the next user turn verbatim (free-form slot values).
    pub raw: bool,
    /// Number of results described at this turn.
    pub num_results: usize,
}

impl ReplyOptions {
    pub fn ending(end: bool) -> Self {
        Self {
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn raw() -> Self {
        Self {
            raw: true,
            ..Default::default()
        }
    }

    pub fn with_num_results(num_results: usize) -> Self {
        Self {
            num_results,
            ..Default::default()
        }
    }
}

/// What the agent says: the new state plus the information the user side
/// needs to interpret the next turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub state: DialogueState,
    /// Context of `state`, carrying the auxiliary payload.
    pub context: Arc<ContextInfo>,
    /// `ctx_sys_any`, the main tag, then the common context tags.
    pub context_tags: Vec<String>,
    pub expected_type: Option<Type>,
    pub raw_mode: bool,
    /// Whether the agent stops listening after this turn.
    pub end: bool,
    pub num_results: usize,
}

impl AgentReply {
    pub fn main_tag(&self) -> &str {
        self.context_tags.get(1).map_or("ctx_sys_any", String::as_str)
    }

    pub fn aux(&self) -> Option<&AgentAux> {
        self.context.aux.as_ref()
    }

    /// Placeholder values for rendering the reply: the top result, then the
    /// payload of the reply, then the act parameters.
    pub fn values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        if let Some(top) = self.context.results().and_then(|r| r.first()) {
            for (name, value) in &top.value {
                values.insert(name.clone(), value.to_display_string());
            }
        }
        match self.aux() {
            Some(AgentAux::Recommendation(rec)) => {
                for (name, value) in &rec.top_result.value {
                    values.insert(name.clone(), value.to_display_string());
                }
                if let Some(info) = &rec.info {
                    for (name, value) in info.iter() {
                        values.insert(name.to_string(), value.to_display_string());
                    }
                }
            }
            Some(AgentAux::ListProposal(proposal)) => {
                let names: Vec<String> = proposal
                    .results
                    .iter()
                    .filter_map(|r| r.id())
                    .map(|id| id.to_display_string())
                    .collect();
                values.insert("names".to_string(), names.join(", "));
                if let Some(info) = &proposal.info {
                    for (name, value) in info.iter() {
                        values.insert(name.to_string(), value.to_display_string());
                    }
                }
            }
            Some(AgentAux::SlotBag(bag)) => {
                for (name, value) in bag.iter() {
                    values.insert(name.to_string(), value.to_display_string());
                }
            }
            Some(AgentAux::Questions(questions)) => {
                values.insert("question".to_string(), questions.join(" and ").replace('_', " "));
            }
            None => {}
        }
        if let Some(params) = &self.state.dialogue_act_param {
            let params: Vec<String> = params.iter().map(|p| p.to_string().replace('_', " ")).collect();
            values.insert("params".to_string(), params.join(" and "));
        }
        values
    }
}

fn main_tag(dialogue_act: &str) -> String {
    if dialogue_act == "sys_generic_search_question" {
        "ctx_sys_search_question".to_string()
    } else if dialogue_act != "sys_search_question" && dialogue_act.ends_with("_question") {
        format!("ctx_{}", dialogue_act.trim_end_matches("_question"))
    } else if dialogue_act.starts_with("sys_recommend_") && dialogue_act != "sys_recommend_one" {
        "ctx_sys_recommend_many".to_string()
    } else if dialogue_act == "sys_rule_enable_success" {
        "ctx_sys_action_success".to_string()
    } else {
        format!("ctx_{}", dialogue_act)
    }
}

/// Build the agent reply for `state`, reached from the context `ctx`.
///
/// A reply that proposes something expects a yes/no answer unless an
/// expected type is given.
pub fn make_agent_reply(
    ctx: &ContextInfo,
    state: DialogueState,
    aux: Option<AgentAux>,
    expected_type: Option<Type>,
    options: ReplyOptions,
) -> Result<AgentReply> {
    ensure_invariant!(
        state.dialogue_act.starts_with("sys_"),
        "agent reply with user act {} (from {})",
        state.dialogue_act,
        ctx.state.dialogue_act
    );

    let expected_type = expected_type.or_else(|| {
        state
            .history
            .iter()
            .any(|item| item.confirm == ConfirmationState::Proposed && !item.is_executed())
            .then_some(Type::Boolean)
    });

    let end = options.end.unwrap_or_else(|| {
        state.history.iter().all(|item| item.is_executed())
            && (state.dialogue_act.starts_with("sys_recommend_")
                || ENDING_ACTS.contains(&state.dialogue_act.as_str()))
    });

    let new_context = ContextInfo::get(&state)?;
    let context = match aux {
        Some(aux) => Arc::new(new_context.with_aux(aux)),
        None => new_context,
    };

    let mut context_tags = vec!["ctx_sys_any".to_string(), main_tag(&state.dialogue_act)];
    get_context_phrases_common(&context, &mut context_tags);

    Ok(AgentReply {
        state,
        context,
        context_tags,
        expected_type,
        raw_mode: options.raw,
        end,
        num_results: options.num_results,
    })
}
