//! The dialogue loop: read a user turn, execute it, choose the agent reply

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use genie_core::{GenieError, Result};
use genie_templates::{PhraseRenderer, expand_choices};
use genie_thingtalk::{ConfirmationState, DialogueState, ResultItem, ResultList, Type, Value};

use crate::ast_manip::get_invocation;
use crate::config::{PolicyConfig, StartMode};
use crate::context_info::{ContextInfo, POLICY_NAME};
use crate::context_tags::tag_context_for_agent;
use crate::dialogue_acts::action_confirm::make_action_confirmation_phrase;
use crate::dialogue_acts::action_results::{
    make_action_error_phrase, make_complete_action_success_phrase, make_generic_action_success_phrase,
};
use crate::dialogue_acts::aggregation::make_aggregation_answer;
use crate::dialogue_acts::common::ParamSlot;
use crate::dialogue_acts::initial_request::{initial_request, start_new_request};
use crate::dialogue_acts::list_proposal::{check_list_proposal, make_list_proposal_reply};
use crate::dialogue_acts::recommendation::{
    check_display_result, check_recommendation, make_display_result, make_display_result_reply,
    make_recommendation, make_recommendation_reply,
};
use crate::dialogue_acts::search_questions::make_search_question;
use crate::dialogue_acts::slot_fill::{make_slot_fill_question, slot_question};
use crate::interface::{DialogueInterface, UserCommand};
use crate::interpret::interpret_answer;
use crate::library::Thingpedia;
use crate::reply::{AgentReply, ReplyOptions, make_agent_reply};
use crate::slot_bag::SlotBag;
use crate::state_manip::make_simple_state;
use crate::verification::Verifier;

pub const UNEXPECTED_UTTERANCE: &str = "Sorry, I did not understand that. Can you rephrase it?";

/// Phrases used when the library has nothing for a reply.
fn default_utterances(dialogue_act: &str) -> &'static [&'static str] {
    match dialogue_act {
        "sys_greet" => &["Hello, how can I help you?"],
        "sys_end" => &["Alright, bye!"],
        "sys_unexpected" => &[UNEXPECTED_UTTERANCE],
        "sys_anything_else" => &["Is there anything else I can help you with?"],
        "sys_learn_more_what" => &["What would you like to know?"],
        "sys_confirm_action" => &["Do you want me to go ahead?"],
        "sys_action_success" => &["The action was completed successfully."],
        "sys_action_error" => &["Sorry, there was an error."],
        "sys_action_error_question" => &["Sorry, there was an error. Would you like to change the ${params}?"],
        "sys_rule_enable_success" => &["Alright, I will let you know."],
        "sys_empty_search" => &["Sorry, I cannot find anything like that."],
        "sys_slot_fill" => &["What ${params} would you like?"],
        "sys_search_question" => &["What ${params} are you looking for?"],
        "sys_generic_search_question" => &["Could you be more specific?"],
        "sys_recommend_one" => &["How about ${id}?"],
        "sys_display_result" => &["The ${field} is ${avg}.", "I found ${count} results.", "Here is ${id}."],
        act if act.starts_with("sys_recommend_") => &["I found ${names}."],
        _ => &["Okay."],
    }
}

/// Drives one dialogue session.
///
/// Sessions share [`ContextCache::global`](crate::cache::ContextCache::global); its
/// capacity is set once by the embedding program, not per session.
pub struct DialoguePolicy {
    library: Arc<Thingpedia>,
    config: PolicyConfig,
    verifier: Verifier,
    renderer: PhraseRenderer,
    rng: Option<StdRng>,
    session_id: Uuid,
}

impl DialoguePolicy {
    pub fn new(library: Arc<Thingpedia>, config: PolicyConfig) -> Result<Self> {
        config.validate()?;
        let verifier = Verifier::from_config(&config)?;
        let rng = config.seed.map(StdRng::seed_from_u64);
        Ok(Self {
            library,
            config,
            verifier,
            renderer: PhraseRenderer::new(),
            rng,
            session_id: Uuid::new_v4(),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Run the session until the user leaves or the dialogue ends. Returns
    /// the last agent state.
    pub async fn run(&mut self, interface: &dyn DialogueInterface) -> Result<Option<DialogueState>> {
        let start_mode = self.config.start_mode;
        info!(session = %self.session_id, ?start_mode, "dialogue started");

        let mut agent_state: Option<DialogueState> = None;
        let mut last_result: Option<ResultList> = None;

        if start_mode.greets() {
            let ctx = ContextInfo::get_or_initial(None)?;
            let reply = self.simple_reply(&ctx, "sys_greet", ReplyOptions::default())?;
            self.send(interface, &reply).await?;
            agent_state = Some(reply.state);
        }

        loop {
            let (reply, results) = match self.turn(interface, agent_state.as_ref(), last_result.as_ref()).await {
                Ok(turn) => turn,
                Err(GenieError::Cancelled) => {
                    self.close(interface, agent_state.as_ref()).await?;
                    return Ok(agent_state);
                }
                Err(GenieError::UnexpectedCommand(what)) => {
                    warn!(session = %self.session_id, what = %what, "unexpected command");
                    self.unexpected(interface, agent_state.as_ref()).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.send(interface, &reply).await?;

            last_result = results;
            let finished = reply.state.dialogue_act == "sys_end";
            agent_state = Some(reply.state);
            if finished {
                info!(session = %self.session_id, "dialogue ended");
                return Ok(agent_state);
            }
        }
    }

    /// One exchange up to the agent reply: read the command, execute it and
    /// choose what to say. Also returns the results the reply is about.
    async fn turn(
        &self,
        interface: &dyn DialogueInterface,
        agent_state: Option<&DialogueState>,
        last_result: Option<&ResultList>,
    ) -> Result<(AgentReply, Option<ResultList>)> {
        let command = interface.get_command(agent_state).await?;
        let user_state = self.user_state(agent_state, command)?;
        let executed = interface.execute(user_state, last_result).await?;
        let ctx = ContextInfo::get(&executed)?;
        let reply = self.agent_turn(&ctx)?;
        self.verifier.check_state(&reply.state.dialogue_act, &ctx, &reply.state);
        Ok((reply, ctx.current().and_then(|item| item.results.clone())))
    }

    /// The user state a command stands for, given the last agent state.
    fn user_state(&self, agent_state: Option<&DialogueState>, command: UserCommand) -> Result<DialogueState> {
        let previous = ContextInfo::get_or_initial(agent_state)?;
        let state = match command {
            UserCommand::Cancel => return Err(GenieError::Cancelled),
            UserCommand::State(state) => {
                if state.policy != POLICY_NAME {
                    return Err(GenieError::InvalidState(format!("unknown policy {}", state.policy)));
                }
                state
            }
            UserCommand::Request(stmt) => {
                let new_state = if previous.state.history.is_empty() {
                    initial_request(&stmt, &self.library)
                } else {
                    start_new_request(&previous, &stmt, &self.library, self.config.strict_multidomain)
                };
                new_state.ok_or_else(|| GenieError::UnexpectedCommand(stmt.to_string()))?
            }
            UserCommand::Answer(value) => {
                let Some(agent_state) = agent_state else {
                    return Err(GenieError::UnexpectedCommand(value.to_string()));
                };
                interpret_answer(agent_state, &value)?.ok_or_else(|| GenieError::UnexpectedCommand(value.to_string()))?
            }
            UserCommand::Act(act) => make_simple_state(&previous.state, &act, Vec::new()),
        };
        self.verifier.check_state(&state.dialogue_act, &previous, &state);
        debug!(session = %self.session_id, act = %state.dialogue_act, "user turn");
        Ok(state)
    }

    /// Choose the agent reply for an executed user state.
    pub fn agent_turn(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        let tags = tag_context_for_agent(ctx)?;
        debug!(session = %self.session_id, ?tags, "agent turn");
        let Some(tag) = tags.first() else {
            return Err(GenieError::Invariant("no context tag".into()));
        };

        match tag.as_str() {
            "ctx_greet" | "ctx_reinit" => self.simple_reply(ctx, "sys_greet", ReplyOptions::default()),
            "ctx_end" | "ctx_cancel" => self.simple_reply(ctx, "sys_end", ReplyOptions::ending(true)),
            "ctx_learn_more" => self.simple_reply(ctx, "sys_learn_more_what", ReplyOptions::ending(false)),
            "ctx_confirm_action" => self.confirm_action(ctx),
            "ctx_incomplete_action_after_search" => self.fill_slot(ctx),
            "ctx_completed_action_error" | "ctx_notification_error" => self.action_error(ctx),
            "ctx_completed_action_success" | "ctx_action_notification" => self.action_success(ctx),
            "ctx_rule_enable_success" => self.simple_reply(ctx, "sys_rule_enable_success", ReplyOptions::default()),
            "ctx_empty_search_command" => self.simple_reply(ctx, "sys_empty_search", ReplyOptions::default()),
            "ctx_display_nonlist_result" | "ctx_nonlist_notification" => self.display_result(ctx),
            "ctx_aggregation_question" => match make_aggregation_answer(ctx)? {
                Some(reply) => Ok(reply),
                None => self.generic_display(ctx),
            },
            "ctx_single_result_search_command" => match self.recommend_top(ctx)? {
                Some(reply) => Ok(reply),
                None => self.propose_results(ctx),
            },
            "ctx_search_command" => match self.narrow_search(ctx)? {
                Some(reply) => Ok(reply),
                None => self.propose_results(ctx),
            },
            "ctx_complete_search_command" | "ctx_list_notification" => self.propose_results(ctx),
            other => Err(GenieError::Invariant(format!("no agent turn for {}", other))),
        }
    }

    fn simple_reply(&self, ctx: &ContextInfo, dialogue_act: &str, options: ReplyOptions) -> Result<AgentReply> {
        let state = make_simple_state(&ctx.state, dialogue_act, Vec::new());
        make_agent_reply(ctx, state, None, None, options)
    }

    fn confirm_action(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        if let Some(action) = ctx.next().and_then(get_invocation) {
            if let Some(reply) = make_action_confirmation_phrase(ctx, action)? {
                return Ok(reply);
            }
        }
        let state = make_simple_state(&ctx.state, "sys_confirm_action", Vec::new());
        make_agent_reply(ctx, state, None, Some(Type::Boolean), ReplyOptions::default())
    }

    /// Ask for the first missing input or filter value of the pending statement.
    fn fill_slot(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        let (Some(next_info), Some(schema)) = (&ctx.next_info, &ctx.next_function) else {
            return Err(GenieError::Invariant("incomplete action without a pending statement".into()));
        };
        for slot in &next_info.missing_slots {
            let Some(name) = slot_question(slot) else {
                continue;
            };
            let Some(question) = ParamSlot::new(schema, name) else {
                continue;
            };
            if let Some(reply) = make_slot_fill_question(ctx, &[question])? {
                return Ok(reply);
            }
        }
        if ctx.results().is_some_and(|results| !results.is_empty()) {
            return self.propose_results(ctx);
        }
        Err(GenieError::Invariant(format!(
            "no question for the pending statement of {}",
            ctx.state.dialogue_act
        )))
    }

    fn action_error(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        match make_action_error_phrase(ctx, &[])? {
            Some(reply) => Ok(reply),
            None => self.simple_reply(ctx, "sys_action_error", ReplyOptions::default()),
        }
    }

    fn action_success(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        if let Some(action) = ctx.current().and_then(|item| item.statement.last()) {
            if let Some(reply) = make_complete_action_success_phrase(ctx, action, None)? {
                return Ok(reply);
            }
        }
        make_generic_action_success_phrase(ctx)
    }

    /// What the agent can say about `result`: the projected outputs, or
    /// every output when `all_outputs` is set.
    fn describe_result(&self, ctx: &ContextInfo, result: &ResultItem, all_outputs: bool) -> Option<SlotBag> {
        let schema = ctx.current_function.as_ref()?;
        let projection = ctx.result_info.as_ref()?.projection.as_ref();
        let mut bag = SlotBag::new(schema.clone());
        for (name, value) in &result.value {
            if name == "id" || !schema.get_argument(name).is_some_and(|arg| !arg.is_input()) {
                continue;
            }
            let wanted = projection.map_or(all_outputs, |names| names.contains(name));
            if wanted {
                bag.set(name.clone(), value.clone());
            }
        }
        (!bag.is_empty()).then_some(bag)
    }

    fn display_result(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        let proposal = ctx
            .results()
            .and_then(|results| results.first())
            .and_then(|top| self.describe_result(ctx, top, true))
            .and_then(|info| make_display_result(ctx, &info));
        match check_display_result(ctx, proposal) {
            Some(rec) => make_display_result_reply(ctx, rec),
            None => self.generic_display(ctx),
        }
    }

    fn generic_display(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        let num_results = ctx.results().map_or(0, <[_]>::len);
        let state = make_simple_state(&ctx.state, "sys_display_result", Vec::new());
        make_agent_reply(ctx, state, None, None, ReplyOptions::with_num_results(num_results))
    }

    fn recommend_top(&self, ctx: &ContextInfo) -> Result<Option<AgentReply>> {
        let Some(top) = ctx.results().and_then(|results| results.first()) else {
            return Ok(None);
        };
        let Some(id) = top.id() else {
            return Ok(None);
        };
        let info = self.describe_result(ctx, top, false);
        let rec = make_recommendation(ctx, id).and_then(|rec| check_recommendation(ctx, rec, info.as_ref()));
        rec.map(|rec| make_recommendation_reply(ctx, rec)).transpose()
    }

    /// Too many results: ask about a field the search does not constrain yet.
    fn narrow_search(&self, ctx: &ContextInfo) -> Result<Option<AgentReply>> {
        let Some(schema) = &ctx.current_table_function else {
            return Ok(None);
        };
        for arg in schema.iterate_arguments() {
            if arg.is_input() || arg.unique || !arg.filterable || !matches!(arg.ty, Type::Enum(_)) {
                continue;
            }
            let Some(question) = ParamSlot::new(schema, &arg.name) else {
                continue;
            };
            if let Some(reply) = make_search_question(ctx, &[question])? {
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }

    fn propose_results(&self, ctx: &ContextInfo) -> Result<AgentReply> {
        let results = ctx.results().unwrap_or_default();
        if results.len() == 1 {
            if let Some(reply) = self.recommend_top(ctx)? {
                return Ok(reply);
            }
        }
        let shown = results.len().min(self.config.max_list_length);
        if shown > 1 {
            if let Some(proposal) = check_list_proposal(ctx, &results[..shown], None, false) {
                return make_list_proposal_reply(ctx, proposal);
            }
        }
        self.generic_display(ctx)
    }

    /// Render the reply into text: library utterances for its tag, then
    /// the phrases of the function it talks about, then built-in phrases.
    pub fn render(&mut self, reply: &AgentReply) -> Result<String> {
        let mut values: BTreeMap<String, String> = reply.values();
        let invocation = reply.context.current().and_then(get_invocation);
        if let Some(invocation) = invocation {
            for param in &invocation.in_params {
                if param.value.is_constant() {
                    values
                        .entry(param.name.clone())
                        .or_insert_with(|| param.value.to_display_string());
                }
            }
        }

        let library = self.library.clone();
        let phrases = library.phrases();
        for (name, value) in &phrases.variables {
            values.entry(name.clone()).or_insert_with(|| value.clone());
        }
        let mut candidates: Vec<String> = phrases.utterances(reply.main_tag()).to_vec();
        if candidates.is_empty() {
            if let Some(function) = invocation.and_then(|inv| phrases.function(&inv.qualified_name())) {
                let act = reply.state.dialogue_act.as_str();
                candidates = match act {
                    "sys_action_error" => match reply.context.error() {
                        Some(Value::Enum(code)) => function.error.get(code).cloned().unwrap_or_default(),
                        _ => Vec::new(),
                    },
                    "sys_empty_search" => function.empty.clone(),
                    "sys_recommend_one" | "sys_action_success" => function.result.top.clone(),
                    _ if act.starts_with("sys_recommend_") => function.result.list.clone(),
                    _ => Vec::new(),
                };
            }
        }

        let mut rendered = self.render_candidates(&candidates, &values)?;
        if rendered.is_empty() {
            let defaults: Vec<String> = default_utterances(&reply.state.dialogue_act)
                .iter()
                .map(|s| s.to_string())
                .collect();
            rendered = self.render_candidates(&defaults, &values)?;
        }
        let text = match (&mut self.rng, rendered.len()) {
            (_, 0) => String::new(),
            (Some(rng), n) => rendered.swap_remove(rng.gen_range(0..n)),
            (None, _) => rendered.swap_remove(0),
        };
        Ok(expand_choices(&text, self.rng.as_mut()))
    }

    /// Every candidate whose placeholders all have values, or just the
    /// first one when there is no rng to choose with.
    fn render_candidates(&self, candidates: &[String], values: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let mut rendered = Vec::new();
        for candidate in candidates {
            if let Some(text) = self.renderer.render(candidate, values)? {
                rendered.push(text);
                if self.rng.is_none() {
                    break;
                }
            }
        }
        Ok(rendered)
    }

    async fn send(&mut self, interface: &dyn DialogueInterface, reply: &AgentReply) -> Result<()> {
        let utterance = self.render(reply)?;
        debug!(
            session = %self.session_id,
            act = %reply.state.dialogue_act,
            end = reply.end,
            utterance = %utterance,
            "sending reply"
        );
        interface.send_reply(&utterance, reply).await
    }

    async fn close(&mut self, interface: &dyn DialogueInterface, agent_state: Option<&DialogueState>) -> Result<()> {
        let ctx = ContextInfo::get_or_initial(agent_state)?;
        let reply = self.simple_reply(&ctx, "sys_end", ReplyOptions::ending(true))?;
        self.send(interface, &reply).await?;
        info!(session = %self.session_id, "dialogue closed");
        Ok(())
    }

    async fn unexpected(&mut self, interface: &dyn DialogueInterface, agent_state: Option<&DialogueState>) -> Result<()> {
        let ctx = ContextInfo::get_or_initial(agent_state)?;
        let reply = self.simple_reply(&ctx, "sys_unexpected", ReplyOptions::ending(false))?;
        self.send(interface, &reply).await
    }
}

/// Run one session with `config`, starting as `start_mode` says.
pub async fn policy(
    interface: &dyn DialogueInterface,
    library: Arc<Thingpedia>,
    start_mode: StartMode,
    config: PolicyConfig,
) -> Result<Option<DialogueState>> {
    let config = PolicyConfig { start_mode, ..config };
    DialoguePolicy::new(library, config)?.run(interface).await
}

/// Whether an agent state waits for a yes or no.
pub fn expects_confirmation(state: &DialogueState) -> bool {
    state.dialogue_act == "sys_confirm_action"
        || state
            .history
            .iter()
            .any(|item| item.confirm == ConfirmationState::Proposed && !item.is_executed())
}
