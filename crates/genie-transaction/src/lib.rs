//! Transaction dialogue policy for Genie

pub mod ast_manip;
pub mod cache;
pub mod config;
pub mod context_info;
pub mod context_phrases;
pub mod context_tags;
pub mod dialogue_acts;
pub mod interface;
pub mod interpret;
pub mod library;
pub mod policy;
pub mod reply;
pub mod result_info;
pub mod simulator;
pub mod slot_bag;
pub mod state_manip;
pub mod verification;

#[cfg(test)]
mod test_util;

pub use cache::{ContextCache, DEFAULT_CACHE_CAPACITY};
pub use config::{DiagnosticsConfig, DiagnosticsKind, PhrasesConfig, PolicyConfig, StartMode};
pub use context_info::{ContextInfo, POLICY_NAME};
pub use context_phrases::{ContextPhrase, get_context_phrases_for_state};
pub use context_tags::{get_context_phrases_common, tag_context_for_agent};
pub use interface::{DialogueInterface, UserCommand};
pub use interpret::{get_follow_up, initial_state, interpret_answer, notification, notify_error};
pub use library::{FollowUp, FollowUpCondition, Thingpedia};
pub use policy::{DialoguePolicy, UNEXPECTED_UTTERANCE, expects_confirmation, policy};
pub use reply::{AgentReply, ReplyOptions, make_agent_reply};
pub use result_info::{ArgMinMax, NextStatementInfo, ResultInfo};
pub use simulator::{FixtureDb, ScriptStep, ScriptedInterface, SentReply, SimulatedExecutor, load_script};
pub use slot_bag::{AgentAux, ListProposal, Recommendation, SlotBag};
pub use state_manip::{
    TargetConfirm, accept_all_proposed_statements, add_new_statement, make_simple_state, make_target_state,
};
pub use verification::Verifier;
