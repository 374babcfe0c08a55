//! The seam between the policy and the user, executor and output channel

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use genie_core::Result;
use genie_thingtalk::{DialogueState, ExpressionStatement, ResultList, Value};

use crate::reply::AgentReply;

/// One user turn, as understood by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserCommand {
    /// A fully interpreted user state.
    State(DialogueState),
    /// A new request; the policy decides how it joins the dialogue.
    Request(ExpressionStatement),
    /// A bare answer to the last agent question (a button, yes or no).
    Answer(Value),
    /// A dialogue act with no parameters (`cancel`, `end`, `learn_more`).
    Act(String),
    /// The user left.
    Cancel,
}

#[async_trait]
pub trait DialogueInterface: Send + Sync {
    /// The next user turn. `state` is the last agent state, `None` before the
    /// agent has spoken.
    async fn get_command(&self, state: Option<&DialogueState>) -> Result<UserCommand>;

    /// Run whatever `state` allows to run and return it with results attached.
    /// `last_result` holds the results of the previous current statement.
    async fn execute(&self, state: DialogueState, last_result: Option<&ResultList>) -> Result<DialogueState>;

    async fn send_reply(&self, utterance: &str, reply: &AgentReply) -> Result<()>;
}
