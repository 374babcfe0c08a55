//! Genie transaction dialogue policy

pub mod error {
    pub use genie_core::{GenieError, Result};
}

pub mod diagnostics {
    pub use genie_core::{DiagnosticsSink, FileSink, LevenshteinReport, MemorySink, NullSink, TracingSink};
    pub use genie_transaction::Verifier;
}

pub mod thingtalk {
    pub use genie_thingtalk::*;
}

pub mod phrases {
    pub use genie_templates::{FunctionPhrases, PhraseLibrary, PhraseLoader, PhraseRenderer, ResultPhrases};
}

pub mod policy {
    pub use genie_transaction::{
        AgentReply, ContextCache, ContextInfo, ContextPhrase, DialogueInterface, DialoguePolicy, POLICY_NAME, ReplyOptions,
        UNEXPECTED_UTTERANCE, UserCommand, expects_confirmation, get_context_phrases_for_state, get_follow_up,
        initial_state, interpret_answer, make_agent_reply, notification, notify_error, policy,
        tag_context_for_agent,
    };
    pub use genie_transaction::dialogue_acts;
    pub use genie_transaction::state_manip;
}

pub mod config {
    pub use genie_transaction::{DiagnosticsConfig, DiagnosticsKind, PhrasesConfig, PolicyConfig, StartMode};
}

pub mod library {
    pub use genie_transaction::{FollowUp, FollowUpCondition, Thingpedia};
}

pub mod simulator {
    pub use genie_transaction::{FixtureDb, ScriptStep, ScriptedInterface, SentReply, SimulatedExecutor, load_script};
}

pub use genie_core::{GenieError, Result};
pub use genie_transaction::{DialoguePolicy, PolicyConfig, StartMode, Thingpedia, UserCommand};
