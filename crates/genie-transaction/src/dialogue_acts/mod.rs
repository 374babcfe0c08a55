//! Dialogue-act handlers.
//!
//! Each handler is a pure function from a [`ContextInfo`](crate::context_info::ContextInfo)
//! and the pieces of an utterance to a new dialogue state or agent reply.
//! `None` means the handler does not apply to this context.

pub mod action_confirm;
pub mod action_results;
pub mod aggregation;
pub mod common;
pub mod coref_questions;
pub mod initial_request;
pub mod list_proposal;
pub mod recommendation;
pub mod refinement;
pub mod search_questions;
pub mod slot_fill;

pub use action_confirm::{action_confirm_accept, action_confirm_reject, make_action_confirmation_phrase};
pub use action_results::{
    ErrorMessage, action_error_change_param, action_error_retry, action_success_question,
    check_action_error_message, check_thingpedia_error_message, make_action_error_phrase,
    make_complete_action_success_phrase, make_generic_action_success_phrase,
    make_thingpedia_action_success_phrase,
};
pub use aggregation::{aggregation_question, make_aggregation_answer};
pub use common::{FilterSlot, InputParamSlot, ParamSlot};
pub use initial_request::{add_initial_dont_care, initial_request, start_new_request};
pub use list_proposal::{DirectAnswer, make_list_proposal_reply};
pub use recommendation::{make_display_result_reply, make_recommendation_reply};
pub use search_questions::{SearchAnswer, imprecise_search_question_answer, make_search_question};
pub use slot_fill::{SlotAnswer, imprecise_slot_fill_answer, make_slot_fill_question};
