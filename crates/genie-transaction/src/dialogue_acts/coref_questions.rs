//! Questions about results the agent just described ("what's its rating?")

use std::sync::Arc;

use genie_thingtalk::{
    BooleanExpression, ConfirmationState, DialogueState, Expression, ExpressionStatement, FunctionDef, Invocation,
    LevenshteinDelta, Value,
};

use crate::ast_manip::is_same_function;
use crate::context_info::ContextInfo;
use crate::dialogue_acts::common::{FilterSlot, ParamSlot, question_names};
use crate::dialogue_acts::refinement::{query_refinement, refine_filter_to_answer_question};
use crate::slot_bag::{AgentAux, SlotBag};
use crate::state_manip::{add_query, attach_levenshtein};

/// Each question asks for an output of the current function, and the
/// function has more than one output to choose from.
pub fn are_questions_valid_for_context(ctx: &ContextInfo, questions: &[ParamSlot]) -> bool {
    if ctx.result_info.as_ref().is_none_or(|info| info.is_aggregation) {
        return false;
    }
    let Some(schema) = &ctx.current_function else {
        return false;
    };
    let (_, outputs) = schema.count_input_output();
    if outputs <= 1 {
        return false;
    }
    questions.iter().all(|q| {
        schema
            .get_argument(&q.name)
            .is_some_and(|arg| !arg.is_input() && arg.ty == q.ty)
    })
}

/// The questions must not ask what the agent already said.
fn check_questions_against_info(info: Option<&SlotBag>, questions: &[ParamSlot]) -> bool {
    let Some(info) = info else {
        return true;
    };
    questions.iter().all(|q| {
        !info.has(&q.name) && info.schema.get_argument(&q.name).is_some_and(|arg| arg.ty == q.ty)
    })
}

fn answer_question(ctx: &ContextInfo, id: Option<&Value>, questions: &[ParamSlot]) -> Option<DialogueState> {
    let current = ctx.current()?;
    let schema = ctx.current_table_function.clone().or_else(|| ctx.current_function.clone())?;
    let names = question_names(questions);

    let (new_stmt, delta) = match id {
        Some(id) => {
            let filter = BooleanExpression::atom("id", "==", id.clone());
            let new_stmt = query_refinement(
                &current.statement,
                Some((&filter, refine_filter_to_answer_question)),
                Some(&names),
            )?;
            (new_stmt, question_delta(&schema, Some(filter), names))
        }
        None => {
            let new_stmt = query_refinement(&current.statement, None, Some(&names))?;
            (new_stmt, question_delta(&schema, None, names))
        }
    };
    let state = add_query(ctx, "execute", new_stmt, ConfirmationState::Accepted);
    Some(attach_levenshtein(state, delta))
}

fn question_delta(schema: &Arc<FunctionDef>, filter: Option<BooleanExpression>, names: Vec<String>) -> LevenshteinDelta {
    let base: Expression = Invocation::new(schema.clone()).into();
    let base = match filter {
        Some(filter) => Expression::filter(base, filter),
        None => base,
    };
    LevenshteinDelta::continuing(ExpressionStatement::single(Expression::projection(base, names)))
}

/// "What's the phone number?" after a recommendation.
pub fn recommendation_search_question_reply(ctx: &ContextInfo, questions: &[ParamSlot]) -> Option<DialogueState> {
    let rec = ctx.aux.as_ref().and_then(AgentAux::as_recommendation)?;
    if !check_questions_against_info(rec.info.as_ref(), questions) || !are_questions_valid_for_context(ctx, questions)
    {
        return None;
    }
    answer_question(ctx, Some(rec.top_result.id()?), questions)
}

/// A question after the user asked to learn more about the top result.
pub fn learn_more_search_question_reply(ctx: &ContextInfo, questions: &[ParamSlot]) -> Option<DialogueState> {
    let top = ctx.results()?.first()?;
    if !are_questions_valid_for_context(ctx, questions) {
        return None;
    }
    answer_question(ctx, Some(top.id()?), questions)
}

/// A question about the result of a non-list query.
pub fn display_result_search_question_reply(ctx: &ContextInfo, questions: &[ParamSlot]) -> Option<DialogueState> {
    if !are_questions_valid_for_context(ctx, questions) {
        return None;
    }
    answer_question(ctx, None, questions)
}

/// A question about one of the proposed results, or about all of them.
pub fn list_proposal_search_question_reply(
    ctx: &ContextInfo,
    name: Option<&Value>,
    questions: &[ParamSlot],
) -> Option<DialogueState> {
    let proposal = ctx.aux.as_ref().and_then(AgentAux::as_list_proposal)?;
    if let Some(name) = name {
        if !proposal.results.iter().any(|r| r.id() == Some(name)) {
            return None;
        }
    }
    if !check_questions_against_info(proposal.info.as_ref(), questions) || !are_questions_valid_for_context(ctx, questions)
    {
        return None;
    }
    answer_question(ctx, name, questions)
}

/// "Is it cheap?": the answer is the projection of the filtered fields on
/// the result being discussed.
pub fn boolean_question(ctx: &ContextInfo, filter: &FilterSlot) -> Option<DialogueState> {
    let schema = ctx.current_function.as_ref()?;
    if !is_same_function(schema, &filter.schema) {
        return None;
    }
    let id = match ctx.aux.as_ref().and_then(AgentAux::as_recommendation) {
        Some(rec) => rec.top_result.id()?.clone(),
        None => match ctx.results()? {
            [single] => single.id()?.clone(),
            _ => return None,
        },
    };

    let questions: Vec<ParamSlot> = filter
        .ast
        .param_names()
        .iter()
        .map(|name| ParamSlot::new(schema, name))
        .collect::<Option<_>>()?;
    if questions.is_empty() || !are_questions_valid_for_context(ctx, &questions) {
        return None;
    }
    answer_question(ctx, Some(&id), &questions)
}

/// Resolve "there" or "that day" against the first result of the previous
/// domain, when it belongs to the same device as `base`.
pub fn coref_constant(ctx: &ContextInfo, base: &Expression, param: &str) -> Option<Value> {
    let previous = ctx.previous_domain()?;
    let result = previous.results.as_ref()?.results.first()?;
    let schema = match previous.statement.last_query() {
        Some(table) => table.schema().clone(),
        None => previous.statement.first()?.schema().clone(),
    };
    if schema.class_name != base.schema().class_name {
        return None;
    }
    result.get(param).filter(|value| !value.is_undefined()).cloned()
}
