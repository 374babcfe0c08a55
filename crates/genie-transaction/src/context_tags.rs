//! Context tags: which kind of agent turn a context calls for

use genie_core::{GenieError, Result};

use crate::context_info::ContextInfo;
use crate::state_manip::is_user_asking_result_question;

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Tags for the agent turn that follows the user act of `ctx`.
///
/// Fails with [`GenieError::UnexpectedCommand`] for user acts the policy
/// does not handle.
pub fn tag_context_for_agent(ctx: &ContextInfo) -> Result<Vec<String>> {
    let act = ctx.state.dialogue_act.as_str();
    match act {
        "end" => return Ok(tags(&["ctx_end"])),
        "greet" => return Ok(tags(&["ctx_greet"])),
        "reinit" => return Ok(tags(&["ctx_reinit"])),
        "cancel" => return Ok(tags(&["ctx_cancel"])),
        "action_question" => return Ok(tags(&["ctx_completed_action_success"])),
        "learn_more" => return Ok(tags(&["ctx_learn_more"])),
        "notification" | "execute" | "ask_recommend" => {}
        other => return Err(GenieError::UnexpectedCommand(other.to_string())),
    }

    let Some(info) = ctx.result_info.as_ref() else {
        // nothing executed yet; only a pending statement can be tagged
        return Ok(match &ctx.next_info {
            Some(next) if next.is_complete => tags(&["ctx_confirm_action"]),
            Some(_) => tags(&["ctx_incomplete_action_after_search"]),
            None => return Err(GenieError::UnexpectedCommand(act.to_string())),
        });
    };

    if act == "notification" {
        return Ok(if info.has_error {
            tags(&["ctx_notification_error"])
        } else if !info.is_table {
            tags(&["ctx_action_notification"])
        } else if info.is_list {
            tags(&["ctx_list_notification"])
        } else {
            tags(&["ctx_nonlist_notification"])
        });
    }

    if let Some(next) = &ctx.next_info {
        if next.chain_parameter.is_none() || next.chain_parameter_filled {
            return Ok(if next.is_complete {
                tags(&["ctx_confirm_action"])
            } else {
                tags(&["ctx_incomplete_action_after_search"])
            });
        }
    }

    if info.has_error {
        return Ok(tags(&["ctx_completed_action_error"]));
    }
    if info.has_stream {
        return Ok(tags(&["ctx_rule_enable_success"]));
    }
    if !info.is_table {
        let should_have_result = ctx.current_function.as_ref().is_some_and(|f| f.has_outputs());
        return Ok(if info.has_empty_result && should_have_result {
            tags(&["ctx_empty_search_command"])
        } else {
            tags(&["ctx_completed_action_success"])
        });
    }
    if info.has_empty_result {
        return Ok(tags(&["ctx_empty_search_command"]));
    }
    if !info.is_list {
        return Ok(tags(&["ctx_display_nonlist_result"]));
    }

    if info.is_question {
        if info.is_aggregation {
            return Ok(tags(&["ctx_aggregation_question"]));
        }
        if info.arg_min_max.is_some() || info.has_single_result {
            return Ok(tags(&["ctx_single_result_search_command", "ctx_complete_search_command"]));
        }
        if info.has_large_result {
            return Ok(tags(&["ctx_search_command", "ctx_complete_search_command"]));
        }
        return Ok(tags(&["ctx_complete_search_command"]));
    }

    if info.has_single_result {
        Ok(tags(&["ctx_single_result_search_command", "ctx_complete_search_command"]))
    } else if info.has_large_result && act != "ask_recommend" {
        Ok(tags(&["ctx_search_command", "ctx_complete_search_command"]))
    } else {
        Ok(tags(&["ctx_complete_search_command"]))
    }
}

fn can_have_related_question(ctx: &ContextInfo) -> bool {
    let Some(current) = ctx.current() else {
        return false;
    };
    current.statement.stream().is_none()
        && current.statement.last_query().is_some()
        && ctx.current_function.as_ref().is_some_and(|f| !f.related.is_empty())
}

/// Append the tags describing what the context contains.
pub fn get_context_phrases_common(ctx: &ContextInfo, tags: &mut Vec<String>) {
    let act = ctx.state.dialogue_act.as_str();
    if act == "notification" {
        tags.push("ctx_with_notification".to_string());
    }
    if act == "init" {
        tags.push("ctx_init".to_string());
    }
    if ctx.is_multi_domain() {
        tags.push("ctx_multidomain".to_string());
    }

    if let Some(next) = &ctx.next_info {
        tags.push("ctx_with_action".to_string());
        if !next.is_complete {
            tags.push("ctx_incomplete_action".to_string());
        }
    } else if ctx.result_info.as_ref().is_some_and(|r| r.is_table) {
        tags.push("ctx_without_action".to_string());
    }

    let Some(info) = ctx.result_info.as_ref() else {
        return;
    };
    if info.has_error {
        tags.push("ctx_with_error".to_string());
        return;
    }
    if info.has_empty_result || (info.has_stream && act != "notification") {
        return;
    }

    tags.push("ctx_with_result".to_string());
    if info.is_table && !info.is_aggregation {
        tags.push("ctx_with_table_result".to_string());
    } else if info.is_aggregation {
        tags.push("ctx_with_aggregation_result".to_string());
    }
    if can_have_related_question(ctx) {
        tags.push("ctx_for_related_question".to_string());
    }

    if is_user_asking_result_question(ctx) {
        tags.push("ctx_with_result_question".to_string());
    } else {
        if info.arg_min_max.is_some() {
            tags.push("ctx_with_result_argminmax".to_string());
        } else {
            tags.push("ctx_with_result_noquestion".to_string());
        }
        if ctx.next_info.is_some() {
            tags.push("ctx_with_result_and_action".to_string());
        }
        if info.projection.is_none() {
            tags.push("ctx_without_projection".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use genie_thingtalk::{
        BooleanExpression, ConfirmationState, DialogueHistoryItem, Expression, ResultList, SortDirection, Value,
    };

    fn tags_for(state: &genie_thingtalk::DialogueState) -> Vec<String> {
        tag_context_for_agent(&ContextInfo::get(state).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_acts() {
        assert_eq!(tags_for(&make_state("greet", vec![])), vec!["ctx_greet"]);
        assert_eq!(tags_for(&make_state("end", vec![])), vec!["ctx_end"]);
        let err = tag_context_for_agent(&ContextInfo::get(&make_state("bogus", vec![])).unwrap()).unwrap_err();
        assert!(matches!(err, GenieError::UnexpectedCommand(act) if act == "bogus"));
    }

    #[test]
    fn test_search_result_tags() {
        let single = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        assert_eq!(
            tags_for(&single),
            vec!["ctx_single_result_search_command", "ctx_complete_search_command"]
        );

        let many = search_state(
            (0..3).map(|i| restaurant_result(&format!("r{i}"), "cheap", 4.0)).collect(),
        );
        assert_eq!(tags_for(&many), vec!["ctx_complete_search_command"]);

        let empty = search_state(vec![]);
        assert_eq!(tags_for(&empty), vec!["ctx_empty_search_command"]);
    }

    #[test]
    fn test_large_result_tags() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0), restaurant_result("r2", "cheap", 3.0)]);
        state.history[0].results.as_mut().unwrap().more = true;
        assert_eq!(tags_for(&state), vec!["ctx_search_command", "ctx_complete_search_command"]);
        state.dialogue_act = "ask_recommend".to_string();
        assert_eq!(tags_for(&state), vec!["ctx_complete_search_command"]);
    }

    #[test]
    fn test_argminmax_question_tags() {
        let table = Expression::index(
            Expression::sort(restaurants(), Value::var_ref("rating"), SortDirection::Desc),
            vec![Value::Number(1.0)],
        );
        let state = search_state_for(table, vec![restaurant_result("r1", "cheap", 5.0)]);
        assert_eq!(
            tags_for(&state),
            vec!["ctx_single_result_search_command", "ctx_complete_search_command"]
        );
    }

    #[test]
    fn test_pending_action_tags() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        state.history.push(DialogueHistoryItem::new(
            statement(complete_reservation("r1")),
            ConfirmationState::Accepted,
        ));
        assert_eq!(tags_for(&state), vec!["ctx_confirm_action"]);

        state.history[1] = DialogueHistoryItem::new(statement(reservation_invocation()), ConfirmationState::Accepted);
        // the chain parameter is still missing, so the search results come first
        assert_eq!(
            tags_for(&state),
            vec!["ctx_single_result_search_command", "ctx_complete_search_command"]
        );
    }

    #[test]
    fn test_action_result_tags() {
        let action = DialogueHistoryItem::new(statement(complete_reservation("r1")), ConfirmationState::Confirmed)
            .with_results(ResultList::with_error(Value::enumerated("no_table")));
        assert_eq!(tags_for(&make_state("execute", vec![action.clone()])), vec!["ctx_completed_action_error"]);

        let done = DialogueHistoryItem { results: Some(ResultList::empty()), ..action };
        assert_eq!(tags_for(&make_state("execute", vec![done])), vec!["ctx_empty_search_command"]);
    }

    #[test]
    fn test_common_tags_for_search() {
        let ctx = ContextInfo::get(&search_state(vec![restaurant_result("r1", "cheap", 4.0)])).unwrap();
        let mut tags = Vec::new();
        get_context_phrases_common(&ctx, &mut tags);
        assert_eq!(
            tags,
            vec![
                "ctx_without_action",
                "ctx_with_result",
                "ctx_with_table_result",
                "ctx_for_related_question",
                "ctx_with_result_noquestion",
                "ctx_without_projection",
            ]
        );
    }

    #[test]
    fn test_common_tags_for_error_and_id_lookup() {
        let table = Expression::filter(
            restaurants(),
            BooleanExpression::atom("id", "==", restaurant_entity("r1")),
        );
        let ctx = ContextInfo::get(&search_state_for(table, vec![restaurant_result("r1", "cheap", 4.0)])).unwrap();
        let mut tags = Vec::new();
        get_context_phrases_common(&ctx, &mut tags);
        assert!(tags.contains(&"ctx_with_result_question".to_string()));

        let failed = DialogueHistoryItem::new(statement(complete_reservation("r1")), ConfirmationState::Confirmed)
            .with_results(ResultList::with_error(Value::enumerated("no_table")));
        let ctx = ContextInfo::get(&make_state("execute", vec![failed])).unwrap();
        let mut tags = Vec::new();
        get_context_phrases_common(&ctx, &mut tags);
        assert_eq!(tags, vec!["ctx_with_error"]);
    }
}
