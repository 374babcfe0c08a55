//! Constructors of new dialogue states from a context plus a change

use std::collections::BTreeMap;
use std::sync::Arc;

use genie_thingtalk::{
    ActParam, BooleanExpression, ConfirmationState, DeviceSelector, DialogueHistoryItem,
    DialogueState, Expression, ExpressionStatement, Invocation, LevenshteinDelta, Value,
};

use crate::ast_manip::{adjust_default_parameters, find_filter_expression, get_invocation, is_same_function};
use crate::context_info::{ContextInfo, POLICY_NAME};
use crate::result_info::ResultInfo;

/// How new items enter the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetConfirm {
    /// Replace every pending item with the new ones.
    Accepted,
    /// Insert a query before the pending items, dropping proposals.
    AcceptedQuery,
    /// Keep pending items up to the first proposal, then the new ones.
    Proposed,
    /// Like `AcceptedQuery`, with the query only proposed.
    ProposedQuery,
    Confirmed,
}

impl TargetConfirm {
    pub fn confirmation(self) -> ConfirmationState {
        match self {
            TargetConfirm::Accepted | TargetConfirm::AcceptedQuery => ConfirmationState::Accepted,
            TargetConfirm::Proposed | TargetConfirm::ProposedQuery => ConfirmationState::Proposed,
            TargetConfirm::Confirmed => ConfirmationState::Confirmed,
        }
    }
}

impl From<ConfirmationState> for TargetConfirm {
    fn from(confirm: ConfirmationState) -> Self {
        match confirm {
            ConfirmationState::Proposed => TargetConfirm::Proposed,
            ConfirmationState::Accepted => TargetConfirm::Accepted,
            ConfirmationState::Confirmed => TargetConfirm::Confirmed,
        }
    }
}

fn act_params(params: Vec<ActParam>) -> Option<Vec<ActParam>> {
    if params.is_empty() { None } else { Some(params) }
}

fn current_index(state: &DialogueState) -> Option<usize> {
    state.history.iter().rposition(DialogueHistoryItem::is_executed)
}

/// A state that only changes the dialogue act. History is kept up to the
/// first proposed item.
pub fn make_simple_state(state: &DialogueState, dialogue_act: &str, params: Vec<ActParam>) -> DialogueState {
    let history = state
        .history
        .iter()
        .take_while(|item| item.confirm != ConfirmationState::Proposed)
        .cloned()
        .collect();
    DialogueState::new(POLICY_NAME, dialogue_act, act_params(params)).with_history(history)
}

fn for_each_selector(expr: &Expression, f: &mut dyn FnMut(&DeviceSelector)) {
    match expr {
        Expression::Invocation(inv) => f(&inv.selector),
        Expression::Join(j) => {
            for_each_selector(&j.lhs, f);
            for_each_selector(&j.rhs, f);
        }
        Expression::Filter(filter) => {
            for_each_selector(&filter.expression, f);
            filter.filter.visit(&mut |node| {
                if let BooleanExpression::External(ext) = node {
                    f(&ext.selector);
                }
                true
            });
        }
        other => {
            if let Some(inner) = other.inner() {
                for_each_selector(inner, f);
            }
        }
    }
}

fn for_each_selector_mut(expr: &mut Expression, f: &mut dyn FnMut(&mut DeviceSelector)) {
    match expr {
        Expression::Invocation(inv) => f(&mut inv.selector),
        Expression::Join(j) => {
            for_each_selector_mut(&mut j.lhs, f);
            for_each_selector_mut(&mut j.rhs, f);
        }
        Expression::Filter(filter) => {
            for_each_selector_mut(&mut filter.expression, f);
            external_selectors_mut(&mut filter.filter, f);
        }
        other => {
            if let Some(inner) = other.inner_mut() {
                for_each_selector_mut(inner, f);
            }
        }
    }
}

fn external_selectors_mut(filter: &mut BooleanExpression, f: &mut dyn FnMut(&mut DeviceSelector)) {
    match filter {
        BooleanExpression::External(ext) => {
            f(&mut ext.selector);
            external_selectors_mut(&mut ext.filter, f);
        }
        BooleanExpression::And { operands } | BooleanExpression::Or { operands } => {
            for operand in operands {
                external_selectors_mut(operand, f);
            }
        }
        BooleanExpression::Not { expr } => external_selectors_mut(expr, f),
        BooleanExpression::Existential { subquery } => for_each_selector_mut(subquery, f),
        _ => {}
    }
}

/// Copy device ids chosen in the current and later items onto the
/// selectors of new items that do not name a device yet.
pub fn propagate_device_ids(
    state: &DialogueState,
    current_idx: Option<usize>,
    items: Vec<DialogueHistoryItem>,
) -> Vec<DialogueHistoryItem> {
    let mut collection: BTreeMap<String, Option<String>> = BTreeMap::new();
    let start = current_idx.unwrap_or(0);
    for item in state.history.iter().skip(start) {
        for expr in &item.statement.expressions {
            for_each_selector(expr, &mut |selector| {
                if selector.all {
                    collection.insert(selector.kind.clone(), None);
                } else if let Some(id) = &selector.id {
                    collection.insert(selector.kind.clone(), Some(id.clone()));
                }
            });
        }
    }
    if collection.is_empty() {
        return items;
    }

    items
        .into_iter()
        .map(|mut item| {
            let stmt = Arc::make_mut(&mut item.statement);
            for expr in stmt.expressions.iter_mut() {
                for_each_selector_mut(expr, &mut |selector| {
                    if !selector.attributes.is_empty() || selector.all || selector.id.is_some() {
                        return;
                    }
                    match collection.get(&selector.kind) {
                        Some(None) => selector.all = true,
                        Some(Some(id)) => selector.id = Some(id.clone()),
                        None => {}
                    }
                });
            }
            item
        })
        .collect()
}

/// Add new items to the history.
///
/// Executed items are always kept so the new state still has a current
/// result. Pending items are kept or dropped depending on `confirm`.
pub fn make_target_state(
    state: &DialogueState,
    dialogue_act: &str,
    params: Vec<ActParam>,
    confirm: TargetConfirm,
    items: Vec<DialogueHistoryItem>,
) -> DialogueState {
    let current_idx = current_index(state);
    let items: Vec<DialogueHistoryItem> = propagate_device_ids(state, current_idx, items)
        .into_iter()
        .map(|mut item| {
            adjust_default_parameters(Arc::make_mut(&mut item.statement));
            item.results = None;
            item.confirm = confirm.confirmation();
            item
        })
        .collect();

    let executed = current_idx.map_or(0, |idx| idx + 1);
    let mut history: Vec<DialogueHistoryItem> = state.history[..executed].to_vec();
    match confirm {
        TargetConfirm::Proposed => {
            history.extend(
                state.history[executed..]
                    .iter()
                    .take_while(|item| item.confirm != ConfirmationState::Proposed)
                    .cloned(),
            );
            history.extend(items);
        }
        TargetConfirm::AcceptedQuery | TargetConfirm::ProposedQuery => {
            history.extend(items);
            history.extend(
                state.history[executed..]
                    .iter()
                    .filter(|item| item.confirm != ConfirmationState::Proposed)
                    .cloned(),
            );
        }
        TargetConfirm::Accepted | TargetConfirm::Confirmed => history.extend(items),
    }

    DialogueState::new(POLICY_NAME, dialogue_act, act_params(params)).with_history(history)
}

pub fn add_new_statement(
    state: &DialogueState,
    dialogue_act: &str,
    params: Vec<ActParam>,
    confirm: ConfirmationState,
    expressions: Vec<Expression>,
) -> DialogueState {
    let items = expressions
        .into_iter()
        .map(|expr| DialogueHistoryItem::new(ExpressionStatement::single(expr), confirm))
        .collect();
    make_target_state(state, dialogue_act, params, confirm.into(), items)
}

fn action_item(action: Invocation, confirm: ConfirmationState) -> DialogueHistoryItem {
    DialogueHistoryItem::new(ExpressionStatement::single(action.into()), confirm)
}

/// Set one parameter of an action, reusing the pending action when it is
/// the same function.
pub fn add_action_param(
    ctx: &ContextInfo,
    dialogue_act: &str,
    action: &Invocation,
    pname: &str,
    value: Value,
    confirm: ConfirmationState,
) -> DialogueState {
    let reused = ctx.next().and_then(|next| {
        let invocation = get_invocation(next)?;
        if !is_same_function(&invocation.schema, &action.schema) {
            return None;
        }
        let mut item = next.clone();
        let stmt = Arc::make_mut(&mut item.statement);
        let invocation = stmt.last_mut()?.invocation_mut()?;
        invocation.set_param(pname, value.clone());
        invocation.merge_params(&action.in_params);
        item.confirm = confirm;
        item.levenshtein = None;
        Some(item)
    });

    let item = reused.unwrap_or_else(|| {
        let mut invocation = Invocation {
            in_params: Vec::new(),
            ..action.clone()
        };
        invocation.set_param(pname, value);
        for param in &action.in_params {
            if param.name != pname && !param.value.is_undefined() {
                invocation.set_param(param.name.clone(), param.value.clone());
            }
        }
        invocation.add_missing_required_params();
        action_item(invocation, confirm)
    });

    make_target_state(&ctx.state, dialogue_act, Vec::new(), confirm.into(), vec![item])
}

/// Add an action without parameters, or change the confirmation of the
/// pending one.
pub fn add_action(
    ctx: &ContextInfo,
    dialogue_act: &str,
    action: &Invocation,
    confirm: ConfirmationState,
) -> DialogueState {
    if let Some(next) = ctx.next() {
        if let Some(invocation) = get_invocation(next) {
            if is_same_function(&invocation.schema, &action.schema) {
                // proposing what the user already asked for keeps it accepted
                if confirm == ConfirmationState::Proposed || confirm == next.confirm {
                    return make_simple_state(&ctx.state, dialogue_act, Vec::new());
                }
                let item = DialogueHistoryItem {
                    statement: next.statement.clone(),
                    results: None,
                    confirm,
                    levenshtein: None,
                };
                return make_target_state(&ctx.state, dialogue_act, Vec::new(), confirm.into(), vec![item]);
            }
        }
    }

    let invocation = Invocation {
        in_params: Vec::new(),
        ..action.clone()
    };
    make_target_state(
        &ctx.state,
        dialogue_act,
        Vec::new(),
        confirm.into(),
        vec![action_item(invocation, confirm)],
    )
}

/// Add a query ahead of the pending items.
pub fn add_query(
    ctx: &ContextInfo,
    dialogue_act: &str,
    table: impl Into<ExpressionStatement>,
    confirm: ConfirmationState,
) -> DialogueState {
    let mut stmt = table.into();
    adjust_default_parameters(&mut stmt);
    let target = if confirm == ConfirmationState::Accepted {
        TargetConfirm::AcceptedQuery
    } else {
        TargetConfirm::ProposedQuery
    };
    make_target_state(
        &ctx.state,
        dialogue_act,
        Vec::new(),
        target,
        vec![DialogueHistoryItem::new(stmt, confirm)],
    )
}

/// Add a query and, after it, an action; pending items are replaced.
pub fn add_query_and_action(
    ctx: &ContextInfo,
    dialogue_act: &str,
    table: Expression,
    action: Invocation,
    confirm: ConfirmationState,
) -> DialogueState {
    let items = vec![
        DialogueHistoryItem::new(ExpressionStatement::single(table), confirm),
        action_item(action, confirm),
    ];
    make_target_state(&ctx.state, dialogue_act, Vec::new(), confirm.into(), items)
}

/// Record the edit script that produced a pending item: the first
/// unexecuted item that runs the function the delta ends with.
pub fn attach_levenshtein(mut state: DialogueState, delta: LevenshteinDelta) -> DialogueState {
    let Some(function) = delta.expression.last().map(|e| e.schema().qualified_name()) else {
        return state;
    };
    let target = state.history.iter_mut().find(|item| {
        !item.is_executed()
            && item
                .statement
                .expressions
                .iter()
                .any(|e| e.schema().qualified_name() == function)
    });
    if let Some(item) = target {
        item.levenshtein = Some(delta);
    }
    state
}

/// The user says yes to everything the agent proposed.
pub fn accept_all_proposed_statements(state: &DialogueState) -> Option<DialogueState> {
    if !state.history.iter().any(|item| item.confirm == ConfirmationState::Proposed) {
        return None;
    }
    let history = state
        .history
        .iter()
        .map(|item| {
            if item.confirm == ConfirmationState::Proposed && !item.is_executed() {
                DialogueHistoryItem {
                    confirm: ConfirmationState::Accepted,
                    ..item.clone()
                }
            } else {
                item.clone()
            }
        })
        .collect();
    Some(DialogueState::new(POLICY_NAME, "execute", None).with_history(history))
}

fn is_subset(small: &[String], big: &[String]) -> bool {
    small.iter().all(|s| big.contains(s))
}

/// Is the user asking about the current results rather than refining the
/// search?
///
/// Computations, id filters and a projection that is not a subset of the
/// previous one are questions.
pub fn is_user_asking_result_question(ctx: &ContextInfo) -> bool {
    if ctx.state.dialogue_act == "action_question" {
        return true;
    }
    let (Some(current_idx), Some(current)) = (ctx.current_idx, ctx.current()) else {
        return false;
    };
    let Some(table) = current.statement.last_query() else {
        return false;
    };
    if let Expression::Projection(p) = table {
        if !p.computations.is_empty() {
            return true;
        }
    }
    if find_filter_expression(table).is_some_and(|f| f.filter.uses_param("id")) {
        return true;
    }
    if current_idx == 0 {
        return false;
    }
    let Some(projection) = ctx.result_info.as_ref().and_then(|r| r.projection.as_ref()) else {
        return false;
    };

    let previous = &ctx.state.history[current_idx - 1];
    match ResultInfo::new(&ctx.state, previous) {
        Ok(info) => match info.projection {
            None => true,
            Some(previous_projection) => !is_subset(projection, &previous_projection),
        },
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use genie_thingtalk::ResultList;

    fn ctx_of(state: &DialogueState) -> Arc<ContextInfo> {
        ContextInfo::get(state).unwrap()
    }

    #[test]
    fn test_make_simple_state_drops_proposals() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        state.history.push(DialogueHistoryItem::new(
            statement(reservation_invocation()),
            ConfirmationState::Proposed,
        ));
        let simple = make_simple_state(&state, "sys_recommend_one", Vec::new());
        assert_eq!(simple.dialogue_act, "sys_recommend_one");
        assert_eq!(simple.history.len(), 1);
        assert!(simple.dialogue_act_param.is_none());
        assert!(Arc::ptr_eq(&simple.history[0].statement, &state.history[0].statement));
    }

    #[test]
    fn test_add_query_round_trip() {
        let state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        let ctx = ctx_of(&state);
        let cheap = BooleanExpression::atom("price", "==", Value::enumerated("cheap"));
        let table = Expression::filter(restaurants(), cheap);

        let new_state = add_query(&ctx, "execute", table, ConfirmationState::Accepted);
        assert_eq!(new_state.history.len(), 2);
        let new_ctx = ctx_of(&new_state);
        assert_eq!(new_ctx.current_idx, Some(0));
        assert_eq!(new_ctx.next_idx, Some(1));
        assert!(!new_ctx.next_info.as_ref().unwrap().is_action);

        // once executed, the query becomes the current item
        let mut executed = new_state.clone();
        executed.history[1].results = Some(ResultList::new(vec![restaurant_result("r1", "cheap", 4.0)]));
        let executed_ctx = ctx_of(&executed);
        assert_eq!(executed_ctx.current_idx, Some(1));
        assert_eq!(executed_ctx.next_idx, None);
        assert!(executed_ctx.result_info.as_ref().unwrap().is_table);
    }

    #[test]
    fn test_add_query_keeps_pending_action() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        state.history.push(DialogueHistoryItem::new(
            statement(reservation_invocation()),
            ConfirmationState::Accepted,
        ));
        let ctx = ctx_of(&state);
        let new_state = add_query(&ctx, "execute", restaurants(), ConfirmationState::Proposed);
        assert_eq!(new_state.history.len(), 3);
        assert_eq!(new_state.history[1].confirm, ConfirmationState::Proposed);
        assert!(new_state.history[2].statement.is_action());
        let new_ctx = ctx_of(&new_state);
        assert_eq!(new_ctx.next_idx, Some(2));
        assert_eq!(new_ctx.proposed_skip, 1);
    }

    #[test]
    fn test_add_action_param_new_action() {
        let state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        let ctx = ctx_of(&state);
        let action = Invocation::new(reservation_schema());
        let new_state = add_action_param(
            &ctx,
            "sys_recommend_one",
            &action,
            "restaurant",
            restaurant_entity("r1"),
            ConfirmationState::Proposed,
        );
        assert_eq!(new_state.history.len(), 2);
        let item = &new_state.history[1];
        assert_eq!(item.confirm, ConfirmationState::Proposed);
        let invocation = get_invocation(item).unwrap();
        assert_eq!(invocation.get_param("restaurant"), Some(&restaurant_entity("r1")));
        assert_eq!(invocation.get_param("book_time"), Some(&Value::Undefined));
        assert!(!item.statement.is_executable());
    }

    #[test]
    fn test_add_action_param_reuses_pending_action() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        state.history.push(DialogueHistoryItem::new(
            statement(reservation_invocation().with_param("book_people", Value::Number(4.0))),
            ConfirmationState::Accepted,
        ));
        let ctx = ctx_of(&state);
        let new_state = add_action_param(
            &ctx,
            "execute",
            &Invocation::new(reservation_schema()),
            "restaurant",
            restaurant_entity("r1"),
            ConfirmationState::Accepted,
        );
        assert_eq!(new_state.history.len(), 2);
        let invocation = get_invocation(&new_state.history[1]).unwrap();
        assert_eq!(invocation.get_param("book_people"), Some(&Value::Number(4.0)));
        assert_eq!(invocation.get_param("restaurant"), Some(&restaurant_entity("r1")));
    }

    #[test]
    fn test_add_action_same_function() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        state.history.push(DialogueHistoryItem::new(
            statement(complete_reservation("r1")),
            ConfirmationState::Accepted,
        ));
        let ctx = ctx_of(&state);
        let action = Invocation::new(reservation_schema());

        // proposing the same action keeps the accepted one
        let proposed = add_action(&ctx, "sys_confirm_action", &action, ConfirmationState::Proposed);
        assert_eq!(proposed.history.len(), 2);
        assert_eq!(proposed.history[1].confirm, ConfirmationState::Accepted);

        let confirmed = add_action(&ctx, "execute", &action, ConfirmationState::Confirmed);
        assert_eq!(confirmed.history[1].confirm, ConfirmationState::Confirmed);
        assert_eq!(confirmed.history[1].statement, state.history[1].statement);
    }

    #[test]
    fn test_attach_levenshtein() {
        let state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        let ctx = ctx_of(&state);
        let cheap = BooleanExpression::atom("price", "==", Value::enumerated("cheap"));
        let new_state = add_query(&ctx, "execute", Expression::filter(restaurants(), cheap.clone()), ConfirmationState::Accepted);
        let delta = LevenshteinDelta::continuing(statement(Expression::filter(restaurants(), cheap)));
        let new_state = attach_levenshtein(new_state, delta.clone());
        assert!(new_state.history[0].levenshtein.is_none());
        assert_eq!(new_state.history[1].levenshtein, Some(delta));
    }

    #[test]
    fn test_propagate_device_ids() {
        let mut with_id = Invocation::new(restaurant_schema());
        with_id.selector.id = Some("yelp-1".to_string());
        let state = make_state(
            "execute",
            vec![DialogueHistoryItem::new(statement(with_id), ConfirmationState::Confirmed)
                .with_results(ResultList::empty())],
        );
        let items = vec![
            DialogueHistoryItem::new(statement(reservation_invocation()), ConfirmationState::Accepted),
            DialogueHistoryItem::new(statement(Invocation::new(hotel_schema())), ConfirmationState::Accepted),
        ];
        let items = propagate_device_ids(&state, Some(0), items);
        assert_eq!(
            get_invocation(&items[0]).unwrap().selector.id.as_deref(),
            Some("yelp-1")
        );
        assert_eq!(get_invocation(&items[1]).unwrap().selector.id, None);
    }

    #[test]
    fn test_accept_all_proposed() {
        let mut state = search_state(vec![restaurant_result("r1", "cheap", 4.0)]);
        assert!(accept_all_proposed_statements(&state).is_none());
        state.history.push(DialogueHistoryItem::new(
            statement(complete_reservation("r1")),
            ConfirmationState::Proposed,
        ));
        let accepted = accept_all_proposed_statements(&state).unwrap();
        assert_eq!(accepted.dialogue_act, "execute");
        assert_eq!(accepted.history.len(), 2);
        assert_eq!(accepted.history[1].confirm, ConfirmationState::Accepted);
        let ctx = ctx_of(&accepted);
        assert_eq!(ctx.next_idx, Some(1));
    }

    #[test]
    fn test_user_asking_result_question() {
        let first = DialogueHistoryItem::new(statement(restaurants()), ConfirmationState::Confirmed)
            .with_results(ResultList::new(vec![restaurant_result("r1", "cheap", 4.0)]));
        let projected = Expression::projection(restaurants(), vec!["rating".to_string()]);
        let second = DialogueHistoryItem::new(statement(projected), ConfirmationState::Confirmed)
            .with_results(ResultList::new(vec![restaurant_result("r1", "cheap", 4.0)]));
        let ctx = ctx_of(&make_state("execute", vec![first.clone(), second]));
        assert!(is_user_asking_result_question(&ctx));

        let by_id = Expression::filter(
            restaurants(),
            BooleanExpression::atom("id", "==", restaurant_entity("r1")),
        );
        let item = DialogueHistoryItem::new(statement(by_id), ConfirmationState::Confirmed)
            .with_results(ResultList::new(vec![restaurant_result("r1", "cheap", 4.0)]));
        assert!(is_user_asking_result_question(&ctx_of(&make_state("execute", vec![item]))));

        assert!(!is_user_asking_result_question(&ctx_of(&make_state("execute", vec![first]))));
    }
}
