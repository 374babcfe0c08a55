//! The first command of a dialogue, or of a new task within one

use std::sync::Arc;

use genie_thingtalk::{
    BooleanExpression, ConfirmMode, ConfirmationState, DialogueHistoryItem, DialogueState, Expression,
    ExpressionStatement, Invocation, Type, Value,
};

use crate::ast_manip::{adjust_default_parameters, expression_uses_id_filter, is_same_function};
use crate::context_info::{ContextInfo, POLICY_NAME};
use crate::dialogue_acts::common::FilterSlot;
use crate::dialogue_acts::refinement::find_or_make_filter_expression;
use crate::library::Thingpedia;
use crate::state_manip::{TargetConfirm, make_target_state};

/// The entity type of `ty`, when the library knows a query listing it.
fn id_query_type<'a>(library: &Thingpedia, ty: &'a Type) -> Option<&'a str> {
    match ty {
        Type::Entity(kind) if library.id_query(kind).is_some() => Some(kind),
        _ => None,
    }
}

fn split_query_and_action(table: &Expression, action: &Expression) -> Option<Vec<ExpressionStatement>> {
    let invocation = action.as_invocation()?;
    if invocation.schema.confirm == ConfirmMode::Auto {
        // keep the compound command, picking one result when it is chosen by id
        let table = if expression_uses_id_filter(table) && !matches!(table, Expression::Index(_) | Expression::Slice(_))
        {
            Expression::index(table.clone(), vec![Value::Number(1.0)])
        } else {
            table.clone()
        };
        return Some(vec![ExpressionStatement::chain(table, action.clone())]);
    }

    let mut new_action = invocation.clone();
    for param in &mut new_action.in_params {
        let Value::VarRef(name) = &param.value else {
            continue;
        };
        if name.starts_with("__const_") {
            continue;
        }
        // only the id is passed from the query; the user picks it later
        if name != "id" {
            return None;
        }
        param.value = Value::Undefined;
    }
    Some(vec![
        ExpressionStatement::single(table.clone()),
        ExpressionStatement::single(new_action.into()),
    ])
}

/// An action on an entity the user has not picked yet gets the query
/// listing those entities in front of it.
fn add_query_for_action(library: &Thingpedia, action: &Invocation) -> Option<Vec<ExpressionStatement>> {
    let mut id_params = action
        .schema
        .iterate_arguments()
        .filter(|arg| arg.is_input() && id_query_type(library, &arg.ty).is_some());
    let Some(id_arg) = id_params.next() else {
        return Some(vec![ExpressionStatement::single(action.clone().into())]);
    };
    if id_params.next().is_some() {
        return None;
    }
    if action.get_param(&id_arg.name).is_some_and(|value| !value.is_undefined()) {
        return Some(vec![ExpressionStatement::single(action.clone().into())]);
    }

    let kind = id_query_type(library, &id_arg.ty)?;
    let query: Expression = Invocation::new(library.id_query(kind)?.clone()).into();
    let mut clone = action.clone();
    clone.add_missing_required_params();

    if action.schema.confirm == ConfirmMode::Auto {
        clone.set_param(id_arg.name.clone(), Value::var_ref("id"));
        Some(vec![ExpressionStatement::chain(query, clone.into())])
    } else {
        Some(vec![ExpressionStatement::single(query), ExpressionStatement::single(clone.into())])
    }
}

/// Normalize a user command into the statements that go into the history.
///
/// Compound commands whose action needs confirmation are split so the user
/// can pick a result first. Streams are not supported.
pub fn adjust_statements_for_initial_request(
    stmt: &ExpressionStatement,
    library: &Thingpedia,
) -> Option<Vec<ExpressionStatement>> {
    if stmt.stream().is_some() {
        return None;
    }

    let mut statements = match stmt.expressions.as_slice() {
        [table, action] => split_query_and_action(table, action)?,
        [Expression::Invocation(action)] if action.schema.is_action() => add_query_for_action(library, action)?,
        [_] => vec![stmt.clone()],
        _ => return None,
    };
    for stmt in &mut statements {
        adjust_default_parameters(stmt);
    }
    Some(statements)
}

fn accepted_items(statements: Vec<ExpressionStatement>) -> Vec<DialogueHistoryItem> {
    statements
        .into_iter()
        .map(|stmt| DialogueHistoryItem::new(stmt, ConfirmationState::Accepted))
        .collect()
}

/// The state after the user's first command.
pub fn initial_request(stmt: &ExpressionStatement, library: &Thingpedia) -> Option<DialogueState> {
    let statements = adjust_statements_for_initial_request(stmt, library)?;
    Some(DialogueState::new(POLICY_NAME, "execute", None).with_history(accepted_items(statements)))
}

fn statement_device(stmt: &ExpressionStatement) -> Option<&str> {
    stmt.last().map(|e| e.schema().class_name.as_str())
}

/// The user moves on to a new task. With `strict_multidomain`, the new
/// task must use a different device than the current one.
pub fn start_new_request(
    ctx: &ContextInfo,
    stmt: &ExpressionStatement,
    library: &Thingpedia,
    strict_multidomain: bool,
) -> Option<DialogueState> {
    if stmt.stream().is_some() {
        return None;
    }
    if strict_multidomain {
        let current = ctx.current()?;
        if statement_device(&current.statement) == statement_device(stmt) {
            return None;
        }
    }
    let statements = adjust_statements_for_initial_request(stmt, library)?;
    Some(make_target_state(
        &ctx.state,
        "execute",
        Vec::new(),
        TargetConfirm::Accepted,
        accepted_items(statements),
    ))
}

/// "Any price is fine" said together with the first command.
pub fn add_initial_dont_care(stmt: &ExpressionStatement, dont_care: &FilterSlot) -> Option<ExpressionStatement> {
    let table = stmt.last_query()?;
    let schema: Arc<_> = table.schema().clone();
    if !is_same_function(&schema, &dont_care.schema) || !schema.is_list {
        return None;
    }
    let BooleanExpression::DontCare { name } = &dont_care.ast else {
        return None;
    };
    let arg = schema.get_argument(name)?;
    if arg.is_input() || !arg.filterable {
        return None;
    }

    let mut clone = stmt.clone();
    let filter_expr = find_or_make_filter_expression(clone.last_query_mut()?)?;
    if !matches!(filter_expr.expression.as_ref(), Expression::Invocation(_)) || filter_expr.filter.uses_param(name) {
        return None;
    }
    let filter = std::mem::replace(&mut filter_expr.filter, BooleanExpression::True);
    filter_expr.filter = BooleanExpression::and(vec![filter, dont_care.ast.clone()]).optimize();
    Some(clone)
}
