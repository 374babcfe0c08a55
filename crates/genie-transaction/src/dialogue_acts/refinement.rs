//! Query refinement: folding what the user said into the current query

use std::collections::{BTreeMap, BTreeSet};

use genie_thingtalk::{
    BooleanExpression, ConfirmationState, DialogueState, Expression, ExpressionStatement,
    FilterExpression, Type,
};

use crate::ast_manip::is_same_function;
use crate::context_info::ContextInfo;
use crate::dialogue_acts::common::{filter_delta, is_filter_compatible_with_info, is_simple_filter_expression};
use crate::slot_bag::SlotBag;
use crate::state_manip::{add_query, attach_levenshtein};

/// Combines the filter of the context with the filter the user said.
pub type RefineFilter = fn(&BooleanExpression, &BooleanExpression) -> Option<BooleanExpression>;

/// The filter of a query, creating an empty one right above the invocation
/// when there is none. Aggregations and joins have no such position.
pub fn find_or_make_filter_expression(expr: &mut Expression) -> Option<&mut FilterExpression> {
    if matches!(expr, Expression::Invocation(_)) {
        *expr = Expression::filter(expr.clone(), BooleanExpression::True);
    }
    match expr {
        Expression::Filter(filter) => Some(filter),
        Expression::Invocation(_) | Expression::Aggregation(_) | Expression::Join(_) => None,
        other => find_or_make_filter_expression(other.inner_mut()?),
    }
}

/// Replace `id == x` atoms with `true`.
pub fn neutralize_id_filter(filter: &BooleanExpression) -> BooleanExpression {
    match filter {
        BooleanExpression::Not { expr } => BooleanExpression::not(neutralize_id_filter(expr)),
        BooleanExpression::And { operands } => BooleanExpression::and(operands.iter().map(neutralize_id_filter).collect()),
        BooleanExpression::Or { operands } => BooleanExpression::or(operands.iter().map(neutralize_id_filter).collect()),
        BooleanExpression::Atom(atom) if atom.name == "id" && atom.operator == "==" => BooleanExpression::True,
        other => other.clone(),
    }
}

fn clauses(filter: &BooleanExpression) -> Vec<BooleanExpression> {
    match filter {
        BooleanExpression::And { operands } => operands.clone(),
        other => vec![other.clone()],
    }
}

/// Top-level atoms and don't-care clauses, keyed by parameter.
pub fn filter_to_slots(filter: &BooleanExpression) -> BTreeMap<String, BooleanExpression> {
    let mut slots = BTreeMap::new();
    for clause in clauses(&filter.clone().optimize()) {
        match &clause {
            BooleanExpression::Atom(atom) => {
                slots.insert(atom.name.clone(), clause.clone());
            }
            BooleanExpression::DontCare { name } => {
                slots.insert(name.clone(), clause.clone());
            }
            _ => {}
        }
    }
    slots
}

/// Top-level negated atoms and don't-care clauses, keyed by parameter.
pub fn filter_to_negated_slots(filter: &BooleanExpression) -> BTreeMap<String, BooleanExpression> {
    let mut slots = BTreeMap::new();
    for clause in clauses(&filter.clone().optimize()) {
        let BooleanExpression::Not { expr } = &clause else {
            continue;
        };
        let name = match expr.as_ref() {
            BooleanExpression::Atom(atom) => atom.name.clone(),
            BooleanExpression::DontCare { name } => name.clone(),
            _ => continue,
        };
        slots.insert(name, clause.clone());
    }
    slots
}

/// Parameters constrained by the filter, ignoring `id ==` and external filters.
pub fn get_params_in_filter(filter: &BooleanExpression) -> BTreeSet<String> {
    let mut params = BTreeSet::new();
    filter.visit(&mut |node| match node {
        BooleanExpression::Atom(atom) => {
            if !(atom.name == "id" && atom.operator == "==") {
                params.insert(atom.name.clone());
            }
            false
        }
        BooleanExpression::DontCare { name } => {
            params.insert(name.clone());
            false
        }
        BooleanExpression::External(_) => false,
        _ => true,
    });
    params
}

/// Apply a refinement to the query of `stmt`.
///
/// With a new filter, the refined filter replaces the filter of the query,
/// which must sit directly on an invocation. With a new projection, the
/// projection is replaced; otherwise the old projection loses the fields
/// the refined filter now constrains, and is dropped when none remain.
pub fn query_refinement(
    stmt: &ExpressionStatement,
    new_filter: Option<(&BooleanExpression, RefineFilter)>,
    new_projection: Option<&[String]>,
) -> Option<ExpressionStatement> {
    let mut clone = stmt.clone();
    let table = clone.last_query_mut()?;

    let mut refined_filter = None;
    if let Some((filter, refine)) = new_filter {
        let filter_expr = find_or_make_filter_expression(table)?;
        if !matches!(filter_expr.expression.as_ref(), Expression::Invocation(_)) {
            return None;
        }
        let refined = refine(&filter_expr.filter, filter)?;
        filter_expr.filter = refined.clone();
        refined_filter = Some(refined);
    }

    let (inner, old_projection) = match table.clone() {
        Expression::Projection(p) => ((*p.expression).clone(), Some(p)),
        other => (other, None),
    };
    *table = match (new_projection, old_projection) {
        (Some(names), _) => Expression::projection(inner, names.to_vec()),
        (None, Some(old)) => {
            let names: Vec<String> = old
                .args
                .into_iter()
                .filter(|name| !refined_filter.as_ref().is_some_and(|f| f.uses_param(name)))
                .collect();
            if names.is_empty() {
                inner
            } else {
                Expression::projection_with_computations(inner, names, old.computations, old.aliases)
            }
        }
        (None, None) => inner,
    };
    Some(clone)
}

/// The user answers a question: the new filter may only constrain
/// parameters the context does not. A previous id selection is lifted.
pub fn refine_filter_to_answer_question(
    ctx_filter: &BooleanExpression,
    refined: &BooleanExpression,
) -> Option<BooleanExpression> {
    if !get_params_in_filter(ctx_filter).is_disjoint(&get_params_in_filter(refined)) {
        return None;
    }
    Some(BooleanExpression::and(vec![neutralize_id_filter(ctx_filter), refined.clone()]).optimize())
}

/// The user answers a question or changes at most one constraint.
pub fn refine_filter_to_answer_question_or_change_filter(
    ctx_filter: &BooleanExpression,
    refined: &BooleanExpression,
) -> Option<BooleanExpression> {
    let ctx_filter = ctx_filter.clone().optimize();
    let refined = refined.clone().optimize();

    let ctx_slots = filter_to_slots(&ctx_filter);
    let refined_slots = filter_to_slots(&refined);
    let negated_slots = filter_to_negated_slots(&refined);

    let mut changed: Option<&str> = None;
    for (name, clause) in &ctx_slots {
        if negated_slots.contains_key(name) {
            return None;
        }
        let Some(new_clause) = refined_slots.get(name) else {
            continue;
        };
        if matches!(clause, BooleanExpression::DontCare { .. }) || new_clause == clause {
            return None;
        }
        if changed.is_some() {
            return None;
        }
        changed = Some(name);
    }

    let mut operands: Vec<BooleanExpression> = clauses(&ctx_filter)
        .into_iter()
        .filter(|clause| match clause {
            BooleanExpression::Atom(atom) => !refined_slots.contains_key(&atom.name),
            BooleanExpression::DontCare { name } => !refined_slots.contains_key(name),
            _ => true,
        })
        .map(|clause| neutralize_id_filter(&clause))
        .collect();
    operands.push(refined);
    Some(BooleanExpression::and(operands).optimize())
}

/// The user changes constraints already in the context, and only those.
pub fn refine_filter_to_change_filter(
    ctx_filter: &BooleanExpression,
    refined: &BooleanExpression,
) -> Option<BooleanExpression> {
    let ctx_filter = ctx_filter.clone().optimize();
    let refined = refined.clone().optimize();

    let ctx_slots = filter_to_slots(&ctx_filter);
    let refined_slots = filter_to_slots(&refined);
    if ctx_slots
        .iter()
        .any(|(name, clause)| refined_slots.get(name) == Some(clause))
    {
        return None;
    }
    if refined_slots.keys().any(|name| !ctx_slots.contains_key(name)) {
        return None;
    }

    let changed = refined.param_names();
    let mut operands: Vec<BooleanExpression> = clauses(&ctx_filter)
        .into_iter()
        .filter(|clause| !clause.has_external() && clause.param_names().is_disjoint(&changed))
        .collect();
    operands.push(refined);
    Some(BooleanExpression::and(operands).optimize())
}

/// The user replies to a proposal with a new search on the same function.
pub fn proposal_reply(ctx: &ContextInfo, request: &Expression, refine: RefineFilter) -> Option<DialogueState> {
    let current_function = ctx.current_function.as_ref()?;
    if !is_same_function(current_function, request.schema()) || !is_simple_filter_expression(request) {
        return None;
    }
    let request = request.as_filter()?;
    let current = ctx.current()?;
    let new_stmt = query_refinement(&current.statement, Some((&request.filter, refine)), None)?;

    let state = add_query(ctx, "execute", new_stmt, ConfirmationState::Accepted);
    Some(attach_levenshtein(state, filter_delta(request.expression.schema(), request.filter.clone())))
}

/// Merge a negative preamble ("no, not italian") with what the user asks
/// for instead. The preamble must contradict nothing the agent said.
pub fn combine_preamble_and_request(
    preamble: Option<&FilterExpression>,
    request: Option<&FilterExpression>,
    info: Option<&SlotBag>,
    proposal_type: Option<&Type>,
) -> Option<FilterExpression> {
    if let Some(preamble) = preamble {
        if !info.is_some_and(|info| is_filter_compatible_with_info(info, &preamble.filter)) {
            return None;
        }
    }

    let combined = match (preamble, request) {
        (Some(preamble), Some(request)) => {
            if !is_same_function(&preamble.schema, &request.schema) {
                return None;
            }
            refine_filter_to_change_filter(&preamble.filter, &request.filter)?;
            FilterExpression {
                filter: BooleanExpression::and(vec![
                    BooleanExpression::not(preamble.filter.clone()),
                    request.filter.clone(),
                ]),
                ..request.clone()
            }
        }
        (Some(preamble), None) => FilterExpression {
            filter: BooleanExpression::not(preamble.filter.clone()),
            ..preamble.clone()
        },
        (None, Some(request)) => request.clone(),
        (None, None) => return None,
    };

    if let Some(proposal_type) = proposal_type {
        if combined.schema.id_type() != Some(proposal_type) {
            return None;
        }
    }
    Some(combined)
}
