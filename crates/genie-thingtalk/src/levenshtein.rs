//! Levenshtein deltas: edit scripts between consecutive statements.
//!
//! A delta is a partial statement. Applying it to the previous statement
//! merges each delta expression into the expression of the same function:
//! filters are conjoined (replacing earlier constraints on the same
//! parameters), projections, sorts, indices and slices replace the existing
//! ones, and invocation parameters are overwritten. Expressions whose
//! function does not appear in the previous statement are appended.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::boolean::BooleanExpression;
use crate::expression::Expression;
use crate::statement::ExpressionStatement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LevenshteinOp {
    #[default]
    #[serde(rename = "$continue")]
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevenshteinDelta {
    #[serde(default)]
    pub op: LevenshteinOp,
    pub expression: ExpressionStatement,
}

impl LevenshteinDelta {
    pub fn continuing(expression: impl Into<ExpressionStatement>) -> Self {
        Self {
            op: LevenshteinOp::Continue,
            expression: expression.into(),
        }
    }

    /// Drop no-op clauses from the delta filters.
    pub fn optimize(mut self) -> Self {
        for expr in self.expression.expressions.iter_mut() {
            optimize_expression(expr);
        }
        self
    }
}

fn optimize_expression(expr: &mut Expression) {
    if let Expression::Filter(f) = expr {
        let filter = std::mem::replace(&mut f.filter, BooleanExpression::True);
        f.filter = filter.optimize();
    }
    if let Some(inner) = expr.inner_mut() {
        optimize_expression(inner);
    }
}

impl fmt::Display for LevenshteinDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$continue {}", self.expression)
    }
}

fn function_name(expr: &Expression) -> String {
    expr.schema().qualified_name()
}

/// Conjoin `delta` into `existing`, dropping the existing conjuncts that
/// constrain any parameter the delta mentions.
fn merge_filters(existing: &BooleanExpression, delta: &BooleanExpression) -> BooleanExpression {
    let replaced = delta.param_names();
    let mut operands: Vec<BooleanExpression> = existing
        .conjuncts()
        .into_iter()
        .filter(|clause| clause.param_names().is_disjoint(&replaced))
        .cloned()
        .collect();
    operands.push(delta.clone());
    BooleanExpression::and(operands).optimize()
}

fn add_filter(expr: Expression, filter: &BooleanExpression) -> Expression {
    match expr {
        Expression::Filter(mut f) => {
            f.filter = merge_filters(&f.filter, filter);
            Expression::Filter(f)
        }
        Expression::Invocation(inv) => Expression::filter(inv.into(), filter.clone()),
        Expression::Projection(p) => {
            let inner = add_filter(*p.expression, filter);
            Expression::projection_with_computations(inner, p.args, p.computations, p.aliases)
        }
        Expression::Sort(s) => Expression::sort(add_filter(*s.expression, filter), s.value, s.direction),
        Expression::Index(i) => Expression::index(add_filter(*i.expression, filter), i.indices),
        Expression::Slice(s) => Expression::slice(add_filter(*s.expression, filter), s.base, s.limit),
        Expression::Monitor(m) => Expression::monitor(add_filter(*m.expression, filter), m.args),
        other @ (Expression::Aggregation(_) | Expression::Join(_)) => {
            Expression::filter(other, filter.clone())
        }
    }
}

fn strip_projection(expr: Expression) -> Expression {
    match expr {
        Expression::Projection(p) => *p.expression,
        other => other,
    }
}

fn strip_ordering(expr: Expression) -> Expression {
    match expr {
        Expression::Projection(p) => {
            let inner = strip_ordering(*p.expression);
            Expression::projection_with_computations(inner, p.args, p.computations, p.aliases)
        }
        Expression::Sort(s) => *s.expression,
        Expression::Index(i) => strip_ordering(*i.expression),
        Expression::Slice(s) => strip_ordering(*s.expression),
        other => other,
    }
}

/// Re-wrap `base` under the projection of `expr` (if any).
fn under_projection(base: Expression, wrapper: Expression) -> Expression {
    match base {
        Expression::Projection(p) => {
            let inner = wrapper_apply(*p.expression, wrapper);
            Expression::projection_with_computations(inner, p.args, p.computations, p.aliases)
        }
        other => wrapper_apply(other, wrapper),
    }
}

fn wrapper_apply(inner: Expression, wrapper: Expression) -> Expression {
    match wrapper {
        Expression::Sort(s) => Expression::sort(inner, s.value, s.direction),
        Expression::Index(i) => Expression::index(inner, i.indices),
        Expression::Slice(s) => Expression::slice(inner, s.base, s.limit),
        other => other,
    }
}

fn merge_expression(old: Expression, delta: &Expression) -> Expression {
    match delta {
        Expression::Invocation(inv) => {
            let mut merged = old;
            if let Some(target) = merged.invocation_mut() {
                for p in &inv.in_params {
                    target.set_param(p.name.clone(), p.value.clone());
                }
                if inv.selector.id.is_some() || inv.selector.all {
                    target.selector = inv.selector.clone();
                }
            }
            merged
        }
        Expression::Filter(f) => {
            let merged = merge_expression(old, &f.expression);
            add_filter(merged, &f.filter)
        }
        Expression::Projection(p) => {
            let merged = strip_projection(merge_expression(old, &p.expression));
            Expression::projection_with_computations(
                merged,
                p.args.clone(),
                p.computations.clone(),
                p.aliases.clone(),
            )
        }
        Expression::Sort(s) => {
            let merged = strip_ordering(merge_expression(old, &s.expression));
            under_projection(
                merged,
                Expression::Sort(s.clone()),
            )
        }
        Expression::Index(i) => {
            let merged = merge_expression(old, &i.expression);
            under_projection(merged, Expression::Index(i.clone()))
        }
        Expression::Slice(s) => {
            let merged = merge_expression(old, &s.expression);
            under_projection(merged, Expression::Slice(s.clone()))
        }
        Expression::Aggregation(a) => {
            let merged = merge_expression(old, &a.expression);
            Expression::aggregation(strip_projection(merged), a.field.clone(), a.operator.clone())
        }
        Expression::Monitor(m) => {
            let merged = merge_expression(old, &m.expression);
            Expression::monitor(merged, m.args.clone())
        }
        Expression::Join(_) => delta.clone(),
    }
}

/// Apply a delta to the previous statement.
pub fn apply_levenshtein(old: &ExpressionStatement, delta: &LevenshteinDelta) -> ExpressionStatement {
    let mut expressions = old.expressions.clone();
    for expr in &delta.expression.expressions {
        let name = function_name(expr);
        match expressions.iter().position(|e| function_name(e) == name) {
            Some(idx) => {
                let previous = expressions.remove(idx);
                expressions.insert(idx, merge_expression(previous, expr));
            }
            None if expr.is_action() => {
                expressions.retain(|e| !e.is_action());
                expressions.push(expr.clone());
            }
            None => {
                // a query on a new function replaces the old query
                expressions.retain(|e| e.is_action());
                expressions.insert(0, expr.clone());
            }
        }
    }
    ExpressionStatement::new(expressions)
}

pub fn apply_multiple_levenshtein(
    old: &ExpressionStatement,
    deltas: &[LevenshteinDelta],
) -> ExpressionStatement {
    deltas
        .iter()
        .fold(old.clone(), |acc, delta| apply_levenshtein(&acc, delta))
}
