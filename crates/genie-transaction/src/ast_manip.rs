//! Expression helpers shared by the dialogue acts

use std::sync::Arc;

use genie_thingtalk::{
    AtomBooleanExpression, BooleanExpression, DialogueHistoryItem, Expression, ExpressionStatement,
    FilterExpression, FunctionDef, IndexExpression, Invocation, ProjectionExpression,
    SliceExpression, SortExpression, Value,
};

pub fn is_same_function(a: &FunctionDef, b: &FunctionDef) -> bool {
    a.class_name == b.class_name && a.name == b.name
}

/// The last invocation of a history item, in program order.
pub fn get_invocation(item: &DialogueHistoryItem) -> Option<&Invocation> {
    item.statement.last().and_then(Expression::invocation)
}

/// The filter node of a query, looking through sorts, projections, index,
/// slice and monitor. Aggregations and joins are not searched.
pub fn find_filter_expression(root: &Expression) -> Option<&FilterExpression> {
    match root {
        Expression::Filter(filter) => Some(filter),
        Expression::Sort(e) => find_filter_expression(&e.expression),
        Expression::Monitor(e) => find_filter_expression(&e.expression),
        Expression::Index(e) => find_filter_expression(&e.expression),
        Expression::Slice(e) => find_filter_expression(&e.expression),
        Expression::Projection(e) => find_filter_expression(&e.expression),
        Expression::Aggregation(_) | Expression::Join(_) | Expression::Invocation(_) => None,
    }
}

pub fn find_statement_filter(stmt: &ExpressionStatement) -> Option<&FilterExpression> {
    stmt.last_query().and_then(find_filter_expression)
}

/// Every filter of a query with the schema it applies to.
pub fn iterate_filters(table: &Expression) -> Vec<(&Arc<FunctionDef>, &BooleanExpression)> {
    let mut filters = Vec::new();
    collect_filters(table, &mut filters);
    filters
}

fn collect_filters<'a>(table: &'a Expression, out: &mut Vec<(&'a Arc<FunctionDef>, &'a BooleanExpression)>) {
    match table {
        Expression::Invocation(_) => {}
        Expression::Filter(f) => {
            out.push((&f.schema, &f.filter));
            collect_filters(&f.expression, out);
        }
        Expression::Join(j) => {
            collect_filters(&j.lhs, out);
            collect_filters(&j.rhs, out);
        }
        other => {
            if let Some(inner) = other.inner() {
                collect_filters(inner, out);
            }
        }
    }
}

/// Atoms and don't-care markers reachable through `and` and `not`.
pub fn iterate_fields(filter: &BooleanExpression) -> Vec<&BooleanExpression> {
    let mut fields = Vec::new();
    collect_fields(filter, &mut fields);
    fields
}

fn collect_fields<'a>(filter: &'a BooleanExpression, out: &mut Vec<&'a BooleanExpression>) {
    match filter {
        BooleanExpression::And { operands } => {
            for operand in operands {
                collect_fields(operand, out);
            }
        }
        BooleanExpression::Not { expr } => collect_fields(expr, out),
        BooleanExpression::Atom(_) | BooleanExpression::DontCare { .. } => out.push(filter),
        _ => {}
    }
}

fn field_name(filter: &BooleanExpression) -> Option<&str> {
    match filter {
        BooleanExpression::Atom(atom) => Some(&atom.name),
        BooleanExpression::DontCare { name } => Some(name),
        BooleanExpression::Compute(compute) => match &compute.lhs {
            Value::VarRef(name) => Some(name),
            _ => None,
        },
        _ => None,
    }
}

/// Whether the filter selects a single, identified element.
///
/// `id == "a" || id == "b"` also counts: it enumerates the set.
pub fn check_filter_uniqueness(schema: &FunctionDef, filter: &BooleanExpression) -> bool {
    match filter {
        BooleanExpression::And { operands } => operands.iter().any(|f| check_filter_uniqueness(schema, f)),
        BooleanExpression::Or { operands } => operands.iter().all(|f| check_filter_uniqueness(schema, f)),
        BooleanExpression::Not { .. } => true,
        BooleanExpression::Atom(atom) => {
            (atom.operator == "==" || atom.operator == "in_array")
                && schema.get_argument(&atom.name).is_some_and(|arg| arg.unique)
        }
        BooleanExpression::External(_)
        | BooleanExpression::Existential { .. }
        | BooleanExpression::True
        | BooleanExpression::False
        | BooleanExpression::Compute(_)
        | BooleanExpression::DontCare { .. } => false,
    }
}

pub fn has_unique_filter(table: &Expression) -> bool {
    iterate_filters(table)
        .into_iter()
        .any(|(_, filter)| check_filter_uniqueness(table.schema(), filter))
}

/// Every field mentioned by the filter refers to a filterable output or
/// input of the table with a compatible value. Projections are looked
/// through, since filters go below them.
pub fn check_filter(table: &Expression, filter: &BooleanExpression) -> bool {
    if let Expression::Projection(p) = table {
        return check_filter(&p.expression, filter);
    }
    let schema = table.schema();
    match filter {
        BooleanExpression::True | BooleanExpression::False => true,
        BooleanExpression::And { operands } | BooleanExpression::Or { operands } => {
            operands.iter().all(|f| check_filter(table, f))
        }
        BooleanExpression::Not { expr } => check_filter(table, expr),
        BooleanExpression::DontCare { name } => schema.get_argument(name).is_some_and(|a| a.filterable),
        BooleanExpression::Atom(atom) => check_atom_filter(schema, atom),
        BooleanExpression::Compute(compute) => match &compute.lhs {
            Value::VarRef(name) => schema.get_argument(name).is_some_and(|a| a.filterable),
            _ => true,
        },
        BooleanExpression::External(_) | BooleanExpression::Existential { .. } => true,
    }
}

fn check_atom_filter(schema: &FunctionDef, atom: &AtomBooleanExpression) -> bool {
    let Some(arg) = schema.get_argument(&atom.name) else {
        return false;
    };
    if !arg.filterable {
        return false;
    }
    if !atom.value.is_constant() {
        return true;
    }
    let value_type = atom.value.get_type();
    match atom.operator.as_str() {
        "contains" | "contains~" => value_type.is_assignable(arg.ty.elem()),
        "in_array" | "in_array~" => value_type.elem().is_assignable(&arg.ty),
        "=~" | "~=" => arg.ty.is_string() || arg.ty.is_entity() || value_type.is_string(),
        ">=" | "<=" | ">" | "<" => arg.ty.is_numeric() || matches!(arg.ty, genie_thingtalk::Type::Date | genie_thingtalk::Type::Time),
        _ => value_type.is_assignable(&arg.ty),
    }
}

/// Validate and push a filter into a query.
pub fn add_filter(table: &Expression, filter: &BooleanExpression, if_filter: bool) -> Option<Expression> {
    if !check_filter(table, filter) {
        return None;
    }
    add_filter_internal(table, filter, if_filter)
}

/// Push a filter into a query, descending through projection, sort, index
/// and slice. Refuses filters that would contradict an existing constraint
/// on the same field, and anything once the query is uniquely filtered.
///
/// Single-result queries only accept `if_filter` filters, used with streams.
pub fn add_filter_internal(table: &Expression, filter: &BooleanExpression, if_filter: bool) -> Option<Expression> {
    let schema = table.schema();
    if schema.no_filter {
        return None;
    }
    if !schema.is_list && !if_filter {
        return None;
    }

    match table {
        Expression::Projection(p) => {
            let added = add_filter_internal(&p.expression, filter, if_filter)?;
            Some(Expression::Projection(ProjectionExpression {
                expression: Box::new(added),
                ..p.clone()
            }))
        }
        Expression::Sort(s) => {
            let added = add_filter_internal(&s.expression, filter, if_filter)?;
            Some(Expression::Sort(SortExpression {
                expression: Box::new(added),
                ..s.clone()
            }))
        }
        Expression::Index(i) => {
            let added = add_filter_internal(&i.expression, filter, if_filter)?;
            Some(Expression::Index(IndexExpression {
                expression: Box::new(added),
                ..i.clone()
            }))
        }
        Expression::Slice(s) => {
            let added = add_filter_internal(&s.expression, filter, if_filter)?;
            Some(Expression::Slice(SliceExpression {
                expression: Box::new(added),
                ..s.clone()
            }))
        }
        Expression::Filter(existing) => merge_into_filter(table, existing, filter),
        _ => {
            let mut schema = (**schema).clone();
            if check_filter_uniqueness(&schema, filter) {
                schema.is_list = false;
                schema.no_filter = true;
            }
            Some(Expression::Filter(FilterExpression {
                expression: Box::new(table.clone()),
                filter: filter.clone(),
                schema: Arc::new(schema),
            }))
        }
    }
}

fn merge_into_filter(
    table: &Expression,
    existing: &FilterExpression,
    filter: &BooleanExpression,
) -> Option<Expression> {
    let name = match filter {
        BooleanExpression::Atom(atom) => atom.name.as_str(),
        BooleanExpression::Not { expr } => expr.as_atom()?.name.as_str(),
        BooleanExpression::Compute(_) => field_name(filter)?,
        _ => return None,
    };
    let operator = match filter {
        BooleanExpression::Atom(atom) => atom.operator.as_str(),
        BooleanExpression::Not { expr } => expr.as_atom()?.operator.as_str(),
        BooleanExpression::Compute(compute) => compute.operator.as_str(),
        _ => return None,
    };

    if check_filter_uniqueness(&existing.schema, filter) || has_unique_filter(table) {
        return None;
    }

    // reject p == X && p == Y, or p > X && p > Y
    let equality = |op: &str| op == "==" || op == "in_array";
    for operand in existing.filter.conjuncts() {
        if let Some(atom) = operand.as_atom() {
            if atom.name == name && (atom.operator == operator || equality(&atom.operator) || equality(operator)) {
                return None;
            }
        }
    }

    if let Some(arg) = existing.schema.get_argument(name) {
        if !arg.conflict_filter.is_empty()
            && iterate_fields(&existing.filter)
                .into_iter()
                .filter_map(field_name)
                .any(|field| arg.conflict_filter.iter().any(|c| c == field))
        {
            return None;
        }
    }

    let merged = BooleanExpression::and(vec![existing.filter.clone(), filter.clone()]).optimize();
    Some(Expression::Filter(FilterExpression {
        expression: existing.expression.clone(),
        filter: merged,
        schema: existing.schema.clone(),
    }))
}

/// Remove input parameters equal to their declared default.
pub fn adjust_default_parameters(stmt: &mut ExpressionStatement) {
    for expression in stmt.expressions.iter_mut() {
        adjust_expression_defaults(expression);
    }
}

fn adjust_expression_defaults(expression: &mut Expression) {
    match expression {
        Expression::Invocation(invocation) => {
            let schema = invocation.schema.clone();
            invocation.in_params.retain(|p| {
                schema
                    .get_argument(&p.name)
                    .and_then(|arg| arg.default.as_ref())
                    .is_none_or(|default| default != &p.value)
            });
        }
        Expression::Join(j) => {
            adjust_expression_defaults(&mut j.lhs);
            adjust_expression_defaults(&mut j.rhs);
        }
        other => {
            if let Some(inner) = other.inner_mut() {
                adjust_expression_defaults(inner);
            }
        }
    }
}

/// Does the query filter on `id`?
pub fn expression_uses_id_filter(expr: &Expression) -> bool {
    find_filter_expression(expr).is_some_and(|f| f.filter.uses_param("id"))
}
