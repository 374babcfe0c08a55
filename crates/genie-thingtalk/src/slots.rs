//! Slots: parameter positions inside an expression

use crate::boolean::BooleanExpression;
use crate::expression::Expression;
use crate::schema::FunctionDef;
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotInfo {
    /// `in_param.<name>`, `filter.<op>.<name>`, `attribute.<name>`, `index`,
    /// `slice.base` or `slice.limit`.
    pub tag: String,
    pub name: String,
    pub ty: Type,
    pub function: String,
    pub is_device_selector: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub info: SlotInfo,
    pub value: Value,
}

impl Slot {
    pub fn tag(&self) -> &str {
        &self.info.tag
    }
}

fn slot_info(tag: String, name: &str, ty: Type, schema: &FunctionDef, device: bool) -> SlotInfo {
    SlotInfo {
        tag,
        name: name.to_string(),
        ty,
        function: schema.qualified_name(),
        is_device_selector: device,
    }
}

fn filter_slot_type(schema: &FunctionDef, name: &str, operator: &str) -> Type {
    let ty = schema.get_argument_type(name).cloned().unwrap_or(Type::Any);
    match operator {
        "contains" | "contains~" => ty.elem().clone(),
        "in_array" | "in_array~" => Type::array(ty),
        "=~" | "~=" => Type::String,
        _ => ty,
    }
}

fn visit_filter_slots(
    filter: &mut BooleanExpression,
    schema: &FunctionDef,
    f: &mut dyn FnMut(&SlotInfo, &mut Value),
) {
    match filter {
        BooleanExpression::Atom(atom) => {
            let ty = filter_slot_type(schema, &atom.name, &atom.operator);
            let info = slot_info(
                format!("filter.{}.{}", atom.operator, atom.name),
                &atom.name,
                ty,
                schema,
                false,
            );
            f(&info, &mut atom.value);
        }
        BooleanExpression::Compute(compute) => {
            let info = slot_info(
                format!("filter.{}.$compute", compute.operator),
                "$compute",
                Type::Any,
                schema,
                false,
            );
            f(&info, &mut compute.rhs);
        }
        BooleanExpression::Not { expr } => visit_filter_slots(expr, schema, f),
        BooleanExpression::And { operands } | BooleanExpression::Or { operands } => {
            for op in operands {
                visit_filter_slots(op, schema, f);
            }
        }
        BooleanExpression::External(ext) => {
            let ext_schema = ext.schema.clone();
            for p in ext.in_params.iter_mut() {
                let ty = ext_schema
                    .get_argument_type(&p.name)
                    .cloned()
                    .unwrap_or(Type::Any);
                let info = slot_info(format!("in_param.{}", p.name), &p.name, ty, &ext_schema, false);
                f(&info, &mut p.value);
            }
            visit_filter_slots(&mut ext.filter, &ext_schema, f);
        }
        BooleanExpression::Existential { subquery } => visit_slots_mut(subquery, f),
        BooleanExpression::True | BooleanExpression::False | BooleanExpression::DontCare { .. } => {}
    }
}

/// Visit every slot of the expression, allowing the value to be replaced.
pub fn visit_slots_mut(expr: &mut Expression, f: &mut dyn FnMut(&SlotInfo, &mut Value)) {
    match expr {
        Expression::Invocation(inv) => {
            let schema = inv.schema.clone();
            for attr in inv.selector.attributes.iter_mut() {
                let info = slot_info(
                    format!("attribute.{}", attr.name),
                    &attr.name,
                    Type::String,
                    &schema,
                    true,
                );
                f(&info, &mut attr.value);
            }
            for p in inv.in_params.iter_mut() {
                let ty = schema.get_argument_type(&p.name).cloned().unwrap_or(Type::Any);
                let info = slot_info(format!("in_param.{}", p.name), &p.name, ty, &schema, false);
                f(&info, &mut p.value);
            }
        }
        Expression::Filter(e) => {
            visit_slots_mut(&mut e.expression, f);
            let schema = e.schema.clone();
            visit_filter_slots(&mut e.filter, &schema, f);
        }
        Expression::Index(e) => {
            visit_slots_mut(&mut e.expression, f);
            let schema = e.schema.clone();
            for idx in e.indices.iter_mut() {
                let info = slot_info("index".into(), "index", Type::Number, &schema, false);
                f(&info, idx);
            }
        }
        Expression::Slice(e) => {
            visit_slots_mut(&mut e.expression, f);
            let schema = e.schema.clone();
            let info = slot_info("slice.base".into(), "base", Type::Number, &schema, false);
            f(&info, &mut e.base);
            let info = slot_info("slice.limit".into(), "limit", Type::Number, &schema, false);
            f(&info, &mut e.limit);
        }
        Expression::Join(e) => {
            visit_slots_mut(&mut e.lhs, f);
            visit_slots_mut(&mut e.rhs, f);
        }
        Expression::Projection(e) => visit_slots_mut(&mut e.expression, f),
        Expression::Sort(e) => visit_slots_mut(&mut e.expression, f),
        Expression::Aggregation(e) => visit_slots_mut(&mut e.expression, f),
        Expression::Monitor(e) => visit_slots_mut(&mut e.expression, f),
    }
}

pub fn iterate_slots(expr: &Expression) -> Vec<Slot> {
    let mut copy = expr.clone();
    let mut slots = Vec::new();
    visit_slots_mut(&mut copy, &mut |info, value| {
        slots.push(Slot {
            info: info.clone(),
            value: value.clone(),
        });
    });
    slots
}
