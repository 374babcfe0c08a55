//! Boolean filter expressions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::expression::{DeviceSelector, Expression, InputParam};
use crate::schema::FunctionDef;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomBooleanExpression {
    pub name: String,
    pub operator: String,
    pub value: Value,
}

impl AtomBooleanExpression {
    pub fn new(name: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            operator: operator.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputeBooleanExpression {
    pub lhs: Value,
    pub operator: String,
    pub rhs: Value,
}

/// A filter that refers to another function (`@com.weather.current() { temperature >= 20 }`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalBooleanExpression {
    pub selector: DeviceSelector,
    pub channel: String,
    pub in_params: Vec<InputParam>,
    pub filter: Box<BooleanExpression>,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BooleanExpression {
    True,
    False,
    DontCare { name: String },
    Atom(AtomBooleanExpression),
    Not { expr: Box<BooleanExpression> },
    And { operands: Vec<BooleanExpression> },
    Or { operands: Vec<BooleanExpression> },
    Compute(ComputeBooleanExpression),
    External(ExternalBooleanExpression),
    Existential { subquery: Box<Expression> },
}

impl BooleanExpression {
    pub fn atom(name: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        BooleanExpression::Atom(AtomBooleanExpression::new(name, operator, value))
    }

    pub fn dont_care(name: impl Into<String>) -> Self {
        BooleanExpression::DontCare { name: name.into() }
    }

    pub fn not(expr: BooleanExpression) -> Self {
        BooleanExpression::Not {
            expr: Box::new(expr),
        }
    }

    pub fn and(operands: Vec<BooleanExpression>) -> Self {
        BooleanExpression::And { operands }
    }

    pub fn or(operands: Vec<BooleanExpression>) -> Self {
        BooleanExpression::Or { operands }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, BooleanExpression::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, BooleanExpression::False)
    }

    pub fn as_atom(&self) -> Option<&AtomBooleanExpression> {
        match self {
            BooleanExpression::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    /// Simplify: flatten nested conjunctions and disjunctions, drop neutral
    /// elements and duplicates, fold constants.
    pub fn optimize(self) -> BooleanExpression {
        match self {
            BooleanExpression::Not { expr } => match expr.optimize() {
                BooleanExpression::True => BooleanExpression::False,
                BooleanExpression::False => BooleanExpression::True,
                BooleanExpression::Not { expr } => *expr,
                other => BooleanExpression::not(other),
            },
            BooleanExpression::And { operands } => {
                let mut flat: Vec<BooleanExpression> = Vec::new();
                for op in operands {
                    match op.optimize() {
                        BooleanExpression::True => {}
                        BooleanExpression::False => return BooleanExpression::False,
                        BooleanExpression::And { operands } => {
                            for inner in operands {
                                if !flat.contains(&inner) {
                                    flat.push(inner);
                                }
                            }
                        }
                        other => {
                            if !flat.contains(&other) {
                                flat.push(other);
                            }
                        }
                    }
                }
                match flat.len() {
                    0 => BooleanExpression::True,
                    1 => flat.remove(0),
                    _ => BooleanExpression::And { operands: flat },
                }
            }
            BooleanExpression::Or { operands } => {
                let mut flat: Vec<BooleanExpression> = Vec::new();
                for op in operands {
                    match op.optimize() {
                        BooleanExpression::False => {}
                        BooleanExpression::True => return BooleanExpression::True,
                        BooleanExpression::Or { operands } => {
                            for inner in operands {
                                if !flat.contains(&inner) {
                                    flat.push(inner);
                                }
                            }
                        }
                        other => {
                            if !flat.contains(&other) {
                                flat.push(other);
                            }
                        }
                    }
                }
                match flat.len() {
                    0 => BooleanExpression::False,
                    1 => flat.remove(0),
                    _ => BooleanExpression::Or { operands: flat },
                }
            }
            BooleanExpression::External(mut ext) => {
                let filter = std::mem::replace(&mut *ext.filter, BooleanExpression::True);
                *ext.filter = filter.optimize();
                BooleanExpression::External(ext)
            }
            other => other,
        }
    }

    /// Pre-order traversal. The callback returns whether to descend into the
    /// node's children. External filters and subqueries are children too.
    pub fn visit(&self, f: &mut dyn FnMut(&BooleanExpression) -> bool) {
        if !f(self) {
            return;
        }
        match self {
            BooleanExpression::Not { expr } => expr.visit(f),
            BooleanExpression::And { operands } | BooleanExpression::Or { operands } => {
                for op in operands {
                    op.visit(f);
                }
            }
            BooleanExpression::External(ext) => ext.filter.visit(f),
            _ => {}
        }
    }

    /// Whether an atom of this filter, outside external filters, names `param`.
    pub fn uses_param(&self, param: &str) -> bool {
        let mut used = false;
        self.visit(&mut |node| match node {
            BooleanExpression::External(_) => false,
            BooleanExpression::Atom(atom) => {
                used = used || atom.name == param;
                true
            }
            _ => true,
        });
        used
    }

    /// Names of all atoms and don't-care clauses, outside external filters.
    pub fn param_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |node| match node {
            BooleanExpression::External(_) => false,
            BooleanExpression::Atom(atom) => {
                names.insert(atom.name.clone());
                true
            }
            BooleanExpression::DontCare { name } => {
                names.insert(name.clone());
                true
            }
            _ => true,
        });
        names
    }

    pub fn has_external(&self) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if matches!(node, BooleanExpression::External(_)) {
                found = true;
            }
            !found
        });
        found
    }

    /// Top-level conjuncts of the filter.
    pub fn conjuncts(&self) -> Vec<&BooleanExpression> {
        match self {
            BooleanExpression::And { operands } => operands.iter().collect(),
            BooleanExpression::True => Vec::new(),
            other => vec![other],
        }
    }
}

impl fmt::Display for BooleanExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BooleanExpression::True => write!(f, "true"),
            BooleanExpression::False => write!(f, "false"),
            BooleanExpression::DontCare { name } => write!(f, "true({})", name),
            BooleanExpression::Atom(atom) => {
                write!(f, "{} {} {}", atom.name, atom.operator, atom.value)
            }
            BooleanExpression::Not { expr } => write!(f, "!({})", expr),
            BooleanExpression::And { operands } => write_joined(f, operands, " && "),
            BooleanExpression::Or { operands } => write_joined(f, operands, " || "),
            BooleanExpression::Compute(c) => write!(f, "{} {} {}", c.lhs, c.operator, c.rhs),
            BooleanExpression::External(ext) => {
                write!(f, "@{}.{}(", ext.selector.kind, ext.channel)?;
                for (i, p) in ext.in_params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", p.name, p.value)?;
                }
                write!(f, ") {{ {} }}", ext.filter)
            }
            BooleanExpression::Existential { subquery } => write!(f, "any({})", subquery),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, operands: &[BooleanExpression], sep: &str) -> fmt::Result {
    for (i, op) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        match op {
            BooleanExpression::And { .. } | BooleanExpression::Or { .. } => write!(f, "({})", op)?,
            _ => write!(f, "{}", op)?,
        }
    }
    Ok(())
}
