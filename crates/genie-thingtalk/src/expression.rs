//! Query and action expressions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::boolean::BooleanExpression;
use crate::schema::{ArgumentDef, FunctionDef};
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputParam {
    pub name: String,
    pub value: Value,
}

impl InputParam {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSelector {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<InputParam>,
    #[serde(default)]
    pub all: bool,
}

impl DeviceSelector {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            attributes: Vec::new(),
            all: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    pub selector: DeviceSelector,
    pub channel: String,
    #[serde(default)]
    pub in_params: Vec<InputParam>,
    pub schema: Arc<FunctionDef>,
}

impl Invocation {
    pub fn new(schema: Arc<FunctionDef>) -> Self {
        Self {
            selector: DeviceSelector::new(schema.class_name.clone()),
            channel: schema.name.clone(),
            in_params: Vec::new(),
            schema,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_param(name, value);
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.selector.kind, self.channel)
    }

    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.in_params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Replace the value of an existing parameter, or add it keeping the
    /// parameters sorted by name.
    pub fn set_param(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(existing) = self.in_params.iter_mut().find(|p| p.name == name) {
            existing.value = value;
            return;
        }
        self.in_params.push(InputParam { name, value });
        self.in_params.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Add every non-undefined parameter of `params`.
    pub fn merge_params(&mut self, params: &[InputParam]) {
        for p in params {
            if p.value.is_undefined() {
                continue;
            }
            self.set_param(p.name.clone(), p.value.clone());
        }
    }

    /// Add undefined placeholders for required inputs that are missing.
    pub fn add_missing_required_params(&mut self) {
        let missing: Vec<String> = self
            .schema
            .iterate_arguments()
            .filter(|a| a.is_required() && self.get_param(&a.name).is_none())
            .map(|a| a.name.clone())
            .collect();
        for name in missing {
            self.set_param(name, Value::Undefined);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn invert(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterExpression {
    pub expression: Box<Expression>,
    pub filter: BooleanExpression,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectionExpression {
    pub expression: Box<Expression>,
    pub args: Vec<String>,
    #[serde(default)]
    pub computations: Vec<Value>,
    #[serde(default)]
    pub aliases: Vec<Option<String>>,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortExpression {
    pub expression: Box<Expression>,
    pub value: Value,
    pub direction: SortDirection,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexExpression {
    pub expression: Box<Expression>,
    pub indices: Vec<Value>,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceExpression {
    pub expression: Box<Expression>,
    pub base: Value,
    pub limit: Value,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationExpression {
    pub expression: Box<Expression>,
    /// `*` for counting results.
    pub field: String,
    pub operator: String,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorExpression {
    pub expression: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinExpression {
    pub lhs: Box<Expression>,
    pub rhs: Box<Expression>,
    pub schema: Arc<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Invocation(Invocation),
    Filter(FilterExpression),
    Projection(ProjectionExpression),
    Sort(SortExpression),
    Index(IndexExpression),
    Slice(SliceExpression),
    Aggregation(AggregationExpression),
    Monitor(MonitorExpression),
    Join(JoinExpression),
}

impl From<Invocation> for Expression {
    fn from(invocation: Invocation) -> Self {
        Expression::Invocation(invocation)
    }
}

impl Expression {
    pub fn filter(inner: Expression, filter: BooleanExpression) -> Self {
        let schema = inner.schema().clone();
        Expression::Filter(FilterExpression {
            expression: Box::new(inner),
            filter,
            schema,
        })
    }

    pub fn projection(inner: Expression, args: Vec<String>) -> Self {
        Self::projection_with_computations(inner, args, Vec::new(), Vec::new())
    }

    pub fn projection_with_computations(
        inner: Expression,
        args: Vec<String>,
        computations: Vec<Value>,
        aliases: Vec<Option<String>>,
    ) -> Self {
        let computed: Vec<String> = computations
            .iter()
            .enumerate()
            .map(|(i, c)| {
                aliases
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| computation_name(c))
            })
            .collect();
        let schema = Arc::new(inner.schema().project(&args, &computed));
        Expression::Projection(ProjectionExpression {
            expression: Box::new(inner),
            args,
            computations,
            aliases,
            schema,
        })
    }

    pub fn sort(inner: Expression, value: Value, direction: SortDirection) -> Self {
        let schema = inner.schema().clone();
        Expression::Sort(SortExpression {
            expression: Box::new(inner),
            value,
            direction,
            schema,
        })
    }

    pub fn index(inner: Expression, indices: Vec<Value>) -> Self {
        let schema = if indices.len() == 1 && matches!(indices[0], Value::Number(_)) {
            let mut clone = (**inner.schema()).clone();
            clone.is_list = false;
            Arc::new(clone)
        } else {
            inner.schema().clone()
        };
        Expression::Index(IndexExpression {
            expression: Box::new(inner),
            indices,
            schema,
        })
    }

    pub fn slice(inner: Expression, base: Value, limit: Value) -> Self {
        let schema = inner.schema().clone();
        Expression::Slice(SliceExpression {
            expression: Box::new(inner),
            base,
            limit,
            schema,
        })
    }

    pub fn aggregation(inner: Expression, field: impl Into<String>, operator: impl Into<String>) -> Self {
        let field = field.into();
        let operator = operator.into();
        let mut clone = (**inner.schema()).clone();
        let ty = if operator == "count" {
            Type::Number
        } else {
            clone
                .get_argument_type(&field)
                .cloned()
                .unwrap_or(Type::Number)
        };
        clone.is_list = false;
        clone.args.retain(|a| a.is_input());
        clone.args.push(ArgumentDef::output(operator.clone(), ty));
        Expression::Aggregation(AggregationExpression {
            expression: Box::new(inner),
            field,
            operator,
            schema: Arc::new(clone),
        })
    }

    pub fn monitor(inner: Expression, args: Option<Vec<String>>) -> Self {
        let schema = inner.schema().clone();
        Expression::Monitor(MonitorExpression {
            expression: Box::new(inner),
            args,
            schema,
        })
    }

    pub fn join(lhs: Expression, rhs: Expression) -> Self {
        let mut clone = (**lhs.schema()).clone();
        for arg in rhs.schema().iterate_arguments() {
            if !clone.has_argument(&arg.name) {
                clone.args.push(arg.clone());
            }
        }
        clone.is_list = lhs.schema().is_list || rhs.schema().is_list;
        Expression::Join(JoinExpression {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            schema: Arc::new(clone),
        })
    }

    pub fn schema(&self) -> &Arc<FunctionDef> {
        match self {
            Expression::Invocation(inv) => &inv.schema,
            Expression::Filter(e) => &e.schema,
            Expression::Projection(e) => &e.schema,
            Expression::Sort(e) => &e.schema,
            Expression::Index(e) => &e.schema,
            Expression::Slice(e) => &e.schema,
            Expression::Aggregation(e) => &e.schema,
            Expression::Monitor(e) => &e.schema,
            Expression::Join(e) => &e.schema,
        }
    }

    /// The wrapped expression of unary nodes.
    pub fn inner(&self) -> Option<&Expression> {
        match self {
            Expression::Invocation(_) | Expression::Join(_) => None,
            Expression::Filter(e) => Some(&e.expression),
            Expression::Projection(e) => Some(&e.expression),
            Expression::Sort(e) => Some(&e.expression),
            Expression::Index(e) => Some(&e.expression),
            Expression::Slice(e) => Some(&e.expression),
            Expression::Aggregation(e) => Some(&e.expression),
            Expression::Monitor(e) => Some(&e.expression),
        }
    }

    pub fn inner_mut(&mut self) -> Option<&mut Expression> {
        match self {
            Expression::Invocation(_) | Expression::Join(_) => None,
            Expression::Filter(e) => Some(&mut e.expression),
            Expression::Projection(e) => Some(&mut e.expression),
            Expression::Sort(e) => Some(&mut e.expression),
            Expression::Index(e) => Some(&mut e.expression),
            Expression::Slice(e) => Some(&mut e.expression),
            Expression::Aggregation(e) => Some(&mut e.expression),
            Expression::Monitor(e) => Some(&mut e.expression),
        }
    }

    pub fn is_action(&self) -> bool {
        self.schema().is_action()
    }

    pub fn is_monitor(&self) -> bool {
        matches!(self, Expression::Monitor(_))
    }

    pub fn as_invocation(&self) -> Option<&Invocation> {
        match self {
            Expression::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    pub fn as_filter(&self) -> Option<&FilterExpression> {
        match self {
            Expression::Filter(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_projection(&self) -> Option<&ProjectionExpression> {
        match self {
            Expression::Projection(p) => Some(p),
            _ => None,
        }
    }

    /// The innermost invocation, following the right side of joins.
    pub fn invocation(&self) -> Option<&Invocation> {
        match self {
            Expression::Invocation(inv) => Some(inv),
            Expression::Join(j) => j.rhs.invocation(),
            other => other.inner().and_then(Expression::invocation),
        }
    }

    pub fn invocation_mut(&mut self) -> Option<&mut Invocation> {
        match self {
            Expression::Invocation(inv) => Some(inv),
            Expression::Join(j) => j.rhs.invocation_mut(),
            other => other.inner_mut().and_then(Expression::invocation_mut),
        }
    }

    /// Strip outer projections.
    pub fn strip_projections(&self) -> &Expression {
        match self {
            Expression::Projection(p) => p.expression.strip_projections(),
            other => other,
        }
    }
}

/// Name used for the output of a computed projection.
pub fn computation_name(value: &Value) -> String {
    match value {
        Value::VarRef(name) => name.clone(),
        Value::Computation { op, .. } if op.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            op.clone()
        }
        _ => "result".to_string(),
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.selector.kind)?;
        if self.selector.id.is_some() || self.selector.all || !self.selector.attributes.is_empty() {
            let mut parts: Vec<String> = Vec::new();
            if let Some(id) = &self.selector.id {
                parts.push(format!("id={:?}", id));
            }
            if self.selector.all {
                parts.push("all=true".to_string());
            }
            for attr in &self.selector.attributes {
                parts.push(format!("{}={}", attr.name, attr.value));
            }
            write!(f, "({})", parts.join(", "))?;
        }
        write!(f, ".{}(", self.channel)?;
        for (i, p) in self.in_params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", p.name, p.value)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Invocation(inv) => write!(f, "{}", inv),
            Expression::Filter(e) => write!(f, "({}), {}", e.expression, e.filter),
            Expression::Projection(e) => {
                let mut names = e.args.clone();
                names.extend(e.computations.iter().map(|c| c.to_string()));
                write!(f, "[{}] of ({})", names.join(", "), e.expression)
            }
            Expression::Sort(e) => write!(
                f,
                "sort({} {} of ({}))",
                e.value,
                e.direction.as_str(),
                e.expression
            ),
            Expression::Index(e) => {
                let indices: Vec<String> = e.indices.iter().map(|v| v.to_string()).collect();
                write!(f, "({})[{}]", e.expression, indices.join(", "))
            }
            Expression::Slice(e) => write!(f, "({})[{} : {}]", e.expression, e.base, e.limit),
            Expression::Aggregation(e) if e.operator == "count" => {
                write!(f, "count({})", e.expression)
            }
            Expression::Aggregation(e) => write!(f, "{}({} of ({}))", e.operator, e.field, e.expression),
            Expression::Monitor(e) => write!(f, "monitor({})", e.expression),
            Expression::Join(e) => write!(f, "({}) join ({})", e.lhs, e.rhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::restaurant_schema;

    #[test]
    fn test_set_param_keeps_order() {
        let mut inv = Invocation::new(restaurant_schema());
        inv.set_param("near", Value::Location("palo alto".into()));
        inv.set_param("book_day", Value::Undefined);
        inv.set_param("near", Value::Location("stanford".into()));

        let names: Vec<&str> = inv.in_params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["book_day", "near"]);
        assert_eq!(inv.get_param("near"), Some(&Value::Location("stanford".into())));
    }

    #[test]
    fn test_index_single_is_not_list() {
        let table = Expression::from(Invocation::new(restaurant_schema()));
        assert!(table.schema().is_list);

        let sorted = Expression::sort(table, Value::var_ref("rating"), SortDirection::Desc);
        let indexed = Expression::index(sorted, vec![Value::Number(1.0)]);
        assert!(!indexed.schema().is_list);
        assert_eq!(indexed.invocation().unwrap().channel, "restaurant");
    }

    #[test]
    fn test_aggregation_schema() {
        let table = Expression::from(Invocation::new(restaurant_schema()));
        let count = Expression::aggregation(table, "*", "count");
        assert!(!count.schema().is_list);
        assert_eq!(count.schema().get_argument_type("count"), Some(&Type::Number));
        assert!(count.schema().id_type().is_none());
        assert_eq!(count.to_string(), "count(@com.yelp.restaurant())");
    }

    #[test]
    fn test_computation_name() {
        assert_eq!(computation_name(&Value::var_ref("price")), "price");
        let distance = Value::Computation {
            op: "distance".into(),
            operands: vec![Value::var_ref("geo")],
        };
        assert_eq!(computation_name(&distance), "distance");
        let plus = Value::Computation {
            op: "+".into(),
            operands: vec![],
        };
        assert_eq!(computation_name(&plus), "result");
    }
}
