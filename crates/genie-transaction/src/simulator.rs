//! In-memory executor and scripted user for tests and offline simulation

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, trace};

use genie_core::{GenieError, Result};
use genie_thingtalk::{
    AtomBooleanExpression, BooleanExpression, ConfirmMode, ConfirmationState, DialogueHistoryItem, DialogueState,
    Expression, ExpressionStatement, Invocation, ResultItem, ResultList, SortDirection, Value,
};

use crate::interface::{DialogueInterface, UserCommand};
use crate::library::Thingpedia;
use crate::reply::AgentReply;

/// Fixture rows keyed by qualified function name, plus functions that
/// always fail with an error code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureDb {
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<BTreeMap<String, Value>>>,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl FixtureDb {
    pub fn from_yaml(content: &str) -> Result<Self> {
        genie_core::yaml::from_str(content)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    fn rows(&self, function: &str) -> Vec<ResultItem> {
        self.tables
            .get(function)
            .map(|rows| rows.iter().cloned().map(ResultItem::new).collect())
            .unwrap_or_default()
    }
}

/// Position of a value on a numeric scale, for comparisons and sorting.
fn order_key(value: &Value) -> Option<f64> {
    match value {
        Value::Time { hour, minute } => Some(f64::from(*hour) * 60.0 + f64::from(*minute)),
        other => other.as_number(),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    order_key(a)?.partial_cmp(&order_key(b)?)
}

fn same(a: &Value, b: &Value) -> bool {
    a.to_key_string() == b.to_key_string()
}

fn fuzzy(haystack: &Value, needle: &Value) -> bool {
    let needle = needle.to_display_string().to_lowercase();
    haystack.to_display_string().to_lowercase().contains(&needle)
}

fn atom_matches(value: &Value, operator: &str, expected: &Value) -> bool {
    match operator {
        "==" => same(value, expected),
        "!=" => !same(value, expected),
        "=~" => fuzzy(value, expected),
        ">=" => compare(value, expected).is_some_and(Ordering::is_ge),
        "<=" => compare(value, expected).is_some_and(Ordering::is_le),
        ">" => compare(value, expected).is_some_and(Ordering::is_gt),
        "<" => compare(value, expected).is_some_and(Ordering::is_lt),
        "contains" => value.as_array().is_some_and(|values| values.iter().any(|v| same(v, expected))),
        "contains~" => value.as_array().is_some_and(|values| values.iter().any(|v| fuzzy(v, expected))),
        "in_array" => expected.as_array().is_some_and(|values| values.iter().any(|v| same(value, v))),
        "in_array~" => expected.as_array().is_some_and(|values| values.iter().any(|v| fuzzy(value, v))),
        _ => false,
    }
}

/// Replace a parameter reference by the value of the row it refers to.
fn resolve<'a>(value: &'a Value, env: Option<&'a ResultItem>) -> Option<&'a Value> {
    match value {
        Value::VarRef(name) => env?.get(name),
        other => Some(other),
    }
}

fn filter_matches(row: &ResultItem, filter: &BooleanExpression, env: Option<&ResultItem>) -> Result<bool> {
    Ok(match filter {
        BooleanExpression::True | BooleanExpression::DontCare { .. } => true,
        BooleanExpression::False => false,
        BooleanExpression::Not { expr } => !filter_matches(row, expr, env)?,
        BooleanExpression::And { operands } => {
            for operand in operands {
                if !filter_matches(row, operand, env)? {
                    return Ok(false);
                }
            }
            true
        }
        BooleanExpression::Or { operands } => {
            for operand in operands {
                if filter_matches(row, operand, env)? {
                    return Ok(true);
                }
            }
            false
        }
        BooleanExpression::Atom(AtomBooleanExpression { name, operator, value }) => {
            match (row.get(name), resolve(value, env)) {
                (Some(actual), Some(expected)) => atom_matches(actual, operator, expected),
                _ => false,
            }
        }
        other => {
            return Err(GenieError::Executor(format!("unsupported filter {}", other)));
        }
    })
}

fn one_based(value: &Value, len: usize) -> Option<usize> {
    let n = value.as_number()? as i64;
    let idx = if n < 0 { len as i64 + n } else { n - 1 };
    usize::try_from(idx).ok().filter(|idx| *idx < len)
}

fn aggregate(rows: &[ResultItem], field: &str, operator: &str) -> Result<ResultItem> {
    if operator == "count" {
        return Ok(ResultItem::from_pairs([("count", Value::Number(rows.len() as f64))]));
    }
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(field).and_then(Value::as_number))
        .collect();
    let value = match operator {
        "sum" => values.iter().sum(),
        "avg" if !values.is_empty() => values.iter().sum::<f64>() / values.len() as f64,
        "min" => values.iter().copied().reduce(f64::min).unwrap_or(0.0),
        "max" => values.iter().copied().reduce(f64::max).unwrap_or(0.0),
        "avg" => 0.0,
        other => return Err(GenieError::Executor(format!("unknown aggregation {}", other))),
    };
    Ok(ResultItem::from_pairs([(operator, Value::Number(value))]))
}

/// Runs statements against a [`FixtureDb`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    db: FixtureDb,
}

impl SimulatedExecutor {
    pub fn new(db: FixtureDb) -> Self {
        Self { db }
    }

    fn invoke(&self, invocation: &Invocation, env: Option<&ResultItem>) -> Result<Vec<ResultItem>> {
        let name = invocation.qualified_name();
        if !invocation.schema.is_action() {
            return Ok(self.db.rows(&name));
        }

        // actions echo their inputs next to the fixture outputs
        let mut value: BTreeMap<String, Value> = self
            .db
            .rows(&name)
            .into_iter()
            .next()
            .map(|row| row.value)
            .unwrap_or_default();
        for param in &invocation.in_params {
            let resolved = resolve(&param.value, env)
                .ok_or_else(|| GenieError::Executor(format!("unresolved parameter {} of {}", param.name, name)))?;
            value.insert(param.name.clone(), resolved.clone());
        }
        Ok(vec![ResultItem::new(value)])
    }

    /// Evaluate one expression; `env` is the row parameter references read from.
    pub fn evaluate(&self, expr: &Expression, env: Option<&ResultItem>) -> Result<Vec<ResultItem>> {
        match expr {
            Expression::Invocation(invocation) => self.invoke(invocation, env),
            Expression::Filter(f) => {
                let mut rows = Vec::new();
                for row in self.evaluate(&f.expression, env)? {
                    if filter_matches(&row, &f.filter, env)? {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }
            Expression::Projection(p) => {
                let rows = self.evaluate(&p.expression, env)?;
                Ok(rows
                    .into_iter()
                    .map(|row| {
                        ResultItem::new(
                            row.value
                                .into_iter()
                                .filter(|(name, _)| name == "id" || p.args.contains(name))
                                .collect(),
                        )
                    })
                    .collect())
            }
            Expression::Sort(s) => {
                let Value::VarRef(field) = &s.value else {
                    return Err(GenieError::Executor(format!("unsupported sort key {}", s.value)));
                };
                let mut rows = self.evaluate(&s.expression, env)?;
                rows.sort_by(|a, b| {
                    let ordering = match (a.get(field), b.get(field)) {
                        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    match s.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                });
                Ok(rows)
            }
            Expression::Index(i) => {
                let rows = self.evaluate(&i.expression, env)?;
                Ok(i.indices
                    .iter()
                    .filter_map(|index| one_based(index, rows.len()))
                    .map(|idx| rows[idx].clone())
                    .collect())
            }
            Expression::Slice(s) => {
                let rows = self.evaluate(&s.expression, env)?;
                let Some(base) = one_based(&s.base, rows.len()) else {
                    return Ok(Vec::new());
                };
                let limit = s.limit.as_number().map_or(rows.len(), |n| n.max(0.0) as usize);
                Ok(rows.into_iter().skip(base).take(limit).collect())
            }
            Expression::Aggregation(a) => {
                let rows = self.evaluate(&a.expression, env)?;
                Ok(vec![aggregate(&rows, &a.field, &a.operator)?])
            }
            Expression::Monitor(_) | Expression::Join(_) => {
                Err(GenieError::Executor(format!("cannot evaluate {}", expr)))
            }
        }
    }

    /// Run a statement. A query feeding an action passes its first row.
    pub fn execute_statement(&self, stmt: &ExpressionStatement, last: Option<&ResultItem>) -> Result<ResultList> {
        if stmt.stream().is_some() {
            // enabling a rule has no immediate results
            return Ok(ResultList::empty());
        }
        if let Some(action) = stmt.last().and_then(Expression::as_invocation) {
            if let Some(code) = self.db.errors.get(&action.qualified_name()) {
                return Ok(ResultList::with_error(Value::enumerated(code.clone())));
            }
        }

        let mut env = last.cloned();
        let mut rows = Vec::new();
        for expr in &stmt.expressions {
            rows = self.evaluate(expr, env.as_ref())?;
            if let Some(first) = rows.first() {
                env = Some(first.clone());
            } else if stmt.expressions.len() > 1 {
                break;
            }
        }
        Ok(ResultList::new(rows))
    }

    fn can_execute(item: &DialogueHistoryItem) -> bool {
        if item.is_executed() || item.confirm == ConfirmationState::Proposed || !item.statement.is_executable() {
            return false;
        }
        if !item.statement.is_action() {
            return true;
        }
        item.confirm == ConfirmationState::Confirmed
            || item.statement.schema().is_some_and(|schema| schema.confirm != ConfirmMode::Confirm)
    }

    /// Execute pending items in order, stopping at the first one that is
    /// incomplete or still needs the user's confirmation.
    pub fn execute_state(&self, mut state: DialogueState, last_result: Option<&ResultList>) -> Result<DialogueState> {
        let mut last = last_result.and_then(ResultList::top).cloned();
        for item in state.history.iter_mut() {
            if item.is_executed() {
                last = item.results.as_ref().and_then(ResultList::top).cloned();
                continue;
            }
            if !Self::can_execute(item) {
                break;
            }
            let results = self.execute_statement(&item.statement, last.as_ref())?;
            trace!(statement = %item.statement, count = results.results.len(), "executed");
            last = results.top().cloned();
            item.results = Some(results);
        }
        Ok(state)
    }
}

/// One step of a simulation script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    /// Invoke a library function, optionally filtered.
    Request {
        function: String,
        #[serde(default)]
        params: BTreeMap<String, Value>,
        #[serde(default)]
        filter: Vec<AtomBooleanExpression>,
    },
    Answer(Value),
    Act(String),
    Cancel,
}

impl ScriptStep {
    pub fn to_command(&self, library: &Thingpedia) -> Result<UserCommand> {
        match self {
            ScriptStep::Request { function, params, filter } => {
                let schema = library
                    .function(function)
                    .ok_or_else(|| GenieError::Config(format!("unknown function {}", function)))?;
                let mut invocation = Invocation::new(schema.clone());
                for (name, value) in params {
                    invocation.set_param(name.clone(), value.clone());
                }
                invocation.add_missing_required_params();

                let mut expr: Expression = invocation.into();
                if !filter.is_empty() {
                    let atoms = filter.iter().cloned().map(BooleanExpression::Atom).collect();
                    expr = Expression::filter(expr, BooleanExpression::and(atoms).optimize());
                }
                Ok(UserCommand::Request(ExpressionStatement::single(expr)))
            }
            ScriptStep::Answer(value) => Ok(UserCommand::Answer(value.clone())),
            ScriptStep::Act(act) => Ok(UserCommand::Act(act.clone())),
            ScriptStep::Cancel => Ok(UserCommand::Cancel),
        }
    }
}

/// Parse a YAML list of [`ScriptStep`]s into commands.
pub fn load_script(content: &str, library: &Thingpedia) -> Result<Vec<UserCommand>> {
    let steps: Vec<ScriptStep> = genie_core::yaml::from_str(content)?;
    steps.iter().map(|step| step.to_command(library)).collect()
}

/// A reply the agent sent through a [`ScriptedInterface`].
#[derive(Debug, Clone)]
pub struct SentReply {
    pub utterance: String,
    pub dialogue_act: String,
    pub end: bool,
    pub state: DialogueState,
}

struct ScriptedInner {
    commands: Vec<UserCommand>,
    index: usize,
    cycle: bool,
    replies: Vec<SentReply>,
    executions: usize,
}

/// Plays back user commands and records what the agent said.
///
/// Once the commands run out the user leaves, unless cycling.
#[derive(Clone)]
pub struct ScriptedInterface {
    inner: Arc<RwLock<ScriptedInner>>,
    executor: Arc<SimulatedExecutor>,
}

impl ScriptedInterface {
    pub fn new(commands: Vec<UserCommand>, executor: SimulatedExecutor) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ScriptedInner {
                commands,
                index: 0,
                cycle: false,
                replies: Vec::new(),
                executions: 0,
            })),
            executor: Arc::new(executor),
        }
    }

    pub fn with_cycle(self, cycle: bool) -> Self {
        self.inner.write().cycle = cycle;
        self
    }

    pub fn replies(&self) -> Vec<SentReply> {
        self.inner.read().replies.clone()
    }

    pub fn last_reply(&self) -> Option<SentReply> {
        self.inner.read().replies.last().cloned()
    }

    pub fn reply_count(&self) -> usize {
        self.inner.read().replies.len()
    }

    pub fn execution_count(&self) -> usize {
        self.inner.read().executions
    }
}

#[async_trait]
impl DialogueInterface for ScriptedInterface {
    async fn get_command(&self, _state: Option<&DialogueState>) -> Result<UserCommand> {
        let mut inner = self.inner.write();
        if inner.index >= inner.commands.len() {
            if !inner.cycle || inner.commands.is_empty() {
                return Err(GenieError::Cancelled);
            }
            inner.index = 0;
        }
        let command = inner.commands[inner.index].clone();
        inner.index += 1;
        Ok(command)
    }

    async fn execute(&self, state: DialogueState, last_result: Option<&ResultList>) -> Result<DialogueState> {
        self.inner.write().executions += 1;
        self.executor.execute_state(state, last_result)
    }

    async fn send_reply(&self, utterance: &str, reply: &AgentReply) -> Result<()> {
        debug!(act = %reply.state.dialogue_act, utterance, "agent reply");
        self.inner.write().replies.push(SentReply {
            utterance: utterance.to_string(),
            dialogue_act: reply.state.dialogue_act.clone(),
            end: reply.end,
            state: reply.state.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    fn executor() -> SimulatedExecutor {
        SimulatedExecutor::new(fixture_db())
    }

    fn cheap() -> Expression {
        Expression::filter(restaurants(), BooleanExpression::atom("price", "==", Value::enumerated("cheap")))
    }

    fn ids(rows: &[ResultItem]) -> Vec<String> {
        rows.iter().map(|r| r.id().unwrap().to_key_string()).collect()
    }

    #[test]
    fn test_filter_and_sort() {
        let executor = executor();
        assert_eq!(ids(&executor.evaluate(&cheap(), None).unwrap()), vec!["r2", "r3"]);

        let best = Expression::index(
            Expression::sort(restaurants(), Value::var_ref("rating"), SortDirection::Desc),
            vec![Value::Number(1.0)],
        );
        assert_eq!(ids(&executor.evaluate(&best, None).unwrap()), vec!["r1"]);

        let good = Expression::filter(restaurants(), BooleanExpression::atom("rating", ">=", Value::Number(4.0)));
        assert_eq!(ids(&executor.evaluate(&good, None).unwrap()), vec!["r1", "r3"]);

        let named = Expression::filter(restaurants(), BooleanExpression::atom("id", "=~", Value::string("taco")));
        assert_eq!(ids(&executor.evaluate(&named, None).unwrap()), vec!["r2"]);
    }

    #[test]
    fn test_aggregation() {
        let executor = executor();
        let count = executor.evaluate(&Expression::aggregation(cheap(), "*", "count"), None).unwrap();
        assert_eq!(count[0].get("count"), Some(&Value::Number(2.0)));
        let avg = executor
            .evaluate(&Expression::aggregation(restaurants(), "rating", "avg"), None)
            .unwrap();
        assert_eq!(avg[0].get("avg"), Some(&Value::Number(3.8333333333333335)));
    }

    #[test]
    fn test_execute_stops_at_unconfirmed_action() {
        let executor = executor();
        let state = make_state(
            "execute",
            vec![
                DialogueHistoryItem::new(statement(cheap()), ConfirmationState::Accepted),
                DialogueHistoryItem::new(statement(complete_reservation("r2")), ConfirmationState::Accepted),
            ],
        );
        let state = executor.execute_state(state, None).unwrap();
        assert_eq!(state.history[0].results.as_ref().unwrap().results.len(), 2);
        assert!(!state.history[1].is_executed());

        let mut state = state;
        state.history[1].confirm = ConfirmationState::Confirmed;
        let state = executor.execute_state(state, None).unwrap();
        let result = state.history[1].results.as_ref().unwrap().top().unwrap().clone();
        assert_eq!(result.get("reservation_id"), Some(&Value::string("ABC123")));
        assert_eq!(result.get("restaurant"), Some(&restaurant_entity("r2")));
    }

    #[test]
    fn test_error_fixture() {
        let mut db = fixture_db();
        db.errors.insert("com.yelp.make_reservation".to_string(), "no_table".to_string());
        let results = SimulatedExecutor::new(db)
            .execute_statement(&statement(complete_reservation("r1")), None)
            .unwrap();
        assert_eq!(results.error, Some(Value::enumerated("no_table")));
    }

    #[test]
    fn test_load_script() {
        let script = r#"
- request:
    function: com.yelp.restaurant
    filter:
      - { name: price, operator: "==", value: { enum: cheap } }
- answer: { boolean: true }
- act: learn_more
- cancel
"#;
        let commands = load_script(script, &library()).unwrap();
        assert_eq!(commands.len(), 4);
        let UserCommand::Request(stmt) = &commands[0] else {
            panic!("expected a request");
        };
        assert_eq!(stmt.last().unwrap().as_filter().unwrap().filter, cheap().as_filter().unwrap().filter);
        assert_eq!(commands[1], UserCommand::Answer(Value::Boolean(true)));
        assert_eq!(commands[3], UserCommand::Cancel);

        let unknown = "- request: { function: com.example.nothing }\n";
        assert!(matches!(load_script(unknown, &library()), Err(GenieError::Config(_))));
    }

    #[test]
    fn test_fixture_values_in_map_form() {
        let db = FixtureDb::from_yaml(
            r#"
tables:
  com.example.row:
    - id: { entity: { value: r1, type: com.example:row, display: First } }
      flag: { boolean: true }
      name: { string: hello }
      size: { number: 3 }
      price: { currency: { value: 12.5, code: usd } }
      distance: { measure: { value: 2, unit: km } }
      day: { date: "2020-01-01" }
      at: { time: { hour: 19, minute: 30 } }
      place: { location: palo alto }
      kind: { enum: cheap }
      tags: { array: [{ string: a }, { string: b }] }
      other: undefined
errors:
  com.example.fail: boom
"#,
        )
        .unwrap();
        let row = &db.tables["com.example.row"][0];
        assert_eq!(row["flag"], Value::Boolean(true));
        assert_eq!(row["size"], Value::Number(3.0));
        assert_eq!(
            row["price"],
            Value::Currency {
                value: 12.5,
                code: "usd".to_string()
            }
        );
        assert_eq!(row["at"], Value::Time { hour: 19, minute: 30 });
        assert_eq!(row["kind"], Value::enumerated("cheap"));
        assert_eq!(row["tags"], Value::Array(vec![Value::string("a"), Value::string("b")]));
        assert_eq!(row["other"], Value::Undefined);
        assert!(matches!(&row["id"], Value::Entity { display: Some(d), .. } if d == "First"));
        assert_eq!(db.errors["com.example.fail"], "boom");
    }

    #[tokio::test]
    async fn test_scripted_interface_runs_out() {
        let interface = ScriptedInterface::new(vec![UserCommand::Act("end".to_string())], executor());
        assert_eq!(
            interface.get_command(None).await.unwrap(),
            UserCommand::Act("end".to_string())
        );
        assert!(matches!(interface.get_command(None).await, Err(GenieError::Cancelled)));

        let cycling =
            ScriptedInterface::new(vec![UserCommand::Act("end".to_string())], executor()).with_cycle(true);
        cycling.get_command(None).await.unwrap();
        assert!(cycling.get_command(None).await.is_ok());
    }
}
