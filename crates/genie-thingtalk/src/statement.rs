//! Expression statements (chains of expressions)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::expression::Expression;
use crate::schema::FunctionDef;
use crate::slots::{Slot, iterate_slots};

/// A statement is a chain of expressions: an optional stream or query
/// followed by an optional action. Single-expression statements are the
/// common case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionStatement {
    pub expressions: Vec<Expression>,
}

impl From<Expression> for ExpressionStatement {
    fn from(expression: Expression) -> Self {
        Self::single(expression)
    }
}

impl ExpressionStatement {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Self { expressions }
    }

    pub fn single(expression: Expression) -> Self {
        Self {
            expressions: vec![expression],
        }
    }

    /// A query followed by an action.
    pub fn chain(first: Expression, second: Expression) -> Self {
        Self {
            expressions: vec![first, second],
        }
    }

    pub fn first(&self) -> Option<&Expression> {
        self.expressions.first()
    }

    pub fn last(&self) -> Option<&Expression> {
        self.expressions.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Expression> {
        self.expressions.last_mut()
    }

    fn last_query_index(&self) -> Option<usize> {
        let last = self.expressions.last()?;
        if last.is_action() {
            if self.expressions.len() == 1 {
                None
            } else {
                Some(self.expressions.len() - 2)
            }
        } else {
            Some(self.expressions.len() - 1)
        }
    }

    /// The last expression that is not an action.
    pub fn last_query(&self) -> Option<&Expression> {
        self.last_query_index().map(|i| &self.expressions[i])
    }

    pub fn last_query_mut(&mut self) -> Option<&mut Expression> {
        let idx = self.last_query_index()?;
        self.expressions.get_mut(idx)
    }

    pub fn stream(&self) -> Option<&Expression> {
        self.expressions.first().filter(|e| e.is_monitor())
    }

    /// Schema of the last expression; a list if any expression is a list,
    /// monitorable only if every expression is.
    pub fn schema(&self) -> Option<Arc<FunctionDef>> {
        let last = self.expressions.last()?;
        if self.expressions.len() == 1 {
            return Some(last.schema().clone());
        }
        let mut clone = (**last.schema()).clone();
        clone.is_list = self.expressions.iter().any(|e| e.schema().is_list);
        clone.is_monitorable = self.expressions.iter().all(|e| e.schema().is_monitorable);
        Some(Arc::new(clone))
    }

    pub fn is_action(&self) -> bool {
        self.last().is_some_and(Expression::is_action)
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.expressions.iter().flat_map(iterate_slots).collect()
    }

    /// No slot is left undefined.
    pub fn is_executable(&self) -> bool {
        self.slots().iter().all(|s| !s.value.is_undefined())
    }
}

impl fmt::Display for ExpressionStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.expressions.iter().enumerate() {
            if i > 0 {
                write!(f, " => ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, ";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Invocation;
    use crate::test_util::{reservation_schema, restaurant_schema};
    use crate::value::Value;

    #[test]
    fn test_last_query_of_chain() {
        let query = Expression::from(Invocation::new(restaurant_schema()));
        let action = Expression::from(
            Invocation::new(reservation_schema()).with_param("restaurant", Value::var_ref("id")),
        );
        let stmt = ExpressionStatement::chain(query.clone(), action.clone());

        assert_eq!(stmt.last_query(), Some(&query));
        assert!(stmt.is_action());
        let schema = stmt.schema().unwrap();
        assert_eq!(schema.name, "make_reservation");
        assert!(schema.is_list);

        let action_only = ExpressionStatement::single(action);
        assert!(action_only.last_query().is_none());
        assert!(action_only.stream().is_none());
    }

    #[test]
    fn test_executable() {
        let mut inv = Invocation::new(reservation_schema());
        inv.add_missing_required_params();
        let stmt = ExpressionStatement::single(inv.clone().into());
        assert!(!stmt.is_executable());

        inv.set_param("book_time", Value::Time { hour: 19, minute: 0 });
        inv.set_param("book_people", Value::Number(2.0));
        inv.set_param(
            "restaurant",
            Value::entity("str:1", "com.yelp:restaurant", Some("Nola")),
        );
        let stmt = ExpressionStatement::single(inv.into());
        assert!(stmt.is_executable());
    }
}
