//! Checks that recorded edit scripts rebuild the statements handlers produce

use std::sync::Arc;

use genie_core::{DiagnosticsSink, LevenshteinReport, NullSink, Result};
use genie_thingtalk::{
    DialogueHistoryItem, DialogueState, ExpressionStatement, LevenshteinDelta, apply_levenshtein,
    apply_multiple_levenshtein,
};
use tracing::trace;

use crate::ast_manip::adjust_default_parameters;
use crate::config::PolicyConfig;
use crate::context_info::ContextInfo;
use crate::state_manip::propagate_device_ids;

/// Compare the result of applying `deltas` to `old` with `expected`.
///
/// `applied` is used as is when the caller already applied the deltas.
/// Mismatches go to `sink`; the return value says whether both agree.
pub fn verify_levenshtein(
    sink: &dyn DiagnosticsSink,
    label: &str,
    old: &ExpressionStatement,
    deltas: &[LevenshteinDelta],
    applied: Option<&ExpressionStatement>,
    expected: &ExpressionStatement,
) -> bool {
    let applied = match applied {
        Some(applied) => applied.clone(),
        None => apply_multiple_levenshtein(old, deltas),
    };
    let applied = applied.to_string();
    let expected = expected.to_string();
    if applied == expected {
        trace!(label, "Levenshtein delta verified");
        return true;
    }
    sink.report(LevenshteinReport::new(
        label,
        old.to_string(),
        deltas.iter().map(ToString::to_string).collect(),
        Some(applied),
        expected,
    ));
    false
}

/// Verifies the deltas attached to new history items.
#[derive(Clone)]
pub struct Verifier {
    sink: Arc<dyn DiagnosticsSink>,
    enabled: bool,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Verifier {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { sink, enabled: true }
    }

    pub fn disabled() -> Self {
        Self {
            sink: Arc::new(NullSink),
            enabled: false,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        if !config.verify_levenshtein {
            return Ok(Self::disabled());
        }
        Ok(Self::new(config.diagnostics.build_sink()?))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check every item of `new_state` that was created at this turn and
    /// carries a delta. Returns the number of mismatches.
    pub fn check_state(&self, label: &str, ctx: &ContextInfo, new_state: &DialogueState) -> usize {
        if !self.enabled {
            return 0;
        }
        let old = ctx
            .current()
            .map(|item| item.statement.as_ref().clone())
            .unwrap_or_else(|| ExpressionStatement::new(Vec::new()));

        let mut mismatches = 0;
        for item in &new_state.history {
            let Some(delta) = &item.levenshtein else {
                continue;
            };
            let carried = ctx
                .state
                .history
                .iter()
                .any(|previous| Arc::ptr_eq(&previous.statement, &item.statement));
            if item.is_executed() || carried {
                continue;
            }

            let rebuilt = DialogueHistoryItem::new(
                apply_levenshtein(&old, delta),
                item.confirm,
            );
            let mut rebuilt = propagate_device_ids(&ctx.state, ctx.current_idx, vec![rebuilt]);
            let Some(mut rebuilt) = rebuilt.pop() else {
                continue;
            };
            adjust_default_parameters(Arc::make_mut(&mut rebuilt.statement));

            if !verify_levenshtein(
                self.sink.as_ref(),
                label,
                &old,
                std::slice::from_ref(delta),
                Some(&rebuilt.statement),
                &item.statement,
            ) {
                mismatches += 1;
            }
        }
        mismatches
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier").field("enabled", &self.enabled).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_manip::{add_query, attach_levenshtein};
    use crate::test_util::*;
    use genie_core::MemorySink;
    use genie_thingtalk::{BooleanExpression, ConfirmationState, Expression, Value};

    fn cheap() -> BooleanExpression {
        BooleanExpression::atom("price", "==", Value::enumerated("cheap"))
    }

    #[test]
    fn test_matching_delta() {
        let sink = MemorySink::new();
        let old = statement(restaurants());
        let delta = LevenshteinDelta::continuing(statement(Expression::filter(restaurants(), cheap())));
        let expected = statement(Expression::filter(restaurants(), cheap()));
        assert!(verify_levenshtein(&sink, "refine", &old, &[delta], None, &expected));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_mismatch_is_reported() {
        let sink = MemorySink::new();
        let old = statement(restaurants());
        let delta = LevenshteinDelta::continuing(statement(Expression::filter(restaurants(), cheap())));
        let expected = statement(restaurants());
        assert!(!verify_levenshtein(&sink, "refine", &old, &[delta], None, &expected));
        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].label, "refine");
        assert_eq!(reports[0].deltas.len(), 1);
        assert_eq!(reports[0].expected, expected.to_string());
    }

    #[test]
    fn test_check_state() {
        let sink = MemorySink::new();
        let verifier = Verifier::new(Arc::new(sink.clone()));
        let ctx = ContextInfo::get(&search_state(vec![restaurant_result("r1", "cheap", 4.0)])).unwrap();
        let refined = Expression::filter(restaurants(), cheap());
        let state = add_query(&ctx, "execute", refined.clone(), ConfirmationState::Accepted);

        let good = attach_levenshtein(state.clone(), LevenshteinDelta::continuing(statement(refined)));
        assert_eq!(verifier.check_state("refine", &ctx, &good), 0);

        let bad = attach_levenshtein(state, LevenshteinDelta::continuing(statement(restaurants())));
        assert_eq!(verifier.check_state("refine", &ctx, &bad), 1);
        assert_eq!(sink.len(), 1);

        assert_eq!(Verifier::disabled().check_state("refine", &ctx, &bad), 0);
    }
}
