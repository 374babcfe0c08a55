//! Derived view over a dialogue state: which item is current, which is next

use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

use genie_core::{Result, ensure_invariant};
use genie_thingtalk::{
    ConfirmationState, DialogueHistoryItem, DialogueState, FunctionDef, ResultItem, Type, Value,
};

use crate::cache::ContextCache;
use crate::result_info::{NextStatementInfo, ResultInfo};
use crate::slot_bag::AgentAux;

pub const POLICY_NAME: &str = "org.thingpedia.dialogue.transaction";

/// Flattened summary of a context, used to match phrases against contexts
/// without comparing whole trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ContextKey {
    pub current_function: Option<String>,
    pub next_function: Option<String>,
    pub current_table_function: Option<String>,
    /// Type of the `id` of the current results.
    pub id_type: Option<Type>,
    /// Ids of the top three results.
    pub id0: Option<String>,
    pub id1: Option<String>,
    pub id2: Option<String>,
    pub result_length: usize,
    pub aggregation_count: Option<i64>,
    pub is_monitorable: bool,
}

#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub state: Arc<DialogueState>,
    pub current_idx: Option<usize>,
    pub next_idx: Option<usize>,
    pub previous_domain_idx: Option<usize>,
    pub proposed_skip: usize,
    pub current_function: Option<Arc<FunctionDef>>,
    pub current_table_function: Option<Arc<FunctionDef>>,
    pub next_function: Option<Arc<FunctionDef>>,
    pub result_info: Option<ResultInfo>,
    pub next_info: Option<NextStatementInfo>,
    pub key: ContextKey,
    pub aux: Option<AgentAux>,
}

fn to_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Undefined => None,
        Value::Entity { value: None, display: None, .. } => None,
        other => Some(other.to_key_string()),
    }
}

impl ContextInfo {
    /// Context of a state, memoized in the process-wide cache.
    pub fn get(state: &DialogueState) -> Result<Arc<ContextInfo>> {
        ContextCache::global().get_or_compute(state, ContextInfo::compute)
    }

    /// Like [`ContextInfo::get`], with no state meaning the start of the dialogue.
    pub fn get_or_initial(state: Option<&DialogueState>) -> Result<Arc<ContextInfo>> {
        match state {
            Some(state) => Self::get(state),
            None => Ok(Arc::new(Self::initial())),
        }
    }

    pub fn initial() -> ContextInfo {
        let state = Arc::new(DialogueState::new(POLICY_NAME, "sys_init", None));
        Self::build(state, None, None, None, 0, None, None, None, None, None)
    }

    /// Classify a state without consulting the cache.
    pub fn compute(state: Arc<DialogueState>) -> Result<ContextInfo> {
        let mut next_idx = None;
        let mut next_info = None;
        let mut next_function = None;
        let mut current_idx: Option<usize> = None;
        let mut current_function = None;
        let mut current_table_function = None;
        let mut current_device: Option<String> = None;
        let mut current_result_info: Option<ResultInfo> = None;
        let mut previous_domain_idx = None;
        let mut proposed_skip = 0;

        for (idx, item) in state.history.iter().enumerate() {
            let schema = item.statement.schema();
            let device = item.device();
            if let (Some(current), Some(device)) = (current_device.as_deref(), device) {
                if current != device {
                    previous_domain_idx = current_idx;
                }
            }
            if item.confirm == ConfirmationState::Proposed {
                proposed_skip += 1;
                continue;
            }
            if item.results.is_none() {
                next_idx = Some(idx);
                next_function = schema;
                next_info = Some(NextStatementInfo::new(
                    current_idx.map(|i| &state.history[i]),
                    current_result_info.as_ref(),
                    item,
                )?);
                break;
            }

            ensure_invariant!(
                proposed_skip == 0,
                "executed item {} follows a proposed item",
                idx
            );
            current_device = device.map(str::to_string);
            current_function = schema;
            if let Some(table) = item.statement.last_query() {
                current_table_function = Some(table.schema().clone());
            }
            current_idx = Some(idx);
            current_result_info = Some(ResultInfo::new(&state, item)?);
        }

        if let (Some(next), Some(current)) = (next_idx, current_idx) {
            ensure_invariant!(
                next == current + 1 + proposed_skip,
                "next item {} does not follow current item {} (skipped {})",
                next,
                current,
                proposed_skip
            );
        }
        if let Some(previous) = previous_domain_idx {
            ensure_invariant!(
                current_idx.is_some_and(|current| previous <= current),
                "previous domain item {} after current item",
                previous
            );
        }

        trace!(
            current = ?current_idx,
            next = ?next_idx,
            proposed = proposed_skip,
            "Computed context"
        );
        Ok(Self::build(
            state,
            current_table_function,
            current_function,
            current_result_info,
            proposed_skip,
            previous_domain_idx,
            current_idx,
            next_idx,
            next_function,
            next_info,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        state: Arc<DialogueState>,
        current_table_function: Option<Arc<FunctionDef>>,
        current_function: Option<Arc<FunctionDef>>,
        result_info: Option<ResultInfo>,
        proposed_skip: usize,
        previous_domain_idx: Option<usize>,
        current_idx: Option<usize>,
        next_idx: Option<usize>,
        next_function: Option<Arc<FunctionDef>>,
        next_info: Option<NextStatementInfo>,
    ) -> ContextInfo {
        let mut key = ContextKey {
            current_function: current_function.as_ref().map(|f| f.qualified_name()),
            next_function: next_function.as_ref().map(|f| f.qualified_name()),
            current_table_function: current_table_function.as_ref().map(|f| f.qualified_name()),
            is_monitorable: current_function.as_ref().is_some_and(|f| f.is_monitorable),
            ..Default::default()
        };

        if let (Some(info), Some(idx)) = (&result_info, current_idx) {
            key.id_type = info.id_type.clone();
            let results = state.history[idx]
                .results
                .as_ref()
                .map(|r| r.results.as_slice())
                .unwrap_or_default();
            key.result_length = results.len();
            key.id0 = to_id(results.first().and_then(ResultItem::id));
            key.id1 = to_id(results.get(1).and_then(ResultItem::id));
            key.id2 = to_id(results.get(2).and_then(ResultItem::id));
            if info.is_aggregation {
                key.aggregation_count = results
                    .first()
                    .and_then(|r| r.get("count"))
                    .and_then(Value::as_number)
                    .map(|n| n as i64);
            }
        }

        ContextInfo {
            state,
            current_idx,
            next_idx,
            previous_domain_idx,
            proposed_skip,
            current_function,
            current_table_function,
            next_function,
            result_info,
            next_info,
            key,
            aux: None,
        }
    }

    /// An uncached copy carrying what the agent just said.
    pub fn with_aux(&self, aux: AgentAux) -> ContextInfo {
        ContextInfo {
            aux: Some(aux),
            ..self.clone()
        }
    }

    pub fn results(&self) -> Option<&[ResultItem]> {
        self.current()
            .and_then(|item| item.results.as_ref())
            .map(|r| r.results.as_slice())
    }

    pub fn error(&self) -> Option<&Value> {
        self.current()
            .and_then(|item| item.results.as_ref())
            .and_then(|r| r.error.as_ref())
    }

    pub fn current(&self) -> Option<&DialogueHistoryItem> {
        self.current_idx.map(|i| &self.state.history[i])
    }

    pub fn next(&self) -> Option<&DialogueHistoryItem> {
        self.next_idx.map(|i| &self.state.history[i])
    }

    pub fn previous_domain(&self) -> Option<&DialogueHistoryItem> {
        self.previous_domain_idx.map(|i| &self.state.history[i])
    }

    pub fn is_multi_domain(&self) -> bool {
        self.previous_domain_idx.is_some()
    }

    pub fn clone_state(&self) -> DialogueState {
        self.state.as_ref().clone()
    }
}
