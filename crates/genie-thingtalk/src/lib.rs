//! In-process representation of the ThingTalk dialogue state consumed by the
//! Genie dialogue policy

pub mod boolean;
pub mod dialogue;
pub mod expression;
pub mod levenshtein;
pub mod schema;
pub mod slots;
pub mod statement;
pub mod types;
pub mod value;

#[cfg(test)]
mod test_util;

pub use boolean::{AtomBooleanExpression, BooleanExpression, ComputeBooleanExpression, ExternalBooleanExpression};
pub use dialogue::{
    ActParam, ConfirmationState, DialogueHistoryItem, DialogueState, LARGE_RESULT_THRESHOLD,
    ResultItem, ResultList,
};
pub use expression::{
    AggregationExpression, DeviceSelector, Expression, FilterExpression, IndexExpression,
    InputParam, Invocation, JoinExpression, MonitorExpression, ProjectionExpression,
    SliceExpression, SortDirection, SortExpression, computation_name,
};
pub use levenshtein::{LevenshteinDelta, LevenshteinOp, apply_levenshtein, apply_multiple_levenshtein};
pub use schema::{ArgDirection, ArgumentDef, ConfirmMode, FunctionDef, FunctionType};
pub use slots::{Slot, SlotInfo, iterate_slots, visit_slots_mut};
pub use statement::ExpressionStatement;
pub use types::Type;
pub use value::Value;
