//! Core error types and traits for the Genie dialogue policy

pub mod error;
pub mod traits;
pub mod yaml;

pub use error::{GenieError, Result};
pub use traits::diagnostics::{
    DiagnosticsSink, FileSink, LevenshteinReport, MemorySink, NullSink, TracingSink,
};
