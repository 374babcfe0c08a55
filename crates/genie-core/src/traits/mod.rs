//! Core traits for the Genie dialogue policy

pub mod diagnostics;

pub use diagnostics::DiagnosticsSink;
