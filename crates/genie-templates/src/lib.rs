//! Phrase library loading and placeholder rendering for Genie

mod choices;
mod library;
mod loader;
mod renderer;

pub use choices::expand_choices;
pub use library::{FunctionPhrases, PhraseLibrary, ResultPhrases};
pub use loader::PhraseLoader;
pub use renderer::PhraseRenderer;
