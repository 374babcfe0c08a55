//! Context phrases: the tags and rendered descriptions of a state

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use serde::Serialize;

use genie_core::{GenieError, Result};
use genie_templates::{FunctionPhrases, PhraseRenderer, expand_choices};
use genie_thingtalk::{DialogueHistoryItem, DialogueState, Invocation, ResultItem, Value};

use crate::ast_manip::get_invocation;
use crate::context_info::{ContextInfo, POLICY_NAME};
use crate::context_tags::{get_context_phrases_common, tag_context_for_agent};
use crate::library::Thingpedia;

/// Results described one by one at most.
const MAX_CONCAT_RESULTS: usize = 5;

/// A tag of the context, or a phrase rendered from the library for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPhrase {
    pub symbol: String,
    /// Empty for bare tags.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub utterance: String,
    /// How many results the phrase describes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_results: Option<usize>,
}

impl ContextPhrase {
    fn tag(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            utterance: String::new(),
            num_results: None,
        }
    }

    fn rendered(symbol: &str, utterance: String, num_results: Option<usize>) -> Self {
        Self {
            symbol: symbol.to_string(),
            utterance,
            num_results,
        }
    }
}

fn param_values(invocation: &Invocation) -> BTreeMap<String, String> {
    invocation
        .in_params
        .iter()
        .filter(|p| !p.value.is_undefined() && !p.value.is_var_ref())
        .map(|p| (p.name.clone(), p.value.to_display_string()))
        .collect()
}

fn result_values(result: &ResultItem) -> BTreeMap<String, String> {
    result
        .value
        .iter()
        .map(|(name, value)| (name.clone(), value.to_display_string()))
        .collect()
}

struct PhraseBuilder<'a> {
    renderer: PhraseRenderer,
    phrases: Vec<ContextPhrase>,
    library: &'a Thingpedia,
}

impl<'a> PhraseBuilder<'a> {
    /// Render every variant whose placeholders all have values.
    fn render_all(
        &mut self,
        symbol: &str,
        variants: &[String],
        values: &BTreeMap<String, String>,
        num_results: Option<usize>,
    ) -> Result<()> {
        for variant in variants {
            if let Some(text) = self.renderer.render(variant, values)? {
                let text = expand_choices::<StdRng>(&text, None);
                self.phrases.push(ContextPhrase::rendered(symbol, text, num_results));
            }
        }
        Ok(())
    }

    fn function(&self, invocation: &Invocation) -> Option<&'a FunctionPhrases> {
        self.library.phrases().function(&invocation.qualified_name())
    }

    fn describe(&mut self, symbol: &str, item: &DialogueHistoryItem) -> Result<()> {
        let Some(invocation) = get_invocation(item) else {
            return Ok(());
        };
        let Some(function) = self.function(invocation) else {
            return Ok(());
        };
        self.render_all(symbol, &function.description, &param_values(invocation), None)
    }

    fn results(&mut self, item: &DialogueHistoryItem) -> Result<()> {
        let (Some(invocation), Some(results)) = (get_invocation(item), item.results.as_ref()) else {
            return Ok(());
        };
        let Some(function) = self.function(invocation) else {
            return Ok(());
        };
        let params = param_values(invocation);

        if let Some(Value::Enum(code)) = &results.error {
            if let Some(messages) = function.error.get(code) {
                self.render_all("ctx_thingpedia_error_message", messages, &params, None)?;
            }
            return Ok(());
        }
        if results.results.is_empty() {
            return self.render_all("ctx_thingpedia_empty_result", &function.empty, &params, Some(0));
        }

        let with_result = |result: &ResultItem| {
            let mut values = params.clone();
            values.extend(result_values(result));
            values
        };
        let top = &results.results[0];
        self.render_all("ctx_thingpedia_result", &function.result.top, &with_result(top), Some(1))?;

        let count = results.results.len();
        if count > 1 {
            self.render_all("ctx_thingpedia_list_result", &function.result.list, &with_result(top), Some(count))?;
        }

        // longest concatenation first
        let shown = count.min(MAX_CONCAT_RESULTS);
        for n in (2..=shown).rev() {
            for variant in &function.result.list_concat {
                let mut parts = Vec::with_capacity(n);
                for result in &results.results[..n] {
                    match self.renderer.render(variant, &with_result(result))? {
                        Some(text) => parts.push(expand_choices::<StdRng>(&text, None)),
                        None => break,
                    }
                }
                if parts.len() == n {
                    let utterance = join_names(&parts);
                    self.phrases
                        .push(ContextPhrase::rendered("ctx_thingpedia_list_result", utterance, Some(n)));
                }
            }
        }

        if let Some(name_param) = &function.name_param {
            let names: Vec<String> = results
                .results
                .iter()
                .take(MAX_CONCAT_RESULTS)
                .filter_map(|r| r.get(name_param))
                .map(Value::to_display_string)
                .collect();
            if !names.is_empty() {
                let n = names.len();
                self.phrases
                    .push(ContextPhrase::rendered("ctx_result_name_list", join_names(&names), Some(n)));
            }
        }
        Ok(())
    }
}

fn join_names(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// All the context phrases of a state: the agent tags of the context, the
/// descriptive tags, then phrases rendered from the library. No state means
/// the start of the dialogue.
pub fn get_context_phrases_for_state(state: Option<&DialogueState>, library: &Thingpedia) -> Result<Vec<ContextPhrase>> {
    let Some(state) = state else {
        return Ok(vec![ContextPhrase::tag("ctx_init")]);
    };
    if state.policy != POLICY_NAME {
        return Err(GenieError::InvalidState(format!("unknown policy {}", state.policy)));
    }

    let ctx = ContextInfo::get(state)?;
    let mut tags = tag_context_for_agent(&ctx)?;
    get_context_phrases_common(&ctx, &mut tags);

    let mut builder = PhraseBuilder {
        renderer: PhraseRenderer::new(),
        phrases: tags.into_iter().map(ContextPhrase::tag).collect(),
        library,
    };

    if state.dialogue_act == "notification" {
        if let Some(app) = state.dialogue_act_param.as_deref().and_then(|p| p.first()).and_then(|p| p.as_value()) {
            let app = app.to_display_string();
            match library.phrases().notifications.get(&app) {
                Some(names) => {
                    let names = names.clone();
                    builder.render_all("ctx_notification_app_name", &names, &BTreeMap::new(), None)?;
                }
                None => builder
                    .phrases
                    .push(ContextPhrase::rendered("ctx_notification_app_name", app, None)),
            }
        }
    }

    if let Some(current) = ctx.current() {
        builder.describe("ctx_current_statement", current)?;
        if current.statement.last_query().is_some() {
            builder.describe("ctx_current_query", current)?;
        }
        builder.results(current)?;
    }
    if let Some(next) = ctx.next() {
        builder.describe("ctx_next_statement", next)?;
    }
    Ok(builder.phrases)
}
