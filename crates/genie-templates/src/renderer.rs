//! Placeholder rendering

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use genie_core::{GenieError, Result};

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").ok());

/// Renders `${param}` phrases. A phrase whose placeholder has no value
/// renders to `None`.
pub struct PhraseRenderer {
    env: Environment<'static>,
}

impl Default for PhraseRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhraseRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Translate placeholders into template expressions, escaping literal
    /// template delimiters.
    fn to_template(phrase: &str) -> String {
        let escaped = phrase.replace("{{", "{{ '{{' }}").replace("{%", "{{ '{%' }}");
        match PLACEHOLDER.as_ref() {
            Some(re) => re
                .replace_all(&escaped, |caps: &regex::Captures| {
                    let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                    format!("{{{{ {} }}}}", name)
                })
                .into_owned(),
            None => escaped,
        }
    }

    /// Names of the placeholders used by a phrase, in order of appearance.
    pub fn placeholders(phrase: &str) -> Vec<String> {
        let Some(re) = PLACEHOLDER.as_ref() else {
            return Vec::new();
        };
        re.captures_iter(phrase)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    pub fn render(&self, phrase: &str, values: &BTreeMap<String, String>) -> Result<Option<String>> {
        let source = Self::to_template(phrase);
        let tmpl = self
            .env
            .template_from_str(&source)
            .map_err(|e| GenieError::Template(e.to_string()))?;
        match tmpl.render(values) {
            Ok(out) => Ok(Some(out)),
            Err(e) if e.kind() == ErrorKind::UndefinedError => Ok(None),
            Err(e) => Err(GenieError::Template(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_placeholders() {
        let renderer = PhraseRenderer::new();
        let out = renderer
            .render("${id} is a $price restaurant", &values(&[("id", "Nola"), ("price", "cheap")]))
            .unwrap();
        assert_eq!(out.as_deref(), Some("Nola is a cheap restaurant"));
    }

    #[test]
    fn test_missing_placeholder_is_none() {
        let renderer = PhraseRenderer::new();
        let out = renderer
            .render("${id} has ${rating} stars", &values(&[("id", "Nola")]))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_literal_braces() {
        let renderer = PhraseRenderer::new();
        let out = renderer.render("{{ not a template }}", &BTreeMap::new()).unwrap();
        assert_eq!(out.as_deref(), Some("{{ not a template }}"));
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(
            PhraseRenderer::placeholders("a table at ${restaurant} for $book_people"),
            vec!["restaurant".to_string(), "book_people".to_string()]
        );
    }
}
