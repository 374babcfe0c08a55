use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

static CHOICE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{([^{}$]*\|[^{}]*)\}").ok());

/// Expand `{a|b|c}` choice groups. Without a random source the first
/// alternative is taken.
pub fn expand_choices<R: Rng>(text: &str, mut rng: Option<&mut R>) -> String {
    let Some(re) = CHOICE.as_ref() else {
        return text.to_string();
    };
    re.replace_all(text, |caps: &regex::Captures| {
        let options: Vec<&str> = caps[1].split('|').collect();
        let idx = match rng.as_deref_mut() {
            Some(rng) => rng.gen_range(0..options.len()),
            None => 0,
        };
        options[idx].to_string()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_first_choice() {
        let text = "{hello|hi}{!|,} {how can i help you|what can i do for you}?";
        assert_eq!(expand_choices::<StdRng>(text, None), "hello! how can i help you?");
    }

    #[test]
    fn test_placeholders_untouched() {
        assert_eq!(
            expand_choices::<StdRng>("${name} is {great|nice}", None),
            "${name} is great"
        );
    }

    #[test]
    fn test_random_choice_is_an_option() {
        let mut rng = StdRng::seed_from_u64(7);
        let out = expand_choices(&"{a|b|c}".repeat(3), Some(&mut rng));
        assert_eq!(out.len(), 3);
        assert!(out.chars().all(|c| "abc".contains(c)));
    }
}
