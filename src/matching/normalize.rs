use std::sync::LazyLock;

use regex::Regex;
use unaccent::unaccent;

static RE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("punctuation regex"));
static RE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Normalize a title or artist for comparison: lowercase, strip diacritics,
/// remove punctuation, collapse whitespace.
pub fn normalize(input: &str) -> String {
    let lowered = unaccent(input).to_lowercase();
    let no_punct = RE_PUNCT.replace_all(lowered.trim(), "");
    let collapsed = RE_SPACE.replace_all(&no_punct, " ");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_lowercases() {
        assert_eq!(normalize("Don't Stop Me Now!"), "dont stop me now");
        assert_eq!(normalize("Mr. Brightside"), "mr brightside");
    }

    #[test]
    fn strips_diacritics() {
        assert_eq!(normalize("Beyoncé"), "beyonce");
        assert_eq!(normalize("Sigur Rós"), "sigur ros");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  Multiple   Spaces  "), "multiple spaces");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!!!"), "");
    }
}
