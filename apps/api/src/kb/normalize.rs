//! Text normalization shared by the KB loader, the phrase extractor and the slugifier.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Anything that is not a word char, whitespace, or one of `/ # + -`.
/// Keeping `#`, `+` and `/` preserves titles like "C# developer" or "UI/UX designer".
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s/#+\-]").expect("valid disallowed-char regex"));

static NON_WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w]+").expect("valid non-word regex"));

/// NFKC-composes, lowercases, drops apostrophes, blanks punctuation and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfkc().collect::<String>().to_lowercase();
    let without_apostrophes: String = composed
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '`'))
        .collect();
    let blanked = DISALLOWED.replace_all(&without_apostrophes, " ");
    blanked.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Filesystem-safe identifier derived from a title.
pub fn slugify(title: &str) -> String {
    let normalized = normalize(title)
        .replace('+', "plus")
        .replace('#', "sharp");
    NON_WORD_RUN
        .replace_all(&normalized, "_")
        .trim_matches('_')
        .to_string()
}

/// "genai intern" -> "Genai Intern". Used when echoing an unresolved phrase back as a title.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("  Senior   Backend\tEngineer "), "senior backend engineer");
    }

    #[test]
    fn test_normalize_keeps_language_symbols() {
        assert_eq!(normalize("C# / C++ Developer!"), "c# / c++ developer");
        assert_eq!(normalize("UI/UX Designer"), "ui/ux designer");
    }

    #[test]
    fn test_normalize_composes_compatibility_forms() {
        // Fullwidth letters fold to ASCII under NFKC.
        assert_eq!(normalize("ＧｅｎＡＩ Intern"), "genai intern");
    }

    #[test]
    fn test_normalize_drops_apostrophes() {
        assert_eq!(normalize("We're hiring"), "were hiring");
    }

    #[test]
    fn test_slugify_replaces_symbols() {
        assert_eq!(slugify("C++ Engineer"), "cplusplus_engineer");
        assert_eq!(slugify("C# Developer"), "csharp_developer");
        assert_eq!(slugify("Data Analyst II"), "data_analyst_ii");
    }

    #[test]
    fn test_slugify_trims_separators() {
        assert_eq!(slugify("  -- Platform / SRE --  "), "platform_sre");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("genai intern"), "Genai Intern");
        assert_eq!(title_case(""), "");
    }
}
