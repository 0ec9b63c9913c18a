//! Candidate names and the rules they must satisfy

use std::fmt;

use certy_core::ExtractionConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::{ExtractorError, Result};

/// Boilerplate phrases that disqualify a line from being a name.
///
/// Matched as lowercase substrings, so a surname such as "Awardson" is
/// rejected along with the word "award".
pub const DEFAULT_DENYLIST: &[&str] = &[
    "this certificate",
    "is hereby presented to",
    "for successful completion",
    "date of issue",
    "signature of",
    "program director",
    "has successfully",
    "award",
    "presented by",
    "congratulations",
    "achieved",
    "hereby certifies",
];

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Remove every character that is neither a word character nor whitespace
pub fn strip_punctuation(text: &str) -> String {
    PUNCTUATION.replace_all(text, "").into_owned()
}

/// Uppercase the first character and lowercase the rest
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Word-count bounds and denylist shared by both strategies
#[derive(Debug, Clone, PartialEq)]
pub struct NameRules {
    pub min_words: usize,
    pub max_words: usize,
    pub denylist: Vec<String>,
}

impl Default for NameRules {
    fn default() -> Self {
        Self {
            min_words: 2,
            max_words: 4,
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&ExtractionConfig> for NameRules {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            min_words: config.min_words,
            max_words: config.max_words,
            ..Default::default()
        }
    }
}

impl NameRules {
    pub fn with_word_bounds(mut self, min_words: usize, max_words: usize) -> Self {
        self.min_words = min_words;
        self.max_words = max_words;
        self
    }

    /// First denylisted phrase contained in `text`, ignoring case
    pub fn denied_phrase(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.denylist
            .iter()
            .find(|phrase| lower.contains(phrase.as_str()))
            .map(String::as_str)
    }

    /// Reason `text` is not a valid candidate, or `None` if it is
    pub fn violation(&self, text: &str) -> Option<String> {
        let words: Vec<&str> = text.split_whitespace().collect();

        if words.is_empty() {
            return Some("empty".to_string());
        }
        if words.len() < self.min_words || words.len() > self.max_words {
            return Some(format!(
                "{} words, expected {}..={}",
                words.len(),
                self.min_words,
                self.max_words
            ));
        }
        if text.chars().any(|c| c.is_numeric()) {
            return Some("contains a digit".to_string());
        }
        if let Some(word) = words.iter().find(|w| {
            !w.chars().all(char::is_alphabetic)
                || !w.chars().next().is_some_and(char::is_uppercase)
        }) {
            return Some(format!("word '{word}' is not a capitalised alphabetic word"));
        }
        if let Some(phrase) = self.denied_phrase(text) {
            return Some(format!("contains denylisted phrase '{phrase}'"));
        }
        None
    }
}

/// A validated person-name candidate
///
/// Words are purely alphabetic, start with an uppercase letter and are
/// joined by single spaces. Ordering is by codepoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CandidateName(String);

impl CandidateName {
    /// Validate `text` against `rules`
    pub fn parse(text: &str, rules: &NameRules) -> Result<Self> {
        let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
        match rules.violation(&joined) {
            Some(reason) => Err(ExtractorError::InvalidCandidate(joined, reason)),
            None => Ok(Self(joined)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split(' ').count()
    }
}

impl fmt::Display for CandidateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CandidateName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Outcome of one extraction run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    /// Concatenated OCR text, or a status message when nothing was read
    pub text: String,

    /// Sorted, unique candidates
    pub names: Vec<CandidateName>,

    /// Recoverable problems encountered along the way
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    /// Result carrying only a message and no names
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name_strings(&self) -> Vec<String> {
        self.names.iter().map(|n| n.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_punctuation() {
        assert_eq!(strip_punctuation("John Smith."), "John Smith");
        assert_eq!(strip_punctuation("O'Brien, Jr!"), "OBrien Jr");
        assert_eq!(strip_punctuation("Ünal Çelik"), "Ünal Çelik");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("MARY"), "Mary");
        assert_eq!(capitalize("jOHN"), "John");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("élodie"), "Élodie");
    }

    #[test]
    fn test_candidate_accepts_names() {
        let rules = NameRules::default();
        let name = CandidateName::parse("  Mary   Ann Clark ", &rules).unwrap();
        assert_eq!(name.as_str(), "Mary Ann Clark");
        assert_eq!(name.word_count(), 3);
    }

    #[test]
    fn test_candidate_rejections() {
        let rules = NameRules::default();
        for text in [
            "",
            "John",
            "One Two Three Four Five",
            "John smith",
            "Jane Doe2",
            "Jane Doe 2024",
            "This Certificate Rocks",
            "Jean-Luc Picard",
        ] {
            assert!(
                CandidateName::parse(text, &rules).is_err(),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_denylist_rejects_award_surname() {
        // Substring matching over-rejects surnames containing a phrase
        let rules = NameRules::default();
        assert_eq!(rules.denied_phrase("Maria Awardson"), Some("award"));
        assert!(CandidateName::parse("Maria Awardson", &rules).is_err());
    }

    #[test]
    fn test_custom_word_bounds() {
        let rules = NameRules::default().with_word_bounds(1, 2);
        assert!(CandidateName::parse("Cher", &rules).is_ok());
        assert!(CandidateName::parse("Mary Ann Clark", &rules).is_err());
    }

    #[test]
    fn test_candidate_ordering_is_codepoint() {
        let rules = NameRules::default();
        let mut names = vec![
            CandidateName::parse("Zoe Adams", &rules).unwrap(),
            CandidateName::parse("Anna Bell", &rules).unwrap(),
            CandidateName::parse("Émile Zola", &rules).unwrap(),
        ];
        names.sort();
        let sorted: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(sorted, vec!["Anna Bell", "Zoe Adams", "Émile Zola"]);
    }

    #[test]
    fn test_result_serializes_names_as_strings() {
        let rules = NameRules::default();
        let result = ExtractionResult {
            text: "John Smith".to_string(),
            names: vec![CandidateName::parse("John Smith", &rules).unwrap()],
            warnings: vec![],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["names"][0], "John Smith");
        assert!(json.get("warnings").is_none());
    }
}
