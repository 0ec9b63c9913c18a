//! Line-based name detection
//!
//! Certificates usually print the recipient on a line of its own, so any
//! OCR line that is a short run of capitalised words and carries no
//! boilerplate is treated as a name.

use certy_core::RawLine;

use crate::candidate::{capitalize, strip_punctuation, CandidateName, NameRules};

/// Whether a punctuation-stripped line looks like a person name
pub fn is_probable_name(line: &str, rules: &NameRules) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();

    if words.len() < rules.min_words || words.len() > rules.max_words {
        return false;
    }

    let capitalised = words.iter().all(|w| {
        w.chars().all(char::is_alphabetic) && w.chars().next().is_some_and(char::is_uppercase)
    });
    if !capitalised {
        return false;
    }

    if rules.denied_phrase(line).is_some() {
        return false;
    }

    !line.chars().any(|c| c.is_numeric())
}

/// Scan OCR lines for names, in first-seen order without duplicates
pub fn names_from_lines(lines: &[RawLine], rules: &NameRules) -> Vec<CandidateName> {
    let mut names: Vec<CandidateName> = Vec::new();

    for line in lines {
        let cleaned = strip_punctuation(&line.text);
        let cleaned = cleaned.trim();
        if !is_probable_name(cleaned, rules) {
            continue;
        }

        let formatted = cleaned
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ");
        if formatted.chars().count() <= 2 {
            continue;
        }

        match CandidateName::parse(&formatted, rules) {
            Ok(name) if !names.contains(&name) => {
                tracing::debug!("Line {} looks like a name: {}", line.index, name);
                names.push(name);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Dropping line {}: {}", line.index, e),
        }
    }

    names
}
