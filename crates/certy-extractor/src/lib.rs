//! Certy Extractor - Name candidate extraction
//!
//! Finds person names on a certificate image with two independent
//! strategies and merges their results:
//! - model-based: person entities from an NER tagger over the full text
//! - heuristic: OCR lines that look like a 2-4 word capitalised name
//!
//! The final list is the sorted union of both strategies.

use certy_core::NamedEntity;
use thiserror::Error;

pub mod cache;
pub mod candidate;
pub mod heuristic;
pub mod ner;
pub mod pipeline;

pub use cache::{CacheStats, ExtractionCache};
pub use candidate::{CandidateName, ExtractionResult, NameRules, DEFAULT_DENYLIST};
pub use heuristic::{is_probable_name, names_from_lines};
pub use ner::{names_from_entities, tagger_from_config, CuePhraseTagger, HttpNerTagger};
pub use pipeline::{reconcile, NameExtractor};

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Invalid candidate name '{0}': {1}")]
    InvalidCandidate(String, String),

    #[error("NER request failed: {0}")]
    NerRequest(String),

    #[error("Malformed NER response: {0}")]
    NerResponse(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
}

pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Trait for named-entity taggers
///
/// Implementations return grouped entity spans: a multi-token person name
/// comes back as one span, not one entity per subword.
pub trait EntityTagger: Send + Sync {
    fn tag(&self, text: &str) -> Result<Vec<NamedEntity>>;

    fn name(&self) -> &str;
}
