//! Model-based name extraction
//!
//! Reduces tagger output to candidate names and provides the taggers:
//! a token-classification HTTP endpoint and an offline cue-phrase matcher.

use std::time::Duration;

use certy_core::{EntityTag, NamedEntity, NerBackend, NerConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::candidate::{capitalize, strip_punctuation, CandidateName, NameRules};
use crate::{EntityTagger, ExtractorError, Result};

// ============================================================================
// Entity Reduction
// ============================================================================

/// Clean a tagger span into display form
///
/// Subword continuation markers are merged, punctuation removed, and the
/// alphabetic tokens capitalised. Non-alphabetic tokens are dropped.
pub fn normalize_entity_text(text: &str) -> String {
    let merged = text.replace(" ##", "");
    let stripped = strip_punctuation(merged.trim());
    stripped
        .split_whitespace()
        .filter(|w| w.chars().all(char::is_alphabetic))
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bring a threshold into [0, 1]
pub fn clamp_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        return 1.0;
    }
    threshold.clamp(0.0, 1.0)
}

/// Person names among `entities` scoring at least `threshold`
///
/// Results keep first-seen order and contain no duplicates.
pub fn names_from_entities(
    entities: &[NamedEntity],
    threshold: f32,
    rules: &NameRules,
) -> Vec<CandidateName> {
    let threshold = clamp_threshold(threshold);
    let mut names: Vec<CandidateName> = Vec::new();

    for entity in entities {
        if entity.tag != EntityTag::Person || entity.score < threshold {
            continue;
        }

        let normalized = normalize_entity_text(&entity.text);
        if normalized.chars().count() <= 2 {
            continue;
        }

        match CandidateName::parse(&normalized, rules) {
            Ok(name) if !names.contains(&name) => names.push(name),
            Ok(_) => {}
            Err(e) => tracing::debug!("Dropping entity span: {}", e),
        }
    }

    names
}

// ============================================================================
// HTTP Tagger
// ============================================================================

const HF_INFERENCE_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// One entity as returned by a token-classification endpoint
#[derive(Debug, Deserialize)]
struct TokenClassification {
    #[serde(alias = "entity")]
    entity_group: String,
    score: f32,
    word: String,
}

/// Parse a token-classification response body
///
/// Accepts a flat list or a list nested once (batched input). Entities
/// with unknown labels are skipped.
pub fn parse_token_classification(body: &Value) -> Result<Vec<NamedEntity>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) if map.contains_key("error") => {
            return Err(ExtractorError::NerRequest(
                map["error"].as_str().unwrap_or("unknown error").to_string(),
            ));
        }
        other => {
            return Err(ExtractorError::NerResponse(format!(
                "expected a list, got {other}"
            )))
        }
    };

    let flat: Vec<&Value> = if items.iter().all(Value::is_array) {
        items
            .iter()
            .filter_map(Value::as_array)
            .flatten()
            .collect()
    } else {
        items.iter().collect()
    };

    let mut entities = Vec::with_capacity(flat.len());
    for item in flat {
        let parsed: TokenClassification = serde_json::from_value(item.clone())
            .map_err(|e| ExtractorError::NerResponse(e.to_string()))?;
        match parsed.entity_group.parse::<EntityTag>() {
            Ok(tag) => entities.push(NamedEntity::new(tag, parsed.word, parsed.score)),
            Err(_) => tracing::debug!("Skipping entity label {}", parsed.entity_group),
        }
    }

    Ok(entities)
}

/// Tagger backed by a token-classification HTTP endpoint
///
/// Speaks the Hugging Face inference request format with
/// `aggregation_strategy = simple`, so person names come back grouped.
#[derive(Debug, Clone)]
pub struct HttpNerTagger {
    endpoint: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpNerTagger {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Tagger for a hosted model on the public inference API
    pub fn for_model(model: &str) -> Self {
        Self::new(format!("{HF_INFERENCE_URL}/{model}"))
    }

    pub fn from_config(config: &NerConfig) -> Self {
        let tagger = match &config.endpoint {
            Some(endpoint) => Self::new(endpoint.clone()),
            None => Self::for_model(&config.model),
        };
        let tagger = tagger.with_timeout(Duration::from_secs(config.timeout_secs));
        match &config.api_token {
            Some(token) => tagger.with_token(token.clone()),
            None => tagger,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(text: &str) -> Value {
        json!({
            "inputs": text,
            "parameters": { "aggregation_strategy": "simple" }
        })
    }
}

impl EntityTagger for HttpNerTagger {
    fn tag(&self, text: &str) -> Result<Vec<NamedEntity>> {
        // Blocking client is built per call so it never lives on an async thread
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ExtractorError::NerRequest(e.to_string()))?;

        let mut request = client.post(&self.endpoint).json(&Self::request_body(text));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| ExtractorError::NerRequest(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| ExtractorError::NerResponse(e.to_string()))?;

        if !status.is_success() {
            return Err(ExtractorError::NerRequest(format!("HTTP {status}: {body}")));
        }

        let entities = parse_token_classification(&body)?;
        tracing::debug!("NER endpoint returned {} entities", entities.len());
        Ok(entities)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Cue-Phrase Tagger
// ============================================================================

static CUE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:certify that|certifies that|presented to|awarded to|conferred upon|granted to)\s+(\p{Lu}\p{L}+(?:[ \t]+\p{Lu}\p{L}+){0,3})",
    )
    .expect("valid regex")
});

/// Offline tagger that finds names following certificate cue phrases
///
/// "This is to certify that John Smith has..." yields "John Smith".
#[derive(Debug, Clone)]
pub struct CuePhraseTagger {
    score: f32,
}

impl CuePhraseTagger {
    pub fn new() -> Self {
        Self { score: 0.85 }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score.clamp(0.0, 1.0);
        self
    }
}

impl Default for CuePhraseTagger {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTagger for CuePhraseTagger {
    fn tag(&self, text: &str) -> Result<Vec<NamedEntity>> {
        Ok(CUE_PATTERN
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| NamedEntity::person(m.as_str(), self.score))
            .collect())
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

/// Build the tagger selected by configuration, if any
pub fn tagger_from_config(config: &NerConfig) -> Option<Box<dyn EntityTagger>> {
    match config.backend {
        NerBackend::Http => {
            let tagger = HttpNerTagger::from_config(config);
            tracing::info!("NER backend: http ({})", tagger.endpoint());
            Some(Box::new(tagger))
        }
        NerBackend::Pattern => {
            tracing::info!("NER backend: cue-phrase pattern matcher");
            Some(Box::new(CuePhraseTagger::new()))
        }
        NerBackend::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(names: Vec<CandidateName>) -> Vec<String> {
        names.into_iter().map(CandidateName::into_string).collect()
    }

    #[test]
    fn test_normalize_entity_text() {
        assert_eq!(normalize_entity_text("Jo ##hn Smith"), "John Smith");
        assert_eq!(normalize_entity_text(" MARY ann, "), "Mary Ann");
        assert_eq!(normalize_entity_text("Agent 007 Bond"), "Agent Bond");
        assert_eq!(normalize_entity_text("##"), "");
    }

    #[test]
    fn test_person_above_threshold() {
        let entities = vec![NamedEntity::person("John Smith", 0.95)];
        let names = names_from_entities(&entities, 0.8, &NameRules::default());
        assert_eq!(strings(names), vec!["John Smith"]);
    }

    #[test]
    fn test_filters_tag_score_and_length() {
        let entities = vec![
            NamedEntity::person("Low Score", 0.5),
            NamedEntity::new(EntityTag::Organization, "Acme Corp", 0.99),
            NamedEntity::person("Al", 0.99),
            NamedEntity::person("Jane Doe", 0.81),
            NamedEntity::person("jane doe", 0.9),
            NamedEntity::person("Madonna", 0.99),
        ];
        let names = names_from_entities(&entities, 0.8, &NameRules::default());
        assert_eq!(strings(names), vec!["Jane Doe"]);
    }

    #[test]
    fn test_threshold_is_clamped() {
        assert_eq!(clamp_threshold(1.7), 1.0);
        assert_eq!(clamp_threshold(-0.2), 0.0);
        assert_eq!(clamp_threshold(f32::NAN), 1.0);
    }

    #[test]
    fn test_cue_phrase_tagger() {
        let tagger = CuePhraseTagger::new();
        let entities = tagger
            .tag("This is to certify that John Smith completed the course")
            .unwrap();
        assert_eq!(entities, vec![NamedEntity::person("John Smith", 0.85)]);

        let entities = tagger
            .tag("PRESENTED TO Mary Ann Clark for excellence")
            .unwrap();
        assert_eq!(entities[0].text, "Mary Ann Clark");

        assert!(tagger.tag("Certificate of Completion").unwrap().is_empty());
    }

    #[test]
    fn test_cue_phrase_feeds_reduction() {
        let tagger = CuePhraseTagger::new();
        let entities = tagger
            .tag("This is to certify that John Smith completed the course")
            .unwrap();
        let names = names_from_entities(&entities, 0.8, &NameRules::default());
        assert_eq!(strings(names), vec!["John Smith"]);
    }

    #[test]
    fn test_parse_grouped_response() {
        let body = json!([
            {"entity_group": "PER", "score": 0.998, "word": "John Smith", "start": 24, "end": 34},
            {"entity_group": "ORG", "score": 0.91, "word": "Acme", "start": 50, "end": 54},
            {"entity_group": "DATE", "score": 0.7, "word": "2024", "start": 60, "end": 64}
        ]);
        let entities = parse_token_classification(&body).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].tag, EntityTag::Person);
        assert_eq!(entities[1].tag, EntityTag::Organization);
    }

    #[test]
    fn test_parse_ungrouped_and_nested_response() {
        let body = json!([[{"entity": "B-PER", "score": 0.9, "word": "Jane"}]]);
        let entities = parse_token_classification(&body).unwrap();
        assert_eq!(entities, vec![NamedEntity::person("Jane", 0.9)]);
    }

    #[test]
    fn test_parse_error_response() {
        let body = json!({"error": "Model is loading"});
        assert!(matches!(
            parse_token_classification(&body),
            Err(ExtractorError::NerRequest(_))
        ));
        assert!(parse_token_classification(&json!("nope")).is_err());
    }

    #[test]
    fn test_http_tagger_from_config() {
        let config = NerConfig {
            backend: NerBackend::Http,
            endpoint: None,
            api_token: Some("secret".to_string()),
            model: "dslim/bert-base-NER".to_string(),
            timeout_secs: 5,
        };
        let tagger = HttpNerTagger::from_config(&config);
        assert_eq!(
            tagger.endpoint(),
            "https://router.huggingface.co/hf-inference/models/dslim/bert-base-NER"
        );
        assert_eq!(tagger.timeout, Duration::from_secs(5));

        let body = HttpNerTagger::request_body("hello");
        assert_eq!(body["parameters"]["aggregation_strategy"], "simple");
    }

    #[test]
    fn test_backend_selection() {
        let mut config = NerConfig::default();
        config.backend = NerBackend::None;
        assert!(tagger_from_config(&config).is_none());

        config.backend = NerBackend::Pattern;
        assert_eq!(tagger_from_config(&config).unwrap().name(), "pattern");
    }

    fn entity_strategy() -> impl Strategy<Value = NamedEntity> {
        (
            prop_oneof![Just(EntityTag::Person), Just(EntityTag::Location)],
            "[A-Za-z]{1,8}( [A-Za-z]{1,8}){0,4}",
            0.0f32..=1.0,
        )
            .prop_map(|(tag, text, score)| NamedEntity::new(tag, text, score))
    }

    proptest! {
        #[test]
        fn prop_reduction_is_deterministic(
            entities in prop::collection::vec(entity_strategy(), 0..12),
            threshold in 0.0f32..=1.0,
        ) {
            let rules = NameRules::default();
            prop_assert_eq!(
                names_from_entities(&entities, threshold, &rules),
                names_from_entities(&entities, threshold, &rules)
            );
        }

        #[test]
        fn prop_higher_threshold_never_adds_names(
            entities in prop::collection::vec(entity_strategy(), 0..12),
        ) {
            let rules = NameRules::default();
            let loose = names_from_entities(&entities, 0.5, &rules);
            let strict = names_from_entities(&entities, 1.0, &rules);
            prop_assert!(strict.len() <= loose.len());
            prop_assert!(strict.iter().all(|n| loose.contains(n)));
        }

        #[test]
        fn prop_reduced_names_have_two_to_four_words(
            entities in prop::collection::vec(entity_strategy(), 0..12),
        ) {
            for name in names_from_entities(&entities, 0.0, &NameRules::default()) {
                prop_assert!((2..=4).contains(&name.word_count()));
                prop_assert!(!name.as_str().chars().any(|c| c.is_ascii_digit()));
            }
        }
    }
}
