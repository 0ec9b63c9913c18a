//! Extraction pipeline: image -> OCR lines -> both strategies -> union

use std::collections::BTreeSet;

use certy_core::{AppConfig, RawLine};
use certy_ocr::{ImagePreprocessor, OcrManager};
use image::DynamicImage;

use crate::cache::ExtractionCache;
use crate::candidate::{CandidateName, ExtractionResult, NameRules};
use crate::heuristic::names_from_lines;
use crate::ner::{clamp_threshold, names_from_entities, tagger_from_config};
use crate::EntityTagger;

pub const NO_TEXT_DETECTED: &str = "No text detected";
pub const NO_READABLE_TEXT: &str = "No readable text found";
const OCR_FAILED_PREFIX: &str = "OCR processing failed";

/// Sorted union of both strategies' candidates
pub fn reconcile(model_names: &[CandidateName], line_names: &[CandidateName]) -> Vec<CandidateName> {
    model_names
        .iter()
        .chain(line_names)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Full-text form of OCR lines: every line trimmed, then single-space joined.
///
/// Blank fragments are kept, so they show up as doubled spaces.
pub fn joined_text(lines: &[RawLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.trim())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name candidate extractor
pub struct NameExtractor {
    preprocessor: ImagePreprocessor,
    ocr: OcrManager,
    tagger: Option<Box<dyn EntityTagger>>,
    rules: NameRules,
    default_threshold: f32,
    cache: ExtractionCache,
}

impl NameExtractor {
    /// Create an extractor around the given collaborators
    ///
    /// A missing OCR engine or tagger is reported once here; later calls
    /// degrade quietly.
    pub fn new(ocr: OcrManager, tagger: Option<Box<dyn EntityTagger>>) -> Self {
        if !ocr.is_available() {
            tracing::warn!("OCR engine not available; image extraction will return no names");
        }
        match &tagger {
            Some(t) => tracing::info!("Name extraction using NER tagger '{}'", t.name()),
            None => tracing::warn!("NER tagger not available; using line heuristics only"),
        }

        Self {
            preprocessor: ImagePreprocessor::new(),
            ocr,
            tagger,
            rules: NameRules::default(),
            default_threshold: 0.8,
            cache: ExtractionCache::default(),
        }
    }

    /// Build from application configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            OcrManager::from_config(&config.ocr),
            tagger_from_config(&config.ner),
        )
        .with_rules(NameRules::from(&config.extraction))
        .with_default_threshold(config.extraction.confidence_threshold)
        .with_cache(ExtractionCache::from_config(&config.extraction))
    }

    pub fn with_rules(mut self, rules: NameRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_default_threshold(mut self, threshold: f32) -> Self {
        self.default_threshold = clamp_threshold(threshold);
        self
    }

    pub fn with_cache(mut self, cache: ExtractionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn rules(&self) -> &NameRules {
        &self.rules
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    pub fn ocr_available(&self) -> bool {
        self.ocr.is_available()
    }

    /// Post-OCR core: both strategies over the given lines
    pub fn extract_from_lines(&self, lines: &[RawLine], threshold: f32) -> ExtractionResult {
        if lines.is_empty() {
            return ExtractionResult::message(NO_TEXT_DETECTED);
        }

        let text = joined_text(lines);
        if text.trim().is_empty() {
            return ExtractionResult::message(NO_READABLE_TEXT);
        }

        let mut warnings = Vec::new();
        let model_names = match &self.tagger {
            Some(tagger) => match tagger.tag(&text) {
                Ok(entities) => names_from_entities(&entities, threshold, &self.rules),
                Err(e) => {
                    let warning = format!("NER processing failed: {e}");
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let line_names = names_from_lines(lines, &self.rules);

        let names = reconcile(&model_names, &line_names);
        tracing::info!(
            "Extracted {} names ({} model, {} heuristic)",
            names.len(),
            model_names.len(),
            line_names.len()
        );

        ExtractionResult {
            text,
            names,
            warnings,
        }
    }

    /// Preprocess, recognize, then extract
    pub fn extract_from_image(&self, image: &DynamicImage, threshold: f32) -> ExtractionResult {
        if !self.ocr.is_available() {
            return ExtractionResult::default();
        }

        let processed = self.preprocessor.preprocess(image);
        match self.ocr.recognize(&processed) {
            Ok(lines) => self.extract_from_lines(&lines, threshold),
            Err(e) => {
                tracing::error!("OCR processing failed: {}", e);
                ExtractionResult::message(format!("{OCR_FAILED_PREFIX}: {e}"))
            }
        }
    }

    /// Decode encoded image bytes and extract, memoising on content
    pub fn extract_from_bytes(&self, bytes: &[u8], threshold: f32) -> ExtractionResult {
        let threshold = clamp_threshold(threshold);
        if let Some(cached) = self.cache.get(bytes, threshold, &self.rules) {
            tracing::debug!("Extraction cache hit");
            return cached;
        }

        let result = match image::load_from_memory(bytes) {
            Ok(image) => self.extract_from_image(&image, threshold),
            Err(e) => {
                tracing::error!("Could not decode image: {}", e);
                return ExtractionResult::message(format!("{OCR_FAILED_PREFIX}: {e}"));
            }
        };

        if result.warnings.is_empty() && !result.text.starts_with(OCR_FAILED_PREFIX) {
            self.cache.put(bytes, threshold, &self.rules, result.clone());
        }
        result
    }

    /// Extract using the configured default threshold
    pub fn extract(&self, bytes: &[u8]) -> ExtractionResult {
        self.extract_from_bytes(bytes, self.default_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ner::CuePhraseTagger;
    use crate::{ExtractorError, Result};
    use certy_core::{lines_from_strs, NamedEntity};
    use certy_ocr::OcrEngine;
    use image::{GrayImage, ImageFormat, Rgb, RgbImage};
    use proptest::prelude::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedTagger(Vec<NamedEntity>);

    impl EntityTagger for FixedTagger {
        fn tag(&self, _text: &str) -> Result<Vec<NamedEntity>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingTagger;

    impl EntityTagger for FailingTagger {
        fn tag(&self, _text: &str) -> Result<Vec<NamedEntity>> {
            Err(ExtractorError::NerRequest("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// OCR engine returning canned lines and counting calls
    struct ScriptedOcr {
        lines: std::result::Result<Vec<RawLine>, String>,
        calls: Arc<AtomicUsize>,
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize(&self, _image: &GrayImage) -> certy_ocr::Result<Vec<RawLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.lines
                .clone()
                .map_err(certy_ocr::OcrError::ExecutionFailed)
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn extractor_with(
        lines: std::result::Result<Vec<RawLine>, String>,
        tagger: Option<Box<dyn EntityTagger>>,
    ) -> (NameExtractor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ocr = OcrManager::empty();
        ocr.register(ScriptedOcr {
            lines,
            calls: Arc::clone(&calls),
        });
        (NameExtractor::new(ocr, tagger), calls)
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(32, 16, Rgb([255, 255, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn strings(names: &[CandidateName]) -> Vec<&str> {
        names.iter().map(|n| n.as_str()).collect()
    }

    #[test]
    fn test_union_of_both_strategies_sorted() {
        let tagger = FixedTagger(vec![
            NamedEntity::person("Zoe Adams", 0.97),
            NamedEntity::person("John Smith", 0.95),
        ]);
        let (extractor, _) = extractor_with(Ok(vec![]), Some(Box::new(tagger)));
        let lines = lines_from_strs(&["Certificate of Achievement", "John Smith", "MARY ANN CLARK"]);

        let result = extractor.extract_from_lines(&lines, 0.8);
        assert_eq!(
            strings(&result.names),
            vec!["John Smith", "Mary Ann Clark", "Zoe Adams"]
        );
        assert_eq!(
            result.text,
            "Certificate of Achievement John Smith MARY ANN CLARK"
        );
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_lines_report_no_text() {
        let (extractor, _) = extractor_with(Ok(vec![]), None);
        let result = extractor.extract_from_lines(&[], 0.8);
        assert_eq!(result.text, NO_TEXT_DETECTED);
        assert!(result.names.is_empty());
    }

    #[test]
    fn test_blank_lines_report_no_readable_text() {
        let (extractor, _) = extractor_with(Ok(vec![]), None);
        let result = extractor.extract_from_lines(&lines_from_strs(&["  ", ""]), 0.8);
        assert_eq!(result.text, NO_READABLE_TEXT);
        assert!(result.names.is_empty());
    }

    #[test]
    fn test_blank_fragments_kept_in_text() {
        let (extractor, _) = extractor_with(Ok(vec![]), None);
        let lines = lines_from_strs(&[" Awarded to ", "", "John Smith"]);

        let result = extractor.extract_from_lines(&lines, 0.8);
        assert_eq!(result.text, "Awarded to  John Smith");
        assert_eq!(strings(&result.names), vec!["John Smith"]);
    }

    #[test]
    fn test_ner_failure_keeps_heuristic() {
        let (extractor, _) = extractor_with(Ok(vec![]), Some(Box::new(FailingTagger)));
        let result = extractor.extract_from_lines(&lines_from_strs(&["Jane Doe"]), 0.8);

        assert_eq!(strings(&result.names), vec!["Jane Doe"]);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("NER processing failed"));
    }

    #[test]
    fn test_image_bytes_through_ocr() {
        let lines = lines_from_strs(&["This is to certify that John Smith", "has completed"]);
        let (extractor, calls) =
            extractor_with(Ok(lines), Some(Box::new(CuePhraseTagger::new())));

        let result = extractor.extract_from_bytes(&png_bytes(), 0.8);
        assert_eq!(strings(&result.names), vec!["John Smith"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeated_bytes_hit_cache() {
        let (extractor, calls) = extractor_with(Ok(lines_from_strs(&["Jane Doe"])), None);
        let bytes = png_bytes();

        let first = extractor.extract_from_bytes(&bytes, 0.8);
        let second = extractor.extract_from_bytes(&bytes, 0.8);
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.cache().stats().hits(), 1);

        extractor.extract_from_bytes(&bytes, 0.6);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ocr_failure_message() {
        let (extractor, calls) = extractor_with(Err("engine crashed".to_string()), None);
        let bytes = png_bytes();

        let result = extractor.extract_from_bytes(&bytes, 0.8);
        assert!(result.text.starts_with("OCR processing failed"));
        assert!(result.text.contains("engine crashed"));
        assert!(result.names.is_empty());

        // Failures are not memoised
        extractor.extract_from_bytes(&bytes, 0.8);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_undecodable_bytes() {
        let (extractor, calls) = extractor_with(Ok(vec![]), None);
        let result = extractor.extract_from_bytes(b"not an image", 0.8);

        assert!(result.text.starts_with("OCR processing failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ocr_unavailable_returns_empty() {
        let extractor = NameExtractor::new(OcrManager::empty(), None);
        let result = extractor.extract_from_bytes(&png_bytes(), 0.8);
        assert_eq!(result, ExtractionResult::default());
    }

    fn candidate_strategy() -> impl Strategy<Value = CandidateName> {
        "[A-Z][a-z]{1,6} [A-Z][a-z]{1,6}".prop_map(|s| {
            CandidateName::parse(&s, &NameRules::default()).unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_reconcile_is_sorted_unique_union(
            a in prop::collection::vec(candidate_strategy(), 0..8),
            b in prop::collection::vec(candidate_strategy(), 0..8),
        ) {
            let merged = reconcile(&a, &b);

            prop_assert!(merged.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(a.iter().chain(&b).all(|n| merged.contains(n)));
            prop_assert!(merged.iter().all(|n| a.contains(n) || b.contains(n)));
            prop_assert_eq!(reconcile(&a, &b), merged);
        }

        #[test]
        fn prop_every_candidate_satisfies_invariant(
            texts in prop::collection::vec("[A-Za-z0-9 .,]{0,40}", 0..10),
        ) {
            let (extractor, _) = extractor_with(Ok(vec![]), Some(Box::new(CuePhraseTagger::new())));
            let result = extractor.extract_from_lines(&lines_from_strs(&texts), 0.5);

            for name in &result.names {
                let words: Vec<&str> = name.as_str().split(' ').collect();
                prop_assert!((2..=4).contains(&words.len()));
                let capitalised_words = words.iter().all(|w| {
                    w.chars().all(char::is_alphabetic)
                        && w.chars().next().is_some_and(char::is_uppercase)
                });
                prop_assert!(capitalised_words);
                prop_assert!(!name.as_str().chars().any(|c| c.is_ascii_digit()));
                prop_assert!(NameRules::default().denied_phrase(name.as_str()).is_none());
            }
        }
    }
}
