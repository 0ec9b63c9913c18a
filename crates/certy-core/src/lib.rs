//! Certy Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout Auto-Certy:
//! - OCR and NER collaborator outputs (lines, entities)
//! - Student records for batch mode
//! - Delivery reports
//! - Common error types
//! - Configuration management
//! - Task status storage

pub mod config;
pub mod task;

pub use config::{
    AppConfig, ConfigError, EmailDefaults, ExtractionConfig, LoggingConfig, NerBackend,
    NerConfig, OcrConfig, RenderConfig, ServerConfig, StorageConfig,
};
pub use task::{InMemoryTaskStore, TaskState, TaskStatus, TaskStore, Transition};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Auto-Certy operations
#[derive(Error, Debug)]
pub enum CertyError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CertyError>;

// ============================================================================
// OCR Output
// ============================================================================

/// Axis-aligned box around a detected text fragment, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Smallest box covering both `self` and `other`
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = (self.left + self.width).max(other.left + other.width);
        let bottom = (self.top + self.height).max(other.top + other.height);
        BoundingBox::new(left, top, right - left, bottom - top)
    }
}

/// A single OCR-detected text fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLine {
    /// Recognized text
    pub text: String,

    /// Position in reading order (left-to-right, top-to-bottom)
    pub index: usize,

    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,

    /// Where the fragment was found, if the engine reports it
    pub bbox: Option<BoundingBox>,
}

impl RawLine {
    /// Create a new line with full confidence and no geometry
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            index,
            confidence: 1.0,
            bbox: None,
        }
    }

    /// Set confidence score
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set bounding box
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Build the ordered line list from plain strings (test and manual input helper)
pub fn lines_from_strs<S: AsRef<str>>(texts: &[S]) -> Vec<RawLine> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| RawLine::new(i, t.as_ref()))
        .collect()
}

// ============================================================================
// NER Output
// ============================================================================

/// Entity tags produced by the NER collaborator
///
/// Only `Person` is consumed by name extraction; the others are accepted
/// so that a tagger's full output can be parsed without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityTag {
    Person,
    Organization,
    Location,
    Miscellaneous,
}

impl EntityTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Miscellaneous => "miscellaneous",
        }
    }
}

impl std::fmt::Display for EntityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityTag {
    type Err = CertyError;

    /// Parse CoNLL-style labels (`PER`, `B-PER`, `I-ORG`, ...) as well as
    /// the long lowercase names used in serialized output.
    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim();
        let label = label
            .strip_prefix("B-")
            .or_else(|| label.strip_prefix("I-"))
            .unwrap_or(label);

        match label.to_ascii_uppercase().as_str() {
            "PER" | "PERSON" => Ok(Self::Person),
            "ORG" | "ORGANIZATION" => Ok(Self::Organization),
            "LOC" | "LOCATION" => Ok(Self::Location),
            "MISC" | "MISCELLANEOUS" => Ok(Self::Miscellaneous),
            _ => Err(CertyError::InvalidInput(format!("unknown entity tag: {s}"))),
        }
    }
}

/// A grouped entity span returned by the NER collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub tag: EntityTag,

    /// Surface text as reported by the model (may carry subword artifacts)
    pub text: String,

    /// Model confidence (0.0 - 1.0)
    pub score: f32,
}

impl NamedEntity {
    pub fn new(tag: EntityTag, text: impl Into<String>, score: f32) -> Self {
        Self {
            tag,
            text: text.into(),
            score,
        }
    }

    pub fn person(text: impl Into<String>, score: f32) -> Self {
        Self::new(EntityTag::Person, text, score)
    }
}

// ============================================================================
// Batch Records
// ============================================================================

/// A student row resolved to the four logical columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    pub email: String,
    pub year_of_study: String,
    pub branch: String,
}

impl StudentRecord {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        year_of_study: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            year_of_study: year_of_study.into(),
            branch: branch.into(),
        }
    }

    /// Record carrying only a name (manual entry and OCR selections)
    pub fn from_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Look up a field by its logical column name
    pub fn field(&self, key: &str) -> Option<&str> {
        match key {
            "name" => Some(&self.name),
            "email" => Some(&self.email),
            "year_of_study" | "year" => Some(&self.year_of_study),
            "branch" => Some(&self.branch),
            _ => None,
        }
    }
}

// ============================================================================
// Delivery Reports
// ============================================================================

/// A recipient that received their certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredRecipient {
    pub name: String,
    pub email: String,
}

/// A recipient whose delivery failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecipient {
    pub name: String,
    pub email: String,
    pub error: String,
}

/// Aggregated result of a bulk delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub successful: Vec<DeliveredRecipient>,
    pub failed: Vec<FailedRecipient>,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

impl DeliveryReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, record: &StudentRecord) {
        self.successful.push(DeliveredRecipient {
            name: record.name.clone(),
            email: record.email.clone(),
        });
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, record: &StudentRecord, error: impl Into<String>) {
        self.failed.push(FailedRecipient {
            name: record.name.clone(),
            email: record.email.clone(),
            error: error.into(),
        });
        self.failure_count += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_tag_parse() {
        assert_eq!("PER".parse::<EntityTag>().unwrap(), EntityTag::Person);
        assert_eq!("B-PER".parse::<EntityTag>().unwrap(), EntityTag::Person);
        assert_eq!("I-ORG".parse::<EntityTag>().unwrap(), EntityTag::Organization);
        assert_eq!("person".parse::<EntityTag>().unwrap(), EntityTag::Person);
        assert_eq!("misc".parse::<EntityTag>().unwrap(), EntityTag::Miscellaneous);
        assert!("DATE".parse::<EntityTag>().is_err());
    }

    #[test]
    fn test_raw_line_builder() {
        let line = RawLine::new(3, "John Smith")
            .with_confidence(1.7)
            .with_bbox(BoundingBox::new(10, 20, 100, 30));

        assert_eq!(line.index, 3);
        assert_eq!(line.confidence, 1.0);
        assert_eq!(line.bbox.unwrap().width, 100);
    }

    #[test]
    fn test_bbox_union() {
        let a = BoundingBox::new(10, 10, 20, 10);
        let b = BoundingBox::new(40, 5, 10, 10);
        assert_eq!(a.union(&b), BoundingBox::new(10, 5, 40, 15));
    }

    #[test]
    fn test_lines_from_strs_keeps_order() {
        let lines = lines_from_strs(&["a", "b", "c"]);
        let indices: Vec<usize> = lines.iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(lines[1].text, "b");
    }

    #[test]
    fn test_student_record_field_lookup() {
        let record = StudentRecord::new("Jane Doe", "jane@example.com", "3", "CSE");
        assert_eq!(record.field("name"), Some("Jane Doe"));
        assert_eq!(record.field("year"), Some("3"));
        assert_eq!(record.field("branch"), Some("CSE"));
        assert_eq!(record.field("unknown"), None);
    }

    #[test]
    fn test_delivery_report_counts() {
        let record = StudentRecord::new("Jane Doe", "jane@example.com", "3", "CSE");
        let mut report = DeliveryReport::new(2);
        report.record_success(&record);
        report.record_failure(&record, "mailbox unavailable");

        assert_eq!(report.total, 2);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.failed[0].error, "mailbox unavailable");
    }
}
