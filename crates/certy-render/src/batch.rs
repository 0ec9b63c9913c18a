//! Batch certificate generation
//!
//! Records are rendered one at a time in input order. A record that fails
//! is logged and reported, and the batch moves on.

use std::collections::HashSet;

use certy_core::StudentRecord;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::renderer::CertificateRenderer;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));

/// Name with everything but word characters, whitespace and `-` removed,
/// spaces turned into underscores
pub fn safe_file_name(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name.trim(), "").replace(' ', "_")
}

/// File name of a certificate for `name`
pub fn certificate_file_name(name: &str) -> String {
    let safe = safe_file_name(name);
    if safe.is_empty() {
        "unnamed_certificate.png".to_string()
    } else {
        format!("{safe}_certificate.png")
    }
}

/// `file_name` made unique against `taken` with `_2`, `_3`, ... suffixes
pub fn unique_file_name(file_name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(file_name) {
        return file_name.to_string();
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (file_name, String::new()),
    };
    (2..)
        .map(|n| format!("{stem}_{n}{ext}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| file_name.to_string())
}

/// A successfully rendered certificate
#[derive(Debug, Clone)]
pub struct GeneratedCertificate {
    /// Position of the source record in the input
    pub record_index: usize,
    pub name: String,
    pub file_name: String,
    pub png: Vec<u8>,
}

/// A record that could not be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub record_index: usize,
    pub name: String,
    pub error: String,
}

/// Result of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub certificates: Vec<GeneratedCertificate>,
    pub failures: Vec<BatchFailure>,
    pub total: usize,
}

impl BatchOutcome {
    /// Certificate rendered for the record at `record_index`, if any
    pub fn for_record(&self, record_index: usize) -> Option<&GeneratedCertificate> {
        self.certificates
            .iter()
            .find(|c| c.record_index == record_index)
    }
}

/// Render every record, reporting `(done, total)` after each one
pub fn generate_all<R, F>(renderer: &R, records: &[StudentRecord], mut progress: F) -> BatchOutcome
where
    R: CertificateRenderer + ?Sized,
    F: FnMut(usize, usize),
{
    let total = records.len();
    let mut outcome = BatchOutcome {
        total,
        ..Default::default()
    };
    let mut taken = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let rendered = renderer
            .render(record)
            .and_then(|certificate| certificate.to_png_bytes());

        match rendered {
            Ok(png) => {
                let file_name = unique_file_name(&certificate_file_name(&record.name), &taken);
                taken.insert(file_name.clone());
                tracing::info!("Generated certificate {}/{}: {}", index + 1, total, file_name);
                outcome.certificates.push(GeneratedCertificate {
                    record_index: index,
                    name: record.name.clone(),
                    file_name,
                    png,
                });
            }
            Err(e) => {
                tracing::error!(
                    "Failed to generate certificate for record {} ({}): {}",
                    index + 1,
                    record.name,
                    e
                );
                outcome.failures.push(BatchFailure {
                    record_index: index,
                    name: record.name.clone(),
                    error: e.to_string(),
                });
            }
        }

        progress(index + 1, total);
    }

    tracing::info!(
        "Generated {} of {} certificates",
        outcome.certificates.len(),
        total
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderedCertificate;
    use crate::{RenderError, Result};
    use image::RgbImage;

    /// Renders a tiny page for everyone except the names it is told to fail
    struct MockRenderer {
        fail_for: Vec<&'static str>,
    }

    impl CertificateRenderer for MockRenderer {
        fn render(&self, record: &StudentRecord) -> Result<RenderedCertificate> {
            if self.fail_for.contains(&record.name.as_str()) {
                return Err(RenderError::InvalidInput(format!("cannot render {}", record.name)));
            }
            Ok(RenderedCertificate {
                image: RgbImage::new(4, 4),
            })
        }
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("John Smith"), "John_Smith");
        assert_eq!(safe_file_name("Mary-Ann O'Neil!"), "Mary-Ann_ONeil");
        assert_eq!(certificate_file_name("John Smith"), "John_Smith_certificate.png");
        assert_eq!(certificate_file_name("???"), "unnamed_certificate.png");
    }

    #[test]
    fn test_unique_file_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_file_name("a.png", &taken), "a.png");
        taken.insert("a.png".to_string());
        assert_eq!(unique_file_name("a.png", &taken), "a_2.png");
        taken.insert("a_2.png".to_string());
        assert_eq!(unique_file_name("a.png", &taken), "a_3.png");
        assert_eq!(unique_file_name("README", &HashSet::from(["README".to_string()])), "README_2");
    }

    #[test]
    fn test_one_failure_does_not_stop_the_batch() {
        let records = vec![
            StudentRecord::from_name("Jane Doe"),
            StudentRecord::from_name("Broken Record"),
            StudentRecord::from_name("John Smith"),
        ];
        let renderer = MockRenderer {
            fail_for: vec!["Broken Record"],
        };
        let mut progress = Vec::new();

        let outcome = generate_all(&renderer, &records, |done, total| progress.push((done, total)));

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.certificates.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].record_index, 1);
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);

        assert_eq!(outcome.for_record(2).unwrap().file_name, "John_Smith_certificate.png");
        assert!(outcome.for_record(1).is_none());
    }

    #[test]
    fn test_duplicate_names_get_distinct_files() {
        let records = vec![
            StudentRecord::from_name("Jane Doe"),
            StudentRecord::from_name("Jane Doe"),
        ];
        let renderer = MockRenderer { fail_for: vec![] };

        let outcome = generate_all(&renderer, &records, |_, _| {});
        let names: Vec<&str> = outcome
            .certificates
            .iter()
            .map(|c| c.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["Jane_Doe_certificate.png", "Jane_Doe_certificate_2.png"]);
    }

    #[test]
    fn test_empty_batch() {
        let renderer = MockRenderer { fail_for: vec![] };
        let outcome = generate_all(&renderer, &[], |_, _| panic!("no progress expected"));
        assert_eq!(outcome.total, 0);
        assert!(outcome.certificates.is_empty());
    }
}
