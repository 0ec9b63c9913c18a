//! Certy OCR - Optical Character Recognition integration
//!
//! Turns a preprocessed certificate image into ordered text lines.
//! Tesseract is driven through its command-line interface in TSV mode so
//! that per-line confidence and geometry survive.

pub mod preprocess;

pub use preprocess::{ImagePreprocessor, PreprocessConfig};

use std::process::Command;

use certy_core::{BoundingBox, OcrConfig, RawLine};
use image::{GrayImage, ImageFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("Image processing failed: {0}")]
    ImageProcessingFailed(String),

    #[error("OCR execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Malformed OCR output: {0}")]
    MalformedOutput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OcrError>;

/// Trait for OCR engines
pub trait OcrEngine: Send + Sync {
    /// Recognize text lines in reading order
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RawLine>>;

    /// Check if the engine is available on the system
    fn is_available(&self) -> bool;

    /// Get the engine name
    fn name(&self) -> &str;
}

// ============================================================================
// Tesseract OCR Engine
// ============================================================================

/// Tesseract OCR engine configuration
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Language code(s) for OCR (e.g., "eng", "eng+fra")
    pub language: String,
    /// Page segmentation mode (PSM)
    pub psm: Option<u8>,
    /// OCR engine mode (OEM)
    pub oem: Option<u8>,
    /// Path to tesseract executable
    pub executable_path: Option<String>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            psm: None,
            oem: None,
            executable_path: None,
        }
    }
}

impl From<&OcrConfig> for TesseractConfig {
    fn from(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            psm: config.psm,
            oem: None,
            executable_path: config.executable_path.clone(),
        }
    }
}

impl TesseractConfig {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_psm(mut self, psm: u8) -> Self {
        self.psm = Some(psm);
        self
    }

    pub fn with_oem(mut self, oem: u8) -> Self {
        self.oem = Some(oem);
        self
    }
}

/// Tesseract OCR engine wrapper
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self {
            config: TesseractConfig::default(),
        }
    }

    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn executable(&self) -> &str {
        self.config
            .executable_path
            .as_deref()
            .unwrap_or("tesseract")
    }

    fn build_args(&self, image_path: &str) -> Vec<String> {
        let mut args = vec![
            image_path.to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.config.language.clone(),
        ];

        if let Some(psm) = self.config.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }

        if let Some(oem) = self.config.oem {
            args.push("--oem".to_string());
            args.push(oem.to_string());
        }

        // Config file name goes last
        args.push("tsv".to_string());
        args
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RawLine>> {
        let file = tempfile::Builder::new()
            .prefix("certy-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| OcrError::ImageProcessingFailed(e.to_string()))?;

        let args = self.build_args(&file.path().display().to_string());
        let output = Command::new(self.executable())
            .args(&args)
            .output()
            .map_err(|e| OcrError::ExecutionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ExecutionFailed(format!(
                "Tesseract failed: {}",
                stderr.trim()
            )));
        }

        let lines = parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!("Tesseract recognized {} lines", lines.len());
        Ok(lines)
    }

    fn is_available(&self) -> bool {
        Command::new(self.executable())
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

// ============================================================================
// TSV parsing
// ============================================================================

const TSV_COLUMNS: usize = 12;
const WORD_LEVEL: u32 = 5;

#[derive(Default)]
struct LineAccumulator {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    confidence_sum: f32,
    bbox: Option<BoundingBox>,
}

impl LineAccumulator {
    fn finish(self, index: usize) -> RawLine {
        let confidence = self.confidence_sum / self.words.len() as f32 / 100.0;
        let mut line = RawLine::new(index, self.words.join(" ")).with_confidence(confidence);
        if let Some(bbox) = self.bbox {
            line = line.with_bbox(bbox);
        }
        line
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, column: &str, row: usize) -> Result<T> {
    value.trim().parse().map_err(|_| {
        OcrError::MalformedOutput(format!("row {row}: bad {column} value '{value}'"))
    })
}

/// Group tesseract TSV word rows into lines, preserving output order
pub fn parse_tsv(tsv: &str) -> Result<Vec<RawLine>> {
    let mut lines = Vec::new();
    let mut current: Option<LineAccumulator> = None;

    for (row, record) in tsv.lines().enumerate() {
        if record.is_empty() || record.starts_with("level") {
            continue;
        }

        let cols: Vec<&str> = record.splitn(TSV_COLUMNS, '\t').collect();
        if cols.len() < TSV_COLUMNS - 1 {
            return Err(OcrError::MalformedOutput(format!(
                "row {row}: expected {TSV_COLUMNS} columns, found {}",
                cols.len()
            )));
        }

        let level: u32 = parse_field(cols[0], "level", row)?;
        if level != WORD_LEVEL {
            continue;
        }

        let text = cols.get(11).map(|t| t.trim()).unwrap_or("");
        let confidence: f32 = parse_field(cols[10], "conf", row)?;
        if text.is_empty() || confidence < 0.0 {
            continue;
        }

        let key = (
            parse_field(cols[1], "page_num", row)?,
            parse_field(cols[2], "block_num", row)?,
            parse_field(cols[3], "par_num", row)?,
            parse_field(cols[4], "line_num", row)?,
        );
        let bbox = BoundingBox::new(
            parse_field(cols[6], "left", row)?,
            parse_field(cols[7], "top", row)?,
            parse_field(cols[8], "width", row)?,
            parse_field(cols[9], "height", row)?,
        );

        if current.as_ref().map(|acc| acc.key) != Some(key) {
            if let Some(done) = current.take() {
                lines.push(done.finish(lines.len()));
            }
            current = Some(LineAccumulator {
                key,
                ..Default::default()
            });
        }

        if let Some(acc) = current.as_mut() {
            acc.words.push(text.to_string());
            acc.confidence_sum += confidence;
            acc.bbox = Some(match acc.bbox {
                Some(existing) => existing.union(&bbox),
                None => bbox,
            });
        }
    }

    if let Some(done) = current.take() {
        lines.push(done.finish(lines.len()));
    }

    Ok(lines)
}

// ============================================================================
// OCR Manager
// ============================================================================

/// OCR manager that handles multiple engines
pub struct OcrManager {
    engines: Vec<Box<dyn OcrEngine>>,
}

impl OcrManager {
    /// Create a manager with Tesseract registered when it is installed
    pub fn new() -> Self {
        Self::from_config(&OcrConfig::default())
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        let mut manager = Self::empty();

        let tesseract = TesseractEngine::with_config(TesseractConfig::from(config));
        if tesseract.is_available() {
            manager.register(tesseract);
        } else {
            tracing::warn!("Tesseract is not installed or not in PATH; OCR disabled");
        }

        manager
    }

    /// Manager with no engines registered
    pub fn empty() -> Self {
        Self {
            engines: Vec::new(),
        }
    }

    pub fn register<E: OcrEngine + 'static>(&mut self, engine: E) {
        self.engines.push(Box::new(engine));
    }

    pub fn is_available(&self) -> bool {
        !self.engines.is_empty()
    }

    pub fn available_engines(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Recognize lines using the first registered engine
    pub fn recognize(&self, image: &GrayImage) -> Result<Vec<RawLine>> {
        match self.engines.first() {
            Some(engine) => engine.recognize(image),
            None => Err(OcrError::EngineNotAvailable(
                "No OCR engines available".to_string(),
            )),
        }
    }
}

impl Default for OcrManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
