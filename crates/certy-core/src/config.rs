//! Auto-Certy Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for local use.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Upload and output directories
    pub storage: StorageConfig,

    /// Name extraction thresholds
    pub extraction: ExtractionConfig,

    /// NER collaborator configuration
    pub ner: NerConfig,

    /// OCR collaborator configuration
    pub ocr: OcrConfig,

    /// Default email settings
    pub email: EmailDefaults,

    /// Certificate rendering configuration
    pub render: RenderConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = parse_value("API_PORT", port)?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Storage
        if let Ok(dir) = std::env::var("UPLOAD_DIR") {
            config.storage.upload_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            config.storage.output_dir = PathBuf::from(dir);
        }

        // Extraction
        if let Ok(threshold) = std::env::var("CONFIDENCE_THRESHOLD") {
            let value: f32 = parse_value("CONFIDENCE_THRESHOLD", threshold.clone())?;
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: "CONFIDENCE_THRESHOLD".to_string(),
                    value: threshold,
                });
            }
            config.extraction.confidence_threshold = value;
        }

        // NER
        if let Ok(backend) = std::env::var("NER_BACKEND") {
            config.ner.backend = backend.parse()?;
        }
        if let Ok(endpoint) = std::env::var("NER_ENDPOINT") {
            config.ner.endpoint = Some(endpoint);
            if std::env::var("NER_BACKEND").is_err() {
                config.ner.backend = NerBackend::Http;
            }
        }
        if let Ok(token) = std::env::var("NER_API_TOKEN") {
            config.ner.api_token = Some(token);
        }

        // OCR
        if let Ok(path) = std::env::var("TESSERACT_PATH") {
            config.ocr.executable_path = Some(path);
        }
        if let Ok(language) = std::env::var("OCR_LANGUAGE") {
            config.ocr.language = language;
        }

        // Email
        if let Ok(server) = std::env::var("SMTP_SERVER") {
            config.email.smtp_server = server;
        }
        if let Ok(port) = std::env::var("SMTP_PORT") {
            config.email.smtp_port = parse_value("SMTP_PORT", port)?;
        }

        // Render
        if let Ok(path) = std::env::var("LAYOUT_PATH") {
            config.render.layout_path = Some(PathBuf::from(path));
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            config.logging.json_format = parse_value("LOG_JSON", json)?;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env_config.server.host != defaults.server.host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != defaults.server.port {
            self.server.port = env_config.server.port;
        }
        if !env_config.server.cors_origins.is_empty() {
            self.server.cors_origins = env_config.server.cors_origins;
        }
        if env_config.storage.upload_dir != defaults.storage.upload_dir {
            self.storage.upload_dir = env_config.storage.upload_dir;
        }
        if env_config.storage.output_dir != defaults.storage.output_dir {
            self.storage.output_dir = env_config.storage.output_dir;
        }
        if env_config.extraction.confidence_threshold != defaults.extraction.confidence_threshold
        {
            self.extraction.confidence_threshold = env_config.extraction.confidence_threshold;
        }
        if env_config.ner.backend != defaults.ner.backend {
            self.ner.backend = env_config.ner.backend;
        }
        if env_config.ner.endpoint.is_some() {
            self.ner.endpoint = env_config.ner.endpoint;
        }
        if env_config.ocr.executable_path.is_some() {
            self.ocr.executable_path = env_config.ocr.executable_path;
        }
        if env_config.ocr.language != defaults.ocr.language {
            self.ocr.language = env_config.ocr.language;
        }
        if env_config.email.smtp_server != defaults.email.smtp_server {
            self.email.smtp_server = env_config.email.smtp_server;
        }
        if env_config.email.smtp_port != defaults.email.smtp_port {
            self.email.smtp_port = env_config.email.smtp_port;
        }
        if env_config.render.layout_path.is_some() {
            self.render.layout_path = env_config.render.layout_path;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }
        if env_config.logging.json_format {
            self.logging.json_format = true;
        }

        // Always use env for secrets
        if env_config.ner.api_token.is_some() {
            self.ner.api_token = env_config.ner.api_token;
        }

        Ok(self)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Allowed origins for CORS (empty = any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_body_size: 20 * 1024 * 1024, // 20MB
            cors_origins: vec![],
        }
    }
}

/// Filesystem locations for uploads and generated certificates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where uploaded spreadsheets and templates are saved
    pub upload_dir: PathBuf,

    /// Where generated certificates are written, one subdirectory per task
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("generated_certificates"),
        }
    }
}

/// Name extraction thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum NER score for a person span (UI range 0.5 - 1.0)
    pub confidence_threshold: f32,

    /// Fewest words a candidate name may have
    pub min_words: usize,

    /// Most words a candidate name may have
    pub max_words: usize,

    /// Number of memoized extraction results
    pub cache_capacity: u64,

    /// Lifetime of a memoized extraction result, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            min_words: 2,
            max_words: 4,
            cache_capacity: 256,
            cache_ttl_secs: 3600,
        }
    }
}

/// Which NER collaborator to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NerBackend {
    /// Remote token-classification endpoint
    Http,
    /// Offline cue-phrase rules
    Pattern,
    /// No model; only the line heuristic runs
    None,
}

impl std::str::FromStr for NerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "pattern" => Ok(Self::Pattern),
            "none" | "off" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue {
                key: "NER_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// NER collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NerConfig {
    pub backend: NerBackend,

    /// Token-classification endpoint URL (`NER_ENDPOINT`). When unset the
    /// http backend posts to `https://router.huggingface.co/hf-inference/models/<model>`.
    pub endpoint: Option<String>,

    /// Bearer token for the endpoint
    pub api_token: Option<String>,

    /// Model name, used in logs and for the default hosted endpoint
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            backend: NerBackend::Pattern,
            endpoint: None,
            api_token: None,
            model: "dslim/bert-base-NER".to_string(),
            timeout_secs: 30,
        }
    }
}

/// OCR collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code(s), e.g. "eng" or "eng+fra"
    pub language: String,

    /// Page segmentation mode
    pub psm: Option<u8>,

    /// Path to the tesseract executable
    pub executable_path: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            psm: None,
            executable_path: None,
        }
    }
}

/// Defaults for outgoing certificate emails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailDefaults {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub subject: String,

    /// Body with `{name}`, `{branch}` and `{year}` placeholders
    pub body_template: String,
}

impl Default for EmailDefaults {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            subject: "Your Certificate".to_string(),
            body_template: "Dear {name},\n\nPlease find your certificate attached.\n\nBest regards,\nCertificate Team".to_string(),
        }
    }
}

/// Certificate rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RenderConfig {
    /// JSON layout file; the built-in layout is used when unset
    pub layout_path: Option<PathBuf>,

    /// Default template (image or PDF) used when a task uploads none
    pub template_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.extraction.confidence_threshold, 0.8);
        assert_eq!(config.extraction.min_words, 2);
        assert_eq!(config.extraction.max_words, 4);
        assert_eq!(config.email.smtp_port, 587);
        assert!(config.email.body_template.contains("{name}"));
    }

    #[test]
    fn test_ner_backend_parse() {
        assert_eq!("http".parse::<NerBackend>().unwrap(), NerBackend::Http);
        assert_eq!("PATTERN".parse::<NerBackend>().unwrap(), NerBackend::Pattern);
        assert_eq!("off".parse::<NerBackend>().unwrap(), NerBackend::None);
        assert!("spacy".parse::<NerBackend>().is_err());
    }

    #[test]
    fn test_from_file_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[extraction]\nconfidence_threshold = 0.65\n\n[ner]\nbackend = \"none\""
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.extraction.confidence_threshold, 0.65);
        assert_eq!(config.extraction.max_words, 4);
        assert_eq!(config.ner.backend, NerBackend::None);
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/certy.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
