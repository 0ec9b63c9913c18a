//! Application state management

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use certy_core::{AppConfig, InMemoryTaskStore, TaskStore};
use certy_delivery::{EmailSettings, MailTransport, SmtpMailer};
use certy_extractor::NameExtractor;
use certy_ocr::OcrManager;

/// Opens a mail transport for one batch
pub trait MailerFactory: Send + Sync {
    fn connect(&self, settings: &EmailSettings) -> certy_delivery::Result<Box<dyn MailTransport>>;
}

/// Connects over SMTP with the settings submitted for the batch
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpMailerFactory;

impl MailerFactory for SmtpMailerFactory {
    fn connect(&self, settings: &EmailSettings) -> certy_delivery::Result<Box<dyn MailTransport>> {
        Ok(Box::new(SmtpMailer::new(settings)?))
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Batch task status records
    pub tasks: Arc<dyn TaskStore>,
    /// Name extractor behind `/extract-names`
    pub extractor: Arc<NameExtractor>,
    /// Mail transport used by background jobs
    pub mailer: Arc<dyn MailerFactory>,
}

impl AppState {
    /// Create new application state with config
    pub fn new(config: AppConfig) -> Self {
        let extractor = NameExtractor::from_config(&config);
        Self {
            config,
            start_time: Instant::now(),
            tasks: Arc::new(InMemoryTaskStore::new()),
            extractor: Arc::new(extractor),
            mailer: Arc::new(SmtpMailerFactory),
        }
    }

    /// State over a fresh temporary directory, with no OCR or NER
    pub fn for_testing() -> Self {
        let root = std::env::temp_dir().join(format!("certy-api-{}", uuid::Uuid::new_v4()));
        let mut config = AppConfig::default();
        config.storage.upload_dir = root.join("uploads");
        config.storage.output_dir = root.join("generated_certificates");
        config.render.layout_path = None;
        config.render.template_path = None;

        Self {
            config,
            start_time: Instant::now(),
            tasks: Arc::new(InMemoryTaskStore::new()),
            extractor: Arc::new(NameExtractor::new(OcrManager::empty(), None)),
            mailer: Arc::new(SmtpMailerFactory),
        }
    }

    pub fn with_task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_extractor(mut self, extractor: NameExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn MailerFactory>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn upload_dir(&self) -> &PathBuf {
        &self.config.storage.upload_dir
    }

    /// Directory holding one task's generated certificates
    pub fn task_output_dir(&self, task_id: &str) -> PathBuf {
        self.config.storage.output_dir.join(task_id)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
