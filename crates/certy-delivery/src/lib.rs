//! Certy Delivery - Packaging and email delivery
//!
//! Bundles generated certificates into a ZIP archive and emails each one
//! to the address on its record.

use thiserror::Error;

pub mod archive;
pub mod mailer;

pub use archive::bundle;
pub use mailer::{
    render_body, EmailSender, EmailSettings, MailTransport, OutgoingEmail, SmtpMailer,
    DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT,
};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid address '{0}': {1}")]
    InvalidAddress(String, String),

    #[error("Message build error: {0}")]
    Message(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Missing setting: {0}")]
    MissingSetting(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
