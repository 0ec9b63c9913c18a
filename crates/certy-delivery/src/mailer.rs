//! Email delivery of certificates
//!
//! [`EmailSender`] walks the records of a batch, pairs each with the
//! certificate rendered from it and hands one message per recipient to a
//! [`MailTransport`]. [`SmtpMailer`] is the SMTP transport.

use certy_core::{DeliveryReport, EmailDefaults, StudentRecord};
use certy_render::BatchOutcome;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};

use crate::{DeliveryError, Result};

pub const DEFAULT_SUBJECT: &str = "Your Certificate";

pub const DEFAULT_BODY_TEMPLATE: &str =
    "Dear {name},\n\nPlease find your certificate attached.\n\nBest regards,\nCertificate Team";

/// SMTP account and message template
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
    pub subject: String,
    pub body_template: String,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("sender_email", &self.sender_email)
            .field("sender_password", &"<redacted>")
            .field("subject", &self.subject)
            .finish()
    }
}

impl EmailSettings {
    /// Settings for `sender` using the configured server and templates
    pub fn new(
        defaults: &EmailDefaults,
        sender_email: impl Into<String>,
        sender_password: impl Into<String>,
    ) -> Self {
        Self {
            smtp_server: defaults.smtp_server.clone(),
            smtp_port: defaults.smtp_port,
            sender_email: sender_email.into(),
            sender_password: sender_password.into(),
            subject: defaults.subject.clone(),
            body_template: defaults.body_template.clone(),
        }
    }

    pub fn with_server(mut self, server: impl Into<String>, port: u16) -> Self {
        self.smtp_server = server.into();
        self.smtp_port = port;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_body_template(mut self, template: impl Into<String>) -> Self {
        self.body_template = template.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.smtp_server.trim().is_empty() {
            return Err(DeliveryError::MissingSetting("smtp_server".to_string()));
        }
        if self.sender_email.trim().is_empty() {
            return Err(DeliveryError::MissingSetting("sender_email".to_string()));
        }
        parse_mailbox(&self.sender_email)?;
        Ok(())
    }
}

/// Fill `{name}`, `{branch}` and `{year}` from a record
pub fn render_body(template: &str, record: &StudentRecord) -> String {
    template
        .replace("{name}", &record.name)
        .replace("{branch}", &record.branch)
        .replace("{year}", &record.year_of_study)
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress(address.to_string(), e.to_string()))
}

/// A single certificate email
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

/// Something that can deliver certificate emails
pub trait MailTransport: Send + Sync {
    /// Connect and authenticate without sending anything
    fn test_connection(&self) -> Result<()>;

    fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

impl<T: MailTransport + ?Sized> MailTransport for Box<T> {
    fn test_connection(&self) -> Result<()> {
        (**self).test_connection()
    }

    fn send(&self, email: &OutgoingEmail) -> Result<()> {
        (**self).send(email)
    }
}

// ============================================================================
// SMTP Transport
// ============================================================================

/// STARTTLS SMTP transport with login credentials
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        settings.validate()?;
        let sender = parse_mailbox(&settings.sender_email)?;

        let transport = SmtpTransport::starttls_relay(&settings.smtp_server)
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.sender_email.clone(),
                settings.sender_password.clone(),
            ))
            .build();

        Ok(Self { transport, sender })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let attachment_type = ContentType::parse("image/png")
            .map_err(|e| DeliveryError::Message(e.to_string()))?;

        Message::builder()
            .from(self.sender.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(email.body.clone()))
                    .singlepart(
                        Attachment::new(email.attachment_name.clone())
                            .body(email.attachment.clone(), attachment_type),
                    ),
            )
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }
}

impl MailTransport for SmtpMailer {
    fn test_connection(&self) -> Result<()> {
        match self.transport.test_connection() {
            Ok(true) => Ok(()),
            Ok(false) => Err(DeliveryError::Smtp("server did not accept the connection".to_string())),
            Err(e) => Err(DeliveryError::Smtp(e.to_string())),
        }
    }

    fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = self.build_message(email)?;
        self.transport
            .send(&message)
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// Bulk Sender
// ============================================================================

/// Sends each record its own certificate
pub struct EmailSender<T: MailTransport> {
    transport: T,
    settings: EmailSettings,
}

impl<T: MailTransport> EmailSender<T> {
    pub fn new(transport: T, settings: EmailSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    pub fn test_connection(&self) -> bool {
        match self.transport.test_connection() {
            Ok(()) => {
                tracing::info!("Email connection test successful");
                true
            }
            Err(e) => {
                tracing::error!("Email connection test failed: {}", e);
                false
            }
        }
    }

    /// Message for one record and its certificate
    pub fn compose(&self, record: &StudentRecord, attachment_name: &str, png: &[u8]) -> OutgoingEmail {
        OutgoingEmail {
            to: record.email.trim().to_string(),
            subject: self.settings.subject.clone(),
            body: render_body(&self.settings.body_template, record),
            attachment_name: attachment_name.to_string(),
            attachment: png.to_vec(),
        }
    }

    /// Send one certificate
    pub fn send_certificate(
        &self,
        record: &StudentRecord,
        attachment_name: &str,
        png: &[u8],
    ) -> Result<()> {
        if record.email.trim().is_empty() {
            return Err(DeliveryError::MissingSetting(format!(
                "email address for {}",
                record.name
            )));
        }
        self.transport
            .send(&self.compose(record, attachment_name, png))
    }

    /// Email every record the certificate rendered from it
    ///
    /// Certificates are matched by record index, so a record whose
    /// certificate failed to render is reported as failed and never
    /// receives someone else's certificate.
    pub fn send_bulk(&self, records: &[StudentRecord], outcome: &BatchOutcome) -> DeliveryReport {
        let mut report = DeliveryReport::new(records.len());

        for (index, record) in records.iter().enumerate() {
            let Some(certificate) = outcome.for_record(index) else {
                tracing::error!("No certificate generated for {}", record.name);
                report.record_failure(record, "Certificate was not generated");
                continue;
            };

            match self.send_certificate(record, &certificate.file_name, &certificate.png) {
                Ok(()) => {
                    tracing::info!("Email sent successfully to {}", record.email);
                    report.record_success(record);
                }
                Err(e) => {
                    tracing::error!("Error sending email to {}: {}", record.email, e);
                    report.record_failure(record, e.to_string());
                }
            }
        }

        tracing::info!(
            "Email sending completed. Success: {}, Failed: {}",
            report.success_count,
            report.failure_count
        );
        report
    }
}
