//! Certy Render - Certificate generation
//!
//! Draws a recipient's name, and optionally other record fields, onto a
//! certificate template (an image, or the first page of a PDF) and encodes
//! the result as PNG.

use thiserror::Error;

pub mod batch;
pub mod fonts;
pub mod layout;
pub mod pdf;
pub mod renderer;

pub use batch::{
    certificate_file_name, generate_all, safe_file_name, BatchFailure, BatchOutcome,
    GeneratedCertificate,
};
pub use fonts::FontBook;
pub use pdf::{is_pdf_bytes, is_pdf_path, PdfRasterizer};
pub use layout::{parse_color, sample_record, CustomFont, FieldStyle, LayoutConfig, TitleStyle};
pub use renderer::{
    load_template_bytes, load_template_path, CertificateRenderer, FixedLayout, LayoutPolicy,
    RenderedCertificate, TemplateRenderer, BLANK_PAGE_SIZE,
};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid color: {0} (expected #RRGGBB or #RGB)")]
    InvalidColor(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("PDF template error: {0}")]
    Pdf(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Layout parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
