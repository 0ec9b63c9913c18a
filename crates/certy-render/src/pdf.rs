//! PDF templates
//!
//! Certificate templates are often designed as single-page PDFs. The first
//! page is rasterised through PDFium and used as the background image, so
//! the rest of the renderer only ever deals with `RgbImage`.

use std::path::Path;

use image::RgbImage;
use pdfium_render::prelude::*;

use crate::{RenderError, Result};

/// Library locations tried before the platform's default search path
const PDFIUM_DIRS: &[&str] = &["./", "/usr/lib", "/usr/local/lib", "/opt/homebrew/lib"];

/// Check for the `%PDF` magic bytes
pub fn is_pdf_bytes(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Check for a `.pdf` extension
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Rasterises the first page of a PDF template
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    /// Render resolution; 72 keeps one pixel per layout point
    pub dpi: f32,
    /// Upper bound on either side of the rendered page
    pub max_dimension: u32,
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self {
            dpi: 144.0,
            max_dimension: 4000,
        }
    }
}

impl PdfRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dpi(mut self, dpi: f32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Bind to a PDFium shared library
    pub fn bind() -> Result<Pdfium> {
        let bindings = PDFIUM_DIRS
            .iter()
            .map(|dir| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)))
            .find_map(|bound| bound.ok())
            .map(Ok)
            .unwrap_or_else(Pdfium::bind_to_system_library)
            .map_err(|e| RenderError::Pdf(format!("PDFium library not found: {e}")))?;
        Ok(Pdfium::new(bindings))
    }

    /// Whether a PDFium library can be loaded on this machine
    pub fn is_available() -> bool {
        Self::bind().is_ok()
    }

    /// Render the first page of an in-memory PDF
    pub fn first_page(&self, bytes: &[u8]) -> Result<RgbImage> {
        let pdfium = Self::bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| RenderError::Pdf(format!("cannot load PDF: {e}")))?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(RenderError::Pdf("PDF has no pages".to_string()));
        }
        if pages.len() > 1 {
            tracing::debug!("PDF template has {} pages; using the first", pages.len());
        }

        let page = pages
            .get(0)
            .map_err(|e| RenderError::Pdf(format!("cannot open page 1: {e}")))?;
        self.render_page(&page)
    }

    /// Render the first page of a PDF file
    pub fn first_page_of_file(&self, path: &Path) -> Result<RgbImage> {
        let bytes = std::fs::read(path)?;
        self.first_page(&bytes)
    }

    /// Pixel size for a page of the given size in points
    fn target_size(&self, width_pt: f32, height_pt: f32) -> (u32, u32) {
        let scale = self.dpi / 72.0;
        let (mut width, mut height) = (width_pt * scale, height_pt * scale);

        let longest = width.max(height);
        if longest > self.max_dimension as f32 {
            let ratio = self.max_dimension as f32 / longest;
            width *= ratio;
            height *= ratio;
        }
        ((width.round() as u32).max(1), (height.round() as u32).max(1))
    }

    fn render_page(&self, page: &PdfPage) -> Result<RgbImage> {
        let (width, height) = self.target_size(page.width().value, page.height().value);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::Pdf(format!("cannot render page 1: {e}")))?;
        Ok(bitmap.as_image().to_rgb8())
    }
}
