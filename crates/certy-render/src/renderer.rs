//! Certificate rendering
//!
//! One renderer, two layout policies:
//! - `Fixed`: a single name at a pixel position with an optional date line
//! - `Configured`: a title plus record fields placed by a [`LayoutConfig`]

use std::io::Cursor;
use std::path::Path;

use ab_glyph::{Font, PxScale, ScaleFont};
use certy_core::StudentRecord;
use chrono::NaiveDate;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};

use crate::fonts::FontBook;
use crate::layout::{check_size, parse_color, LayoutConfig};
use crate::pdf::{is_pdf_bytes, is_pdf_path, PdfRasterizer};
use crate::{RenderError, Result};

/// A4 at 72 dpi, used when no template can be read
pub const BLANK_PAGE_SIZE: (u32, u32) = (595, 842);

/// Page size in points that configured layouts are expressed in
const LAYOUT_PAGE_SIZE: (f32, f32) = (595.0, 842.0);

/// Decode a template: the first page of a PDF, or any supported image
pub fn load_template_bytes(bytes: &[u8]) -> Result<RgbImage> {
    if is_pdf_bytes(bytes) {
        return PdfRasterizer::new().first_page(bytes);
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Read and decode a template file
pub fn load_template_path(path: &Path) -> Result<RgbImage> {
    if is_pdf_path(path) {
        return PdfRasterizer::new().first_page_of_file(path);
    }
    Ok(image::open(path)?.to_rgb8())
}

/// Single-name placement in template pixels (origin top-left)
#[derive(Debug, Clone, PartialEq)]
pub struct FixedLayout {
    pub x: i32,
    pub y: i32,
    pub font_size: f32,
    pub color: String,
    pub font: String,
    /// Date printed under the name, if any
    pub date: Option<NaiveDate>,
}

impl Default for FixedLayout {
    fn default() -> Self {
        Self {
            x: 500,
            y: 300,
            font_size: 40.0,
            color: "#000000".to_string(),
            font: "Helvetica".to_string(),
            date: None,
        }
    }
}

impl FixedLayout {
    pub fn new(x: i32, y: i32, font_size: f32) -> Self {
        Self {
            x,
            y,
            font_size,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = font.into();
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Stamp today's local date
    pub fn with_today(self) -> Self {
        self.with_date(chrono::Local::now().date_naive())
    }

    /// Date line text, e.g. "Date: March 05, 2025"
    pub fn date_line(&self) -> Option<String> {
        self.date.map(|d| format!("Date: {}", d.format("%B %d, %Y")))
    }

    /// Size of the date line relative to the name
    pub fn date_font_size(&self) -> f32 {
        (self.font_size / 3.0).floor().max(16.0)
    }
}

/// How values are placed on the page
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutPolicy {
    Fixed(FixedLayout),
    Configured(LayoutConfig),
}

/// A rendered certificate page
#[derive(Debug, Clone)]
pub struct RenderedCertificate {
    pub image: RgbImage,
}

impl RenderedCertificate {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// Anything that can turn a record into a certificate
pub trait CertificateRenderer: Send + Sync {
    fn render(&self, record: &StudentRecord) -> Result<RenderedCertificate>;
}

/// Renderer drawing text over a raster template
pub struct TemplateRenderer {
    template: Option<RgbImage>,
    fonts: FontBook,
    policy: LayoutPolicy,
}

/// Vertical anchoring of drawn text
#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// `y` is the vertical middle of the text
    Middle,
    /// `y` is the text baseline
    Baseline,
}

/// One centred run of text
struct TextSpec<'a> {
    text: &'a str,
    at: (f32, f32),
    size: f32,
    font: &'a str,
    color: Rgb<u8>,
    anchor: Anchor,
}

impl TemplateRenderer {
    /// Renderer over a blank page
    pub fn new(policy: LayoutPolicy, fonts: FontBook) -> Self {
        Self {
            template: None,
            fonts,
            policy,
        }
    }

    pub fn with_template(mut self, template: DynamicImage) -> Self {
        self.template = Some(template.to_rgb8());
        self
    }

    /// Use encoded template bytes (image or PDF), falling back to a blank page
    pub fn with_template_bytes(mut self, bytes: &[u8]) -> Self {
        match load_template_bytes(bytes) {
            Ok(img) => self.template = Some(img),
            Err(e) => {
                tracing::warn!("Template unreadable ({}); using a blank page", e);
                self.template = None;
            }
        }
        self
    }

    /// Use a template file (image or PDF), falling back to a blank page
    pub fn with_template_path(mut self, path: &Path) -> Self {
        match load_template_path(path) {
            Ok(img) => self.template = Some(img),
            Err(e) => {
                tracing::warn!(
                    "Template {} unreadable ({}); using a blank page",
                    path.display(),
                    e
                );
                self.template = None;
            }
        }
        self
    }

    pub fn policy(&self) -> &LayoutPolicy {
        &self.policy
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }

    /// Validate colours and fonts up front so a batch fails fast
    pub fn check(&self) -> Result<()> {
        match &self.policy {
            LayoutPolicy::Fixed(fixed) => {
                check_size("name", fixed.font_size)?;
                parse_color(&fixed.color)?;
                self.fonts.resolve(&fixed.font)?;
            }
            LayoutPolicy::Configured(layout) => {
                layout.validate()?;
                if let Some(title) = &layout.title {
                    self.fonts.resolve(&title.font)?;
                }
                for style in layout.fields.values() {
                    self.fonts.resolve(&style.font)?;
                }
            }
        }
        Ok(())
    }

    fn page(&self) -> RgbImage {
        match &self.template {
            Some(template) => template.clone(),
            None => {
                let (w, h) = BLANK_PAGE_SIZE;
                RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
            }
        }
    }

    fn draw(&self, page: &mut RgbImage, text: &TextSpec<'_>) -> Result<()> {
        if text.text.trim().is_empty() {
            return Ok(());
        }

        let font = self.fonts.resolve(text.font)?;
        let scale = PxScale::from(text.size);
        let ascent = font.as_scaled(scale).ascent();
        let (width, height) = text_size(scale, font, text.text);

        // Glyphs are laid out with their baseline `ascent` below the top
        let (x, y) = text.at;
        let left = x - width as f32 / 2.0;
        let top = match text.anchor {
            Anchor::Middle => y - ascent + height as f32 / 2.0,
            Anchor::Baseline => y - ascent,
        };

        draw_text_mut(
            page,
            text.color,
            left.round() as i32,
            top.round() as i32,
            scale,
            font,
            text.text,
        );
        Ok(())
    }

    fn render_fixed(&self, fixed: &FixedLayout, record: &StudentRecord) -> Result<RgbImage> {
        check_size("name", fixed.font_size)?;
        let color = parse_color(&fixed.color)?;
        let mut page = self.page();
        let (x, y) = (fixed.x as f32, fixed.y as f32);

        self.draw(
            &mut page,
            &TextSpec {
                text: &record.name,
                at: (x, y),
                size: fixed.font_size,
                font: &fixed.font,
                color,
                anchor: Anchor::Middle,
            },
        )?;

        if let Some(date_line) = fixed.date_line() {
            self.draw(
                &mut page,
                &TextSpec {
                    text: &date_line,
                    at: (x, y + fixed.font_size + 15.0),
                    size: fixed.date_font_size(),
                    font: &fixed.font,
                    color,
                    anchor: Anchor::Middle,
                },
            )?;
        }

        Ok(page)
    }

    fn render_configured(&self, layout: &LayoutConfig, record: &StudentRecord) -> Result<RgbImage> {
        let mut page = self.page();
        let (width, height) = page.dimensions();
        let sx = width as f32 / LAYOUT_PAGE_SIZE.0;
        let sy = height as f32 / LAYOUT_PAGE_SIZE.1;
        // Layout points have their origin at the bottom-left corner
        let to_pixels = |x: f32, y: f32| (x * sx, height as f32 - y * sy);

        if let Some(title) = &layout.title {
            self.draw(
                &mut page,
                &TextSpec {
                    text: &title.text,
                    at: to_pixels(title.x, title.y),
                    size: title.size * sy,
                    font: &title.font,
                    color: parse_color(&title.color)?,
                    anchor: Anchor::Baseline,
                },
            )?;
        }

        for (field, style) in &layout.fields {
            let value = record.field(field).unwrap_or_default();
            self.draw(
                &mut page,
                &TextSpec {
                    text: value,
                    at: to_pixels(style.x, style.y),
                    size: style.size * sy,
                    font: &style.font,
                    color: parse_color(&style.color)?,
                    anchor: Anchor::Baseline,
                },
            )?;
        }

        Ok(page)
    }
}

impl CertificateRenderer for TemplateRenderer {
    fn render(&self, record: &StudentRecord) -> Result<RenderedCertificate> {
        if record.name.trim().is_empty() {
            return Err(RenderError::InvalidInput("record has no name".to_string()));
        }

        let image = match &self.policy {
            LayoutPolicy::Fixed(fixed) => self.render_fixed(fixed, record)?,
            LayoutPolicy::Configured(layout) => self.render_configured(layout, record)?,
        };
        Ok(RenderedCertificate { image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FieldStyle;

    fn ink_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| p.0 != [255, 255, 255]).count()
    }

    fn ink_rows(image: &RgbImage) -> Option<(u32, u32)> {
        let rows: Vec<u32> = (0..image.height())
            .filter(|&y| (0..image.width()).any(|x| image.get_pixel(x, y).0 != [255, 255, 255]))
            .collect();
        Some((*rows.first()?, *rows.last()?))
    }

    fn system_fonts() -> Option<FontBook> {
        let book = FontBook::system();
        book.has_fonts().then_some(book)
    }

    #[test]
    fn test_date_line_format() {
        let fixed = FixedLayout::new(100, 100, 60.0)
            .with_date(NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert_eq!(fixed.date_line().unwrap(), "Date: March 05, 2025");
        assert_eq!(fixed.date_font_size(), 20.0);
        assert_eq!(FixedLayout::new(0, 0, 30.0).date_font_size(), 16.0);
        assert!(FixedLayout::default().date_line().is_none());
    }

    #[test]
    fn test_blank_page_when_no_template() {
        let renderer = TemplateRenderer::new(
            LayoutPolicy::Configured(LayoutConfig::empty()),
            FontBook::empty(),
        )
        .with_template_bytes(b"definitely not an image");

        assert!(!renderer.has_template());
        let cert = renderer.render(&StudentRecord::from_name("Jane Doe")).unwrap();
        assert_eq!(cert.dimensions(), BLANK_PAGE_SIZE);
        assert_eq!(ink_pixels(&cert.image), 0);
    }

    const A4_PDF: &[u8] = b"%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] >> endobj
trailer << /Root 1 0 R >>
%%EOF
";

    #[test]
    fn test_pdf_template_is_rasterised() {
        match load_template_bytes(A4_PDF) {
            Ok(page) => {
                assert_eq!(page.dimensions(), (1190, 1684));
                let renderer = TemplateRenderer::new(
                    LayoutPolicy::Configured(LayoutConfig::empty()),
                    FontBook::empty(),
                )
                .with_template_bytes(A4_PDF);
                assert!(renderer.has_template());
            }
            // Without a PDFium library the failure comes from the PDF loader, not an image decode
            Err(e) => assert!(matches!(e, RenderError::Pdf(_))),
        }
    }

    #[test]
    fn test_pdf_template_path_goes_through_pdf_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();

        assert!(matches!(load_template_path(&path), Err(RenderError::Pdf(_))));
    }

    #[test]
    fn test_template_size_is_kept() {
        let template = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 200, Rgb([240, 240, 240])));
        let renderer = TemplateRenderer::new(
            LayoutPolicy::Configured(LayoutConfig::empty()),
            FontBook::empty(),
        )
        .with_template(template);

        let cert = renderer.render(&StudentRecord::from_name("Jane Doe")).unwrap();
        assert_eq!(cert.dimensions(), (320, 200));
        let png = cert.to_png_bytes().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let renderer = TemplateRenderer::new(
            LayoutPolicy::Fixed(FixedLayout::default()),
            FontBook::empty(),
        );
        assert!(renderer.check().is_err());
        assert!(matches!(
            renderer.render(&StudentRecord::from_name("Jane Doe")),
            Err(RenderError::Font(_))
        ));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let renderer = TemplateRenderer::new(
            LayoutPolicy::Configured(LayoutConfig::empty()),
            FontBook::empty(),
        );
        assert!(matches!(
            renderer.render(&StudentRecord::from_name("  ")),
            Err(RenderError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_positive_fixed_font_size() {
        for size in [0.0, -12.0, f32::NAN] {
            let renderer = TemplateRenderer::new(
                LayoutPolicy::Fixed(FixedLayout::new(100, 100, size)),
                FontBook::empty(),
            );
            assert!(matches!(renderer.check(), Err(RenderError::InvalidLayout(_))));
            assert!(matches!(
                renderer.render(&StudentRecord::from_name("Jane Doe")),
                Err(RenderError::InvalidLayout(_))
            ));
        }
    }

    #[test]
    fn test_invalid_fixed_color() {
        let renderer = TemplateRenderer::new(
            LayoutPolicy::Fixed(FixedLayout::default().with_color("red")),
            FontBook::empty(),
        );
        assert!(matches!(
            renderer.render(&StudentRecord::from_name("Jane Doe")),
            Err(RenderError::InvalidColor(_))
        ));
    }

    #[test]
    fn test_fixed_name_is_centered_on_anchor() {
        let Some(fonts) = system_fonts() else { return };
        let renderer = TemplateRenderer::new(
            LayoutPolicy::Fixed(FixedLayout::new(297, 400, 40.0)),
            fonts,
        );

        let cert = renderer.render(&StudentRecord::from_name("John Smith")).unwrap();
        let (top, bottom) = ink_rows(&cert.image).unwrap();
        assert!(top < 400 && bottom > 380, "ink rows {top}..{bottom}");

        let cols: Vec<u32> = (0..cert.image.width())
            .filter(|&x| (0..cert.image.height()).any(|y| cert.image.get_pixel(x, y).0 != [255, 255, 255]))
            .collect();
        let middle = (cols[0] + cols[cols.len() - 1]) / 2;
        assert!((middle as i32 - 297).abs() < 15, "text centred at {middle}");
    }

    #[test]
    fn test_fixed_date_adds_second_line() {
        let Some(fonts) = system_fonts() else { return };
        let layout = FixedLayout::new(297, 300, 40.0)
            .with_date(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        let renderer = TemplateRenderer::new(LayoutPolicy::Fixed(layout), fonts);

        let cert = renderer.render(&StudentRecord::from_name("John Smith")).unwrap();
        let (_, bottom) = ink_rows(&cert.image).unwrap();
        assert!(bottom > 340, "date line should sit below the name, ink ends at {bottom}");
    }

    #[test]
    fn test_configured_layout_uses_bottom_left_origin() {
        let Some(fonts) = system_fonts() else { return };
        let layout = LayoutConfig::empty()
            .with_field("name", FieldStyle::new(297.0, 742.0, "Helvetica-Bold", 24.0));
        let renderer = TemplateRenderer::new(LayoutPolicy::Configured(layout), fonts);

        let cert = renderer.render(&StudentRecord::from_name("Jane Doe")).unwrap();
        let (top, bottom) = ink_rows(&cert.image).unwrap();
        // y = 742pt from the bottom is 100px from the top of an 842px page
        assert!(bottom <= 106 && top >= 75, "ink rows {top}..{bottom}");
    }
}
