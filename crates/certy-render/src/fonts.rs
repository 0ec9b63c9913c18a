//! Font lookup for certificate text
//!
//! Layout font names ("Helvetica", "Helvetica-Bold", or a custom name) are
//! resolved to loaded TrueType fonts. Custom fonts registered from the
//! layout win; everything else maps onto a regular or bold system family.

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::FontVec;

use crate::layout::CustomFont;
use crate::{RenderError, Result};

const REGULAR_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BOLD_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

fn load_font_file(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path)
        .map_err(|e| RenderError::Font(format!("{}: {e}", path.display())))?;
    FontVec::try_from_vec(data)
        .map_err(|_| RenderError::Font(format!("failed to parse font file: {}", path.display())))
}

fn first_loadable(paths: &[&str]) -> Option<FontVec> {
    paths.iter().find_map(|path| match load_font_file(Path::new(path)) {
        Ok(font) => {
            tracing::debug!("Loaded system font: {}", path);
            Some(font)
        }
        Err(_) => None,
    })
}

fn is_bold_name(name: &str) -> bool {
    name.to_ascii_lowercase().contains("bold")
}

/// Loaded fonts addressable by layout font name
#[derive(Default)]
pub struct FontBook {
    regular: Option<FontVec>,
    bold: Option<FontVec>,
    custom: HashMap<String, FontVec>,
}

impl FontBook {
    /// Font book with no fonts; resolve fails until fonts are added
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the regular and bold system families
    pub fn system() -> Self {
        let book = Self {
            regular: first_loadable(REGULAR_FONT_PATHS),
            bold: first_loadable(BOLD_FONT_PATHS),
            custom: HashMap::new(),
        };
        if book.regular.is_none() && book.bold.is_none() {
            tracing::warn!("No system font found; register a font file to render text");
        }
        book
    }

    /// Register a font file under `name`
    pub fn with_font_file(mut self, name: impl Into<String>, path: &Path) -> Result<Self> {
        let font = load_font_file(path)?;
        self.custom.insert(name.into(), font);
        Ok(self)
    }

    /// Use `path` as the regular family fallback
    pub fn with_regular_file(mut self, path: &Path) -> Result<Self> {
        self.regular = Some(load_font_file(path)?);
        Ok(self)
    }

    /// Register a layout's custom fonts, resolving relative paths from `base`
    ///
    /// Unreadable files are skipped with a warning.
    pub fn register_custom(&mut self, fonts: &[CustomFont], base: Option<&Path>) {
        for custom in fonts {
            let path = match base {
                Some(dir) if Path::new(&custom.file).is_relative() => dir.join(&custom.file),
                _ => Path::new(&custom.file).to_path_buf(),
            };
            match load_font_file(&path) {
                Ok(font) => {
                    self.custom.insert(custom.name.clone(), font);
                }
                Err(e) => tracing::warn!("Skipping custom font '{}': {}", custom.name, e),
            }
        }
    }

    pub fn has_fonts(&self) -> bool {
        self.regular.is_some() || self.bold.is_some() || !self.custom.is_empty()
    }

    /// Font for a layout font name
    pub fn resolve(&self, name: &str) -> Result<&FontVec> {
        if let Some(font) = self.custom.get(name) {
            return Ok(font);
        }

        let (preferred, fallback) = if is_bold_name(name) {
            (&self.bold, &self.regular)
        } else {
            (&self.regular, &self.bold)
        };

        preferred
            .as_ref()
            .or(fallback.as_ref())
            .or_else(|| self.custom.values().next())
            .ok_or_else(|| RenderError::Font(format!("no font available for '{name}'")))
    }
}
