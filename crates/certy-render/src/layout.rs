//! Layout configuration for certificates
//!
//! A layout places a title and any number of record fields on the page.
//! Positions are page points (A4 is 595x842) measured from the bottom-left
//! corner, and each value is centred horizontally on its anchor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use certy_core::StudentRecord;
use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

pub const DEFAULT_TITLE: &str = "CERTIFICATE OF COMPLETION";

fn default_x() -> f32 {
    300.0
}

fn default_field_y() -> f32 {
    400.0
}

fn default_title_y() -> f32 {
    500.0
}

fn default_font() -> String {
    "Helvetica".to_string()
}

fn default_bold_font() -> String {
    "Helvetica-Bold".to_string()
}

fn default_field_size() -> f32 {
    14.0
}

fn default_title_size() -> f32 {
    24.0
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_title_text() -> String {
    DEFAULT_TITLE.to_string()
}

/// Placement and styling of one record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStyle {
    #[serde(default = "default_x")]
    pub x: f32,
    #[serde(default = "default_field_y")]
    pub y: f32,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_field_size")]
    pub size: f32,
    #[serde(default = "default_color")]
    pub color: String,
}

impl FieldStyle {
    pub fn new(x: f32, y: f32, font: impl Into<String>, size: f32) -> Self {
        Self {
            x,
            y,
            font: font.into(),
            size,
            color: default_color(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// Placement, styling and text of the title line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleStyle {
    #[serde(default = "default_x")]
    pub x: f32,
    #[serde(default = "default_title_y")]
    pub y: f32,
    #[serde(default = "default_bold_font")]
    pub font: String,
    #[serde(default = "default_title_size")]
    pub size: f32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_title_text")]
    pub text: String,
}

impl Default for TitleStyle {
    fn default() -> Self {
        Self {
            x: default_x(),
            y: default_title_y(),
            font: default_bold_font(),
            size: default_title_size(),
            color: default_color(),
            text: default_title_text(),
        }
    }
}

/// A font file registered under a layout font name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFont {
    pub name: String,
    pub file: String,
}

/// Certificate layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<TitleStyle>,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldStyle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_fonts: Vec<CustomFont>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            "name".to_string(),
            FieldStyle::new(300.0, 450.0, "Helvetica-Bold", 18.0),
        );
        fields.insert(
            "branch".to_string(),
            FieldStyle::new(300.0, 420.0, "Helvetica", 14.0),
        );
        fields.insert(
            "year_of_study".to_string(),
            FieldStyle::new(300.0, 400.0, "Helvetica", 14.0),
        );

        Self {
            title: Some(TitleStyle::default()),
            fields,
            template_path: Some("template.pdf".to_string()),
            custom_fonts: Vec::new(),
        }
    }
}

impl LayoutConfig {
    /// Layout with no title and no fields
    pub fn empty() -> Self {
        Self {
            title: None,
            fields: BTreeMap::new(),
            template_path: None,
            custom_fonts: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, style: FieldStyle) -> Self {
        self.fields.insert(name.into(), style);
        self
    }

    pub fn with_title(mut self, title: TitleStyle) -> Self {
        self.title = Some(title);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let layout: Self = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a layout file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Template named by the layout, relative paths resolved from `base`
    pub fn resolve_template(&self, base: Option<&Path>) -> Option<PathBuf> {
        let template = Path::new(self.template_path.as_deref()?);
        match base {
            Some(dir) if template.is_relative() => Some(dir.join(template)),
            _ => Some(template.to_path_buf()),
        }
    }

    /// Check colours and sizes
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            parse_color(&title.color)?;
            check_size("title", title.size)?;
        }
        for (name, style) in &self.fields {
            parse_color(&style.color)?;
            check_size(name, style.size)?;
        }
        Ok(())
    }
}

pub(crate) fn check_size(what: &str, size: f32) -> Result<()> {
    if size.is_finite() && size > 0.0 {
        Ok(())
    } else {
        Err(RenderError::InvalidLayout(format!(
            "{what}: font size must be positive, got {size}"
        )))
    }
}

/// Parse `#RRGGBB` or `#RGB`
pub fn parse_color(color: &str) -> Result<Rgb<u8>> {
    let invalid = || RenderError::InvalidColor(color.to_string());
    let hex = color.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        6 => Ok(Rgb([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ])),
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Ok(Rgb([expand(0)?, expand(1)?, expand(2)?]))
        }
        _ => Err(invalid()),
    }
}

/// Data used for layout previews
pub fn sample_record() -> StudentRecord {
    StudentRecord::new("Sample Name", "", "2025", "Sample Branch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = LayoutConfig::default();
        assert_eq!(layout.fields.len(), 3);
        assert_eq!(layout.fields["name"].font, "Helvetica-Bold");
        assert_eq!(layout.fields["name"].y, 450.0);
        assert_eq!(layout.fields["branch"].y, 420.0);
        assert_eq!(layout.fields["year_of_study"].y, 400.0);

        let title = layout.title.as_ref().unwrap();
        assert_eq!(title.size, 24.0);
        assert_eq!(title.text, DEFAULT_TITLE);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let layout = LayoutConfig::from_json(
            r##"{"fields": {"name": {"x": 100, "y": 200}}, "title": {"text": "AWARD"}}"##,
        )
        .unwrap();

        let name = &layout.fields["name"];
        assert_eq!((name.x, name.y), (100.0, 200.0));
        assert_eq!(name.font, "Helvetica");
        assert_eq!(name.size, 14.0);
        assert_eq!(name.color, "#000000");

        let title = layout.title.unwrap();
        assert_eq!(title.text, "AWARD");
        assert_eq!(title.y, 500.0);
        assert!(layout.template_path.is_none());
    }

    #[test]
    fn test_resolve_template() {
        let layout = LayoutConfig::default();
        assert_eq!(
            layout.resolve_template(None),
            Some(PathBuf::from("template.pdf"))
        );
        assert_eq!(
            layout.resolve_template(Some(Path::new("/srv/designs"))),
            Some(PathBuf::from("/srv/designs/template.pdf"))
        );

        let mut absolute = LayoutConfig::empty();
        absolute.template_path = Some("/opt/templates/award.png".to_string());
        assert_eq!(
            absolute.resolve_template(Some(Path::new("/srv/designs"))),
            Some(PathBuf::from("/opt/templates/award.png"))
        );
        assert_eq!(LayoutConfig::empty().resolve_template(None), None);
    }

    #[test]
    fn test_invalid_color_is_rejected() {
        let err = LayoutConfig::from_json(r#"{"fields": {"name": {"color": "blue"}}}"#);
        assert!(matches!(err, Err(RenderError::InvalidColor(_))));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let err = LayoutConfig::from_json(r#"{"fields": {"name": {"size": 0}}}"#);
        assert!(matches!(err, Err(RenderError::InvalidLayout(_))));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#1A2b3C").unwrap(), Rgb([0x1a, 0x2b, 0x3c]));
        assert_eq!(parse_color("#fff").unwrap(), Rgb([255, 255, 255]));
        assert!(parse_color("000000").is_err());
        assert!(parse_color("#12345").is_err());
        assert!(parse_color("#gg0000").is_err());
        assert!(parse_color("#ééé").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");

        let layout = LayoutConfig::default()
            .with_field("email", FieldStyle::new(300.0, 380.0, "Helvetica", 10.0).with_color("#333"));
        layout.save(&path).unwrap();

        assert_eq!(LayoutConfig::load(&path).unwrap(), layout);
    }
}
