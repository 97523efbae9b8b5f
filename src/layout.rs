//! Layout descriptor: where each recipient field sits on the certificate.
//!
//! Positions are relative (0.0..=1.0 of the canvas) and font sizes are a
//! fraction of the canvas height, so the same descriptor drives the HTML
//! template and the preview canvas at any scale factor.

use crate::data::{CertificateData, Field};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Font family used for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontRole {
    Script,
    Serif,
    Sans,
}

impl FontRole {
    /// CSS font stack for the HTML template
    pub fn css_stack(self) -> &'static str {
        match self {
            FontRole::Script => "'Great Vibes', 'Brush Script MT', 'Dancing Script', cursive",
            FontRole::Serif => "'Playfair Display', Georgia, 'Times New Roman', serif",
            FontRole::Sans => "'Montserrat', 'Helvetica Neue', Arial, sans-serif",
        }
    }
}

/// Horizontal anchoring of `x`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

/// One field's slot on the template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSlot {
    pub field: Field,
    /// Anchor x as a fraction of canvas width
    pub x: f32,
    /// Top of the text box as a fraction of canvas height
    pub y: f32,
    /// Font size as a fraction of canvas height
    pub size: f32,
    pub font: FontRole,
    /// `#rrggbb`
    pub color: String,
    #[serde(default)]
    pub align: Align,
    #[serde(default)]
    pub bold: bool,
    /// Literal label drawn before the value, e.g. `Certificate No: `
    #[serde(default)]
    pub prefix: String,
}

/// A text run resolved to pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedText {
    pub field: Field,
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_px: f32,
    pub font: FontRole,
    pub color: [u8; 3],
    pub align: Align,
    pub bold: bool,
}

/// Named fields mapped to relative position, font and color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLayout {
    pub fields: Vec<FieldSlot>,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSlot {
                    field: Field::RecipientName,
                    x: 0.5,
                    y: 0.42,
                    size: 0.075,
                    font: FontRole::Script,
                    color: "#1f2a44".to_string(),
                    align: Align::Center,
                    bold: false,
                    prefix: String::new(),
                },
                FieldSlot {
                    field: Field::Professional,
                    x: 0.5,
                    y: 0.56,
                    size: 0.028,
                    font: FontRole::Serif,
                    color: "#3a3a3a".to_string(),
                    align: Align::Center,
                    bold: false,
                    prefix: String::new(),
                },
                FieldSlot {
                    field: Field::CertificateNumber,
                    x: 0.12,
                    y: 0.83,
                    size: 0.022,
                    font: FontRole::Sans,
                    color: "#222222".to_string(),
                    align: Align::Left,
                    bold: true,
                    prefix: "Certificate No: ".to_string(),
                },
                FieldSlot {
                    field: Field::AwardReraNumber,
                    x: 0.88,
                    y: 0.83,
                    size: 0.022,
                    font: FontRole::Sans,
                    color: "#222222".to_string(),
                    align: Align::Right,
                    bold: true,
                    prefix: "RERA No: ".to_string(),
                },
            ],
        }
    }
}

/// Parse `#rrggbb` into RGB components
pub fn parse_color(s: &str) -> Result<[u8; 3]> {
    let hex_part = s.trim().trim_start_matches('#');
    if hex_part.len() != 6 {
        return Err(Error::Config(format!("invalid color: {}", s)));
    }
    let b = hex::decode(hex_part).map_err(|_| Error::Config(format!("invalid color: {}", s)))?;
    Ok([b[0], b[1], b[2]])
}

impl TemplateLayout {
    /// Load a layout descriptor from a JSON file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let layout: TemplateLayout = serde_json::from_slice(&raw)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<()> {
        for slot in &self.fields {
            if !(0.0..=1.0).contains(&slot.x) || !(0.0..=1.0).contains(&slot.y) {
                return Err(Error::Config(format!(
                    "slot {:?} position ({}, {}) is outside the canvas",
                    slot.field, slot.x, slot.y
                )));
            }
            if !(slot.size > 0.0 && slot.size <= 1.0) {
                return Err(Error::Config(format!(
                    "slot {:?} has invalid size {}",
                    slot.field, slot.size
                )));
            }
            parse_color(&slot.color)?;
        }
        Ok(())
    }

    /// Resolve every slot against `data` for a `width`×`height` canvas.
    pub fn place(&self, data: &CertificateData, width: u32, height: u32) -> Result<Vec<PlacedText>> {
        let (w, h) = (width as f32, height as f32);
        self.fields
            .iter()
            .map(|slot| {
                Ok(PlacedText {
                    field: slot.field,
                    text: format!("{}{}", slot.prefix, data.display(slot.field)),
                    x: (slot.x * w).round(),
                    y: (slot.y * h).round(),
                    font_px: (slot.size * h).round().max(1.0),
                    font: slot.font,
                    color: parse_color(&slot.color)?,
                    align: slot.align,
                    bold: slot.bold,
                })
            })
            .collect()
    }
}

/// Stable digest of a placement list
pub fn fingerprint(placed: &[PlacedText]) -> String {
    let json = serde_json::to_vec(placed).unwrap_or_default();
    hex::encode(Sha256::digest(&json))
}
