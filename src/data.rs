//! Recipient data accepted by the renderer.
//!
//! Callers send loosely-named JSON (the same record may arrive as
//! `recipient_name` or `name`, `certificate_number` or `certificateNo`).
//! Nothing is validated: blank or missing values render as placeholders.

use serde::{Deserialize, Serialize};

/// Placeholder shown when no recipient name is provided
pub const NAME_PLACEHOLDER: &str = "Recipient Name";
/// Placeholder shown for any other empty slot
pub const EMPTY_PLACEHOLDER: &str = "-";

/// Fields interpolated into a certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCertificateData")]
pub struct CertificateData {
    pub recipient_name: String,
    pub certificate_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub award_rera_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional: Option<String>,
}

/// Scalar JSON value accepted for a text field
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseText {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl LooseText {
    fn into_string(self) -> String {
        match self {
            LooseText::Text(s) => s,
            LooseText::Int(n) => n.to_string(),
            LooseText::UInt(n) => n.to_string(),
            LooseText::Float(n) => n.to_string(),
            LooseText::Bool(b) => b.to_string(),
        }
    }
}

/// Accepts a string, number, bool or null; anything else is an error.
fn loose_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<LooseText> = Option::deserialize(deserializer)?;
    Ok(opt.map(LooseText::into_string))
}

/// Every accepted key kept apart, so a payload may carry both a canonical
/// key and an alias. Canonical keys win when both hold text.
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawCertificateData {
    #[serde(deserialize_with = "loose_text")]
    recipient_name: Option<String>,
    #[serde(rename = "recipientName", deserialize_with = "loose_text")]
    recipient_name_camel: Option<String>,
    #[serde(deserialize_with = "loose_text")]
    name: Option<String>,

    #[serde(deserialize_with = "loose_text")]
    certificate_number: Option<String>,
    #[serde(rename = "certificateNumber", deserialize_with = "loose_text")]
    certificate_number_camel: Option<String>,
    #[serde(deserialize_with = "loose_text")]
    certificate_no: Option<String>,
    #[serde(rename = "certificateNo", deserialize_with = "loose_text")]
    certificate_no_camel: Option<String>,

    #[serde(deserialize_with = "loose_text")]
    award_rera_number: Option<String>,
    #[serde(rename = "awardReraNumber", deserialize_with = "loose_text")]
    award_rera_number_camel: Option<String>,
    #[serde(deserialize_with = "loose_text")]
    rera_number: Option<String>,
    #[serde(rename = "reraNumber", deserialize_with = "loose_text")]
    rera_number_camel: Option<String>,

    #[serde(deserialize_with = "loose_text")]
    professional: Option<String>,
    #[serde(deserialize_with = "loose_text")]
    profession: Option<String>,
}

/// First candidate with non-blank text, else the first one present
fn pick(candidates: [Option<String>; 4]) -> Option<String> {
    let mut fallback = None;
    for value in candidates.into_iter().flatten() {
        if !value.trim().is_empty() {
            return Some(value);
        }
        fallback.get_or_insert(value);
    }
    fallback
}

impl From<RawCertificateData> for CertificateData {
    fn from(raw: RawCertificateData) -> Self {
        Self {
            recipient_name: pick([raw.recipient_name, raw.recipient_name_camel, raw.name, None])
                .unwrap_or_default(),
            certificate_number: pick([
                raw.certificate_number,
                raw.certificate_number_camel,
                raw.certificate_no,
                raw.certificate_no_camel,
            ])
            .unwrap_or_default(),
            award_rera_number: pick([
                raw.award_rera_number,
                raw.award_rera_number_camel,
                raw.rera_number,
                raw.rera_number_camel,
            ]),
            professional: pick([raw.professional, raw.profession, None, None]),
        }
    }
}

/// Logical slots a layout can place on the certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    RecipientName,
    CertificateNumber,
    AwardReraNumber,
    Professional,
}

impl CertificateData {
    pub fn new(recipient_name: impl Into<String>, certificate_number: impl Into<String>) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            certificate_number: certificate_number.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON body. Unknown keys are ignored.
    pub fn from_json(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Text to draw for `field`, substituting the placeholder for blanks.
    pub fn display(&self, field: Field) -> &str {
        let (raw, placeholder) = match field {
            Field::RecipientName => (Some(self.recipient_name.as_str()), NAME_PLACEHOLDER),
            Field::CertificateNumber => (Some(self.certificate_number.as_str()), EMPTY_PLACEHOLDER),
            Field::AwardReraNumber => (self.award_rera_number.as_deref(), EMPTY_PLACEHOLDER),
            Field::Professional => (self.professional.as_deref(), EMPTY_PLACEHOLDER),
        };
        match raw.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => placeholder,
        }
    }

    /// File stem used for downloads, e.g. `certificate-TSP-2024-001`.
    pub fn file_stem(&self) -> String {
        let number: String = self
            .certificate_number
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if number.is_empty() {
            "certificate".to_string()
        } else {
            format!("certificate-{}", number)
        }
    }
}
