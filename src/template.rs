//! HTML/CSS certificate template for the headless browser path.
//!
//! The page is exactly one viewport in size: the background image is
//! stretched to fill it and each field is an absolutely positioned block
//! at the coordinates produced by [`TemplateLayout::place`].

use crate::layout::{Align, PlacedText};
use crate::{CertificateData, RendererConfig, Result};
use std::fmt::Write;

/// Escape text for HTML element content and attribute values
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn field_style(p: &PlacedText) -> String {
    let [r, g, b] = p.color;
    let anchor = match p.align {
        Align::Left => format!("left: {}px;", p.x),
        Align::Center => format!("left: {}px; transform: translateX(-50%);", p.x),
        Align::Right => format!("right: calc(100% - {}px);", p.x),
    };
    format!(
        "top: {}px; {} font-family: {}; font-size: {}px; font-weight: {}; color: rgb({}, {}, {}); text-align: {};",
        p.y,
        anchor,
        p.font.css_stack(),
        p.font_px,
        if p.bold { 700 } else { 400 },
        r,
        g,
        b,
        match p.align {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    )
}

fn field_class(p: &PlacedText) -> &'static str {
    match p.field {
        crate::Field::RecipientName => "recipient-name",
        crate::Field::CertificateNumber => "certificate-number",
        crate::Field::AwardReraNumber => "award-rera-number",
        crate::Field::Professional => "professional",
    }
}

/// Build the certificate page. `background` is a data URL (or any URL the
/// browser can load); `None` leaves the page blank behind the text.
pub fn build_html(data: &CertificateData, background: Option<&str>, config: &RendererConfig) -> Result<String> {
    let (width, height) = (config.viewport.width, config.viewport.height);
    let placed = config.layout.place(data, width, height)?;

    let mut fields = String::new();
    for p in &placed {
        // Writing into a String cannot fail
        let _ = writeln!(
            fields,
            r#"    <div class="field {}" style="{}">{}</div>"#,
            field_class(p),
            html_escape(&field_style(p)),
            html_escape(&p.text)
        );
    }

    let background_html = match background {
        Some(src) => format!(r#"    <img class="background" src="{}" alt="">"#, html_escape(src)),
        None => String::new(),
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Certificate {number}</title>
  <style>
    @page {{ size: {w}px {h}px; margin: 0; }}
    html, body {{ margin: 0; padding: 0; width: {w}px; height: {h}px; overflow: hidden; background: #ffffff; }}
    .certificate {{ position: relative; width: {w}px; height: {h}px; }}
    .background {{ position: absolute; top: 0; left: 0; width: {w}px; height: {h}px; object-fit: fill; }}
    .field {{ position: absolute; white-space: nowrap; line-height: 1; }}
  </style>
</head>
<body>
  <div class="certificate">
{background}
{fields}  </div>
</body>
</html>
"#,
        number = html_escape(data.display(crate::Field::CertificateNumber)),
        w = width,
        h = height,
        background = background_html,
        fields = fields,
    ))
}
