//! Preview canvas: in-process raster composition of a certificate.
//!
//! The template is stretched onto a fixed-size RGBA canvas and each placed
//! field is drawn with `rusttype`. A canvas that received cross-origin
//! pixels without CORS approval refuses to export.

use crate::layout::{Align, FontRole, PlacedText};
use crate::source::TemplateImage;
use crate::{CertificateData, Error, FontConfig, RendererConfig, Result};
use base64::Engine as Base64Engine;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, ImageOutputFormat, Rgba, RgbaImage};
use log::{debug, warn};
use rusttype::{point, Font, Scale};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

const BLANK: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// DejaVu Sans, used when no configured or system face loads
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const SCRIPT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSerif-Italic.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSerif-Italic.ttf",
    "/usr/share/fonts/liberation-serif/LiberationSerif-Italic.ttf",
    "/System/Library/Fonts/Supplemental/Brush Script.ttf",
    "C:\\Windows\\Fonts\\BRUSHSCI.TTF",
];

const SERIF_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSerif-Regular.ttf",
    "/usr/share/fonts/liberation-serif/LiberationSerif-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Georgia.ttf",
    "C:\\Windows\\Fonts\\georgia.ttf",
];

const SANS_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn load_font_file(path: &Path) -> Option<Font<'static>> {
    let bytes = std::fs::read(path).ok()?;
    let font = Font::try_from_vec(bytes);
    if font.is_none() {
        warn!("{} is not a usable TrueType font", path.display());
    }
    font
}

/// Fonts for each [`FontRole`]. Roles without their own face reuse the
/// first face that loaded, or the bundled face when none did.
pub struct FontSet {
    faces: HashMap<FontRole, Font<'static>>,
    fallback: Font<'static>,
}

impl FontSet {
    /// Only the bundled face, for every role
    pub fn bundled() -> Result<Self> {
        Ok(Self {
            faces: HashMap::new(),
            fallback: bundled_font()?,
        })
    }

    pub fn load(config: &FontConfig) -> Result<Self> {
        let roles: [(FontRole, &Option<PathBuf>, &[&str]); 3] = [
            (FontRole::Script, &config.script, SCRIPT_CANDIDATES),
            (FontRole::Serif, &config.serif, SERIF_CANDIDATES),
            (FontRole::Sans, &config.sans, SANS_CANDIDATES),
        ];

        let mut faces = HashMap::new();
        let mut fallback = None;
        for (role, configured, candidates) in roles {
            let configured_face = configured.as_deref().and_then(|path| {
                let face = load_font_file(path);
                if face.is_none() {
                    warn!("Configured {:?} font {} did not load", role, path.display());
                }
                face
            });
            let face = configured_face.or_else(|| candidates.iter().find_map(|c| load_font_file(Path::new(c))));
            match face {
                Some(f) => {
                    fallback.get_or_insert_with(|| f.clone());
                    faces.insert(role, f);
                }
                None => debug!("No font found for {:?}", role),
            }
        }

        let fallback = match fallback {
            Some(f) => f,
            None => {
                debug!("No system fonts found; using the bundled face");
                bundled_font()?
            }
        };
        Ok(Self { faces, fallback })
    }

    pub fn get(&self, role: FontRole) -> &Font<'static> {
        self.faces.get(&role).unwrap_or(&self.fallback)
    }
}

fn bundled_font() -> Result<Font<'static>> {
    Font::try_from_bytes(BUNDLED_FONT).ok_or_else(|| Error::Font("bundled font is not a valid TrueType file".into()))
}

/// Baseline offset below the top of a `line-height: 1` text box, matching
/// how the HTML template positions the same slot.
pub fn baseline_offset(font: &Font<'static>, px: f32) -> f32 {
    let v_metrics = font.v_metrics(Scale::uniform(px));
    let half_leading = (px - (v_metrics.ascent - v_metrics.descent)) / 2.0;
    half_leading + v_metrics.ascent
}

/// Advance width of `text` in pixels
pub fn text_width(font: &Font<'static>, px: f32, text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    font.layout(text, scale, point(0.0, v_metrics.ascent))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Fixed-size RGBA drawing surface
pub struct Canvas {
    pixels: RgbaImage,
    tainted_by: Option<String>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: ImageBuffer::from_pixel(width, height, BLANK),
            tainted_by: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted_by.is_some()
    }

    /// Stretch `image` over the whole canvas, ignoring its aspect ratio
    pub fn draw_background(&mut self, image: &TemplateImage) -> Result<()> {
        let decoded = image.decode()?.to_rgba8();
        let stretched = imageops::resize(&decoded, self.width(), self.height(), FilterType::Triangle);
        imageops::overlay(&mut self.pixels, &stretched, 0, 0);
        if let Some(src) = &image.tainted_by {
            self.tainted_by = Some(src.clone());
        }
        Ok(())
    }

    /// Draw one placed field
    pub fn draw_text(&mut self, placed: &PlacedText, fonts: &FontSet) {
        let font = fonts.get(placed.font);
        let width = text_width(font, placed.font_px, &placed.text);
        let left = match placed.align {
            Align::Left => placed.x,
            Align::Center => placed.x - width / 2.0,
            Align::Right => placed.x - width,
        };
        let color = Rgba([placed.color[0], placed.color[1], placed.color[2], 255]);
        self.draw_run(font, placed.font_px, left, placed.y, color, &placed.text);
        if placed.bold {
            self.draw_run(font, placed.font_px, left + (placed.font_px / 24.0).max(1.0), placed.y, color, &placed.text);
        }
    }

    fn draw_run(&mut self, font: &Font<'static>, px: f32, x: f32, y: f32, color: Rgba<u8>, text: &str) {
        let scale = Scale::uniform(px);
        let baseline = y + baseline_offset(font, px);
        let (w, h) = (self.width() as i32, self.height() as i32);
        let img = &mut self.pixels;

        for glyph in font.layout(text, scale, point(x, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, v| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px >= w || py >= h || v <= 0.0 {
                    return;
                }
                let dst = img.get_pixel_mut(px as u32, py as u32);
                let inv = 1.0 - v;
                for i in 0..3 {
                    dst.0[i] = (color.0[i] as f32 * v + dst.0[i] as f32 * inv).round() as u8;
                }
                dst.0[3] = 255;
            });
        }
    }

    /// Encode as PNG. Fails when the canvas is tainted.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        if let Some(src) = &self.tainted_by {
            return Err(Error::CanvasTainted(src.clone()));
        }
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(self.pixels.clone()).write_to(&mut out, ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }
}

/// `data:image/png;base64,...` for encoded PNG bytes
pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

/// Compose a certificate preview and return the PNG bytes.
///
/// `background` of `None` leaves the canvas white.
pub fn compose(config: &RendererConfig, data: &CertificateData, background: Option<&TemplateImage>) -> Result<Vec<u8>> {
    let (width, height) = config.raster_size();
    let mut canvas = Canvas::new(width, height);

    if let Some(image) = background {
        canvas.draw_background(image)?;
    }
    // A tainted canvas stays tainted; fail before any text work
    if let Some(src) = &canvas.tainted_by {
        return Err(Error::CanvasTainted(src.clone()));
    }

    let fonts = FontSet::load(&config.fonts)?;
    for placed in config.layout.place(data, width, height)? {
        canvas.draw_text(&placed, &fonts);
    }
    canvas.to_png()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ImageOrigin;

    fn template(color: [u8; 4], tainted_by: Option<&str>) -> TemplateImage {
        let img = RgbaImage::from_pixel(8, 2, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        TemplateImage {
            bytes: out.into_inner(),
            mime: "image/png",
            origin: ImageOrigin::Direct,
            tainted_by: tainted_by.map(|s| s.to_string()),
        }
    }

    #[test]
    fn background_is_stretched_to_canvas() {
        let mut canvas = Canvas::new(1024, 724);
        canvas.draw_background(&template([200, 10, 10, 255], None)).unwrap();
        assert_eq!(canvas.pixels().get_pixel(0, 0), &Rgba([200, 10, 10, 255]));
        assert_eq!(canvas.pixels().get_pixel(1023, 723), &Rgba([200, 10, 10, 255]));

        let png = canvas.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1024, 724));
    }

    #[test]
    fn tainted_canvas_refuses_export() {
        let mut canvas = Canvas::new(16, 16);
        canvas
            .draw_background(&template([0, 0, 0, 255], Some("https://cdn.other.com/t.png")))
            .unwrap();
        assert!(canvas.is_tainted());
        assert!(matches!(canvas.to_png(), Err(Error::CanvasTainted(_))));
    }

    #[test]
    fn data_url_prefix() {
        assert!(png_data_url(&[1, 2, 3]).starts_with("data:image/png;base64,AQID"));
    }

    #[test]
    fn bundled_font_draws_text() {
        let fonts = FontSet::bundled().unwrap();
        let mut canvas = Canvas::new(200, 60);
        let placed = PlacedText {
            field: crate::Field::CertificateNumber,
            text: "TSP-2024-001".into(),
            x: 10.0,
            y: 10.0,
            font_px: 24.0,
            font: FontRole::Script,
            color: [0, 0, 0],
            align: Align::Left,
            bold: true,
        };
        canvas.draw_text(&placed, &fonts);
        assert!(canvas.pixels().pixels().any(|p| p.0[0] < 128));
    }

    #[test]
    fn unloadable_configured_fonts_fall_back() {
        let config = FontConfig {
            script: Some("/nonexistent/script.ttf".into()),
            serif: Some("/nonexistent/serif.ttf".into()),
            sans: Some("/nonexistent/sans.ttf".into()),
        };
        assert!(FontSet::load(&config).is_ok());
    }

    #[test]
    fn baseline_matches_unit_line_height_box() {
        let font = bundled_font().unwrap();
        let px = 40.0;
        let v = font.v_metrics(Scale::uniform(px));
        let offset = baseline_offset(&font, px);
        // Box top to baseline plus baseline to box bottom spans exactly 1em
        let below = px - offset;
        assert!((offset - below - (v.ascent + v.descent)).abs() < 1e-3);
        assert!(offset > 0.0 && offset < px);
    }

    #[test]
    fn text_is_drawn_with_default_fonts() {
        let fonts = FontSet::load(&FontConfig::default()).unwrap();
        let mut canvas = Canvas::new(200, 60);
        let placed = PlacedText {
            field: crate::Field::RecipientName,
            text: "John Doe".into(),
            x: 100.0,
            y: 10.0,
            font_px: 30.0,
            font: FontRole::Sans,
            color: [0, 0, 0],
            align: Align::Center,
            bold: false,
        };
        canvas.draw_text(&placed, &fonts);
        let dark = canvas.pixels().pixels().filter(|p| p.0[0] < 128).count();
        assert!(dark > 0, "expected glyph pixels on the canvas");
    }
}
