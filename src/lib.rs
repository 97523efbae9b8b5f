//! Certrender
//!
//! Renders certificates from recipient data and an optional background
//! template image. Two output paths share one layout descriptor:
//!
//! - **Headless browser** (feature `cdp`, default): an HTML/CSS template is
//!   loaded into headless Chrome and exported as a PDF page or a JPEG
//!   screenshot.
//! - **Canvas preview**: an in-process raster compositor stretches the
//!   template onto a fixed-size canvas, draws the recipient fields and
//!   returns a `data:image/png;base64,...` URL.
//!
//! Template acquisition never fails a render: unreachable or undecodable
//! templates fall back to the bundled default image, and then to an empty
//! background.
//!
//! # Example
//!
//! ```no_run
//! use certrender::{CertificateData, OutputFormat, Renderer, RendererConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = Renderer::new(RendererConfig::default())?;
//! let data = CertificateData::new("John Doe", "TSP-2024-001");
//!
//! let pdf = renderer.render_certificate(&data, None, OutputFormat::Pdf)?;
//! std::fs::write("certificate.pdf", pdf)?;
//!
//! let preview = renderer.generate_preview_data_url(&data, None)?;
//! assert!(preview.starts_with("data:image/png;base64,"));
//! # Ok(())
//! # }
//! ```

use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod error;
pub use error::{Error, Result};

pub mod data;
pub use data::{CertificateData, Field};

pub mod layout;
pub use layout::{Align, FieldSlot, FontRole, PlacedText, TemplateLayout};

pub mod source;
pub use source::{ImageChain, ImageOrigin, TemplateImage};

pub mod template;

pub mod canvas;

// Headless Chrome backend
#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly wrapper that runs renders on worker threads
pub mod async_api;
pub use async_api::RenderService;

// HTTP handler
#[cfg(feature = "server")]
pub mod server;

/// Design resolution of the certificate in CSS pixels
pub const CERTIFICATE_WIDTH: u32 = 1024;
pub const CERTIFICATE_HEIGHT: u32 = 724;

/// Configuration for the renderer
///
/// Defaults match the stock certificate template: a 1024×724 design
/// resolution, 2× device scale for rasters and a 10 second fetch timeout.
/// Every field can be overridden from a JSON file (see
/// [`RendererConfig::from_json_file`]); missing keys keep their defaults.
///
/// ```
/// let cfg = certrender::RendererConfig::default();
/// assert_eq!(cfg.viewport.width, 1024);
/// assert_eq!(cfg.device_scale_factor, 2.0);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Page dimensions in CSS pixels
    pub viewport: Viewport,
    /// Multiplier applied to raster outputs (JPEG and PNG preview)
    pub device_scale_factor: f32,
    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,
    /// Timeout for template image fetches in milliseconds
    pub fetch_timeout_ms: u64,
    /// User agent sent with template fetches
    pub user_agent: String,
    /// Largest template body read from the network
    pub max_template_bytes: u64,
    /// Whether templates may name local paths or `file://` URLs
    pub allow_local_templates: bool,
    /// Bundled default template read when no remote template is usable
    pub default_template: Option<PathBuf>,
    /// Same-origin proxy used by the preview path (`{proxy_url}?url=...`)
    pub proxy_url: Option<String>,
    /// Origin the preview is served from; enables the cross-origin taint rule
    pub preview_origin: Option<String>,
    /// Font files for the preview canvas
    pub fonts: FontConfig,
    /// Field placement on the template
    pub layout: TemplateLayout,
    /// Explicit Chrome/Chromium binary; autodetected when unset
    pub chrome_path: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            device_scale_factor: 2.0,
            jpeg_quality: 92,
            fetch_timeout_ms: 10_000,
            user_agent: concat!("certrender/", env!("CARGO_PKG_VERSION")).to_string(),
            max_template_bytes: 16 * 1024 * 1024,
            allow_local_templates: true,
            default_template: Some(
                Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/certificate-template.png"),
            ),
            proxy_url: None,
            preview_origin: None,
            fonts: FontConfig::default(),
            layout: TemplateLayout::default(),
            chrome_path: None,
        }
    }
}

impl RendererConfig {
    /// Load configuration from a JSON file; absent keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let config: RendererConfig = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::Config("viewport must be non-empty".into()));
        }
        if !(self.device_scale_factor > 0.0 && self.device_scale_factor <= 4.0) {
            return Err(Error::Config(format!(
                "device_scale_factor {} is outside (0, 4]",
                self.device_scale_factor
            )));
        }
        if self.max_template_bytes == 0 {
            return Err(Error::Config("max_template_bytes must be positive".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!("jpeg_quality {} is outside 1..=100", self.jpeg_quality)));
        }
        self.layout.validate()
    }

    /// Raster dimensions after applying the device scale factor
    pub fn raster_size(&self) -> (u32, u32) {
        (
            (self.viewport.width as f32 * self.device_scale_factor).round() as u32,
            (self.viewport.height as f32 * self.device_scale_factor).round() as u32,
        )
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: CERTIFICATE_WIDTH,
            height: CERTIFICATE_HEIGHT,
        }
    }
}

/// Font files used by the preview canvas. Unset or unloadable roles fall
/// back to common system font locations, then to the bundled DejaVu Sans.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub script: Option<PathBuf>,
    pub serif: Option<PathBuf>,
    pub sans: Option<PathBuf>,
}

/// Document formats produced by the headless browser path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pdf,
    Jpeg,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            other => Err(Error::Config(format!("unsupported format '{}'; expected pdf or jpeg", other))),
        }
    }
}

/// A document backend that turns HTML into PDF/JPEG bytes.
///
/// Instances are call-scoped: [`Renderer`] launches one per render and
/// always calls [`RenderBackend::close`], whether or not rendering succeeded.
pub trait RenderBackend {
    /// Start the backend (e.g. spawn a browser process)
    fn launch(config: &RendererConfig) -> Result<Self>
    where
        Self: Sized;

    /// Load `html` at the configured viewport and export it as `format`
    fn render_html(&mut self, html: &str, format: OutputFormat) -> Result<Vec<u8>>;

    /// Release the backend and any child process it owns
    fn close(self) -> Result<()>;
}

/// Certificate renderer bound to one configuration
#[derive(Debug, Clone)]
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Copy of this renderer that only loads remote or inline templates
    pub fn without_local_templates(&self) -> Renderer {
        let mut config = self.config.clone();
        config.allow_local_templates = false;
        Renderer { config }
    }

    /// Resolve the background for the headless browser path as a data URL.
    ///
    /// Returns `None` when neither the template nor the default asset is
    /// usable; the certificate is then rendered on an empty background.
    pub fn resolve_background(&self, template_url: Option<&str>) -> Option<String> {
        ImageChain::for_server(&self.config)
            .resolve(template_url)
            .map(|img| img.to_data_url())
    }

    /// Build the HTML document for `data`
    pub fn build_html(&self, data: &CertificateData, template_url: Option<&str>) -> Result<String> {
        let background = self.resolve_background(template_url);
        template::build_html(data, background.as_deref(), &self.config)
    }

    /// Render a certificate with the default headless Chrome backend
    #[cfg(feature = "cdp")]
    pub fn render_certificate(
        &self,
        data: &CertificateData,
        template_url: Option<&str>,
        format: OutputFormat,
    ) -> Result<Vec<u8>> {
        self.render_certificate_with::<cdp::ChromeBackend>(data, template_url, format)
    }

    /// Render a certificate with an explicit backend
    pub fn render_certificate_with<B: RenderBackend>(
        &self,
        data: &CertificateData,
        template_url: Option<&str>,
        format: OutputFormat,
    ) -> Result<Vec<u8>> {
        let html = self.build_html(data, template_url)?;
        debug!("Certificate HTML prepared ({} bytes)", html.len());

        let mut backend = B::launch(&self.config)?;
        let rendered = backend.render_html(&html, format);
        let closed = backend.close();

        let bytes = rendered?;
        closed?;
        info!(
            "Rendered certificate {} as {} ({} bytes)",
            data.display(Field::CertificateNumber),
            format.extension(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Compose the certificate on the preview canvas and return a PNG data URL
    pub fn generate_preview_data_url(&self, data: &CertificateData, template_url: Option<&str>) -> Result<String> {
        self.generate_preview_png(data, template_url)
            .map(|png| canvas::png_data_url(&png))
    }

    /// Same as [`Renderer::generate_preview_data_url`] but returns raw PNG bytes
    pub fn generate_preview_png(&self, data: &CertificateData, template_url: Option<&str>) -> Result<Vec<u8>> {
        let image = ImageChain::for_preview(&self.config).resolve(template_url);
        canvas::compose(&self.config, data, image.as_ref())
    }
}

/// Render with the default configuration and headless Chrome
#[cfg(feature = "cdp")]
pub fn render_certificate(
    data: &CertificateData,
    template_url: Option<&str>,
    format: OutputFormat,
) -> Result<Vec<u8>> {
    Renderer::new(RendererConfig::default())?.render_certificate(data, template_url, format)
}

/// Preview with the default configuration
pub fn generate_preview_data_url(data: &CertificateData, template_url: Option<&str>) -> Result<String> {
    Renderer::new(RendererConfig::default())?.generate_preview_data_url(data, template_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.viewport, Viewport { width: 1024, height: 724 });
        assert_eq!(config.raster_size(), (2048, 1448));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"device_scale_factor":1.0,"jpeg_quality":80}"#).unwrap();
        let config = RendererConfig::from_json_file(&path).unwrap();
        assert_eq!(config.device_scale_factor, 1.0);
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.viewport.width, 1024);
        assert_eq!(config.fetch_timeout_ms, 10_000);
        assert!(config.allow_local_templates);
    }

    #[test]
    fn test_without_local_templates_keeps_other_settings() {
        let renderer = Renderer::new(RendererConfig {
            jpeg_quality: 70,
            ..Default::default()
        })
        .unwrap();
        let remote_only = renderer.without_local_templates();
        assert!(!remote_only.config().allow_local_templates);
        assert_eq!(remote_only.config().jpeg_quality, 70);
        assert!(renderer.config().allow_local_templates);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RendererConfig {
            jpeg_quality: 0,
            ..Default::default()
        };
        assert!(matches!(Renderer::new(config), Err(Error::Config(_))));

        let config = RendererConfig {
            max_template_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(Renderer::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("PDF".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert!("png".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Jpeg.mime_type(), "image/jpeg");
    }
}
