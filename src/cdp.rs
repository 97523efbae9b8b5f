//! Chrome DevTools Protocol backend (uses the `headless_chrome` crate)

use crate::{Error, OutputFormat, RenderBackend, RendererConfig, Result, Viewport};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::io::Write;
use std::sync::Arc;

/// CSS pixels per inch used by Chrome when sizing printed pages
const CSS_PX_PER_INCH: f64 = 96.0;

/// Headless Chrome instance owning a single tab.
///
/// One instance is launched per render; dropping it (or calling `close`)
/// terminates the browser process.
pub struct ChromeBackend {
    browser: Browser,
    tab: Arc<Tab>,
    viewport: Viewport,
    device_scale_factor: f32,
    jpeg_quality: u8,
}

impl ChromeBackend {
    fn load(&self, html: &str) -> Result<()> {
        // Large inline backgrounds exceed Chrome's URL limit, so load from a file
        let mut page = tempfile::Builder::new()
            .prefix("certificate-")
            .suffix(".html")
            .tempfile()?;
        page.write_all(html.as_bytes())?;
        page.flush()?;

        let url = url::Url::from_file_path(page.path())
            .map_err(|_| Error::Render(format!("Invalid page path {}", page.path().display())))?;

        self.tab
            .navigate_to(url.as_str())
            .map_err(|e| Error::Render(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::Render(format!("Wait for navigation failed: {}", e)))?;

        // Web fonts must be ready before export or text falls back mid-render
        if let Err(e) = self.tab.evaluate("document.fonts.ready.then(() => true)", true) {
            warn!("Waiting for fonts failed: {}", e);
        }
        Ok(())
    }

    fn export_pdf(&self) -> Result<Vec<u8>> {
        let options = PrintToPdfOptions {
            landscape: Some(false),
            display_header_footer: Some(false),
            print_background: Some(true),
            scale: Some(1.0),
            paper_width: Some(self.viewport.width as f64 / CSS_PX_PER_INCH),
            paper_height: Some(self.viewport.height as f64 / CSS_PX_PER_INCH),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            page_ranges: Some("1".to_string()),
            prefer_css_page_size: Some(true),
            ..Default::default()
        };
        self.tab
            .print_to_pdf(Some(options))
            .map_err(|e| Error::Render(format!("PDF export failed: {}", e)))
    }

    fn export_jpeg(&self) -> Result<Vec<u8>> {
        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.viewport.width as f64,
            height: self.viewport.height as f64,
            scale: self.device_scale_factor as f64,
        };
        self.tab
            .capture_screenshot(
                Page::CaptureScreenshotFormatOption::Jpeg,
                Some(self.jpeg_quality as u32),
                Some(clip),
                true,
            )
            .map_err(|e| Error::Render(format!("Screenshot failed: {}", e)))
    }
}

impl RenderBackend for ChromeBackend {
    fn launch(config: &RendererConfig) -> Result<Self>
    where
        Self: Sized,
    {
        let mut builder = LaunchOptions::default_builder();
        builder
            .headless(true)
            .window_size(Some((config.viewport.width, config.viewport.height)));
        if let Some(path) = &config.chrome_path {
            builder.path(Some(path.clone()));
        }
        let launch_options = builder
            .build()
            .map_err(|e| Error::Launch(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::Launch(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::Launch(format!("Failed to create tab: {}", e)))?;

        debug!(
            "Chrome launched for {}x{} @{}x",
            config.viewport.width, config.viewport.height, config.device_scale_factor
        );

        Ok(Self {
            browser,
            tab,
            viewport: config.viewport,
            device_scale_factor: config.device_scale_factor,
            jpeg_quality: config.jpeg_quality,
        })
    }

    fn render_html(&mut self, html: &str, format: OutputFormat) -> Result<Vec<u8>> {
        self.load(html)?;
        let bytes = match format {
            OutputFormat::Pdf => self.export_pdf()?,
            OutputFormat::Jpeg => self.export_jpeg()?,
        };
        if bytes.is_empty() {
            return Err(Error::Render(format!("Chrome returned an empty {}", format.extension())));
        }
        Ok(bytes)
    }

    fn close(self) -> Result<()> {
        // Dropping the tab and browser terminates the child process
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CertificateData, Renderer};

    fn chrome_renderer() -> Option<Renderer> {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return None;
        }
        let config = RendererConfig::default();
        match ChromeBackend::launch(&config) {
            Ok(backend) => {
                backend.close().ok();
                Renderer::new(config).ok()
            }
            Err(e) => {
                eprintln!("Skipping Chrome test because Chrome is not available or failed to launch: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_pdf_export() {
        let Some(renderer) = chrome_renderer() else { return };
        let data = CertificateData::new("John Doe", "TSP-2024-001");
        let pdf = renderer.render_certificate(&data, None, OutputFormat::Pdf).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn test_jpeg_export_dimensions() {
        let Some(renderer) = chrome_renderer() else { return };
        let data = CertificateData::new("John Doe", "TSP-2024-001");
        let jpeg = renderer.render_certificate(&data, None, OutputFormat::Jpeg).unwrap();
        let img = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((img.width(), img.height()), renderer.config().raster_size());
    }
}
