//! Orchestration tests: backend lifecycle, placeholders and concurrency

use certrender::async_api::RenderRequest;
use certrender::{
    CertificateData, Error, OutputFormat, RenderBackend, RenderService, Renderer, RendererConfig, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns the generated HTML so tests can inspect interpolation
struct HtmlBackend;

impl RenderBackend for HtmlBackend {
    fn launch(_config: &RendererConfig) -> Result<Self> {
        Ok(HtmlBackend)
    }

    fn render_html(&mut self, html: &str, _format: OutputFormat) -> Result<Vec<u8>> {
        Ok(html.as_bytes().to_vec())
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Counts process lifecycles for the concurrency test
struct CountingBackend;

static COUNT_LAUNCHED: AtomicUsize = AtomicUsize::new(0);
static COUNT_CLOSED: AtomicUsize = AtomicUsize::new(0);

impl RenderBackend for CountingBackend {
    fn launch(_config: &RendererConfig) -> Result<Self> {
        COUNT_LAUNCHED.fetch_add(1, Ordering::SeqCst);
        Ok(CountingBackend)
    }

    fn render_html(&mut self, _html: &str, format: OutputFormat) -> Result<Vec<u8>> {
        std::thread::sleep(std::time::Duration::from_millis(20));
        Ok(format.extension().as_bytes().to_vec())
    }

    fn close(self) -> Result<()> {
        COUNT_CLOSED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches fine but crashes while rendering
struct CrashingBackend;

static CRASH_CLOSED: AtomicUsize = AtomicUsize::new(0);

impl RenderBackend for CrashingBackend {
    fn launch(_config: &RendererConfig) -> Result<Self> {
        Ok(CrashingBackend)
    }

    fn render_html(&mut self, _html: &str, _format: OutputFormat) -> Result<Vec<u8>> {
        Err(Error::Render("renderer crashed".into()))
    }

    fn close(self) -> Result<()> {
        CRASH_CLOSED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Cannot start at all
struct UnlaunchableBackend;

impl RenderBackend for UnlaunchableBackend {
    fn launch(_config: &RendererConfig) -> Result<Self> {
        Err(Error::Launch("no browser binary".into()))
    }

    fn render_html(&mut self, _html: &str, _format: OutputFormat) -> Result<Vec<u8>> {
        unreachable!("never launched")
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

fn renderer() -> Renderer {
    Renderer::new(RendererConfig::default()).expect("default config is valid")
}

#[test]
fn example_record_without_template() {
    let data = CertificateData::new("John Doe", "TSP-2024-001");
    let bytes = renderer()
        .render_certificate_with::<HtmlBackend>(&data, None, OutputFormat::Pdf)
        .unwrap();
    let html = String::from_utf8(bytes).unwrap();

    assert!(html.contains("recipient-name"));
    assert!(html.contains(">John Doe</div>"));
    assert!(html.contains("Certificate No: TSP-2024-001"));
    assert!(html.contains("RERA No: -"));
    // Default background is inlined
    assert!(html.contains(r#"src="data:image/png;base64,"#));
}

#[test]
fn alias_payload_renders_like_canonical() {
    let canonical = CertificateData::from_json(br#"{"recipient_name":"Jane","certificate_number":"N-7"}"#).unwrap();
    let aliased = CertificateData::from_json(br#"{"name":"Jane","certificateNumber":"N-7"}"#).unwrap();
    let r = renderer();
    assert_eq!(
        r.render_certificate_with::<HtmlBackend>(&canonical, None, OutputFormat::Jpeg).unwrap(),
        r.render_certificate_with::<HtmlBackend>(&aliased, None, OutputFormat::Jpeg).unwrap()
    );
}

#[test]
fn backend_is_closed_when_render_fails() {
    let before = CRASH_CLOSED.load(Ordering::SeqCst);
    let err = renderer()
        .render_certificate_with::<CrashingBackend>(&CertificateData::default(), None, OutputFormat::Pdf)
        .unwrap_err();
    assert!(err.to_string().contains("renderer crashed"));
    assert_eq!(CRASH_CLOSED.load(Ordering::SeqCst), before + 1);
}

#[test]
fn launch_failure_propagates() {
    let err = renderer()
        .render_certificate_with::<UnlaunchableBackend>(&CertificateData::default(), None, OutputFormat::Pdf)
        .unwrap_err();
    assert!(matches!(err, Error::Launch(_)));
}

#[tokio::test]
async fn concurrent_renders_release_every_backend() {
    let service = RenderService::with_backend::<CountingBackend>(renderer());
    let requests: Vec<RenderRequest> = (0..8)
        .map(|i| RenderRequest {
            data: CertificateData::new(format!("Recipient {}", i), format!("TSP-{:03}", i)),
            template_url: None,
            format: if i % 2 == 0 { OutputFormat::Pdf } else { OutputFormat::Jpeg },
        })
        .collect();

    let results = service.render_many(requests).await;
    for (i, res) in results.iter().enumerate() {
        let expected: &[u8] = if i % 2 == 0 { b"pdf" } else { b"jpg" };
        assert_eq!(res.as_ref().unwrap().as_slice(), expected);
    }
    assert_eq!(COUNT_LAUNCHED.load(Ordering::SeqCst), 8);
    assert_eq!(COUNT_CLOSED.load(Ordering::SeqCst), 8);
}

#[cfg(feature = "cdp")]
#[test]
#[ignore] // Requires Chrome to be installed
fn chrome_renders_pdf_and_jpeg() {
    let r = renderer();
    let data = CertificateData::new("John Doe", "TSP-2024-001");

    let pdf = r.render_certificate(&data, None, OutputFormat::Pdf).expect("pdf");
    assert!(pdf.starts_with(b"%PDF"));

    let jpeg = r.render_certificate(&data, None, OutputFormat::Jpeg).expect("jpeg");
    let img = image::load_from_memory(&jpeg).expect("decode jpeg");
    assert_eq!((img.width(), img.height()), (2048, 1448));
}
