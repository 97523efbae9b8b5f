//! Template acquisition against a local HTTP server: fallbacks, proxy and taint

use certrender::{CertificateData, Error, ImageChain, ImageOrigin, Renderer, RendererConfig};
use std::io::Cursor;
use std::sync::Once;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

static INIT: Once = Once::new();
const ADDR: &str = "127.0.0.1:18181";

fn template_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(40, 20, image::Rgba([30, 60, 90, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Start a server with a template image, a CORS-enabled copy, a proxy, a 404 and a slow route
fn start_template_server() -> String {
    INIT.call_once(|| {
        let server = Server::http(ADDR).unwrap();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let png = template_png();
                let path = request.url().to_string();
                let png_header = "Content-Type: image/png".parse::<Header>().unwrap();
                let response = if path == "/template.png" {
                    Response::from_data(png).with_header(png_header)
                } else if path == "/cors/template.png" {
                    Response::from_data(png)
                        .with_header(png_header)
                        .with_header("Access-Control-Allow-Origin: *".parse::<Header>().unwrap())
                } else if path.starts_with("/proxy?url=") {
                    Response::from_data(png).with_header(png_header)
                } else if path == "/slow.png" {
                    std::thread::sleep(Duration::from_millis(1500));
                    Response::from_data(png).with_header(png_header)
                } else if path == "/not-an-image.png" {
                    Response::from_string("<html>oops</html>")
                } else {
                    Response::from_data(b"Not Found".to_vec()).with_status_code(404)
                };
                let _ = request.respond(response);
            }
        });
        std::thread::sleep(Duration::from_millis(100));
    });

    format!("http://{}", ADDR)
}

fn default_bytes(config: &RendererConfig) -> Vec<u8> {
    ImageChain::for_server(config).resolve(None).expect("bundled default").bytes
}

#[test]
fn remote_template_is_fetched() {
    let base = start_template_server();
    let config = RendererConfig::default();
    let img = ImageChain::for_server(&config)
        .resolve(Some(&format!("{}/template.png", base)))
        .unwrap();
    assert_eq!(img.origin, ImageOrigin::CrossOrigin);
    assert_eq!(img.bytes, template_png());
    assert!(img.to_data_url().starts_with("data:image/png;base64,"));
}

#[test]
fn missing_template_falls_back_to_default() {
    let base = start_template_server();
    let config = RendererConfig::default();
    let expected = default_bytes(&config);

    for path in ["/missing.png", "/not-an-image.png"] {
        let img = ImageChain::for_server(&config)
            .resolve(Some(&format!("{}{}", base, path)))
            .unwrap();
        assert_eq!(img.origin, ImageOrigin::BundledDefault, "{}", path);
        assert_eq!(img.bytes, expected);
    }

    let renderer = Renderer::new(config).unwrap();
    assert_eq!(
        renderer.resolve_background(Some(&format!("{}/missing.png", base))),
        renderer.resolve_background(None)
    );
}

#[test]
fn slow_template_times_out_to_default() {
    let base = start_template_server();
    let config = RendererConfig {
        fetch_timeout_ms: 200,
        ..Default::default()
    };
    let img = ImageChain::for_preview(&config)
        .resolve(Some(&format!("{}/slow.png", base)))
        .unwrap();
    assert_eq!(img.origin, ImageOrigin::BundledDefault);
}

#[test]
fn oversized_template_falls_back_to_default() {
    let base = start_template_server();
    let config = RendererConfig {
        max_template_bytes: 16,
        ..Default::default()
    };
    assert!(template_png().len() > 16);
    for chain in [ImageChain::for_server(&config), ImageChain::for_preview(&config)] {
        let img = chain.resolve(Some(&format!("{}/template.png", base))).unwrap();
        assert_eq!(img.origin, ImageOrigin::BundledDefault);
    }
}

#[test]
fn unreachable_template_and_no_default_gives_empty_background() {
    let config = RendererConfig {
        default_template: None,
        fetch_timeout_ms: 200,
        ..Default::default()
    };
    let renderer = Renderer::new(config).unwrap();
    assert!(renderer.resolve_background(Some("http://127.0.0.1:1/none.png")).is_none());

    let html = renderer
        .build_html(&CertificateData::new("John Doe", "TSP-2024-001"), None)
        .unwrap();
    assert!(!html.contains("<img"));
    assert!(html.contains("John Doe"));
}

#[test]
fn preview_prefers_proxy() {
    let base = start_template_server();
    let config = RendererConfig {
        proxy_url: Some(format!("{}/proxy", base)),
        ..Default::default()
    };
    let img = ImageChain::for_preview(&config)
        .resolve(Some("https://cdn.example.invalid/template.png"))
        .unwrap();
    assert_eq!(img.origin, ImageOrigin::Proxy);
    assert!(img.tainted_by.is_none());
}

#[test]
fn cross_origin_without_cors_taints_preview() {
    let base = start_template_server();
    let config = RendererConfig {
        preview_origin: Some("http://app.example.test".into()),
        ..Default::default()
    };
    let renderer = Renderer::new(config).unwrap();
    let data = CertificateData::new("John Doe", "TSP-2024-001");

    let err = renderer
        .generate_preview_data_url(&data, Some(&format!("{}/template.png", base)))
        .unwrap_err();
    assert!(matches!(err, Error::CanvasTainted(_)), "unexpected error: {}", err);

    let img = ImageChain::for_preview(renderer.config())
        .resolve(Some(&format!("{}/cors/template.png", base)))
        .unwrap();
    assert!(img.tainted_by.is_none());
}
