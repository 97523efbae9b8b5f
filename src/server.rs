//! Minimal HTTP handler (tiny_http) exposing the renderer.
//!
//! - `POST /certificate?format=pdf|jpeg[&template=<url>]` → file bytes
//! - `POST /preview[?template=<url>]` → `{"dataUrl": "..."}`
//! - `GET /health` → `ok`
//!
//! Request bodies are `CertificateData` JSON; a `template_url` /
//! `templateUrl` key in the body is honoured as well, with the `template`
//! query parameter taking precedence. Templates named over HTTP are never
//! read from the local filesystem.

use crate::{CertificateData, Error, OutputFormat, RenderBackend, Renderer, Result};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::io::Read;
use std::sync::Arc;

/// Upper bound on accepted request bodies
const MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct CertificateRequest {
    #[serde(flatten)]
    data: CertificateData,
    #[serde(default)]
    template_url: Option<String>,
    #[serde(default, rename = "templateUrl")]
    template_url_camel: Option<String>,
}

impl CertificateRequest {
    fn template(self, query: Option<&str>) -> (CertificateData, Option<String>) {
        let template = [query.map(str::to_string), self.template_url, self.template_url_camel]
            .into_iter()
            .flatten()
            .find(|t| !t.trim().is_empty());
        (self.data, template)
    }
}

/// Transport-independent response
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            headers: Vec::new(),
            body: value.to_string().into_bytes(),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }
}

fn parse_target(target: &str) -> Result<(String, Vec<(String, String)>)> {
    let parsed = url::Url::parse("http://localhost")
        .and_then(|base| base.join(target))
        .map_err(|e| Error::Other(format!("bad request target {}: {}", target, e)))?;
    let query = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    Ok((parsed.path().to_string(), query))
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Route one request using document backend `B`
pub fn route<B: RenderBackend>(renderer: &Renderer, method: &str, target: &str, body: &[u8]) -> Reply {
    let renderer = &renderer.without_local_templates();
    let (path, query) = match parse_target(target) {
        Ok(t) => t,
        Err(e) => return Reply::error(400, &e.to_string()),
    };

    match (method, path.as_str()) {
        ("GET", "/health") => Reply::text(200, "ok"),
        ("POST", "/certificate") | ("POST", "/preview") => {
            let request: CertificateRequest = match serde_json::from_slice(body) {
                Ok(r) => r,
                Err(e) => return Reply::error(400, &format!("invalid certificate JSON: {}", e)),
            };
            let (data, template_url) = request.template(query_value(&query, "template"));

            if path == "/preview" {
                return match renderer.generate_preview_data_url(&data, template_url.as_deref()) {
                    Ok(data_url) => Reply::json(200, serde_json::json!({ "dataUrl": data_url })),
                    Err(e) => {
                        error!("Preview failed: {}", e);
                        Reply::error(500, &e.to_string())
                    }
                };
            }

            let format = match query_value(&query, "format").unwrap_or("pdf").parse::<OutputFormat>() {
                Ok(f) => f,
                Err(e) => return Reply::error(400, &e.to_string()),
            };
            match renderer.render_certificate_with::<B>(&data, template_url.as_deref(), format) {
                Ok(bytes) => Reply {
                    status: 200,
                    content_type: format.mime_type(),
                    headers: vec![(
                        "Content-Disposition".to_string(),
                        format!(
                            "attachment; filename=\"{}.{}\"",
                            data.file_stem(),
                            format.extension()
                        ),
                    )],
                    body: bytes,
                },
                Err(e) => {
                    error!("Certificate render failed: {}", e);
                    Reply::error(500, &e.to_string())
                }
            }
        }
        (_, "/health") | (_, "/certificate") | (_, "/preview") => Reply::error(405, "method not allowed"),
        _ => Reply::error(404, "not found"),
    }
}

fn respond(request: tiny_http::Request, reply: Reply) {
    let mut response = tiny_http::Response::from_data(reply.body).with_status_code(reply.status);
    let headers = std::iter::once(("Content-Type".to_string(), reply.content_type.to_string())).chain(reply.headers);
    for (name, value) in headers {
        match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(h) => response.add_header(h),
            Err(_) => warn!("Dropping invalid header {}", name),
        }
    }
    if let Err(e) = request.respond(response) {
        warn!("Failed to send response: {}", e);
    }
}

fn handle<B: RenderBackend>(renderer: &Renderer, mut request: tiny_http::Request) {
    let method = request.method().as_str().to_uppercase();
    let target = request.url().to_string();
    debug!("{} {}", method, target);

    let mut body = Vec::new();
    let read = request.as_reader().take(MAX_BODY_BYTES).read_to_end(&mut body);
    if let Err(e) = read {
        respond(request, Reply::error(400, &format!("failed to read body: {}", e)));
        return;
    }
    let reply = route::<B>(renderer, &method, &target, &body);
    respond(request, reply);
}

/// Serve until the listener fails; each request runs on its own thread
pub fn serve_with<B: RenderBackend + 'static>(addr: &str, renderer: Renderer) -> Result<()> {
    let server = tiny_http::Server::http(addr)
        .map_err(|e| Error::Other(format!("failed to bind {}: {}", addr, e)))?;
    info!("Certificate server listening on http://{}", addr);

    let renderer = Arc::new(renderer);
    for request in server.incoming_requests() {
        let renderer = Arc::clone(&renderer);
        std::thread::spawn(move || handle::<B>(&renderer, request));
    }
    Ok(())
}

/// Serve with headless Chrome as the document backend
#[cfg(feature = "cdp")]
pub fn serve(addr: &str, renderer: Renderer) -> Result<()> {
    serve_with::<crate::cdp::ChromeBackend>(addr, renderer)
}
