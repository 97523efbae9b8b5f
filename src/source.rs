//! Template image acquisition.
//!
//! Acquisition is an ordered list of strategies. Each strategy declares
//! whether it applies to the request and returns a uniform
//! `Result<TemplateImage>`; the chain stops at the first image that decodes.
//! Failures are logged and never surface to the caller.

use crate::{Error, RendererConfig, Result};
use base64::Engine as Base64Engine;
use image::{DynamicImage, ImageFormat};
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// How a template image was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Proxy,
    CrossOrigin,
    Direct,
    BundledDefault,
}

/// Raw template bytes plus where they came from
#[derive(Debug, Clone)]
pub struct TemplateImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub origin: ImageOrigin,
    /// Set when the pixels came from another origin without CORS approval
    pub tainted_by: Option<String>,
}

impl TemplateImage {
    fn new(bytes: Vec<u8>, origin: ImageOrigin) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::Image("empty image body".into()));
        }
        let format = image::guess_format(&bytes).map_err(|e| Error::Image(e.to_string()))?;
        Ok(Self {
            mime: mime_for(format),
            bytes,
            origin,
            tainted_by: None,
        })
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory(&self.bytes)?)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn is_http(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// One way of obtaining the template image
pub trait ImageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can handle `url` (None means no template given)
    fn applies(&self, url: Option<&str>) -> bool;

    fn acquire(&self, url: Option<&str>) -> Result<TemplateImage>;
}

fn http_client(config: &RendererConfig) -> Client {
    Client::builder()
        .timeout(Duration::from_millis(config.fetch_timeout_ms))
        .user_agent(config.user_agent.clone())
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client with timeout ({}); using defaults", e);
            Client::new()
        })
}

fn fetch(client: &Client, url: &str, origin: Option<&str>) -> Result<Response> {
    let mut request = client.get(url).header("Accept", "image/*,*/*;q=0.8");
    if let Some(origin) = origin {
        request = request.header("Origin", origin);
    }
    let response = request
        .send()
        .map_err(|e| Error::Fetch(format!("GET {} failed: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(Error::Fetch(format!("GET {} returned {}", url, response.status())));
    }
    Ok(response)
}

/// Read at most `limit` bytes of a response body
fn read_capped(response: Response, url: &str, limit: u64) -> Result<Vec<u8>> {
    if let Some(len) = response.content_length() {
        if len > limit {
            return Err(Error::Fetch(format!("{} is {} bytes, over the {} byte limit", url, len, limit)));
        }
    }
    let mut body = Vec::new();
    response
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| Error::Fetch(format!("reading {} failed: {}", url, e)))?;
    if body.len() as u64 > limit {
        return Err(Error::Fetch(format!("{} exceeds the {} byte limit", url, limit)));
    }
    Ok(body)
}

/// Fetch through a same-origin proxy: `{proxy}?url=<template>`
pub struct ProxyFetch {
    client: Client,
    proxy_url: Option<String>,
    max_bytes: u64,
}

impl ImageStrategy for ProxyFetch {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn applies(&self, url: Option<&str>) -> bool {
        self.proxy_url.is_some() && url.map(is_http).unwrap_or(false)
    }

    fn acquire(&self, url: Option<&str>) -> Result<TemplateImage> {
        let (Some(proxy), Some(url)) = (self.proxy_url.as_deref(), url) else {
            return Err(Error::Fetch("proxy strategy not applicable".into()));
        };
        let proxied = Url::parse_with_params(proxy, &[("url", url)])
            .map_err(|e| Error::Config(format!("invalid proxy url {}: {}", proxy, e)))?;
        let response = fetch(&self.client, proxied.as_str(), None)?;
        let body = read_capped(response, proxied.as_str(), self.max_bytes)?;
        TemplateImage::new(body, ImageOrigin::Proxy)
    }
}

/// Permissive direct fetch of a remote template.
///
/// When `preview_origin` is set the request carries an `Origin` header and a
/// response from another origin without a matching
/// `Access-Control-Allow-Origin` header yields a tainted image.
pub struct CrossOriginFetch {
    client: Client,
    preview_origin: Option<String>,
    max_bytes: u64,
}

impl CrossOriginFetch {
    fn taint_for(&self, url: &str, allow_origin: Option<&str>) -> Option<String> {
        let page_origin = self.preview_origin.as_deref()?;
        let target = Url::parse(url).ok()?.origin().ascii_serialization();
        if target == page_origin.trim_end_matches('/') {
            return None;
        }
        match allow_origin.map(str::trim) {
            Some("*") => None,
            Some(allowed) if allowed == page_origin.trim_end_matches('/') => None,
            _ => Some(url.to_string()),
        }
    }
}

impl ImageStrategy for CrossOriginFetch {
    fn name(&self) -> &'static str {
        "cross-origin"
    }

    fn applies(&self, url: Option<&str>) -> bool {
        url.map(is_http).unwrap_or(false)
    }

    fn acquire(&self, url: Option<&str>) -> Result<TemplateImage> {
        let url = url.ok_or_else(|| Error::Fetch("no template url".into()))?;
        let response = fetch(&self.client, url, self.preview_origin.as_deref())?;
        let allow_origin = response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = read_capped(response, url, self.max_bytes)?;
        let mut image = TemplateImage::new(body, ImageOrigin::CrossOrigin)?;
        image.tainted_by = self.taint_for(url, allow_origin.as_deref());
        Ok(image)
    }
}

/// Decode a `data:` URL or read a `file://` URL / local path.
///
/// Local files are only read when `allow_local_files` is set; templates
/// named by remote callers must stay off the host filesystem.
pub struct DirectLoad {
    allow_local_files: bool,
}

impl DirectLoad {
    pub fn new(allow_local_files: bool) -> Self {
        Self { allow_local_files }
    }

    fn local_path(&self, url: &str) -> Option<PathBuf> {
        if !self.allow_local_files {
            return None;
        }
        if url.starts_with("file:") {
            return Url::parse(url).ok()?.to_file_path().ok();
        }
        if url.starts_with("data:") || url.contains("://") {
            return None;
        }
        Some(PathBuf::from(url))
    }
}

/// Decode the payload of a base64 `data:` URL
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::Image("not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Image("data URL has no payload".into()))?;
    if !meta.ends_with(";base64") {
        return Err(Error::Image("only base64 data URLs are supported".into()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Image(format!("invalid base64 payload: {}", e)))
}

impl ImageStrategy for DirectLoad {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn applies(&self, url: Option<&str>) -> bool {
        match url {
            Some(u) => u.starts_with("data:") || self.local_path(u).is_some(),
            None => false,
        }
    }

    fn acquire(&self, url: Option<&str>) -> Result<TemplateImage> {
        let url = url.ok_or_else(|| Error::Fetch("no template url".into()))?;
        let bytes = if url.starts_with("data:") {
            decode_data_url(url)?
        } else {
            let path = self
                .local_path(url)
                .ok_or_else(|| Error::Fetch(format!("unsupported template url {}", url)))?;
            std::fs::read(&path)?
        };
        TemplateImage::new(bytes, ImageOrigin::Direct)
    }
}

/// The default template shipped with the crate
pub struct BundledDefault {
    path: Option<PathBuf>,
}

impl BundledDefault {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
        }
    }
}

impl ImageStrategy for BundledDefault {
    fn name(&self) -> &'static str {
        "bundled-default"
    }

    fn applies(&self, _url: Option<&str>) -> bool {
        self.path.as_deref().map(Path::is_file).unwrap_or(false)
    }

    fn acquire(&self, _url: Option<&str>) -> Result<TemplateImage> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| Error::Config("no default template configured".into()))?;
        TemplateImage::new(std::fs::read(path)?, ImageOrigin::BundledDefault)
    }
}

/// Ordered list of acquisition strategies
pub struct ImageChain {
    strategies: Vec<Box<dyn ImageStrategy>>,
}

impl ImageChain {
    pub fn new(strategies: Vec<Box<dyn ImageStrategy>>) -> Self {
        Self { strategies }
    }

    /// proxy → cross-origin fetch → direct load → bundled default
    pub fn for_preview(config: &RendererConfig) -> Self {
        let client = http_client(config);
        Self::new(vec![
            Box::new(ProxyFetch {
                client: client.clone(),
                proxy_url: config.proxy_url.clone(),
                max_bytes: config.max_template_bytes,
            }),
            Box::new(CrossOriginFetch {
                client,
                preview_origin: config.preview_origin.clone(),
                max_bytes: config.max_template_bytes,
            }),
            Box::new(DirectLoad::new(config.allow_local_templates)),
            Box::new(BundledDefault::new(config.default_template.as_deref())),
        ])
    }

    /// remote fetch → direct load → bundled default; no taint tracking
    pub fn for_server(config: &RendererConfig) -> Self {
        Self::new(vec![
            Box::new(CrossOriginFetch {
                client: http_client(config),
                preview_origin: None,
                max_bytes: config.max_template_bytes,
            }),
            Box::new(DirectLoad::new(config.allow_local_templates)),
            Box::new(BundledDefault::new(config.default_template.as_deref())),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First decodable image, or `None` when every strategy failed
    pub fn resolve(&self, url: Option<&str>) -> Option<TemplateImage> {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        for strategy in &self.strategies {
            if !strategy.applies(url) {
                continue;
            }
            match strategy.acquire(url).and_then(|img| img.decode().map(|_| img)) {
                Ok(img) => {
                    debug!("Template acquired via {} ({} bytes)", strategy.name(), img.bytes.len());
                    return Some(img);
                }
                Err(e) => debug!("Template strategy {} failed: {}", strategy.name(), e),
            }
        }
        warn!("No usable template image for {:?}; rendering on an empty background", url);
        None
    }
}
