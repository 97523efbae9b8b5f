//! Async-friendly facade over [`Renderer`].
//!
//! Rendering is blocking (browser control, blocking HTTP, raster work), so
//! every call is shipped to its own worker thread and the result is sent
//! back over a oneshot channel. Calls share no mutable state and may run
//! concurrently.

use crate::{CertificateData, Error, OutputFormat, RenderBackend, Renderer, Result};
use futures::future::join_all;
use log::debug;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

type DocumentFn = Arc<dyn Fn(&Renderer, &CertificateData, Option<&str>, OutputFormat) -> Result<Vec<u8>> + Send + Sync>;

enum Job {
    Document {
        data: CertificateData,
        template_url: Option<String>,
        format: OutputFormat,
        resp: oneshot::Sender<Result<Vec<u8>>>,
    },
    Preview {
        data: CertificateData,
        template_url: Option<String>,
        resp: oneshot::Sender<Result<String>>,
    },
}

fn document_with<B: RenderBackend>(
    renderer: &Renderer,
    data: &CertificateData,
    template_url: Option<&str>,
    format: OutputFormat,
) -> Result<Vec<u8>> {
    renderer.render_certificate_with::<B>(data, template_url, format)
}

/// One request in a [`RenderService::render_many`] batch
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub data: CertificateData,
    pub template_url: Option<String>,
    pub format: OutputFormat,
}

/// Cloneable async handle; each call runs on a dedicated worker thread.
#[derive(Clone)]
pub struct RenderService {
    renderer: Arc<Renderer>,
    document: DocumentFn,
}

impl RenderService {
    /// Service backed by headless Chrome
    #[cfg(feature = "cdp")]
    pub fn new(renderer: Renderer) -> Self {
        Self::with_backend::<crate::cdp::ChromeBackend>(renderer)
    }

    /// Service backed by an explicit document backend
    pub fn with_backend<B: RenderBackend + 'static>(renderer: Renderer) -> Self {
        Self {
            renderer: Arc::new(renderer),
            document: Arc::new(document_with::<B>),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    fn spawn(&self, job: Job) {
        let renderer = Arc::clone(&self.renderer);
        let document = Arc::clone(&self.document);
        thread::spawn(move || match job {
            Job::Document {
                data,
                template_url,
                format,
                resp,
            } => {
                let res = document(&renderer, &data, template_url.as_deref(), format);
                let _ = resp.send(res);
            }
            Job::Preview {
                data,
                template_url,
                resp,
            } => {
                let res = renderer.generate_preview_data_url(&data, template_url.as_deref());
                let _ = resp.send(res);
            }
        });
    }

    /// Render a PDF or JPEG certificate
    pub async fn render_certificate(
        &self,
        data: CertificateData,
        template_url: Option<String>,
        format: OutputFormat,
    ) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.spawn(Job::Document {
            data,
            template_url,
            format,
            resp: tx,
        });
        rx.await
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))?
    }

    /// Compose a PNG preview data URL
    pub async fn generate_preview_data_url(
        &self,
        data: CertificateData,
        template_url: Option<String>,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.spawn(Job::Preview {
            data,
            template_url,
            resp: tx,
        });
        rx.await
            .map_err(|e| Error::Other(format!("Preview canceled: {}", e)))?
    }

    /// Render a batch concurrently; results keep the request order
    pub async fn render_many(&self, requests: Vec<RenderRequest>) -> Vec<Result<Vec<u8>>> {
        debug!("Rendering batch of {} certificates", requests.len());
        join_all(
            requests
                .into_iter()
                .map(|r| self.render_certificate(r.data, r.template_url, r.format)),
        )
        .await
    }
}
