//! Error types for the certificate renderer

use thiserror::Error;

/// Result type alias for renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a certificate
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch the headless browser
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Failed to render or export the document
    #[error("Rendering failed: {0}")]
    Render(String),

    /// The preview canvas holds cross-origin pixels and cannot be exported
    #[error("Canvas is tainted by cross-origin image {0}; serve it through the proxy or with CORS headers")]
    CanvasTainted(String),

    /// Failed to fetch a template image
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Template image could not be decoded or encoded
    #[error("Image error: {0}")]
    Image(String),

    /// No usable font for the preview canvas
    #[error("Font error: {0}")]
    Font(String),

    /// Invalid configuration or layout descriptor
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
