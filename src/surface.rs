//! Render surface and screenshot seams
//!
//! A [`RenderSurface`] is the isolated preview a snippet runs in. It is
//! supplied by the hosting environment (a headless browser tab, an embedded
//! webview, a test double) together with a raster capability. A
//! [`ScreenshotCapturer`] turns a loaded surface into a JPEG data URL.

use async_trait::async_trait;
use base64::Engine as Base64Engine;

use crate::document::{PreviewDocument, PREVIEW_BACKGROUND};
use crate::{Error, Result};

const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

/// What the capturer asks the host to rasterize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOptions {
    pub format: ImageFormat,
    /// CSS color painted behind transparent content
    pub background: String,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            background: PREVIEW_BACKGROUND.to_string(),
        }
    }
}

/// An isolated, script-enabled preview context.
#[async_trait]
pub trait RenderSurface: Send {
    /// Start rendering `document`, replacing whatever was shown before.
    async fn present(&mut self, document: &PreviewDocument) -> Result<()>;

    /// Resolves once the most recently presented document reports it has
    /// loaded. Has no timeout of its own.
    async fn wait_loaded(&mut self) -> Result<()>;

    /// Whether the rendered content tree can be reached right now.
    async fn content_accessible(&mut self) -> bool;

    /// Rasterize the visible content.
    async fn rasterize(&mut self, options: &RasterOptions) -> Result<Vec<u8>>;
}

/// Produces a screenshot of a loaded surface as a `data:` URL.
#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    async fn capture(&self, surface: &mut dyn RenderSurface) -> Result<String>;
}

/// Default capturer: asks the surface for a JPEG raster on the preview
/// background and encodes it.
#[derive(Debug, Clone, Default)]
pub struct RasterCapturer {
    options: RasterOptions,
}

impl RasterCapturer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScreenshotCapturer for RasterCapturer {
    async fn capture(&self, surface: &mut dyn RenderSurface) -> Result<String> {
        let bytes = surface.rasterize(&self.options).await.map_err(|e| match e {
            Error::Capture(_) => e,
            other => Error::Capture(other.to_string()),
        })?;
        if bytes.is_empty() {
            return Err(Error::Capture("surface produced an empty image".into()));
        }
        Ok(jpeg_data_url(&bytes))
    }
}

pub fn jpeg_data_url(bytes: &[u8]) -> String {
    format!(
        "{}{}",
        JPEG_DATA_URL_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Base64 payload of a JPEG data URL.
pub fn strip_data_url(url: &str) -> Result<String> {
    match url.split_once(',') {
        Some((header, payload)) if header.starts_with("data:image/jpeg") && !payload.is_empty() => {
            Ok(payload.to_string())
        }
        Some((header, _)) => Err(Error::Capture(format!(
            "expected a JPEG data URL, got {:?}",
            header
        ))),
        None => Err(Error::Capture("screenshot is not a data URL".into())),
    }
}
