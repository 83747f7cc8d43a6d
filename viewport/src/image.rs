//! Rendered images and the two seams the sync loop talks through: where
//! images come from ([`ImageSource`]) and where they are shown ([`Surface`]).

use crate::view::{ViewError, ViewState};

/// An image payload returned by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl RenderedImage {
    #[must_use]
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self { bytes, content_type: content_type.into() }
    }

    /// File extension matching the content type, `bin` when unknown.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        let essence = self.content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            _ => "bin",
        }
    }
}

/// Errors produced while fetching a render.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The view could not be encoded into the request.
    #[error("view encoding failed: {0}")]
    View(#[from] ViewError),

    /// The request URL could not be built.
    #[error("invalid request URL: {0}")]
    Url(String),

    /// The HTTP request failed before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The renderer answered with a non-success status.
    #[error("renderer returned status {status}")]
    Status { status: u16 },

    /// The response is not an image.
    #[error("response is not an image (content-type `{content_type}`)")]
    NotAnImage { content_type: String },
}

/// Produces rendered images for views.
#[async_trait::async_trait]
pub trait ImageSource<V: ViewState>: Send + Sync + 'static {
    /// Fetch the render for `view`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the render cannot be obtained.
    async fn fetch(&self, view: &V) -> Result<RenderedImage, FetchError>;
}

/// The display container a viewer owns.
pub trait Surface: Send + 'static {
    /// Take over the container, discarding prior contents.
    fn mount(&mut self, width: u32, height: u32);

    /// Replace the displayed image with `image`.
    fn replace_image(&mut self, image: RenderedImage);
}
