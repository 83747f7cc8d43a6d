//! HTTP image source for the remote renderer.
//!
//! Thin `reqwest` wrapper: one GET per view, the view encoded as a JSON array
//! in the `data` query parameter followed by the configured image-quality
//! arguments. No caching headers, no retries; the sync loop decides what
//! happens after a failure. URL building is a pure function for testability.

use std::time::Duration;

use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use viewport::image::{FetchError, ImageSource, RenderedImage};
use viewport::view::ViewState;

/// Name of the query parameter carrying the encoded view.
pub const VIEW_PARAM: &str = "data";

pub struct HttpImageSource {
    http: reqwest::Client,
    base_url: Url,
    query_args: Vec<(String, String)>,
}

impl HttpImageSource {
    /// Build a source for `base_url` (scheme, host, port and path).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Url`] for an unparseable base URL and
    /// [`FetchError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, query_args: Vec<(String, String)>, connect_timeout: Duration) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url).map_err(|e| FetchError::Url(format!("{base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self { http, base_url, query_args })
    }

    /// The request URL for `view`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::View`] if the view cannot be encoded.
    pub fn image_url<V: ViewState>(&self, view: &V) -> Result<Url, FetchError> {
        image_url(&self.base_url, &self.query_args, view)
    }
}

/// Combine the base URL, the encoded view and the extra query arguments.
///
/// # Errors
///
/// Returns [`FetchError::View`] if the view cannot be encoded.
pub fn image_url<V: ViewState>(base: &Url, query_args: &[(String, String)], view: &V) -> Result<Url, FetchError> {
    let param = view.to_url_param()?;
    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(VIEW_PARAM, &param);
        for (key, value) in query_args {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

#[async_trait::async_trait]
impl<V: ViewState> ImageSource<V> for HttpImageSource {
    async fn fetch(&self, view: &V) -> Result<RenderedImage, FetchError> {
        let url = self.image_url(view)?;
        tracing::debug!(%url, "image URL");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(FetchError::NotAnImage { content_type });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(RenderedImage::new(bytes.to_vec(), content_type))
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
