use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use tracing::debug;
use tryon_contracts::source::DEFAULT_MIME_TYPE;
use tryon_contracts::{decode_data_url, CanonicalBlob, ImageSource, TryOnError};

/// What a remote fetch produced, before any validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, TryOnError>;
}

/// Anonymous GET: no cookie jar, no auth headers, any origin.
pub struct HttpImageFetcher {
    http: HttpClient,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, TryOnError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TryOnError::Unknown(format!("HTTP client setup failed: {err}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, TryOnError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| TryOnError::Fetch(format!("{url}: {err}")))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TryOnError::Fetch(format!("{url}: body read failed: {err}")))?
            .to_vec();
        Ok(FetchedImage {
            status,
            content_type,
            bytes,
        })
    }
}

/// Turns any [`ImageSource`] into a [`CanonicalBlob`].
#[derive(Clone)]
pub struct Normalizer {
    fetcher: Arc<dyn ImageFetcher>,
}

impl Normalizer {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn normalize(&self, source: &ImageSource) -> Result<CanonicalBlob, TryOnError> {
        match source {
            ImageSource::RemoteUrl(url) => self.fetch_remote(url).await,
            ImageSource::DataUrl(raw) => decode_data_url(raw),
            ImageSource::Blob(blob) => Ok(blob.clone()),
        }
    }

    /// Classifies a raw string first; unrecognized strings fail with
    /// [`TryOnError::UnsupportedSource`].
    pub async fn normalize_str(&self, raw: &str) -> Result<CanonicalBlob, TryOnError> {
        let source = ImageSource::parse(raw)?;
        self.normalize(&source).await
    }

    async fn fetch_remote(&self, url: &str) -> Result<CanonicalBlob, TryOnError> {
        let fetched = self.fetcher.fetch(url).await?;
        if !(200..300).contains(&fetched.status) {
            return Err(TryOnError::Fetch(format!(
                "{url} returned status {}",
                fetched.status
            )));
        }
        let mime = fetched
            .content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !mime.starts_with("image/") {
            return Err(TryOnError::Fetch(format!(
                "{url} is not an image (content-type '{mime}')"
            )));
        }
        debug!(%url, %mime, bytes = fetched.bytes.len(), "fetched remote image");
        Ok(CanonicalBlob::new(fetched.bytes, mime))
    }
}

/// Reads a local image into a blob source. The media type comes from the
/// extension, then from content sniffing.
pub async fn load_image_file(path: &Path) -> Result<ImageSource, TryOnError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| TryOnError::Unknown(format!("failed reading {}: {err}", path.display())))?;
    let mime = mime_for_path(path)
        .or_else(|| {
            image::guess_format(&bytes)
                .ok()
                .map(|format| format.to_mime_type())
        })
        .unwrap_or(DEFAULT_MIME_TYPE);
    Ok(ImageSource::blob(bytes, mime))
}

/// URL, data URL, or path to an existing file.
pub async fn source_from_arg(raw: &str) -> Result<ImageSource, TryOnError> {
    match ImageSource::parse(raw) {
        Ok(source) => Ok(source),
        Err(err) => {
            let path = Path::new(raw.trim());
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                load_image_file(path).await
            } else {
                Err(err)
            }
        }
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}
