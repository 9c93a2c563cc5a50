//! Image host uploader (imgbb-compatible API).
//!
//! `POST {upload_url}` with a multipart form carrying `key`, `name` and the
//! base64-encoded `image`; the response is
//! `{"success": true, "data": {"url": "..."}}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use margin_core::defaults::{HTTP_TIMEOUT_SECS, IMAGE_HOST_URL};
use margin_core::{Asset, AssetUploader, AssetUrl, Error, Result};

/// Uploads assets to an image host.
#[derive(Clone)]
pub struct ImageHostUploader {
    client: Client,
    upload_url: String,
    api_key: String,
}

impl std::fmt::Debug for ImageHostUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHostUploader")
            .field("upload_url", &self.upload_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<UploadData>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct UploadData {
    url: String,
}

impl ImageHostUploader {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_url(IMAGE_HOST_URL, api_key)
    }

    pub fn with_url(upload_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            upload_url: upload_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `IMGBB_API_KEY` | (required) | Image host API key |
    /// | `IMGBB_UPLOAD_URL` | `https://api.imgbb.com/1/upload` | Upload endpoint |
    ///
    /// Returns `None` when no API key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("IMGBB_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        let url = std::env::var("IMGBB_UPLOAD_URL").unwrap_or_else(|_| IMAGE_HOST_URL.to_string());
        Some(Self::with_url(url, api_key))
    }
}

#[async_trait]
impl AssetUploader for ImageHostUploader {
    #[instrument(skip_all, fields(subsystem = "image", op = "upload_asset", filename = %asset.filename, bytes = asset.bytes.len()))]
    async fn upload_asset(&self, asset: Asset) -> Result<AssetUrl> {
        let start = Instant::now();
        let stem = asset
            .filename
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| asset.filename.clone());

        let form = Form::new()
            .text("key", self.api_key.clone())
            .text("name", stem)
            .text("image", STANDARD.encode(&asset.bytes));

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upload(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Upload(format!("Image host returned {}: {}", status, e)))?;

        match body {
            UploadResponse {
                success: true,
                data: Some(data),
                ..
            } if status.is_success() && !data.url.trim().is_empty() => {
                info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Asset uploaded"
                );
                Ok(AssetUrl::from(data.url))
            }
            UploadResponse { success: true, .. } if status.is_success() => {
                warn!("Image host returned no URL");
                Err(Error::Upload("Image host returned no URL".into()))
            }
            UploadResponse { error, .. } => {
                let reason = error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("status {}", status));
                warn!(error = %reason, "Image host rejected upload");
                Err(Error::Upload(format!("Image host rejected upload: {}", reason)))
            }
        }
    }
}
