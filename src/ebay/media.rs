use crate::config::EbayConfig;
use crate::ebay::MediaUploader;
use crate::http::build_client;
use crate::models::RawImage;
use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("marketplace credential is not configured")]
    MissingCredential,
    #[error("upload request failed: {0}")]
    Transport(String),
    #[error("media endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("media endpoint accepted the upload but returned no fileId")]
    MissingFileId,
}

pub struct EbayMediaClient {
    http: Client,
    base_url: String,
    bearer_token: String,
    marketplace_id: String,
}

impl EbayMediaClient {
    pub fn new(config: &EbayConfig) -> Self {
        Self {
            http: build_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            marketplace_id: config.marketplace_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(rename = "fileId")]
    file_id: Option<String>,
}

#[async_trait]
impl MediaUploader for EbayMediaClient {
    async fn upload(&self, image: &RawImage, name: &str) -> Result<String, UploadError> {
        if self.bearer_token.trim().is_empty() {
            return Err(UploadError::MissingCredential);
        }

        // The media endpoint takes one binary part declared as image/jpeg;
        // the acquisition layer has already normalized the bytes.
        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(name.to_string())
            .mime_str("image/jpeg")
            .map_err(|err| UploadError::Transport(err.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/file", self.base_url))
            .bearer_auth(&self.bearer_token)
            .header("X-API-COMPATIBILITY-VERSION", "1.0.0")
            .header("X-EBAY-C-MARKETPLACE-ID", &self.marketplace_id)
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: FileResponse = response
            .json()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;

        payload
            .file_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(UploadError::MissingFileId)
    }
}
