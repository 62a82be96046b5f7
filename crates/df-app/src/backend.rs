pub mod schemas;

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use crate::backend::schemas::{JobCreateResponse, JobStatusResponse};
use crate::error::AppError;
use crate::upload::ImageFile;

/// HTTP surface of the conversion service.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// `POST /upload` with the image as multipart field `file`.
    async fn upload(&self, file: &ImageFile) -> Result<JobCreateResponse, AppError>;

    /// `GET /status/{job_id}`
    async fn status(&self, job_id: &str) -> Result<JobStatusResponse, AppError>;

    /// Location of the finished asset; never fetched by the poller itself.
    fn result_url(&self, job_id: &str) -> String;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError>;
}

pub struct GenBackend {
    client: reqwest::Client,
    base_url: String,
}

impl GenBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::BackendError(format!("HTTP {}: {}", status, body)))
    }
}

#[async_trait]
impl JobApi for GenBackend {
    async fn upload(&self, file: &ImageFile) -> Result<JobCreateResponse, AppError> {
        let url = format!("{}/upload", self.base_url);
        debug!("POST {} ({} bytes, {})", url, file.bytes.len(), file.mime_type());

        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(file.mime_type())?;
        let form = Form::new().part("file", part);

        let response = self.client.post(url).multipart(form).send().await?;
        let response = Self::ensure_success(response).await?;

        Ok(response.json().await?)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatusResponse, AppError> {
        let url = format!("{}/status/{}", self.base_url, job_id);
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            debug!("Undecodable status body for {}: {}", job_id, String::from_utf8_lossy(&body));
            AppError::from(e)
        })
    }

    fn result_url(&self, job_id: &str) -> String {
        format!("{}/result/{}", self.base_url, job_id)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;

        Ok(response.bytes().await?.to_vec())
    }
}
