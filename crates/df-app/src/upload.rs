use std::path::Path;
use std::sync::Arc;
use image::ImageFormat;
use log::{info, warn};
use tokio::task::JoinHandle;
use df_core::JobEvent;
use crate::backend::JobApi;
use crate::error::AppError;
use crate::events::EventProxy;

/// Advertised upload limit. The backend enforces it; the client only warns.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// An image the user picked, with its declared format.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub name: String,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    /// Checks the declared media type before any bytes are read.
    pub fn declared_format(path: &Path) -> Result<ImageFormat, AppError> {
        let name = path.display().to_string();
        match ImageFormat::from_path(path) {
            Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(format),
            Ok(other) => Err(AppError::UnsupportedFile(format!("{} is {}", name, other.to_mime_type()))),
            Err(_) => Err(AppError::UnsupportedFile(format!("{} is not an image", name))),
        }
    }

    pub fn open(path: &Path) -> Result<Self, AppError> {
        let format = Self::declared_format(path)?;
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());

        Ok(Self::new(name, format, bytes))
    }

    pub fn new(name: impl Into<String>, format: ImageFormat, bytes: Vec<u8>) -> Self {
        let file = Self { name: name.into(), format, bytes };
        if file.bytes.len() > MAX_UPLOAD_BYTES {
            warn!(
                "{} is {} bytes, over the {} byte upload limit; the backend may reject it",
                file.name,
                file.bytes.len(),
                MAX_UPLOAD_BYTES
            );
        }
        file
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
}

/// Sends the image to the backend once. No retry: a failure ends this attempt.
pub async fn submit(api: &dyn JobApi, file: &ImageFile) -> Result<JobHandle, AppError> {
    let response = api.upload(file).await?;
    if response.job_id.trim().is_empty() {
        return Err(AppError::BackendError("upload response carried an empty job_id".into()));
    }

    Ok(JobHandle { job_id: response.job_id })
}

/// Runs [`submit`] in the background and reports the outcome as a job event.
pub fn spawn_submit(api: Arc<dyn JobApi>, file: ImageFile, proxy: EventProxy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let event = match submit(api.as_ref(), &file).await {
            Ok(handle) => {
                info!("Uploaded {} as job {}", file.name, handle.job_id);
                JobEvent::UploadSucceeded { job_id: handle.job_id }
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", file.name, e);
                JobEvent::UploadFailed { message: None }
            }
        };
        proxy.send_job(event);
    })
}
