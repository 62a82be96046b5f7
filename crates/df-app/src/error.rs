use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Error from backend: {0}")]
    BackendError(String),

    #[error("Please select a PNG or JPEG image ({0})")]
    UnsupportedFile(String),

    #[error("No image selected")]
    NoFileSelected,

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid model: {0}")]
    Model(String),

    #[error("Failed to parse model: {0}")]
    Gltf(#[from] gltf::Error),

    #[error(transparent)]
    Geometry(#[from] df_core::Error),

    #[error("Invalid value for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("Render failed: {0}")]
    Render(String),
}

impl AppError {
    /// Validation errors are reported without touching the job.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::UnsupportedFile(_) | Self::NoFileSelected)
    }
}
