//! Google Cloud provider error types

use mailstack_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found. Please install: brew install --cask google-cloud-sdk")]
    GcloudNotFound,

    #[error("gcloud authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("gcloud command failed: {0}")]
    CommandFailed(String),

    #[error("Cloud DNS API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GcpError>;

impl GcpError {
    /// Whether a gcloud failure means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            GcpError::CommandFailed(msg) => msg.contains("NOT_FOUND") || msg.contains("not found"),
            GcpError::ApiError { code, .. } => *code == 404,
            _ => false,
        }
    }
}

impl From<GcpError> for CloudError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::GcloudNotFound | GcpError::AuthenticationFailed(_) => {
                CloudError::AuthenticationFailed(e.to_string())
            }
            GcpError::CommandFailed(msg) => CloudError::CommandFailed(msg),
            GcpError::ApiError { .. } | GcpError::HttpError(_) => {
                CloudError::ApiError(e.to_string())
            }
            GcpError::JsonError(e) => CloudError::Json(e),
            GcpError::IoError(e) => CloudError::Io(e),
        }
    }
}
