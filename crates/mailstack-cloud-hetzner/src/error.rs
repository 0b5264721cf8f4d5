//! Hetzner Cloud provider error types

use mailstack_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HetznerError {
    #[error("hcloud not found. Please install: brew install hcloud")]
    HcloudNotFound,

    #[error("hcloud authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("hcloud command failed: {0}")]
    CommandFailed(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Resource creation failed: {0}")]
    CreationFailed(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HetznerError>;

impl From<HetznerError> for CloudError {
    fn from(e: HetznerError) -> Self {
        match e {
            HetznerError::HcloudNotFound | HetznerError::AuthenticationFailed(_) => {
                CloudError::AuthenticationFailed(e.to_string())
            }
            HetznerError::CommandFailed(msg) => CloudError::CommandFailed(msg),
            HetznerError::NotFound { .. } => CloudError::ResourceNotFound(e.to_string()),
            HetznerError::CreationFailed(msg) => CloudError::ApiError(msg),
            HetznerError::JsonError(e) => CloudError::Json(e),
            HetznerError::IoError(e) => CloudError::Io(e),
        }
    }
}
