//! AWS provider error types

use mailstack_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: brew install awscli")]
    CliNotFound,

    #[error("aws authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("aws command failed: {0}")]
    CommandFailed(String),

    #[error("Unexpected aws output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AwsError {
    /// The requested entity does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            AwsError::CommandFailed(msg) => {
                msg.contains("NoSuchEntity") || msg.contains("(404)") || msg.contains("Not Found")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for CloudError {
    fn from(e: AwsError) -> Self {
        match e {
            AwsError::CliNotFound | AwsError::AuthenticationFailed(_) => {
                CloudError::AuthenticationFailed(e.to_string())
            }
            AwsError::CommandFailed(msg) => CloudError::CommandFailed(msg),
            AwsError::UnexpectedOutput(msg) => CloudError::ApiError(msg),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::IoError(e) => CloudError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found() {
        let missing = AwsError::CommandFailed(
            "An error occurred (NoSuchEntity) when calling the GetUser operation".to_string(),
        );
        assert!(missing.is_not_found());

        let bucket = AwsError::CommandFailed(
            "An error occurred (404) when calling the HeadBucket operation: Not Found".to_string(),
        );
        assert!(bucket.is_not_found());

        let denied = AwsError::CommandFailed("An error occurred (AccessDenied)".to_string());
        assert!(!denied.is_not_found());
        assert!(!AwsError::CliNotFound.is_not_found());
    }
}
