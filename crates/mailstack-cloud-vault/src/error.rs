//! Vault error types

use mailstack_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Vault API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;

impl From<VaultError> for CloudError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::MissingEnvVar(_) => CloudError::InvalidConfig(e.to_string()),
            VaultError::ApiError { code: 401 | 403, .. } => {
                CloudError::AuthenticationFailed(e.to_string())
            }
            _ => CloudError::ApiError(e.to_string()),
        }
    }
}
