//! Errors shared by providers and the executor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Not found: {0}")]
    ResourceNotFound(String),

    #[error("Not authenticated: {0}")]
    AuthenticationFailed(String),

    #[error("Provider API error: {0}")]
    ApiError(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("State is locked: {0}")]
    LockError(String),

    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error(transparent)]
    Graph(#[from] mailstack_core::CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
