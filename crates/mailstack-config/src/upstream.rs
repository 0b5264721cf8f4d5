//! Outputs published by the shared-services stack.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamOutputs {
    pub aws: UpstreamAws,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamAws {
    pub postgresql: PostgresConnection,
}

/// Administrative connection to the shared PostgreSQL instance.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresConnection {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl UpstreamOutputs {
    pub fn postgresql(&self) -> &PostgresConnection {
        &self.aws.postgresql
    }
}

pub fn load_upstream(path: &Path) -> Result<UpstreamOutputs> {
    if !path.exists() {
        return Err(ConfigError::UpstreamNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let outputs: UpstreamOutputs =
        serde_json::from_str(&content).map_err(|e| ConfigError::UpstreamMalformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let pg = outputs.postgresql();
    if pg.address.is_empty() || pg.username.is_empty() || pg.port == 0 {
        return Err(ConfigError::UpstreamMalformed {
            path: path.to_path_buf(),
            message: "aws.postgresql の address / port / username が空です".to_string(),
        });
    }

    tracing::debug!(path = %path.display(), host = %pg.address, "Loaded upstream outputs");
    Ok(outputs)
}
