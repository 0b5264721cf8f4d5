//! Vault KV v2 client
//!
//! Write-only: secrets are mirrored to `<mount>/data/<path>/<key>` and never
//! read back.

use crate::error::{Result, VaultError};
use async_trait::async_trait;
use mailstack_cloud::SecretStore;
use serde::{Deserialize, Serialize};

pub const VAULT_ADDR_ENV: &str = "VAULT_ADDR";
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";

/// Vault connection settings
#[derive(Clone)]
pub struct VaultConfig {
    pub address: String,
    pub token: String,
    pub mount: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}

impl VaultConfig {
    /// Build from `VAULT_ADDR` / `VAULT_TOKEN`; `address` overrides the env
    pub fn from_env(address: Option<&str>, mount: &str) -> Result<Self> {
        let address = match address {
            Some(a) => a.to_string(),
            None => std::env::var(VAULT_ADDR_ENV)
                .map_err(|_| VaultError::MissingEnvVar(VAULT_ADDR_ENV.to_string()))?,
        };
        let token = std::env::var(VAULT_TOKEN_ENV)
            .map_err(|_| VaultError::MissingEnvVar(VAULT_TOKEN_ENV.to_string()))?;

        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            token,
            mount: mount.trim_matches('/').to_string(),
        })
    }
}

/// Vault KV v2 client
pub struct VaultClient {
    client: reqwest::Client,
    config: VaultConfig,
}

impl VaultClient {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn data_url(&self, path: &str, key: &str) -> String {
        format!(
            "{}/v1/{}/data/{}/{}",
            self.config.address,
            self.config.mount,
            path.trim_matches('/'),
            key
        )
    }

    /// Write a new version of the secret at `<path>/<key>`
    pub async fn write_secret(&self, path: &str, key: &str, data: &serde_json::Value) -> Result<()> {
        let url = self.data_url(path, key);

        let response = self
            .client
            .post(&url)
            .header("X-Vault-Token", &self.config.token)
            .json(&WriteRequest { data })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.errors.join("; "))
                .unwrap_or(body);
            return Err(VaultError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        tracing::debug!("Wrote secret {}/{}", path, key);
        Ok(())
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn write(
        &self,
        path: &str,
        key: &str,
        data: &serde_json::Value,
    ) -> mailstack_cloud::Result<()> {
        self.write_secret(path, key, data).await?;
        Ok(())
    }
}

/// Stand-in used when Vault is not configured; every write is skipped.
#[derive(Debug, Default)]
pub struct DisabledSecretStore;

#[async_trait]
impl SecretStore for DisabledSecretStore {
    async fn write(
        &self,
        path: &str,
        key: &str,
        _data: &serde_json::Value,
    ) -> mailstack_cloud::Result<()> {
        tracing::warn!("Vault is not configured, skipping secret {}/{}", path, key);
        Ok(())
    }
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    data: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config() -> VaultConfig {
        VaultConfig {
            address: "https://vault.example.com:8200".to_string(),
            token: "s.token".to_string(),
            mount: "secret".to_string(),
        }
    }

    #[test]
    fn test_data_url() {
        let client = VaultClient::new(config());
        assert_eq!(
            client.data_url("mail-services", "mailcow-api"),
            "https://vault.example.com:8200/v1/secret/data/mail-services/mailcow-api"
        );
    }

    #[test]
    fn test_write_request_body() {
        let data = serde_json::json!({"read_write": "a", "read": "b"});
        let body = serde_json::to_value(WriteRequest { data: &data }).unwrap();
        assert_eq!(body["data"]["read"], "b");
    }

    #[test]
    fn test_debug_hides_token() {
        assert!(!format!("{:?}", config()).contains("s.token"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        temp_env::with_vars(
            [
                (VAULT_ADDR_ENV, Some("https://vault.local/")),
                (VAULT_TOKEN_ENV, Some("t")),
            ],
            || {
                let config = VaultConfig::from_env(None, "/kv/").unwrap();
                assert_eq!(config.address, "https://vault.local");
                assert_eq!(config.mount, "kv");
            },
        );
    }

    #[test]
    #[serial]
    fn test_from_env_without_token() {
        temp_env::with_vars(
            [
                (VAULT_ADDR_ENV, Some("https://vault.local")),
                (VAULT_TOKEN_ENV, None),
            ],
            || {
                let err = VaultConfig::from_env(None, "secret").unwrap_err();
                assert!(matches!(err, VaultError::MissingEnvVar(_)));
            },
        );
    }

    #[tokio::test]
    async fn test_disabled_store_succeeds() {
        DisabledSecretStore
            .write("mail-services", "google-cloud", &serde_json::json!({}))
            .await
            .unwrap();
    }
}
