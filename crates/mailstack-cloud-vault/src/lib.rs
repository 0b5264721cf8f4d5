//! HashiCorp Vault secret mirror for mailstack
//!
//! Generated credentials are mirrored write-only into a KV v2 mount. When
//! `VAULT_ADDR` / `VAULT_TOKEN` are absent, [`secret_store`] falls back to
//! [`DisabledSecretStore`], which logs and skips every write.

pub mod error;
pub mod vault;

use mailstack_cloud::SecretStore;
use std::sync::Arc;

pub use error::{Result, VaultError};
pub use vault::{DisabledSecretStore, VaultClient, VaultConfig};

/// Vault client from the environment, or the disabled store
pub fn secret_store(address: Option<&str>, mount: &str) -> Arc<dyn SecretStore> {
    match VaultConfig::from_env(address, mount) {
        Ok(config) => {
            tracing::debug!(address = %config.address, mount = %config.mount, "Vault enabled");
            Arc::new(VaultClient::new(config))
        }
        Err(e) => {
            tracing::warn!("Vault mirroring disabled: {}", e);
            Arc::new(DisabledSecretStore)
        }
    }
}
