//! Immutable per-run context and provider bundle.

use mailstack_cloud::{
    ComputeProvider, DatabaseAdmin, DnsProvider, IamProvider, Labels, ObjectStore,
    RemoteExecutor, SecretStore, StorageAdmin,
};
use mailstack_config::{LoadedConfig, PostgresConnection, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name shared by every resource of the stack; also the Vault path.
pub const GLOBAL_NAME: &str = "mail-services";

/// Mail server hostname for a domain.
pub fn mailname(domain: &str) -> String {
    format!("mail.{domain}")
}

/// Everything a task needs to know about the stack, fixed for the run.
#[derive(Debug, Clone)]
pub struct StackContext {
    pub stack: String,
    pub settings: Settings,
    pub postgres: PostgresConnection,
    pub assets_dir: PathBuf,
    pub outputs_dir: PathBuf,
}

impl StackContext {
    pub fn new(
        stack: impl Into<String>,
        settings: Settings,
        postgres: PostgresConnection,
        project_root: &Path,
    ) -> Self {
        Self {
            stack: stack.into(),
            settings,
            postgres,
            assets_dir: project_root.join("assets"),
            outputs_dir: project_root.join("outputs"),
        }
    }

    pub fn from_loaded(loaded: &LoadedConfig, project_root: &Path) -> Self {
        Self::new(
            loaded.stack.clone(),
            loaded.settings.clone(),
            loaded.upstream.postgresql().clone(),
            project_root,
        )
    }

    /// `mail-services-<stack>`
    pub fn resource_name(&self) -> String {
        format!("{}-{}", GLOBAL_NAME, self.stack)
    }

    /// `mail-services-<stack>-<location>`
    pub fn server_name(&self) -> String {
        format!("{}-{}", self.resource_name(), self.settings.server.location)
    }

    /// Object prefix inside both buckets.
    pub fn bucket_path(&self) -> String {
        format!("{}/{}", GLOBAL_NAME, self.stack)
    }

    pub fn labels(&self) -> Labels {
        Labels::from([
            ("environment".to_string(), self.stack.clone()),
            ("purpose".to_string(), GLOBAL_NAME.to_string()),
        ])
    }

    /// `mail.<main domain>`
    pub fn mailname(&self) -> String {
        mailname(&self.settings.mail.main.name)
    }

    pub fn asset(&self, service: &str, file: &str) -> PathBuf {
        self.assets_dir.join(service).join(file)
    }
}

/// Implementations of every external system the graph talks to.
#[derive(Clone)]
pub struct Providers {
    pub compute: Arc<dyn ComputeProvider>,
    pub dns: Arc<dyn DnsProvider>,
    pub secrets: Arc<dyn SecretStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub iam: Arc<dyn IamProvider>,
    pub storage: Arc<dyn StorageAdmin>,
    pub database: Arc<dyn DatabaseAdmin>,
    pub remote: Arc<dyn RemoteExecutor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::context;

    #[test]
    fn test_mailname() {
        assert_eq!(mailname("example.com"), "mail.example.com");
    }

    #[test]
    fn test_names() {
        let ctx = context();
        assert_eq!(ctx.resource_name(), "mail-services-prod");
        assert_eq!(ctx.server_name(), "mail-services-prod-fsn1");
        assert_eq!(ctx.bucket_path(), "mail-services/prod");
        assert_eq!(ctx.mailname(), "mail.example.com");
        assert_eq!(ctx.labels()["purpose"], "mail-services");
        assert!(ctx.asset("mailcow", "prepare.sh").ends_with("assets/mailcow/prepare.sh"));
    }
}
