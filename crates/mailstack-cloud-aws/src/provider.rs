//! AWS provider implementation

use crate::aws::{AwsCli, MAX_POLICY_VERSIONS, PolicyVersion, bucket_arn};
use crate::error::AwsError;
use async_trait::async_trait;
use mailstack_cloud::{AccessKey, AuthStatus, Labels, StorageAdmin};

/// AWS provider
#[derive(Debug, Default, Clone)]
pub struct AwsProvider {
    cli: AwsCli,
}

impl AwsProvider {
    pub fn new() -> Self {
        Self { cli: AwsCli::new() }
    }
}

/// Oldest non-default version, deleted to make room for a new one.
fn version_to_prune(versions: &[PolicyVersion]) -> Option<&PolicyVersion> {
    if versions.len() < MAX_POLICY_VERSIONS {
        return None;
    }
    versions
        .iter()
        .filter(|v| !v.is_default_version)
        .min_by(|a, b| a.create_date.cmp(&b.create_date))
}

#[async_trait]
impl StorageAdmin for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn check_auth(&self) -> mailstack_cloud::Result<AuthStatus> {
        match self.cli.check_auth().await {
            Ok(arn) => Ok(AuthStatus::ok(arn)),
            Err(AwsError::CliNotFound) => {
                Ok(AuthStatus::failed("aws CLI がインストールされていません"))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn ensure_bucket(
        &self,
        name: &str,
        region: &str,
        labels: &Labels,
    ) -> mailstack_cloud::Result<String> {
        if self.cli.bucket_exists(name).await? {
            tracing::debug!(bucket = name, "Bucket already exists");
        } else {
            self.cli.create_bucket(name, region).await?;
            tracing::info!(bucket = name, region, "Created bucket");
        }
        self.cli.put_bucket_tagging(name, labels).await?;
        Ok(bucket_arn(name))
    }

    async fn ensure_policy(
        &self,
        name: &str,
        document: &serde_json::Value,
        labels: &Labels,
    ) -> mailstack_cloud::Result<String> {
        let body = serde_json::to_string(document)?;

        let Some(policy) = self.cli.find_policy(name).await? else {
            let created = self.cli.create_policy(name, &body, labels).await?;
            tracing::info!(policy = name, arn = %created.arn, "Created policy");
            return Ok(created.arn);
        };

        let current = match &policy.default_version_id {
            Some(version) => Some(self.cli.policy_document(&policy.arn, version).await?),
            None => None,
        };
        if current.as_ref() == Some(document) {
            tracing::debug!(policy = name, "Policy document unchanged");
            return Ok(policy.arn);
        }

        let versions = self.cli.list_policy_versions(&policy.arn).await?;
        if let Some(oldest) = version_to_prune(&versions) {
            self.cli
                .delete_policy_version(&policy.arn, &oldest.version_id)
                .await?;
            tracing::debug!(policy = name, version = %oldest.version_id, "Pruned policy version");
        }
        self.cli
            .create_default_policy_version(&policy.arn, &body)
            .await?;
        tracing::info!(policy = name, "Updated policy document");
        Ok(policy.arn)
    }

    async fn ensure_user(
        &self,
        name: &str,
        policy_arn: &str,
        labels: &Labels,
    ) -> mailstack_cloud::Result<()> {
        match self.cli.find_user(name).await? {
            Some(user) => tracing::debug!(user = name, arn = %user.arn, "Reusing existing user"),
            None => {
                let user = self.cli.create_user(name, labels).await?;
                tracing::info!(user = name, arn = %user.arn, "Created user");
            }
        }

        let attached = self.cli.attached_policies(name).await?;
        if !attached.iter().any(|arn| arn == policy_arn) {
            self.cli.attach_user_policy(name, policy_arn).await?;
            tracing::info!(user = name, policy = policy_arn, "Attached policy");
        }
        Ok(())
    }

    async fn create_access_key(&self, user: &str) -> mailstack_cloud::Result<AccessKey> {
        let key = self.cli.create_access_key(user).await?;
        tracing::info!(user = %key.user_name, id = %key.access_key_id, "Created access key");
        Ok(AccessKey {
            id: key.access_key_id,
            secret: key.secret_access_key,
        })
    }
}
