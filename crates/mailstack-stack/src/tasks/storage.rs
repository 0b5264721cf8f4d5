use async_trait::async_trait;
use mailstack_cloud::{Labels, StorageAdmin};
use mailstack_core::{Deps, Inputs, Outputs, RunPolicy, Task, TaskId, Value};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum StorageOp {
    Bucket {
        name: String,
        region: String,
        labels: Labels,
    },
    /// Policy granting full access to the objects of one bucket.
    BucketPolicy {
        name: String,
        bucket_arn: Value,
        labels: Labels,
    },
    User {
        name: String,
        policy_arn: Value,
        labels: Labels,
    },
    /// New access key for the user; created once.
    AccessKey { user: Value },
}

/// IAM policy document allowing `s3:*` on every object of the bucket.
pub fn bucket_policy(bucket_arn: &str) -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["s3:*"],
            "Resource": [format!("{bucket_arn}/*")],
        }],
    })
}

pub struct StorageTask {
    id: TaskId,
    deps: Deps,
    op: StorageOp,
    provider: Arc<dyn StorageAdmin>,
}

impl StorageTask {
    pub fn new(id: impl Into<TaskId>, op: StorageOp, provider: Arc<dyn StorageAdmin>) -> Self {
        let deps = match &op {
            StorageOp::Bucket { .. } => Deps::new(),
            StorageOp::BucketPolicy { bucket_arn, .. } => Deps::new().uses(bucket_arn),
            StorageOp::User { policy_arn, .. } => Deps::new().uses(policy_arn),
            StorageOp::AccessKey { user } => Deps::new().uses(user),
        };
        Self {
            id: id.into(),
            deps,
            op,
            provider,
        }
    }
}

#[async_trait]
impl Task for StorageTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        match self.op {
            StorageOp::Bucket { .. } => "s3-bucket",
            StorageOp::BucketPolicy { .. } => "iam-policy",
            StorageOp::User { .. } => "iam-user",
            StorageOp::AccessKey { .. } => "iam-access-key",
        }
    }

    fn describe(&self) -> String {
        match &self.op {
            StorageOp::Bucket { name, region, .. } => format!("bucket {name} ({region})"),
            StorageOp::BucketPolicy { name, .. } => format!("policy {name}"),
            StorageOp::User { name, .. } => format!("user {name}"),
            StorageOp::AccessKey { .. } => "access key".to_string(),
        }
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    fn policy(&self) -> RunPolicy {
        match self.op {
            StorageOp::AccessKey { .. } => RunPolicy::CreateOnly,
            _ => RunPolicy::OnChange,
        }
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        Ok(match &self.op {
            StorageOp::Bucket { name, region, .. } => vec![name.clone(), region.clone()],
            StorageOp::BucketPolicy {
                name, bucket_arn, ..
            } => vec![
                name.clone(),
                bucket_policy(&inputs.resolve(bucket_arn)?).to_string(),
            ],
            StorageOp::User {
                name, policy_arn, ..
            } => vec![name.clone(), inputs.resolve(policy_arn)?],
            StorageOp::AccessKey { user } => vec![inputs.resolve(user)?],
        })
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let provider = &self.provider;
        let outputs = match &self.op {
            StorageOp::Bucket {
                name,
                region,
                labels,
            } => {
                let arn = provider.ensure_bucket(name, region, labels).await?;
                Outputs::new()
                    .with("name", name.clone())
                    .with("region", region.clone())
                    .with("arn", arn)
            }
            StorageOp::BucketPolicy {
                name,
                bucket_arn,
                labels,
            } => {
                let document = bucket_policy(&inputs.resolve(bucket_arn)?);
                let arn = provider.ensure_policy(name, &document, labels).await?;
                Outputs::new().with("arn", arn)
            }
            StorageOp::User {
                name,
                policy_arn,
                labels,
            } => {
                provider
                    .ensure_user(name, &inputs.resolve(policy_arn)?, labels)
                    .await?;
                Outputs::new().with("name", name.clone())
            }
            StorageOp::AccessKey { user } => {
                let key = provider.create_access_key(&inputs.resolve(user)?).await?;
                Outputs::new()
                    .with("access_key_id", key.id)
                    .with("secret_access_key", key.secret)
            }
        };
        Ok(outputs)
    }
}
