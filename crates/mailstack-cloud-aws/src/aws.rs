//! aws CLI wrapper
//!
//! Every call runs with `--output json`. Credentials and the default region
//! are resolved by the CLI itself.

use crate::error::{AwsError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

/// IAM keeps at most this many versions per managed policy.
pub const MAX_POLICY_VERSIONS: usize = 5;

/// Region where S3 rejects an explicit location constraint.
const DEFAULT_S3_REGION: &str = "us-east-1";

/// aws CLI wrapper
#[derive(Debug, Default, Clone)]
pub struct AwsCli;

impl AwsCli {
    pub fn new() -> Self {
        Self
    }

    /// Check that the CLI is installed and credentials resolve; returns the
    /// caller ARN.
    pub async fn check_auth(&self) -> Result<String> {
        let which = Command::new("which").arg("aws").output().await?;
        if !which.status.success() {
            return Err(AwsError::CliNotFound);
        }

        let identity: CallerIdentity = self
            .run_json(&["sts", "get-caller-identity"])
            .await
            .map_err(|e| AwsError::AuthenticationFailed(e.to_string()))?;
        Ok(identity.arn)
    }

    /// Run an aws command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("aws");
        cmd.args(args);
        cmd.args(["--output", "json"]);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: aws {}", args.join(" "));

        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run_command(args).await?;
        Ok(serde_json::from_str(output.trim())?)
    }

    // ============ S3 ============

    pub async fn bucket_exists(&self, name: &str) -> Result<bool> {
        match self
            .run_command(&["s3api", "head-bucket", "--bucket", name])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn create_bucket(&self, name: &str, region: &str) -> Result<()> {
        let constraint = format!("LocationConstraint={region}");
        let mut args = vec!["s3api", "create-bucket", "--bucket", name, "--region", region];
        if region != DEFAULT_S3_REGION {
            args.extend(["--create-bucket-configuration", constraint.as_str()]);
        }
        self.run_command(&args).await?;
        Ok(())
    }

    pub async fn put_bucket_tagging(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<()> {
        let tagging = serde_json::json!({ "TagSet": tag_set(labels) }).to_string();
        self.run_command(&[
            "s3api",
            "put-bucket-tagging",
            "--bucket",
            name,
            "--tagging",
            &tagging,
        ])
        .await?;
        Ok(())
    }

    // ============ IAM policies ============

    pub async fn find_policy(&self, name: &str) -> Result<Option<PolicyInfo>> {
        let list: PolicyList = self
            .run_json(&["iam", "list-policies", "--scope", "Local"])
            .await?;
        Ok(list.policies.into_iter().find(|p| p.policy_name == name))
    }

    pub async fn create_policy(
        &self,
        name: &str,
        document: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<PolicyInfo> {
        let tags = tag_args(labels);
        let mut args = vec![
            "iam",
            "create-policy",
            "--policy-name",
            name,
            "--policy-document",
            document,
        ];
        if !tags.is_empty() {
            args.push("--tags");
            args.extend(tags.iter().map(String::as_str));
        }
        let created: PolicyEnvelope = self.run_json(&args).await?;
        Ok(created.policy)
    }

    /// Document of one policy version, decoded.
    pub async fn policy_document(&self, arn: &str, version_id: &str) -> Result<serde_json::Value> {
        let version: PolicyVersionEnvelope = self
            .run_json(&[
                "iam",
                "get-policy-version",
                "--policy-arn",
                arn,
                "--version-id",
                version_id,
            ])
            .await?;
        version
            .policy_version
            .document
            .ok_or_else(|| AwsError::UnexpectedOutput(format!("policy {arn} has no document")))
    }

    pub async fn list_policy_versions(&self, arn: &str) -> Result<Vec<PolicyVersion>> {
        let list: PolicyVersionList = self
            .run_json(&["iam", "list-policy-versions", "--policy-arn", arn])
            .await?;
        Ok(list.versions)
    }

    pub async fn delete_policy_version(&self, arn: &str, version_id: &str) -> Result<()> {
        self.run_command(&[
            "iam",
            "delete-policy-version",
            "--policy-arn",
            arn,
            "--version-id",
            version_id,
        ])
        .await?;
        Ok(())
    }

    pub async fn create_default_policy_version(&self, arn: &str, document: &str) -> Result<()> {
        self.run_command(&[
            "iam",
            "create-policy-version",
            "--policy-arn",
            arn,
            "--policy-document",
            document,
            "--set-as-default",
        ])
        .await?;
        Ok(())
    }

    // ============ IAM users ============

    pub async fn find_user(&self, name: &str) -> Result<Option<UserInfo>> {
        match self
            .run_json::<UserEnvelope>(&["iam", "get-user", "--user-name", name])
            .await
        {
            Ok(found) => Ok(Some(found.user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_user(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<UserInfo> {
        let tags = tag_args(labels);
        let mut args = vec!["iam", "create-user", "--user-name", name];
        if !tags.is_empty() {
            args.push("--tags");
            args.extend(tags.iter().map(String::as_str));
        }
        let created: UserEnvelope = self.run_json(&args).await?;
        Ok(created.user)
    }

    /// ARNs of the managed policies attached to `user`.
    pub async fn attached_policies(&self, user: &str) -> Result<Vec<String>> {
        let list: AttachedPolicyList = self
            .run_json(&["iam", "list-attached-user-policies", "--user-name", user])
            .await?;
        Ok(list
            .attached_policies
            .into_iter()
            .map(|p| p.policy_arn)
            .collect())
    }

    pub async fn attach_user_policy(&self, user: &str, policy_arn: &str) -> Result<()> {
        self.run_command(&[
            "iam",
            "attach-user-policy",
            "--user-name",
            user,
            "--policy-arn",
            policy_arn,
        ])
        .await?;
        Ok(())
    }

    pub async fn create_access_key(&self, user: &str) -> Result<AccessKeyInfo> {
        let created: AccessKeyEnvelope = self
            .run_json(&["iam", "create-access-key", "--user-name", user])
            .await?;
        Ok(created.access_key)
    }
}

/// ARN of an S3 bucket
pub fn bucket_arn(name: &str) -> String {
    format!("arn:aws:s3:::{name}")
}

/// `Key=k,Value=v` shorthand for IAM `--tags`, in key order
fn tag_args(labels: &BTreeMap<String, String>) -> Vec<String> {
    labels
        .iter()
        .map(|(k, v)| format!("Key={k},Value={v}"))
        .collect()
}

fn tag_set(labels: &BTreeMap<String, String>) -> Vec<serde_json::Value> {
    labels
        .iter()
        .map(|(k, v)| serde_json::json!({ "Key": k, "Value": v }))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    arn: String,
}

/// Managed policy information from IAM
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyInfo {
    pub policy_name: String,
    pub arn: String,
    #[serde(default)]
    pub default_version_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyList {
    #[serde(default)]
    policies: Vec<PolicyInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyEnvelope {
    policy: PolicyInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyVersion {
    pub version_id: String,
    pub is_default_version: bool,
    #[serde(default)]
    pub create_date: Option<String>,
    #[serde(default)]
    pub document: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyVersionEnvelope {
    policy_version: PolicyVersion,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyVersionList {
    #[serde(default)]
    versions: Vec<PolicyVersion>,
}

/// IAM user information
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserInfo {
    pub user_name: String,
    pub arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserEnvelope {
    user: UserInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttachedPolicy {
    policy_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttachedPolicyList {
    #[serde(default)]
    attached_policies: Vec<AttachedPolicy>,
}

/// Freshly created access key; the secret is only returned once.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessKeyInfo {
    pub user_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccessKeyEnvelope {
    access_key: AccessKeyInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("purpose".to_string(), "mail-services".to_string()),
            ("environment".to_string(), "prod".to_string()),
        ])
    }

    #[test]
    fn test_tag_args() {
        assert_eq!(
            tag_args(&labels()),
            vec!["Key=environment,Value=prod", "Key=purpose,Value=mail-services"]
        );
    }

    #[test]
    fn test_tag_set() {
        let set = tag_set(&labels());
        assert_eq!(set[0]["Key"], "environment");
        assert_eq!(set[1]["Value"], "mail-services");
    }

    #[test]
    fn test_bucket_arn() {
        assert_eq!(
            bucket_arn("mail-services-simplelogin"),
            "arn:aws:s3:::mail-services-simplelogin"
        );
    }

    #[test]
    fn test_parse_policy_list() {
        let output = r#"{"Policies": [{
            "PolicyName": "mail-services-simplelogin",
            "PolicyId": "ANPAEXAMPLE",
            "Arn": "arn:aws:iam::123456789012:policy/mail-services-simplelogin",
            "Path": "/",
            "DefaultVersionId": "v2",
            "AttachmentCount": 1,
            "IsAttachable": true
        }]}"#;
        let list: PolicyList = serde_json::from_str(output).unwrap();
        assert_eq!(list.policies[0].policy_name, "mail-services-simplelogin");
        assert_eq!(list.policies[0].default_version_id.as_deref(), Some("v2"));
    }

    #[test]
    fn test_parse_policy_version_document() {
        let output = r#"{"PolicyVersion": {
            "Document": {"Version": "2012-10-17", "Statement": [{"Effect": "Allow", "Action": ["s3:*"], "Resource": ["arn:aws:s3:::b/*"]}]},
            "VersionId": "v1",
            "IsDefaultVersion": true,
            "CreateDate": "2024-01-01T00:00:00Z"
        }}"#;
        let version: PolicyVersionEnvelope = serde_json::from_str(output).unwrap();
        let document = version.policy_version.document.unwrap();
        assert_eq!(document["Statement"][0]["Action"][0], "s3:*");
        assert!(version.policy_version.is_default_version);
    }

    #[test]
    fn test_parse_access_key() {
        let output = r#"{"AccessKey": {
            "UserName": "mail-services-simplelogin",
            "AccessKeyId": "AKIAEXAMPLE",
            "Status": "Active",
            "SecretAccessKey": "wJalrXUtnFEMI",
            "CreateDate": "2024-01-01T00:00:00Z"
        }}"#;
        let key: AccessKeyEnvelope = serde_json::from_str(output).unwrap();
        assert_eq!(key.access_key.access_key_id, "AKIAEXAMPLE");
        assert_eq!(key.access_key.secret_access_key, "wJalrXUtnFEMI");
    }

    #[test]
    fn test_parse_attached_policies() {
        let output = r#"{"AttachedPolicies": [{"PolicyName": "p", "PolicyArn": "arn:aws:iam::1:policy/p"}]}"#;
        let list: AttachedPolicyList = serde_json::from_str(output).unwrap();
        assert_eq!(list.attached_policies[0].policy_arn, "arn:aws:iam::1:policy/p");
    }
}
