//! gcloud CLI wrapper
//!
//! Used for everything that is not Cloud DNS: access tokens, service
//! accounts and their keys, IAM bindings and object uploads.

use crate::error::{GcpError, Result};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// gcloud CLI wrapper
#[derive(Debug, Default, Clone)]
pub struct Gcloud;

impl Gcloud {
    pub fn new() -> Self {
        Self
    }

    /// Check if gcloud is installed and an account is active
    pub async fn check_auth(&self) -> Result<String> {
        let which = Command::new("which").arg("gcloud").output().await?;
        if !which.status.success() {
            return Err(GcpError::GcloudNotFound);
        }

        let account = self
            .run_command(&["config", "get-value", "account"], None)
            .await?;
        let account = account.trim();
        if account.is_empty() || account == "(unset)" {
            return Err(GcpError::AuthenticationFailed(
                "no active account; run `gcloud auth login`".to_string(),
            ));
        }
        Ok(account.to_string())
    }

    /// Run a gcloud command and return stdout
    async fn run_command(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<String> {
        let mut cmd = Command::new("gcloud");
        cmd.args(args);
        cmd.arg("--quiet");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }

        tracing::debug!("Running: gcloud {}", args.join(" "));

        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GcpError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// OAuth access token of the active account
    pub async fn access_token(&self) -> Result<String> {
        let token = self
            .run_command(&["auth", "print-access-token"], None)
            .await
            .map_err(|e| GcpError::AuthenticationFailed(e.to_string()))?;
        Ok(token.trim().to_string())
    }

    // ============ Service accounts ============

    pub async fn describe_service_account(
        &self,
        project: &str,
        email: &str,
    ) -> Result<Option<ServiceAccountInfo>> {
        match self
            .run_command(
                &[
                    "iam",
                    "service-accounts",
                    "describe",
                    email,
                    "--project",
                    project,
                    "--format",
                    "json",
                ],
                None,
            )
            .await
        {
            Ok(output) => Ok(Some(serde_json::from_str(&output)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_service_account(
        &self,
        project: &str,
        account_id: &str,
        display_name: &str,
    ) -> Result<ServiceAccountInfo> {
        let output = self
            .run_command(
                &[
                    "iam",
                    "service-accounts",
                    "create",
                    account_id,
                    "--project",
                    project,
                    "--display-name",
                    display_name,
                    "--format",
                    "json",
                ],
                None,
            )
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Create a key; the credentials JSON is written to stdout
    pub async fn create_service_account_key(&self, email: &str) -> Result<String> {
        self.run_command(
            &[
                "iam",
                "service-accounts",
                "keys",
                "create",
                "-",
                "--iam-account",
                email,
            ],
            None,
        )
        .await
    }

    // ============ IAM bindings ============

    pub async fn add_bucket_binding(&self, bucket: &str, member: &str, role: &str) -> Result<()> {
        let bucket_url = format!("gs://{bucket}");
        let member_arg = format!("--member={member}");
        let role_arg = format!("--role={role}");
        self.run_command(
            &[
                "storage",
                "buckets",
                "add-iam-policy-binding",
                &bucket_url,
                &member_arg,
                &role_arg,
            ],
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn add_project_binding(&self, project: &str, member: &str, role: &str) -> Result<()> {
        let member_arg = format!("--member={member}");
        let role_arg = format!("--role={role}");
        self.run_command(
            &[
                "projects",
                "add-iam-policy-binding",
                project,
                &member_arg,
                &role_arg,
                "--condition=None",
            ],
            None,
        )
        .await?;
        Ok(())
    }

    // ============ Storage ============

    /// Upload `content` to `gs://<bucket>/<path>`
    pub async fn upload(&self, bucket: &str, path: &str, content: &[u8]) -> Result<()> {
        let target = object_url(bucket, path);
        self.run_command(&["storage", "cp", "-", &target], Some(content))
            .await?;
        Ok(())
    }
}

fn object_url(bucket: &str, path: &str) -> String {
    format!("gs://{}/{}", bucket, path.trim_start_matches('/'))
}

/// Service account email for an account id in a project
pub fn service_account_email(project: &str, account_id: &str) -> String {
    format!("{account_id}@{project}.iam.gserviceaccount.com")
}

/// Service account as returned by `gcloud iam service-accounts`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountInfo {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_account_email() {
        assert_eq!(
            service_account_email("dns-project", "mail-services-prod"),
            "mail-services-prod@dns-project.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_object_url() {
        assert_eq!(
            object_url("bucket", "/mail-services/prod/ssh.key"),
            "gs://bucket/mail-services/prod/ssh.key"
        );
        assert_eq!(object_url("bucket", "a/b"), "gs://bucket/a/b");
    }

    #[test]
    fn test_parse_service_account() {
        let info: ServiceAccountInfo = serde_json::from_str(
            r#"{"email": "sa@p.iam.gserviceaccount.com", "displayName": "Mail", "uniqueId": "1"}"#,
        )
        .unwrap();
        assert_eq!(info.display_name.as_deref(), Some("Mail"));
    }
}
