//! Google Cloud provider implementation

use crate::dns::{CloudDns, ResourceRecordSet};
use crate::error::GcpError;
use crate::gcloud::{Gcloud, service_account_email};
use async_trait::async_trait;
use mailstack_cloud::{AuthStatus, DnsProvider, DnsRecord, IamProvider, ObjectStore};

/// Google Cloud provider (Cloud DNS, IAM, Cloud Storage)
pub struct GcpProvider {
    gcloud: Gcloud,
    dns: CloudDns,
}

impl GcpProvider {
    pub fn new() -> Self {
        let gcloud = Gcloud::new();
        Self {
            dns: CloudDns::new(gcloud.clone()),
            gcloud,
        }
    }
}

impl Default for GcpProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn to_record_set(record: &DnsRecord) -> ResourceRecordSet {
    ResourceRecordSet::new(
        &record.name,
        record.record_type.to_string(),
        record.ttl,
        record.values.clone(),
    )
}

#[async_trait]
impl DnsProvider for GcpProvider {
    fn name(&self) -> &str {
        "gcp"
    }

    async fn check_auth(&self) -> mailstack_cloud::Result<AuthStatus> {
        match self.gcloud.check_auth().await {
            Ok(account) => Ok(AuthStatus::ok(account)),
            Err(GcpError::GcloudNotFound) => {
                Ok(AuthStatus::failed("gcloud がインストールされていません"))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn ensure_record(&self, record: &DnsRecord) -> mailstack_cloud::Result<()> {
        self.dns
            .ensure_record(&record.project, &record.zone, &to_record_set(record))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for GcpProvider {
    async fn upload(&self, bucket: &str, path: &str, content: &[u8]) -> mailstack_cloud::Result<()> {
        self.gcloud.upload(bucket, path, content).await?;
        tracing::info!("Uploaded gs://{}/{}", bucket, path);
        Ok(())
    }
}

#[async_trait]
impl IamProvider for GcpProvider {
    async fn ensure_service_account(
        &self,
        project: &str,
        account_id: &str,
        display_name: &str,
    ) -> mailstack_cloud::Result<String> {
        let email = service_account_email(project, account_id);
        if let Some(existing) = self.gcloud.describe_service_account(project, &email).await? {
            tracing::debug!("Service account already exists: {}", existing.email);
            return Ok(existing.email);
        }

        let created = self
            .gcloud
            .create_service_account(project, account_id, display_name)
            .await?;
        tracing::info!("Created service account: {}", created.email);
        Ok(created.email)
    }

    async fn create_service_account_key(&self, email: &str) -> mailstack_cloud::Result<String> {
        let key = self.gcloud.create_service_account_key(email).await?;
        tracing::info!("Created key for service account {}", email);
        Ok(key)
    }

    async fn add_bucket_binding(
        &self,
        bucket: &str,
        member: &str,
        role: &str,
    ) -> mailstack_cloud::Result<()> {
        self.gcloud.add_bucket_binding(bucket, member, role).await?;
        tracing::info!("Granted {} on gs://{} to {}", role, bucket, member);
        Ok(())
    }

    async fn add_project_binding(
        &self,
        project: &str,
        member: &str,
        role: &str,
    ) -> mailstack_cloud::Result<()> {
        self.gcloud.add_project_binding(project, member, role).await?;
        tracing::info!("Granted {} on project {} to {}", role, project, member);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailstack_cloud::RecordType;

    #[test]
    fn test_to_record_set() {
        let record = DnsRecord {
            name: "dkim._domainkey.example.com".to_string(),
            record_type: RecordType::Txt,
            zone: "example-com".to_string(),
            project: "dns-project".to_string(),
            ttl: 300,
            values: vec!["\"v=DKIM1; k=rsa\"".to_string()],
        };

        let set = to_record_set(&record);
        assert_eq!(set.name, "dkim._domainkey.example.com.");
        assert_eq!(set.record_type, "TXT");
        assert_eq!(set.ttl, 300);
        assert_eq!(set.rrdatas, record.values);
    }
}
