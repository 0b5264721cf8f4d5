//! Google Cloud DNS API client
//!
//! Direct REST implementation for record-set management. The bearer token
//! comes from `gcloud auth print-access-token` and is fetched once per
//! client.

use crate::error::{GcpError, Result};
use crate::gcloud::Gcloud;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

const CLOUD_DNS_API_BASE: &str = "https://dns.googleapis.com/dns/v1";

/// Cloud DNS manager
pub struct CloudDns {
    client: reqwest::Client,
    gcloud: Gcloud,
    token: OnceCell<String>,
    base_url: String,
}

impl CloudDns {
    pub fn new(gcloud: Gcloud) -> Self {
        Self {
            client: reqwest::Client::new(),
            gcloud,
            token: OnceCell::new(),
            base_url: CLOUD_DNS_API_BASE.to_string(),
        }
    }

    async fn token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| self.gcloud.access_token())
            .await?;
        Ok(token.as_str())
    }

    fn rrsets_url(&self, project: &str, zone: &str) -> String {
        format!(
            "{}/projects/{}/managedZones/{}/rrsets",
            self.base_url, project, zone
        )
    }

    /// Find a record set by name and type
    pub async fn find_record(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<ResourceRecordSet>> {
        let url = self.rrsets_url(project, zone);
        let fqdn = fqdn(name);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token().await?)
            .query(&[("name", fqdn.as_str()), ("type", record_type)])
            .send()
            .await?;

        let list: ListResponse = parse_response(response).await?;
        Ok(list.rrsets.into_iter().next())
    }

    pub async fn create_record(
        &self,
        project: &str,
        zone: &str,
        record: &ResourceRecordSet,
    ) -> Result<ResourceRecordSet> {
        let url = self.rrsets_url(project, zone);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token().await?)
            .json(record)
            .send()
            .await?;

        parse_response(response).await
    }

    pub async fn update_record(
        &self,
        project: &str,
        zone: &str,
        record: &ResourceRecordSet,
    ) -> Result<ResourceRecordSet> {
        let url = format!(
            "{}/{}/{}",
            self.rrsets_url(project, zone),
            record.name,
            record.record_type
        );

        let response = self
            .client
            .patch(&url)
            .bearer_auth(self.token().await?)
            .json(record)
            .send()
            .await?;

        parse_response(response).await
    }

    /// Ensure a record set exists with exactly the given data (create or update)
    pub async fn ensure_record(
        &self,
        project: &str,
        zone: &str,
        desired: &ResourceRecordSet,
    ) -> Result<ResourceRecordSet> {
        if let Some(existing) = self
            .find_record(project, zone, &desired.name, &desired.record_type)
            .await?
        {
            if existing.same_data(desired) {
                tracing::debug!("DNS record already up to date: {}", existing.name);
                return Ok(existing);
            }
            tracing::info!(
                "Updating DNS record {} {} from {:?} to {:?}",
                existing.record_type,
                existing.name,
                existing.rrdatas,
                desired.rrdatas
            );
            return self.update_record(project, zone, desired).await;
        }

        tracing::info!(
            "Creating DNS record: {} {} -> {:?}",
            desired.record_type,
            desired.name,
            desired.rrdatas
        );
        self.create_record(project, zone, desired).await
    }
}

async fn parse_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(GcpError::ApiError {
            code: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

/// Record names are absolute in Cloud DNS.
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

// ============ API Types ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u32,
    #[serde(default)]
    pub rrdatas: Vec<String>,
}

impl ResourceRecordSet {
    pub fn new(name: &str, record_type: impl Into<String>, ttl: u32, rrdatas: Vec<String>) -> Self {
        Self {
            name: fqdn(name),
            record_type: record_type.into(),
            ttl,
            rrdatas,
        }
    }

    fn same_data(&self, other: &ResourceRecordSet) -> bool {
        self.ttl == other.ttl && self.rrdatas == other.rrdatas
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    rrsets: Vec<ResourceRecordSet>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[allow(dead_code)]
    code: u16,
    message: String,
}
