//! Hetzner Cloud provider implementation

use crate::error::HetznerError;
use crate::hcloud::{CreatePrimaryIpConfig, CreateServerConfig, Hcloud, HcloudRule};
use async_trait::async_trait;
use mailstack_cloud::{
    AuthStatus, ComputeProvider, FirewallRule, FirewallSpec, Labels, NetworkSpec, PrimaryIp,
    PrimaryIpSpec, ServerInfo, ServerSpec, SubnetSpec,
};

/// Hetzner Cloud provider
#[derive(Debug, Default, Clone)]
pub struct HetznerProvider {
    hcloud: Hcloud,
}

impl HetznerProvider {
    pub fn new() -> Self {
        Self {
            hcloud: Hcloud::new(),
        }
    }
}

fn to_hcloud_rules(rules: &[FirewallRule]) -> Vec<HcloudRule> {
    rules
        .iter()
        .map(|r| HcloudRule {
            direction: "in".to_string(),
            protocol: r.protocol.clone(),
            port: Some(r.port.to_string()),
            source_ips: r.source_ips.clone(),
            description: Some(r.description.clone()),
        })
        .collect()
}

#[async_trait]
impl ComputeProvider for HetznerProvider {
    fn name(&self) -> &str {
        "hetzner"
    }

    async fn check_auth(&self) -> mailstack_cloud::Result<AuthStatus> {
        match self.hcloud.check_auth().await {
            Ok(context) => Ok(AuthStatus::ok(context)),
            Err(HetznerError::HcloudNotFound) => {
                Ok(AuthStatus::failed("hcloud がインストールされていません"))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn ensure_ssh_key(
        &self,
        name: &str,
        public_key: &str,
        labels: &Labels,
    ) -> mailstack_cloud::Result<String> {
        if let Some(existing) = self.hcloud.find_ssh_key(name).await? {
            let same = existing
                .public_key
                .as_deref()
                .is_some_and(|k| k.trim() == public_key.trim());
            if same {
                tracing::debug!(name, id = existing.id, "SSH key already registered");
                return Ok(existing.id.to_string());
            }
            tracing::info!(name, "Replacing SSH key with a different public key");
            self.hcloud.delete_ssh_key(&existing.id.to_string()).await?;
        }

        let key = self.hcloud.create_ssh_key(name, public_key, labels).await?;
        tracing::info!(name, id = key.id, "Registered SSH key");
        Ok(key.id.to_string())
    }

    async fn ensure_network(&self, spec: &NetworkSpec) -> mailstack_cloud::Result<String> {
        if let Some(network) = self.hcloud.find_network(&spec.name).await? {
            tracing::debug!(name = %spec.name, id = network.id, "Reusing existing network");
            return Ok(network.id.to_string());
        }

        let network = self
            .hcloud
            .create_network(&spec.name, &spec.cidr, &spec.labels)
            .await?;
        tracing::info!(name = %spec.name, id = network.id, "Created network");
        Ok(network.id.to_string())
    }

    async fn ensure_subnet(&self, spec: &SubnetSpec) -> mailstack_cloud::Result<()> {
        let network = self.hcloud.find_network_by_id(&spec.network_id).await?;
        if network.is_some_and(|n| n.has_subnet(&spec.cidr)) {
            tracing::debug!(cidr = %spec.cidr, "Subnet already present");
            return Ok(());
        }

        self.hcloud
            .add_subnet(&spec.network_id, &spec.cidr, &spec.network_zone)
            .await?;
        tracing::info!(cidr = %spec.cidr, "Added subnet");
        Ok(())
    }

    async fn ensure_firewall(&self, spec: &FirewallSpec) -> mailstack_cloud::Result<String> {
        let rules = to_hcloud_rules(&spec.rules);

        if let Some(firewall) = self.hcloud.find_firewall(&spec.name).await? {
            if firewall.rules != rules {
                self.hcloud
                    .replace_firewall_rules(&firewall.id.to_string(), &rules)
                    .await?;
                tracing::info!(name = %spec.name, "Replaced firewall rules");
            }
            return Ok(firewall.id.to_string());
        }

        let firewall = self
            .hcloud
            .create_firewall(&spec.name, &rules, &spec.labels)
            .await?;
        tracing::info!(name = %spec.name, id = firewall.id, "Created firewall");
        Ok(firewall.id.to_string())
    }

    async fn ensure_primary_ip(&self, spec: &PrimaryIpSpec) -> mailstack_cloud::Result<PrimaryIp> {
        let ip = match self.hcloud.find_primary_ip(&spec.name).await? {
            Some(ip) => ip,
            None => {
                let created = self
                    .hcloud
                    .create_primary_ip(&CreatePrimaryIpConfig {
                        name: spec.name.clone(),
                        ip_type: spec.family.to_string(),
                        datacenter: spec.datacenter.clone(),
                        auto_delete: spec.auto_delete,
                        labels: spec.labels.clone(),
                    })
                    .await?;
                tracing::info!(name = %spec.name, ip = %created.ip, "Created primary IP");
                created
            }
        };

        Ok(PrimaryIp {
            id: ip.id.to_string(),
            ip: ip.ip,
        })
    }

    async fn set_reverse_dns(
        &self,
        primary_ip_id: &str,
        ip: &str,
        hostname: &str,
    ) -> mailstack_cloud::Result<()> {
        self.hcloud
            .set_primary_ip_rdns(primary_ip_id, ip, hostname)
            .await?;
        tracing::info!(ip, hostname, "Set reverse DNS");
        Ok(())
    }

    async fn ensure_server(&self, spec: &ServerSpec) -> mailstack_cloud::Result<ServerInfo> {
        let server = match self.hcloud.find_server(&spec.name).await? {
            Some(server) => {
                tracing::debug!(name = %spec.name, id = server.id, "Server already exists");
                server
            }
            None => {
                let created = self
                    .hcloud
                    .create_server(&CreateServerConfig {
                        name: spec.name.clone(),
                        server_type: spec.server_type.clone(),
                        image: spec.image.clone(),
                        datacenter: spec.datacenter.clone(),
                        ssh_key_id: spec.ssh_key_id.clone(),
                        firewall_id: spec.firewall_id.clone(),
                        primary_ipv4_id: spec.primary_ipv4_id.clone(),
                        primary_ipv6_id: spec.primary_ipv6_id.clone(),
                        labels: spec.labels.clone(),
                    })
                    .await?;
                tracing::info!(name = %spec.name, id = created.id, "Created server");

                if spec.backups {
                    self.hcloud.enable_backup(&spec.name).await?;
                }
                if spec.protection {
                    self.hcloud.enable_protection(&spec.name).await?;
                }
                created
            }
        };

        let network_id: u64 = spec.network_id.parse().map_err(|_| {
            mailstack_cloud::CloudError::InvalidConfig(format!(
                "network id is not numeric: {}",
                spec.network_id
            ))
        })?;
        if !server.is_attached_to(network_id) {
            self.hcloud
                .attach_to_network(&spec.name, &spec.network_id, &spec.private_ipv4)
                .await?;
            tracing::info!(name = %spec.name, ip = %spec.private_ipv4, "Attached server to network");
        }

        Ok(ServerInfo {
            id: server.id.to_string(),
            name: server.name,
        })
    }
}
