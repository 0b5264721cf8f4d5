//! hcloud CLI wrapper
//!
//! Wraps the hcloud CLI commands for Hetzner Cloud operations. The token is
//! read by hcloud itself from `HCLOUD_TOKEN` or the active context.

use crate::error::{HetznerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// hcloud CLI wrapper
#[derive(Debug, Default, Clone)]
pub struct Hcloud;

impl Hcloud {
    pub fn new() -> Self {
        Self
    }

    /// Check if hcloud is installed and the token is usable
    pub async fn check_auth(&self) -> Result<String> {
        let which = Command::new("which").arg("hcloud").output().await?;
        if !which.status.success() {
            return Err(HetznerError::HcloudNotFound);
        }

        let output = self.run_command(&["context", "active"], None).await?;
        let context = output.trim();

        // Listing a cheap resource validates the token.
        self.run_command(&["datacenter", "list", "-o", "json"], None)
            .await
            .map_err(|e| HetznerError::AuthenticationFailed(e.to_string()))?;

        Ok(if context.is_empty() {
            "HCLOUD_TOKEN".to_string()
        } else {
            context.to_string()
        })
    }

    /// Run an hcloud command and return stdout
    async fn run_command(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let mut cmd = Command::new("hcloud");
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }

        tracing::debug!("Running: hcloud {}", args.join(" "));

        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HetznerError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn list<T: for<'de> Deserialize<'de>>(&self, resource: &str) -> Result<Vec<T>> {
        let output = self
            .run_command(&[resource, "list", "-o", "json"], None)
            .await?;
        parse_list(&output)
    }

    // ============ SSH keys ============

    pub async fn find_ssh_key(&self, name: &str) -> Result<Option<SshKeyInfo>> {
        let keys: Vec<SshKeyInfo> = self.list("ssh-key").await?;
        Ok(keys.into_iter().find(|k| k.name == name))
    }

    pub async fn create_ssh_key(
        &self,
        name: &str,
        public_key: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<SshKeyInfo> {
        let label_args = label_args(labels);
        let mut args = vec!["ssh-key", "create", "--name", name, "--public-key", public_key];
        args.extend(label_args.iter().map(String::as_str));
        self.run_command(&args, None).await?;

        self.find_ssh_key(name)
            .await?
            .ok_or_else(|| HetznerError::CreationFailed(format!("ssh-key {name}")))
    }

    pub async fn delete_ssh_key(&self, id: &str) -> Result<()> {
        self.run_command(&["ssh-key", "delete", id], None).await?;
        Ok(())
    }

    // ============ Networks ============

    pub async fn find_network(&self, name: &str) -> Result<Option<NetworkInfo>> {
        let networks: Vec<NetworkInfo> = self.list("network").await?;
        Ok(networks.into_iter().find(|n| n.name == name))
    }

    pub async fn find_network_by_id(&self, id: &str) -> Result<Option<NetworkInfo>> {
        let networks: Vec<NetworkInfo> = self.list("network").await?;
        Ok(networks.into_iter().find(|n| n.id.to_string() == id))
    }

    pub async fn create_network(
        &self,
        name: &str,
        ip_range: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<NetworkInfo> {
        let label_args = label_args(labels);
        let mut args = vec!["network", "create", "--name", name, "--ip-range", ip_range];
        args.extend(label_args.iter().map(String::as_str));
        self.run_command(&args, None).await?;

        self.find_network(name)
            .await?
            .ok_or_else(|| HetznerError::CreationFailed(format!("network {name}")))
    }

    pub async fn add_subnet(&self, network_id: &str, ip_range: &str, zone: &str) -> Result<()> {
        self.run_command(
            &[
                "network",
                "add-subnet",
                network_id,
                "--type",
                "cloud",
                "--network-zone",
                zone,
                "--ip-range",
                ip_range,
            ],
            None,
        )
        .await?;
        Ok(())
    }

    // ============ Firewalls ============

    pub async fn find_firewall(&self, name: &str) -> Result<Option<FirewallInfo>> {
        let firewalls: Vec<FirewallInfo> = self.list("firewall").await?;
        Ok(firewalls.into_iter().find(|f| f.name == name))
    }

    pub async fn create_firewall(
        &self,
        name: &str,
        rules: &[HcloudRule],
        labels: &BTreeMap<String, String>,
    ) -> Result<FirewallInfo> {
        let rules_json = serde_json::to_string(rules)?;
        let label_args = label_args(labels);
        let mut args = vec!["firewall", "create", "--name", name, "--rules-file", "-"];
        args.extend(label_args.iter().map(String::as_str));
        self.run_command(&args, Some(&rules_json)).await?;

        self.find_firewall(name)
            .await?
            .ok_or_else(|| HetznerError::CreationFailed(format!("firewall {name}")))
    }

    pub async fn replace_firewall_rules(&self, id: &str, rules: &[HcloudRule]) -> Result<()> {
        let rules_json = serde_json::to_string(rules)?;
        self.run_command(
            &["firewall", "replace-rules", id, "--rules-file", "-"],
            Some(&rules_json),
        )
        .await?;
        Ok(())
    }

    // ============ Primary IPs ============

    pub async fn find_primary_ip(&self, name: &str) -> Result<Option<PrimaryIpInfo>> {
        let ips: Vec<PrimaryIpInfo> = self.list("primary-ip").await?;
        Ok(ips.into_iter().find(|ip| ip.name == name))
    }

    pub async fn create_primary_ip(&self, config: &CreatePrimaryIpConfig) -> Result<PrimaryIpInfo> {
        let label_args = label_args(&config.labels);
        let auto_delete = format!("--auto-delete={}", config.auto_delete);
        let mut args = vec![
            "primary-ip",
            "create",
            "--name",
            config.name.as_str(),
            "--type",
            config.ip_type.as_str(),
            "--datacenter",
            config.datacenter.as_str(),
            auto_delete.as_str(),
        ];
        args.extend(label_args.iter().map(String::as_str));
        self.run_command(&args, None).await?;

        self.find_primary_ip(&config.name)
            .await?
            .ok_or_else(|| HetznerError::CreationFailed(format!("primary-ip {}", config.name)))
    }

    pub async fn set_primary_ip_rdns(&self, id: &str, ip: &str, hostname: &str) -> Result<()> {
        self.run_command(
            &["primary-ip", "set-rdns", id, "--ip", ip, "--hostname", hostname],
            None,
        )
        .await?;
        Ok(())
    }

    // ============ Servers ============

    pub async fn find_server(&self, name: &str) -> Result<Option<ServerInfo>> {
        let servers: Vec<ServerInfo> = self.list("server").await?;
        Ok(servers.into_iter().find(|s| s.name == name))
    }

    /// Create a server; it is attached to the private network afterwards
    /// so the private address can be chosen.
    pub async fn create_server(&self, config: &CreateServerConfig) -> Result<ServerInfo> {
        let label_args = label_args(&config.labels);
        let mut args = vec![
            "server",
            "create",
            "--name",
            config.name.as_str(),
            "--type",
            config.server_type.as_str(),
            "--image",
            config.image.as_str(),
            "--datacenter",
            config.datacenter.as_str(),
            "--ssh-key",
            config.ssh_key_id.as_str(),
            "--firewall",
            config.firewall_id.as_str(),
            "--primary-ipv4",
            config.primary_ipv4_id.as_str(),
            "--primary-ipv6",
            config.primary_ipv6_id.as_str(),
        ];
        args.extend(label_args.iter().map(String::as_str));
        self.run_command(&args, None).await?;

        self.find_server(&config.name)
            .await?
            .ok_or_else(|| HetznerError::CreationFailed(format!("server {}", config.name)))
    }

    pub async fn attach_to_network(&self, server: &str, network_id: &str, ip: &str) -> Result<()> {
        self.run_command(
            &[
                "server",
                "attach-to-network",
                server,
                "--network",
                network_id,
                "--ip",
                ip,
            ],
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn enable_backup(&self, server: &str) -> Result<()> {
        self.run_command(&["server", "enable-backup", server], None)
            .await?;
        Ok(())
    }

    pub async fn enable_protection(&self, server: &str) -> Result<()> {
        self.run_command(
            &["server", "enable-protection", server, "delete", "rebuild"],
            None,
        )
        .await?;
        Ok(())
    }
}

/// `--label k=v` arguments in key order
fn label_args(labels: &BTreeMap<String, String>) -> Vec<String> {
    labels
        .iter()
        .flat_map(|(k, v)| ["--label".to_string(), format!("{k}={v}")])
        .collect()
}

fn parse_list<T: for<'de> Deserialize<'de>>(output: &str) -> Result<Vec<T>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "[]" {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// SSH key information from hcloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeyInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Network information from hcloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: u64,
    pub name: String,
    pub ip_range: String,
    #[serde(default)]
    pub subnets: Vec<SubnetInfo>,
}

impl NetworkInfo {
    pub fn has_subnet(&self, ip_range: &str) -> bool {
        self.subnets.iter().any(|s| s.ip_range == ip_range)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetInfo {
    #[serde(rename = "type")]
    pub subnet_type: String,
    pub ip_range: String,
    pub network_zone: String,
}

/// Firewall information from hcloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<HcloudRule>,
}

/// Firewall rule in the hcloud rules-file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HcloudRule {
    pub direction: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default)]
    pub source_ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Primary IP information from hcloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryIpInfo {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub ip_type: String,
    /// Address, or the assigned /64 network for IPv6
    pub ip: String,
}

/// Configuration for creating a primary IP
#[derive(Debug, Clone)]
pub struct CreatePrimaryIpConfig {
    pub name: String,
    pub ip_type: String,
    pub datacenter: String,
    pub auto_delete: bool,
    pub labels: BTreeMap<String, String>,
}

/// Server information from hcloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub private_net: Vec<PrivateNetInfo>,
}

impl ServerInfo {
    pub fn is_attached_to(&self, network_id: u64) -> bool {
        self.private_net.iter().any(|n| n.network == network_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateNetInfo {
    pub network: u64,
    pub ip: String,
}

/// Configuration for creating a server
#[derive(Debug, Clone)]
pub struct CreateServerConfig {
    pub name: String,
    pub server_type: String,
    pub image: String,
    pub datacenter: String,
    pub ssh_key_id: String,
    pub firewall_id: String,
    pub primary_ipv4_id: String,
    pub primary_ipv6_id: String,
    pub labels: BTreeMap<String, String>,
}
