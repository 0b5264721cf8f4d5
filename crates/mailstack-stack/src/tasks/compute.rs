use async_trait::async_trait;
use mailstack_cloud::{
    ComputeProvider, FirewallSpec, Labels, NetworkSpec, PrimaryIpSpec, ServerSpec, SubnetSpec,
};
use mailstack_core::{Deps, Inputs, Outputs, Task, TaskId, Value};
use std::sync::Arc;

/// Desired server, with ids that other tasks produce.
#[derive(Debug, Clone)]
pub struct ServerTemplate {
    pub name: String,
    pub server_type: String,
    pub image: String,
    pub datacenter: String,
    pub private_ipv4: String,
    pub public_ssh: bool,
    pub backups: bool,
    pub protection: bool,
    pub labels: Labels,
    pub ssh_key_id: Value,
    pub firewall_id: Value,
    pub network_id: Value,
    pub ipv4_id: Value,
    pub ipv4: Value,
    pub ipv6_id: Value,
    pub ipv6: Value,
}

impl ServerTemplate {
    fn values(&self) -> [&Value; 7] {
        [
            &self.ssh_key_id,
            &self.firewall_id,
            &self.network_id,
            &self.ipv4_id,
            &self.ipv4,
            &self.ipv6_id,
            &self.ipv6,
        ]
    }
}

#[derive(Debug, Clone)]
pub enum ComputeOp {
    SshKey {
        name: String,
        public_key: Value,
        labels: Labels,
    },
    Network(NetworkSpec),
    Subnet {
        network_id: Value,
        cidr: String,
        network_zone: String,
    },
    Firewall(FirewallSpec),
    PrimaryIp(PrimaryIpSpec),
    ReverseDns {
        primary_ip_id: Value,
        ip: Value,
        hostname: String,
    },
    Server(Box<ServerTemplate>),
}

impl ComputeOp {
    fn values(&self) -> Vec<&Value> {
        match self {
            ComputeOp::SshKey { public_key, .. } => vec![public_key],
            ComputeOp::Subnet { network_id, .. } => vec![network_id],
            ComputeOp::ReverseDns {
                primary_ip_id, ip, ..
            } => vec![primary_ip_id, ip],
            ComputeOp::Server(server) => server.values().to_vec(),
            ComputeOp::Network(_) | ComputeOp::Firewall(_) | ComputeOp::PrimaryIp(_) => Vec::new(),
        }
    }
}

/// Converges one compute resource.
pub struct ComputeTask {
    id: TaskId,
    deps: Deps,
    op: ComputeOp,
    provider: Arc<dyn ComputeProvider>,
}

impl ComputeTask {
    pub fn new(id: impl Into<TaskId>, op: ComputeOp, provider: Arc<dyn ComputeProvider>) -> Self {
        Self {
            id: id.into(),
            deps: Deps::new().uses_all(op.values()),
            op,
            provider,
        }
    }

    /// Runs after `tasks` without consuming their outputs.
    pub fn after(mut self, tasks: &[TaskId]) -> Self {
        self.deps = self.deps.after_all(tasks);
        self
    }
}

/// IPv6 host address inside an assigned `/64`.
pub fn ipv6_host(network: &str) -> String {
    let prefix = network.split('/').next().unwrap_or(network);
    format!("{prefix}1")
}

#[async_trait]
impl Task for ComputeTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        match self.op {
            ComputeOp::SshKey { .. } => "hcloud-ssh-key",
            ComputeOp::Network(_) => "hcloud-network",
            ComputeOp::Subnet { .. } => "hcloud-subnet",
            ComputeOp::Firewall(_) => "hcloud-firewall",
            ComputeOp::PrimaryIp(_) => "hcloud-primary-ip",
            ComputeOp::ReverseDns { .. } => "hcloud-rdns",
            ComputeOp::Server(_) => "hcloud-server",
        }
    }

    fn describe(&self) -> String {
        match &self.op {
            ComputeOp::SshKey { name, .. } => format!("SSH key {name}"),
            ComputeOp::Network(spec) => format!("network {} ({})", spec.name, spec.cidr),
            ComputeOp::Subnet { cidr, .. } => format!("subnet {cidr}"),
            ComputeOp::Firewall(spec) => {
                format!("firewall {} ({} rules)", spec.name, spec.rules.len())
            }
            ComputeOp::PrimaryIp(spec) => format!("primary {} {}", spec.family, spec.name),
            ComputeOp::ReverseDns { hostname, .. } => format!("reverse DNS → {hostname}"),
            ComputeOp::Server(server) => {
                format!("server {} ({}, {})", server.name, server.server_type, server.datacenter)
            }
        }
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        let mut triggers = match &self.op {
            ComputeOp::SshKey { name, .. } => vec![name.clone()],
            ComputeOp::Network(spec) => vec![spec.name.clone(), spec.cidr.clone()],
            ComputeOp::Subnet {
                cidr, network_zone, ..
            } => vec![cidr.clone(), network_zone.clone()],
            ComputeOp::Firewall(spec) => {
                let mut t = vec![spec.name.clone()];
                for rule in &spec.rules {
                    t.push(format!(
                        "{}/{}:{}",
                        rule.protocol,
                        rule.port,
                        rule.source_ips.join(",")
                    ));
                }
                t
            }
            ComputeOp::PrimaryIp(spec) => vec![
                spec.name.clone(),
                spec.family.to_string(),
                spec.datacenter.clone(),
            ],
            ComputeOp::ReverseDns { hostname, .. } => vec![hostname.clone()],
            ComputeOp::Server(server) => vec![
                server.name.clone(),
                server.server_type.clone(),
                server.image.clone(),
                server.datacenter.clone(),
                server.private_ipv4.clone(),
                server.public_ssh.to_string(),
            ],
        };
        for value in self.op.values() {
            triggers.push(inputs.resolve(value)?);
        }
        Ok(triggers)
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let provider = &self.provider;
        let outputs = match &self.op {
            ComputeOp::SshKey {
                name,
                public_key,
                labels,
            } => {
                let public_key = inputs.resolve(public_key)?;
                let id = provider.ensure_ssh_key(name, &public_key, labels).await?;
                Outputs::new().with("id", id)
            }
            ComputeOp::Network(spec) => {
                Outputs::new().with("id", provider.ensure_network(spec).await?)
            }
            ComputeOp::Subnet {
                network_id,
                cidr,
                network_zone,
            } => {
                provider
                    .ensure_subnet(&SubnetSpec {
                        network_id: inputs.resolve(network_id)?,
                        cidr: cidr.clone(),
                        network_zone: network_zone.clone(),
                    })
                    .await?;
                Outputs::new().with("cidr", cidr.clone())
            }
            ComputeOp::Firewall(spec) => {
                Outputs::new().with("id", provider.ensure_firewall(spec).await?)
            }
            ComputeOp::PrimaryIp(spec) => {
                let ip = provider.ensure_primary_ip(spec).await?;
                let address = match spec.family {
                    mailstack_cloud::IpFamily::V4 => ip.ip.clone(),
                    mailstack_cloud::IpFamily::V6 => ipv6_host(&ip.ip),
                };
                Outputs::new()
                    .with("id", ip.id)
                    .with("ip", ip.ip)
                    .with("address", address)
            }
            ComputeOp::ReverseDns {
                primary_ip_id,
                ip,
                hostname,
            } => {
                let ip = inputs.resolve(ip)?;
                provider
                    .set_reverse_dns(&inputs.resolve(primary_ip_id)?, &ip, hostname)
                    .await?;
                Outputs::new().with("ptr", hostname.clone())
            }
            ComputeOp::Server(server) => {
                let spec = ServerSpec {
                    name: server.name.clone(),
                    server_type: server.server_type.clone(),
                    image: server.image.clone(),
                    datacenter: server.datacenter.clone(),
                    ssh_key_id: inputs.resolve(&server.ssh_key_id)?,
                    firewall_id: inputs.resolve(&server.firewall_id)?,
                    network_id: inputs.resolve(&server.network_id)?,
                    private_ipv4: server.private_ipv4.clone(),
                    primary_ipv4_id: inputs.resolve(&server.ipv4_id)?,
                    primary_ipv6_id: inputs.resolve(&server.ipv6_id)?,
                    backups: server.backups,
                    protection: server.protection,
                    labels: server.labels.clone(),
                };
                let info = provider.ensure_server(&spec).await?;

                let public_ipv4 = inputs.resolve(&server.ipv4)?;
                let ssh_host = crate::server::ssh_address(
                    server.public_ssh,
                    &public_ipv4,
                    &server.private_ipv4,
                );
                Outputs::new()
                    .with("id", info.id)
                    .with("name", info.name)
                    .with("public_ipv4", public_ipv4)
                    .with("public_ipv6", inputs.resolve(&server.ipv6)?)
                    .with("private_ipv4", server.private_ipv4.clone())
                    .with("ssh_host", ssh_host)
            }
        };
        Ok(outputs)
    }
}
