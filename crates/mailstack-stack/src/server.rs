//! Compute instance: SSH key, network, firewall, primary IPs, reverse DNS
//! and the server itself.

use crate::context::{Providers, StackContext};
use crate::tasks::{ComputeOp, ComputeTask, Remote, RsaKeyTask, ServerTemplate};
use mailstack_cloud::{FirewallRule, FirewallSpec, IpFamily, NetworkSpec, PrimaryIpSpec};
use mailstack_cloud_hetzner::{NETWORK_ZONE, to_datacenter};
use mailstack_config::Settings;
use mailstack_core::{TaskGraph, TaskId, Value};

pub const SSH_KEY_BITS: usize = 4096;
pub const SERVER_IMAGE: &str = "ubuntu-24.04";

const ANYWHERE: [&str; 2] = ["0.0.0.0/0", "::/0"];

/// Address used for every remote operation.
pub fn ssh_address(public_ssh: bool, public_ipv4: &str, private_ipv4: &str) -> String {
    if public_ssh {
        public_ipv4.to_string()
    } else {
        private_ipv4.to_string()
    }
}

pub fn firewall_rules(settings: &Settings) -> Vec<FirewallRule> {
    let anywhere = || ANYWHERE.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let ssh_sources = if settings.server.public_ssh {
        anywhere()
    } else {
        vec![settings.network.subnet_cidr.clone()]
    };

    vec![
        FirewallRule::tcp_in(22, ssh_sources, "Allow incoming SSH traffic"),
        FirewallRule::tcp_in(9099, anywhere(), "Allow incoming Prometheus traffic (Mailcow)"),
        FirewallRule::tcp_in(25, anywhere(), "Allow incoming mail traffic (SMTP)"),
        FirewallRule::tcp_in(465, anywhere(), "Allow incoming mail traffic (SMTPS)"),
        FirewallRule::tcp_in(993, anywhere(), "Allow incoming mail traffic (IMAPS)"),
        FirewallRule::tcp_in(4190, anywhere(), "Allow incoming mail traffic (Sieve)"),
        FirewallRule::tcp_in(80, anywhere(), "Allow incoming web traffic (HTTP)"),
        FirewallRule::tcp_in(443, anywhere(), "Allow incoming web traffic (HTTPS)"),
    ]
}

/// Task ids of the provisioned instance.
#[derive(Clone)]
pub struct Instance {
    pub ssh_key: TaskId,
    pub server: TaskId,
    pub remote: Remote,
}

impl Instance {
    pub fn public_ipv4(&self) -> Value {
        Value::output(&self.server, "public_ipv4")
    }

    pub fn public_ipv6(&self) -> Value {
        Value::output(&self.server, "public_ipv6")
    }

    pub fn private_key(&self) -> Value {
        Value::output(&self.ssh_key, "private_key")
    }
}

pub fn add_instance(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
) -> anyhow::Result<Instance> {
    let settings = &ctx.settings;
    let compute = &providers.compute;
    let name = ctx.resource_name();
    let labels = ctx.labels();
    let datacenter = to_datacenter(&settings.server.location).to_string();

    let ssh_key = graph.add(RsaKeyTask::ssh("ssh:key", SSH_KEY_BITS))?;
    let hcloud_key = graph.add(ComputeTask::new(
        "hetzner:ssh-key",
        ComputeOp::SshKey {
            name: name.clone(),
            public_key: Value::output(&ssh_key, "public_key_openssh"),
            labels: labels.clone(),
        },
        compute.clone(),
    ))?;

    let network = graph.add(ComputeTask::new(
        "hetzner:network",
        ComputeOp::Network(NetworkSpec {
            name: settings.network.name.clone(),
            cidr: settings.network.cidr.clone(),
            labels: labels.clone(),
        }),
        compute.clone(),
    ))?;
    let network_id = Value::output(&network, "id");
    let subnet = graph.add(ComputeTask::new(
        "hetzner:subnet",
        ComputeOp::Subnet {
            network_id: network_id.clone(),
            cidr: settings.network.subnet_cidr.clone(),
            network_zone: NETWORK_ZONE.to_string(),
        },
        compute.clone(),
    ))?;

    let firewall = graph.add(ComputeTask::new(
        "hetzner:firewall",
        ComputeOp::Firewall(FirewallSpec {
            name: name.clone(),
            rules: firewall_rules(settings),
            labels: labels.clone(),
        }),
        compute.clone(),
    ))?;

    let mut primary_ips = Vec::with_capacity(2);
    // Subnet and reverse DNS have no output the server reads.
    let mut settle_first = vec![subnet];
    for family in [IpFamily::V4, IpFamily::V6] {
        let ip = graph.add(ComputeTask::new(
            format!("hetzner:primary-{family}"),
            ComputeOp::PrimaryIp(PrimaryIpSpec {
                name: format!("{name}-{family}"),
                family,
                datacenter: datacenter.clone(),
                auto_delete: false,
                labels: labels.clone(),
            }),
            compute.clone(),
        ))?;
        let rdns = graph.add(ComputeTask::new(
            format!("hetzner:rdns-{family}"),
            ComputeOp::ReverseDns {
                primary_ip_id: Value::output(&ip, "id"),
                ip: Value::output(&ip, "address"),
                hostname: ctx.mailname(),
            },
            compute.clone(),
        ))?;
        primary_ips.push(ip);
        settle_first.push(rdns);
    }
    let (ipv4, ipv6) = (&primary_ips[0], &primary_ips[1]);

    let server = graph.add(ComputeTask::new(
        "hetzner:server",
        ComputeOp::Server(Box::new(ServerTemplate {
            name: ctx.server_name(),
            server_type: settings.server.server_type.clone(),
            image: SERVER_IMAGE.to_string(),
            datacenter,
            private_ipv4: settings.server.ipv4.clone(),
            public_ssh: settings.server.public_ssh,
            backups: true,
            protection: true,
            labels,
            ssh_key_id: Value::output(&hcloud_key, "id"),
            firewall_id: Value::output(&firewall, "id"),
            network_id,
            ipv4_id: Value::output(ipv4, "id"),
            ipv4: Value::output(ipv4, "address"),
            ipv6_id: Value::output(ipv6, "id"),
            ipv6: Value::output(ipv6, "address"),
        })),
        compute.clone(),
    )
    .after(&settle_first))?;

    let remote = Remote {
        host: Value::output(&server, "ssh_host"),
        private_key: Value::output(&ssh_key, "private_key"),
        executor: providers.remote.clone(),
    };

    Ok(Instance {
        ssh_key,
        server,
        remote,
    })
}
