//! Fixtures shared by the unit tests.

use crate::context::{Providers, StackContext};
use async_trait::async_trait;
use mailstack_cloud::{
    AccessKey, AuthStatus, ComputeProvider, Connection, DatabaseAdmin, DnsProvider, DnsRecord,
    FirewallSpec, IamProvider, Labels, NetworkSpec, ObjectStore, PrimaryIp, PrimaryIpSpec,
    RemoteExecutor, Result, SecretStore, ServerInfo, ServerSpec, StorageAdmin, SubnetSpec,
};
use mailstack_config::{PostgresConnection, Settings};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const SETTINGS: &str = r#"
bucketId: mail-config
backupBucketId: mail-backup
dns:
  project: dns-project
  email: hostmaster@example.com
network:
  name: private
  cidr: 10.10.0.0/16
  subnetCidr: 10.10.1.0/24
server:
  location: fsn1
  type: cx32
  ipv4: 10.10.1.10
mail:
  main:
    name: example.com
    zoneId: example-com
  additional:
    - name: example.org
      zoneId: example-org
      project: other-project
  dkimSignHeaders: [From, To]
simplelogin:
  domain: alias.example.com
  mail:
    domain: relay.example.com
    mx: mail.example.com
  oidc:
    wellKnownUrl: https://id.example.com/.well-known/openid-configuration
    clientId: simplelogin
    clientSecret: s3cr3t
roundcube:
  domain:
    name: webmail.example.com
ntfy:
  domain:
    name: ntfy.example.com
    zoneId: ntfy-zone
database:
  users: [roundcube, simplelogin]
  database:
    roundcube: roundcube
    simplelogin: simplelogin
"#;

pub fn settings() -> Settings {
    Settings::from_yaml(SETTINGS).unwrap()
}

pub fn context() -> StackContext {
    context_in(Path::new("/srv/mail"))
}

pub fn context_in(root: &Path) -> StackContext {
    StackContext::new(
        "prod",
        settings(),
        PostgresConnection {
            address: "db.internal".to_string(),
            port: 5432,
            username: "admin".to_string(),
            password: "admin-pw".to_string(),
        },
        root,
    )
}

/// Provider fake that records every call.
#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<String>>,
    pub fail_secrets: bool,
}

impl Recorder {
    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn providers(recorder: &Arc<Recorder>) -> Providers {
    Providers {
        compute: recorder.clone(),
        dns: recorder.clone(),
        secrets: recorder.clone(),
        objects: recorder.clone(),
        iam: recorder.clone(),
        storage: recorder.clone(),
        database: recorder.clone(),
        remote: recorder.clone(),
    }
}

#[async_trait]
impl ComputeProvider for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("test"))
    }

    async fn ensure_ssh_key(&self, name: &str, _public_key: &str, _labels: &Labels) -> Result<String> {
        self.push(format!("ssh-key {name}"));
        Ok("11".to_string())
    }

    async fn ensure_network(&self, spec: &NetworkSpec) -> Result<String> {
        self.push(format!("network {}", spec.name));
        Ok("22".to_string())
    }

    async fn ensure_subnet(&self, spec: &SubnetSpec) -> Result<()> {
        self.push(format!("subnet {} {}", spec.network_id, spec.cidr));
        Ok(())
    }

    async fn ensure_firewall(&self, spec: &FirewallSpec) -> Result<String> {
        self.push(format!("firewall {}", spec.name));
        Ok("33".to_string())
    }

    async fn ensure_primary_ip(&self, spec: &PrimaryIpSpec) -> Result<PrimaryIp> {
        self.push(format!("primary-ip {}", spec.name));
        let ip = match spec.family {
            mailstack_cloud::IpFamily::V4 => "192.0.2.10",
            mailstack_cloud::IpFamily::V6 => "2001:db8:1::/64",
        };
        Ok(PrimaryIp {
            id: format!("ip-{}", spec.family),
            ip: ip.to_string(),
        })
    }

    async fn set_reverse_dns(&self, _primary_ip_id: &str, ip: &str, hostname: &str) -> Result<()> {
        self.push(format!("rdns {ip} {hostname}"));
        Ok(())
    }

    async fn ensure_server(&self, spec: &ServerSpec) -> Result<ServerInfo> {
        self.push(format!("server {}", spec.name));
        Ok(ServerInfo {
            id: "44".to_string(),
            name: spec.name.clone(),
        })
    }
}

#[async_trait]
impl DnsProvider for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("test"))
    }

    async fn ensure_record(&self, record: &DnsRecord) -> Result<()> {
        self.push(format!(
            "dns {} {} {}",
            record.record_type,
            record.name,
            record.values.join(",")
        ));
        Ok(())
    }
}

#[async_trait]
impl SecretStore for Recorder {
    async fn write(&self, path: &str, key: &str, _data: &serde_json::Value) -> Result<()> {
        if self.fail_secrets {
            return Err(mailstack_cloud::CloudError::ApiError("sealed".to_string()));
        }
        self.push(format!("secret {path}/{key}"));
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for Recorder {
    async fn upload(&self, bucket: &str, path: &str, _content: &[u8]) -> Result<()> {
        self.push(format!("upload gs://{bucket}/{path}"));
        Ok(())
    }
}

#[async_trait]
impl IamProvider for Recorder {
    async fn ensure_service_account(
        &self,
        project: &str,
        account_id: &str,
        _display_name: &str,
    ) -> Result<String> {
        self.push(format!("service-account {account_id}"));
        Ok(format!("{account_id}@{project}.iam.gserviceaccount.com"))
    }

    async fn create_service_account_key(&self, email: &str) -> Result<String> {
        self.push(format!("sa-key {email}"));
        Ok(r#"{"type":"service_account"}"#.to_string())
    }

    async fn add_bucket_binding(&self, bucket: &str, _member: &str, role: &str) -> Result<()> {
        self.push(format!("bucket-binding {bucket} {role}"));
        Ok(())
    }

    async fn add_project_binding(&self, project: &str, _member: &str, role: &str) -> Result<()> {
        self.push(format!("project-binding {project} {role}"));
        Ok(())
    }
}

#[async_trait]
impl StorageAdmin for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("test"))
    }

    async fn ensure_bucket(&self, name: &str, region: &str, _labels: &Labels) -> Result<String> {
        self.push(format!("bucket {name} {region}"));
        Ok(format!("arn:aws:s3:::{name}"))
    }

    async fn ensure_policy(
        &self,
        name: &str,
        document: &serde_json::Value,
        _labels: &Labels,
    ) -> Result<String> {
        let resource = document["Statement"][0]["Resource"][0].as_str().unwrap_or_default();
        self.push(format!("policy {name} {resource}"));
        Ok(format!("arn:aws:iam::123456789012:policy/{name}"))
    }

    async fn ensure_user(&self, name: &str, policy_arn: &str, _labels: &Labels) -> Result<()> {
        self.push(format!("user {name} {policy_arn}"));
        Ok(())
    }

    async fn create_access_key(&self, user: &str) -> Result<AccessKey> {
        self.push(format!("access-key {user}"));
        Ok(AccessKey {
            id: "AKIAEXAMPLE".to_string(),
            secret: "wJalrXUtnFEMI".to_string(),
        })
    }
}

#[async_trait]
impl DatabaseAdmin for Recorder {
    async fn ensure_role(&self, name: &str, _password: &str) -> Result<()> {
        self.push(format!("role {name}"));
        Ok(())
    }

    async fn ensure_database(&self, name: &str, owner: &str) -> Result<()> {
        self.push(format!("database {name} {owner}"));
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for Recorder {
    async fn run_script(&self, conn: &Connection, script: &str) -> Result<String> {
        self.push(format!(
            "run {}@{} {}",
            conn.user,
            conn.host,
            script.lines().next().unwrap_or_default()
        ));
        Ok(String::new())
    }

    async fn copy_file(&self, conn: &Connection, _content: &[u8], remote_path: &str) -> Result<()> {
        self.push(format!("copy {} {remote_path}", conn.host));
        Ok(())
    }
}
