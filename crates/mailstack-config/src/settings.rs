//! Typed stack settings.
//!
//! Every block is required; optional fields are marked as such. Missing keys
//! surface as parse errors before anything is provisioned.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Database users that the services connect as.
pub const REQUIRED_DATABASE_USERS: [&str; 2] = ["roundcube", "simplelogin"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Bucket receiving rendered configuration files and the SSH key.
    pub bucket_id: String,
    /// Bucket receiving service backups.
    pub backup_bucket_id: String,
    pub dns: DnsConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
    pub mail: MailConfig,
    pub simplelogin: SimpleloginConfig,
    pub roundcube: ServiceDomainConfig,
    pub ntfy: ServiceDomainConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    pub name: String,
    pub zone_id: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    /// Default Google Cloud project for DNS zones and service accounts.
    pub project: String,
    /// ACME contact address.
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub name: String,
    pub cidr: String,
    pub subnet_cidr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub location: String,
    #[serde(rename = "type")]
    pub server_type: String,
    /// Private address inside the network.
    pub ipv4: String,
    #[serde(default)]
    pub public_ssh: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    pub main: DomainConfig,
    #[serde(default)]
    pub additional: Vec<DomainConfig>,
    #[serde(default)]
    pub dkim_sign_headers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleloginConfig {
    pub domain: String,
    pub mail: SimpleloginMailConfig,
    pub oidc: OidcConfig,
    #[serde(default)]
    pub s3: S3Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleloginMailConfig {
    pub domain: String,
    pub mx: String,
    pub zone_id: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcConfig {
    pub well_known_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Region of the attachment bucket; the bucket and its user are provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    #[serde(default = "default_s3_region")]
    pub region: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
        }
    }
}

fn default_s3_region() -> String {
    "eu-west-1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDomainConfig {
    pub domain: DomainConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub users: Vec<String>,
    /// Database name → owning user.
    pub database: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Path to the shared-services outputs, relative to the settings file.
    pub outputs_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Falls back to `VAULT_ADDR`.
    pub address: Option<String>,
    #[serde(default = "default_vault_mount")]
    pub mount: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: None,
            mount: default_vault_mount(),
        }
    }
}

fn default_vault_mount() -> String {
    "secret".to_string()
}

impl Settings {
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<()> {
        require("bucketId", &self.bucket_id)?;
        require("backupBucketId", &self.backup_bucket_id)?;
        require("dns.project", &self.dns.project)?;
        require("dns.email", &self.dns.email)?;
        require("network.name", &self.network.name)?;
        validate_cidr("network.cidr", &self.network.cidr)?;
        validate_cidr("network.subnetCidr", &self.network.subnet_cidr)?;
        require("server.location", &self.server.location)?;
        require("server.type", &self.server.server_type)?;
        self.server
            .ipv4
            .parse::<Ipv4Addr>()
            .map_err(|e| ConfigError::invalid("server.ipv4", e.to_string()))?;

        validate_domain("mail.main", &self.mail.main)?;
        for (i, domain) in self.mail.additional.iter().enumerate() {
            validate_domain(&format!("mail.additional[{i}]"), domain)?;
        }
        if self.mail.main.zone_id.is_none() {
            return Err(ConfigError::invalid(
                "mail.main.zoneId",
                "メインドメインには DNS ゾーンが必要です",
            ));
        }

        require("simplelogin.domain", &self.simplelogin.domain)?;
        require("simplelogin.mail.domain", &self.simplelogin.mail.domain)?;
        require("simplelogin.mail.mx", &self.simplelogin.mail.mx)?;
        require("simplelogin.oidc.wellKnownUrl", &self.simplelogin.oidc.well_known_url)?;
        require("simplelogin.oidc.clientId", &self.simplelogin.oidc.client_id)?;
        require("simplelogin.s3.region", &self.simplelogin.s3.region)?;
        validate_domain("roundcube.domain", &self.roundcube.domain)?;
        validate_domain("ntfy.domain", &self.ntfy.domain)?;

        self.validate_database()
    }

    fn validate_database(&self) -> Result<()> {
        for user in REQUIRED_DATABASE_USERS {
            if !self.database.users.iter().any(|u| u == user) {
                return Err(ConfigError::invalid(
                    "database.users",
                    format!("ユーザー '{user}' が定義されていません"),
                ));
            }
            if !self.database.database.contains_key(user) {
                return Err(ConfigError::invalid(
                    "database.database",
                    format!("データベース '{user}' が定義されていません"),
                ));
            }
        }
        for (db, owner) in &self.database.database {
            if !self.database.users.contains(owner) {
                return Err(ConfigError::invalid(
                    format!("database.database.{db}"),
                    format!("所有者 '{owner}' は database.users に含まれていません"),
                ));
            }
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "値が空です"));
    }
    Ok(())
}

fn validate_domain(field: &str, domain: &DomainConfig) -> Result<()> {
    require(&format!("{field}.name"), &domain.name)?;
    if domain.name.ends_with('.') || domain.name.contains(' ') {
        return Err(ConfigError::invalid(
            format!("{field}.name"),
            format!("ドメイン名が不正です: {}", domain.name),
        ));
    }
    Ok(())
}

fn validate_cidr(field: &str, cidr: &str) -> Result<()> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| ConfigError::invalid(field, format!("CIDR 形式ではありません: {cidr}")))?;
    addr.parse::<Ipv4Addr>()
        .map_err(|e| ConfigError::invalid(field, e.to_string()))?;
    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        _ => Err(ConfigError::invalid(
            field,
            format!("プレフィックス長が不正です: {prefix}"),
        )),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
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
  publicSsh: false
mail:
  main:
    name: example.com
    zoneId: example-com
  additional:
    - name: example.org
      zoneId: example-org
      project: other-project
  dkimSignHeaders:
    - From
    - To
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
  users:
    - roundcube
    - simplelogin
  database:
    roundcube: roundcube
    simplelogin: simplelogin
"#;

    pub(crate) fn sample() -> Settings {
        Settings::from_yaml(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let settings = sample();
        assert_eq!(settings.bucket_id, "mail-config");
        assert_eq!(settings.server.server_type, "cx32");
        assert!(!settings.server.public_ssh);
        assert_eq!(settings.mail.additional.len(), 1);
        assert_eq!(settings.mail.dkim_sign_headers, vec!["From", "To"]);
        assert_eq!(settings.simplelogin.s3.region, "eu-west-1");
        assert_eq!(settings.vault.mount, "secret");
        assert!(settings.upstream.outputs_path.is_none());
        settings.validate().unwrap();
    }

    #[test]
    fn test_s3_region_override() {
        let yaml = SAMPLE.replace(
            "    clientSecret: s3cr3t\n",
            "    clientSecret: s3cr3t\n  s3:\n    region: eu-central-1\n",
        );
        let settings = Settings::from_yaml(&yaml).unwrap();
        assert_eq!(settings.simplelogin.s3.region, "eu-central-1");
        settings.validate().unwrap();
    }

    #[test]
    fn test_missing_block_fails_to_parse() {
        let yaml = SAMPLE.replace("ntfy:\n  domain:\n    name: ntfy.example.com\n    zoneId: ntfy-zone\n", "");
        let err = Settings::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("ntfy"));
    }

    #[test]
    fn test_invalid_private_ip() {
        let mut settings = sample();
        settings.server.ipv4 = "10.10.1".to_string();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "server.ipv4"));
    }

    #[test]
    fn test_invalid_cidr() {
        let mut settings = sample();
        settings.network.subnet_cidr = "10.10.1.0/33".to_string();
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref field, .. } if field == "network.subnetCidr")
        );
    }

    #[test]
    fn test_database_owner_must_be_user() {
        let mut settings = sample();
        settings
            .database
            .database
            .insert("analytics".to_string(), "nobody".to_string());
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }

    #[test]
    fn test_service_users_required() {
        let mut settings = sample();
        settings.database.users.retain(|u| u != "simplelogin");
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("simplelogin"));
    }

    #[test]
    fn test_main_zone_required() {
        let mut settings = sample();
        settings.mail.main.zone_id = None;
        assert!(settings.validate().is_err());
    }
}
