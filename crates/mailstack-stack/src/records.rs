//! DNS record policy.
//!
//! The primary mail domain gets A/AAAA records for the instance; every other
//! name is a CNAME to the mail hostname. Each mail domain also gets the
//! client discovery CNAMEs, and the relay domain carries the DKIM selectors.

use crate::context::mailname;
use mailstack_cloud::RecordType;
use mailstack_config::{DomainConfig, Settings};
use mailstack_core::Value;

pub const RECORD_TTL: u32 = 300;

pub const DISCOVERY_PREFIXES: [&str; 3] = ["autodiscover", "autoconfig", "mta-sts"];

pub const DKIM_SELECTORS: [&str; 3] = ["dkim", "dkim02", "dkim03"];

/// Maximum length of a single TXT character-string we emit.
pub const TXT_CHUNK_LENGTH: usize = 200;

/// A record set to publish; values may still be unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpec {
    pub name: String,
    pub record_type: RecordType,
    pub zone: String,
    pub project: String,
    pub values: Vec<Value>,
}

/// Target, zone and project for a service CNAME.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreDetails {
    /// `mail.<main>.`
    pub target: String,
    pub zone: String,
    pub project: String,
}

pub fn dns_core_details(
    zone_override: Option<&str>,
    project_override: Option<&str>,
    settings: &Settings,
) -> CoreDetails {
    let main = &settings.mail.main;
    CoreDetails {
        target: format!("{}.", mailname(&main.name)),
        zone: zone_override
            .or(main.zone_id.as_deref())
            .unwrap_or_default()
            .to_string(),
        project: project_override
            .or(main.project.as_deref())
            .unwrap_or(&settings.dns.project)
            .to_string(),
    }
}

/// Split a TXT value into quoted chunks of at most 200 characters.
pub fn split_txt(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    let chunks: Vec<String> = chars
        .chunks(TXT_CHUNK_LENGTH)
        .map(|c| c.iter().collect())
        .collect();
    format!("\"{}\"", chunks.join("\" \""))
}

/// TXT record value publishing a DKIM public key (base64 DER).
pub fn dkim_txt(public_key: &str) -> String {
    split_txt(&format!("v=DKIM1; k=rsa; t=s; s=email; p={public_key}"))
}

/// A/AAAA for the mail host plus per-domain CNAMEs.
pub fn mail_records(settings: &Settings, ipv4: Value, ipv6: Value) -> Vec<RecordSpec> {
    let main = &settings.mail.main;
    let details = dns_core_details(None, main.project.as_deref(), settings);
    let host = mailname(&main.name);

    let mut records = vec![
        RecordSpec {
            name: host.clone(),
            record_type: RecordType::A,
            zone: details.zone.clone(),
            project: details.project.clone(),
            values: vec![ipv4],
        },
        RecordSpec {
            name: host,
            record_type: RecordType::Aaaa,
            zone: details.zone,
            project: details.project,
            values: vec![ipv6],
        },
    ];

    records.extend(domain_records(settings, main, true));
    for domain in &settings.mail.additional {
        records.extend(domain_records(settings, domain, false));
    }
    records
}

fn domain_records(settings: &Settings, domain: &DomainConfig, primary: bool) -> Vec<RecordSpec> {
    let details = dns_core_details(
        domain.zone_id.as_deref(),
        domain.project.as_deref(),
        settings,
    );
    let cname = |name: String| RecordSpec {
        name,
        record_type: RecordType::Cname,
        zone: details.zone.clone(),
        project: details.project.clone(),
        values: vec![Value::literal(&details.target)],
    };

    let mut records = Vec::new();
    if !primary {
        records.push(cname(mailname(&domain.name)));
    }
    for prefix in DISCOVERY_PREFIXES {
        records.push(cname(format!("{prefix}.{}", domain.name)));
    }
    records
}

/// CNAME from a service hostname to the mail host.
pub fn service_cname(settings: &Settings, domain: &DomainConfig) -> RecordSpec {
    cname_to_mail(
        settings,
        &domain.name,
        domain.zone_id.as_deref(),
        domain.project.as_deref(),
    )
}

pub fn cname_to_mail(
    settings: &Settings,
    name: &str,
    zone: Option<&str>,
    project: Option<&str>,
) -> RecordSpec {
    let details = dns_core_details(zone, project, settings);
    RecordSpec {
        name: name.to_string(),
        record_type: RecordType::Cname,
        zone: details.zone,
        project: details.project,
        values: vec![Value::literal(details.target)],
    }
}

/// One TXT record per DKIM selector on the relay mail domain.
pub fn dkim_records(settings: &Settings, txt: &Value) -> Vec<RecordSpec> {
    let relay = &settings.simplelogin.mail;
    let details = dns_core_details(relay.zone_id.as_deref(), relay.project.as_deref(), settings);

    DKIM_SELECTORS
        .iter()
        .map(|selector| RecordSpec {
            name: format!("{selector}._domainkey.{}", relay.domain),
            record_type: RecordType::Txt,
            zone: details.zone.clone(),
            project: details.project.clone(),
            values: vec![txt.clone()],
        })
        .collect()
}
