//! mailcow-dockerized: the mail server itself.

use super::publish;
use crate::context::{Providers, StackContext};
use crate::crypto::DEFAULT_PASSWORD_LENGTH;
use crate::install::{Placement, ServiceInstall, ServiceTasks};
use crate::records::mail_records;
use crate::server::Instance;
use crate::source::Source;
use crate::tasks::{GenerateSecrets, SecretWrite};
use mailstack_core::{TaskGraph, TaskId, Value};

pub const POSTFIX_DIR: &str = "/opt/mailcow/data/conf/postfix";

/// Postfix files placed after the install.
pub const POSTFIX_FILES: [&str; 3] = ["body_checks.pcre", "client_headers.pcre", "extra.cf"];

pub struct Mailcow {
    pub tasks: ServiceTasks,
    /// Read-write API key, handed to the Roundcube password plugin.
    pub api_read_write: Value,
}

pub fn add(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
    instance: &Instance,
    after: &[TaskId],
) -> anyhow::Result<Mailcow> {
    let settings = &ctx.settings;

    let secrets = graph.add(GenerateSecrets::new(
        "mailcow:secrets",
        [
            ("db_user", DEFAULT_PASSWORD_LENGTH),
            ("db_root", DEFAULT_PASSWORD_LENGTH),
            ("redis", DEFAULT_PASSWORD_LENGTH),
            ("api_read_write", DEFAULT_PASSWORD_LENGTH),
            ("api_read", DEFAULT_PASSWORD_LENGTH),
        ],
    ))?;
    let secret = |key: &str| Value::output(&secrets, key);

    graph.add(SecretWrite::new(
        "mailcow-api",
        [
            ("read_write", secret("api_read_write")),
            ("read", secret("api_read")),
        ],
        providers.secrets.clone(),
    ))?;

    let config = Source::template(
        ctx.asset("mailcow", "config/mailcow.conf.j2"),
        [
            ("mailname", Value::literal(ctx.mailname())),
            ("db.auth.user", secret("db_user")),
            ("db.auth.root", secret("db_root")),
            ("redis.password", secret("redis")),
            ("api.readWrite", secret("api_read_write")),
            ("api.read", secret("api_read")),
            ("ip.v4", instance.public_ipv4()),
            ("ip.v6", instance.public_ipv6()),
            ("acme.email", Value::literal(settings.dns.email.clone())),
        ],
    );

    let mut install = ServiceInstall::new("mailcow", ctx, providers, &instance.remote)
        .after(after)
        .compose_override([
            ("mailname", Value::literal(ctx.mailname())),
            ("apiKey", secret("api_read")),
        ])
        .config(Placement::new("mailcow.conf", config, "/opt/mailcow/mailcow.conf").mirrored())
        .cron()
        .systemd()
        .install_uploaded([
            ("bucket.id", Value::literal(settings.backup_bucket_id.clone())),
            ("bucket.path", Value::literal(ctx.bucket_path())),
            (
                "dkimSignHeaders",
                Value::literal(settings.mail.dkim_sign_headers.join(":")),
            ),
        ]);
    for file in POSTFIX_FILES {
        install = install.postinstall_file(Placement::new(
            file,
            Source::Asset(ctx.asset("mailcow", &format!("config/{file}"))),
            format!("{POSTFIX_DIR}/{file}"),
        ));
    }
    let tasks = install.build(graph)?;

    publish(
        graph,
        mail_records(settings, instance.public_ipv4(), instance.public_ipv6()),
        &providers.dns,
    )?;

    Ok(Mailcow {
        tasks,
        api_read_write: secret("api_read_write"),
    })
}
