//! SimpleLogin alias service with its own DKIM key on the relay domain.

use super::publish;
use crate::context::{GLOBAL_NAME, Providers, StackContext};
use crate::database::Database;
use crate::install::{Placement, ServiceInstall, ServiceTasks};
use crate::records::{cname_to_mail, dkim_records};
use crate::server::Instance;
use crate::source::Source;
use crate::tasks::{FileTask, GenerateSecrets, RsaKeyTask, SecretWrite, StorageOp, StorageTask};
use mailstack_core::{TaskGraph, TaskId, Value};

pub const DKIM_KEY_BITS: usize = 2048;
pub const FLASK_SECRET_LENGTH: usize = 32;

/// Database user and database of the service.
pub const DATABASE: &str = "simplelogin";

/// Attachment storage: S3 bucket and the IAM user SimpleLogin signs with.
pub struct Storage {
    pub bucket: TaskId,
    pub access_key: TaskId,
}

/// `mail-services-simplelogin`, shared by the bucket, policy and user.
pub fn storage_name() -> String {
    format!("{GLOBAL_NAME}-simplelogin")
}

pub fn add_storage(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
) -> anyhow::Result<Storage> {
    let name = storage_name();
    let labels = ctx.labels();
    let storage = &providers.storage;

    let bucket = graph.add(StorageTask::new(
        "simplelogin:bucket",
        StorageOp::Bucket {
            name: name.clone(),
            region: ctx.settings.simplelogin.s3.region.clone(),
            labels: labels.clone(),
        },
        storage.clone(),
    ))?;
    let policy = graph.add(StorageTask::new(
        "simplelogin:policy",
        StorageOp::BucketPolicy {
            name: name.clone(),
            bucket_arn: Value::output(&bucket, "arn"),
            labels: labels.clone(),
        },
        storage.clone(),
    ))?;
    let user = graph.add(StorageTask::new(
        "simplelogin:user",
        StorageOp::User {
            name,
            policy_arn: Value::output(&policy, "arn"),
            labels,
        },
        storage.clone(),
    ))?;
    let access_key = graph.add(StorageTask::new(
        "simplelogin:access-key",
        StorageOp::AccessKey {
            user: Value::output(&user, "name"),
        },
        storage.clone(),
    ))?;

    Ok(Storage { bucket, access_key })
}

pub struct Simplelogin {
    pub tasks: ServiceTasks,
    pub dkim: TaskId,
}

pub fn add(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
    instance: &Instance,
    database: &Database,
    after: &[TaskId],
) -> anyhow::Result<Simplelogin> {
    let settings = &ctx.settings;
    let config = &settings.simplelogin;
    let user = database.user(DATABASE)?;

    let storage = add_storage(graph, ctx, providers)?;
    let dkim = graph.add(RsaKeyTask::dkim("simplelogin:dkim", DKIM_KEY_BITS))?;
    graph.add(SecretWrite::new(
        "simplelogin-dkim",
        [
            ("private_key", Value::output(&dkim, "private_key")),
            ("public_key", Value::output(&dkim, "public_key_pem")),
        ],
        providers.secrets.clone(),
    ))?;
    let secrets = graph.add(GenerateSecrets::new(
        "simplelogin:secrets",
        [("flask_secret", FLASK_SECRET_LENGTH)],
    ))?;

    let dkim_key = FileTask::new(
        "simplelogin:dkim-key",
        Source::Output(Value::output(&dkim, "private_key")),
    )
    .local_private(ctx.outputs_dir.join("simplelogin_dkim.key"))
    .remote(&instance.remote, "/opt/simplelogin/dkim.key");

    let env = Source::template(
        ctx.asset("simplelogin", "env.j2"),
        [
            ("flaskSecret", Value::output(&secrets, "flask_secret")),
            ("db.host", Value::literal(ctx.postgres.address.clone())),
            ("db.port", Value::literal(ctx.postgres.port.to_string())),
            ("db.database", Value::literal(DATABASE)),
            ("db.user", Value::literal(DATABASE)),
            ("db.password", user.password.clone()),
            ("aws.bucket", Value::output(&storage.bucket, "name")),
            ("aws.region", Value::output(&storage.bucket, "region")),
            ("aws.accessKeyId", Value::output(&storage.access_key, "access_key_id")),
            (
                "aws.secretAccessKey",
                Value::output(&storage.access_key, "secret_access_key"),
            ),
            ("oidc.wellKnownUrl", Value::literal(config.oidc.well_known_url.clone())),
            ("oidc.clientId", Value::literal(config.oidc.client_id.clone())),
            ("oidc.clientSecret", Value::literal(config.oidc.client_secret.clone())),
            ("domain", Value::literal(config.domain.clone())),
            ("email.domain", Value::literal(config.mail.domain.clone())),
            ("email.mx", Value::literal(config.mail.mx.clone())),
            ("email.relay", Value::literal(settings.server.ipv4.clone())),
        ],
    );

    let mut after = after.to_vec();
    after.extend(database.ready(DATABASE, DATABASE));

    let tasks = ServiceInstall::new("simplelogin", ctx, providers, &instance.remote)
        .after(&after)
        .compose("app", [("domain", Value::literal(config.domain.clone()))])
        .file(dkim_key)
        .config(Placement::new("env", env, "/opt/simplelogin/env").mirrored())
        .systemd()
        .config(Placement::new(
            "init.sh",
            Source::Asset(ctx.asset("simplelogin", "init.sh")),
            "/opt/simplelogin/init.sh",
        ))
        .install_template([])
        .build(graph)?;

    let mut records = vec![cname_to_mail(
        settings,
        &config.domain,
        config.mail.zone_id.as_deref(),
        config.mail.project.as_deref(),
    )];
    records.extend(dkim_records(settings, &Value::output(&dkim, "dkim_record")));
    publish(graph, records, &providers.dns)?;

    Ok(Simplelogin { tasks, dkim })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::add_database;
    use crate::server::add_instance;
    use crate::testing::{Recorder, context, providers};
    use mailstack_core::Task;
    use std::sync::Arc;

    #[test]
    fn test_install_waits_for_database() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let mut graph = TaskGraph::new();
        let instance = add_instance(&mut graph, &ctx, &providers).unwrap();
        let database = add_database(&mut graph, &ctx, &providers).unwrap();

        let simplelogin = add(&mut graph, &ctx, &providers, &instance, &database, &[]).unwrap();

        let prepare = graph.get(&TaskId::new("simplelogin:prepare")).unwrap();
        assert!(
            prepare
                .dependencies()
                .contains(&TaskId::new("postgresql:database:simplelogin"))
        );
        let install = graph.get(&simplelogin.tasks.install).unwrap();
        for dep in [
            "simplelogin:dkim-key",
            "simplelogin:config:env",
            "simplelogin:config:init.sh",
            "simplelogin:compose",
            "simplelogin:systemd",
        ] {
            assert!(install.dependencies().contains(&TaskId::new(dep)), "{dep}");
        }
        graph.validate().unwrap();
    }

    #[test]
    fn test_env_uses_provisioned_storage() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let mut graph = TaskGraph::new();
        let instance = add_instance(&mut graph, &ctx, &providers).unwrap();
        let database = add_database(&mut graph, &ctx, &providers).unwrap();

        add(&mut graph, &ctx, &providers, &instance, &database, &[]).unwrap();

        let env = graph.get(&TaskId::new("simplelogin:config:env")).unwrap();
        assert!(env.dependencies().contains(&TaskId::new("simplelogin:access-key")));
        assert!(env.dependencies().contains(&TaskId::new("simplelogin:bucket")));

        let chain = [
            ("simplelogin:policy", "simplelogin:bucket"),
            ("simplelogin:user", "simplelogin:policy"),
            ("simplelogin:access-key", "simplelogin:user"),
        ];
        for (task, dep) in chain {
            let task = graph.get(&TaskId::new(task)).unwrap();
            assert!(task.dependencies().contains(&TaskId::new(dep)), "{dep}");
        }
        assert_eq!(storage_name(), "mail-services-simplelogin");
    }

    #[test]
    fn test_dkim_selectors_published() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let mut graph = TaskGraph::new();
        let instance = add_instance(&mut graph, &ctx, &providers).unwrap();
        let database = add_database(&mut graph, &ctx, &providers).unwrap();

        add(&mut graph, &ctx, &providers, &instance, &database, &[]).unwrap();

        for selector in ["dkim", "dkim02", "dkim03"] {
            let id = TaskId::new(format!("dns:txt:{selector}._domainkey.relay.example.com"));
            let task = graph.get(&id).unwrap();
            assert!(task.dependencies().contains(&TaskId::new("simplelogin:dkim")));
        }
        assert!(graph.contains(&TaskId::new("dns:cname:alias.example.com")));
    }

    #[test]
    fn test_missing_database_user() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let mut graph = TaskGraph::new();
        let instance = add_instance(&mut graph, &ctx, &providers).unwrap();

        let result = add(&mut graph, &ctx, &providers, &instance, &Database::default(), &[]);
        assert!(result.is_err());
    }
}
