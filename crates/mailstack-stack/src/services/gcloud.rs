//! Google Cloud service account used on the instance for backups and ACME
//! DNS challenges.

use crate::context::{Providers, StackContext};
use crate::install::{ServiceInstall, ServiceTasks};
use crate::source::Source;
use crate::tasks::{FileTask, IamOp, IamTask, Remote, SecretWrite};
use mailstack_core::{TaskGraph, TaskId, Value};

pub const BACKUP_BUCKET_ROLES: [&str; 2] =
    ["roles/storage.objectAdmin", "roles/storage.legacyBucketReader"];
pub const DNS_ROLE: &str = "roles/dns.admin";
pub const CREDENTIALS_PATH: &str = "/opt/google/credentials.json";

pub fn add(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
    remote: &Remote,
    after: &[TaskId],
) -> anyhow::Result<ServiceTasks> {
    let settings = &ctx.settings;
    let name = ctx.resource_name();

    let account = graph.add(IamTask::new(
        "gcloud:service-account",
        IamOp::ServiceAccount {
            project: settings.dns.project.clone(),
            account_id: name.clone(),
            display_name: name,
        },
        providers.iam.clone(),
    ))?;
    let email = Value::output(&account, "email");

    let key = graph.add(IamTask::new(
        "gcloud:key",
        IamOp::Key {
            email: email.clone(),
        },
        providers.iam.clone(),
    ))?;
    graph.add(IamTask::new(
        "gcloud:bindings",
        IamOp::Bindings {
            email,
            bucket: BACKUP_BUCKET_ROLES
                .iter()
                .map(|role| (settings.backup_bucket_id.clone(), role.to_string()))
                .collect(),
            project: vec![(settings.dns.project.clone(), DNS_ROLE.to_string())],
        },
        providers.iam.clone(),
    ))?;

    let credentials = Value::output(&key, "credentials");
    graph.add(SecretWrite::new(
        "google-cloud",
        [
            ("credentials", credentials.clone()),
            ("bucket", Value::literal(settings.backup_bucket_id.clone())),
        ],
        providers.secrets.clone(),
    ))?;

    let credentials_file = FileTask::new("gcloud:credentials", Source::Output(credentials))
        .local_private(ctx.outputs_dir.join("google_credentials.json"))
        .remote(remote, CREDENTIALS_PATH);

    ServiceInstall::new("gcloud", ctx, providers, remote)
        .after(after)
        .file(credentials_file)
        .build(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, context, providers};
    use mailstack_core::Task;
    use std::sync::Arc;

    #[test]
    fn test_install_triggered_by_credentials() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let remote = Remote {
            host: Value::literal("10.10.1.10"),
            private_key: Value::literal("key"),
            executor: recorder.clone(),
        };
        let mut graph = TaskGraph::new();

        let tasks = add(&mut graph, &ctx, &providers, &remote, &[]).unwrap();

        let install = graph.get(&tasks.install).unwrap();
        assert!(install.dependencies().contains(&TaskId::new("gcloud:credentials")));
        assert!(install.dependencies().contains(&TaskId::new("gcloud:prepare")));

        let credentials = graph.get(&TaskId::new("gcloud:credentials")).unwrap();
        assert!(credentials.dependencies().contains(&TaskId::new("gcloud:key")));
        assert!(graph.contains(&TaskId::new("vault:google-cloud")));
        graph.validate().unwrap();
    }
}
