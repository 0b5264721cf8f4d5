//! ntfy push notifications.

use super::publish;
use crate::context::{Providers, StackContext};
use crate::install::{Placement, ServiceInstall, ServiceTasks};
use crate::records::service_cname;
use crate::server::Instance;
use crate::source::Source;
use mailstack_core::{TaskGraph, TaskId, Value};

pub fn add(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
    instance: &Instance,
    after: &[TaskId],
) -> anyhow::Result<ServiceTasks> {
    let settings = &ctx.settings;
    let domain = &settings.ntfy.domain;

    publish(graph, [service_cname(settings, domain)], &providers.dns)?;

    let server = Source::template(
        ctx.asset("ntfy", "server.yml.j2"),
        [("domain", Value::literal(domain.name.clone()))],
    );

    ServiceInstall::new("ntfy", ctx, providers, &instance.remote)
        .after(after)
        .compose("ntfy", [("domain", Value::literal(domain.name.clone()))])
        .config(Placement::new("server.yml", server, "/opt/ntfy/config/server.yml").mirrored())
        .cron()
        .systemd()
        .install_template([
            ("project", Value::literal(settings.dns.project.clone())),
            ("bucket.id", Value::literal(settings.backup_bucket_id.clone())),
            ("bucket.path", Value::literal(ctx.bucket_path())),
        ])
        .postinstall()
        .build(graph)
}
