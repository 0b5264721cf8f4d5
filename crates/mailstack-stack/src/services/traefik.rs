use crate::context::{Providers, StackContext};
use crate::install::{Placement, ServiceInstall, ServiceTasks};
use crate::source::Source;
use crate::tasks::Remote;
use mailstack_core::{TaskGraph, TaskId, Value};

/// Reverse proxy terminating TLS for every web service.
pub fn add(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
    remote: &Remote,
    after: &[TaskId],
) -> anyhow::Result<ServiceTasks> {
    let dns = &ctx.settings.dns;

    ServiceInstall::new("traefik", ctx, providers, remote)
        .after(after)
        .compose("traefik", [("gcpProject", Value::literal(dns.project.clone()))])
        .config(Placement::new(
            "traefik.yml",
            Source::template(
                ctx.asset("traefik", "traefik.yml.j2"),
                [("acmeEmail", Value::literal(dns.email.clone()))],
            ),
            "/opt/traefik/traefik.yml",
        ))
        .systemd()
        .build(graph)
}
