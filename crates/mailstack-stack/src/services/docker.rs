use crate::context::{Providers, StackContext};
use crate::install::{ServiceInstall, ServiceTasks};
use crate::server::Instance;
use mailstack_core::TaskGraph;

/// Docker engine; installed once, configured from `daemon.json`.
pub fn add(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
    instance: &Instance,
) -> anyhow::Result<ServiceTasks> {
    ServiceInstall::new("docker", ctx, providers, &instance.remote)
        .after(std::slice::from_ref(&instance.server))
        .without_prepare()
        .install_template([])
        .install_file_var("daemonJson", "daemon.json")
        .once()
        .build(graph)
}
