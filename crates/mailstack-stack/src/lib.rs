//! Mail services stack
//!
//! Builds the task graph that provisions the Hetzner instance, the upstream
//! PostgreSQL roles, DNS records, secrets and every service installed on
//! the instance.
//!
//! ```text
//! ssh key ── hetzner (network, firewall, ips, server)
//!                 │
//!              docker ── gcloud ── traefik ─┬─ mailcow
//!                                           ├─ simplelogin ── postgresql, s3
//!                                           ├─ roundcube ──── postgresql
//!                                           └─ ntfy
//! ```

pub mod context;
pub mod crypto;
pub mod database;
pub mod error;
pub mod install;
pub mod outputs;
pub mod psql;
pub mod records;
pub mod remote;
pub mod server;
pub mod services;
pub mod source;
pub mod tasks;
pub mod version;

#[cfg(test)]
mod testing;

pub use context::{GLOBAL_NAME, Providers, StackContext};
pub use error::{Result, StackError};
pub use psql::Psql;
pub use remote::SshExecutor;
pub use server::Instance;

use mailstack_core::{TaskGraph, TaskId};

/// The complete graph plus the ids exports are read from.
pub struct Stack {
    pub graph: TaskGraph,
    pub instance: Instance,
    pub dkim: TaskId,
}

pub fn build_stack(ctx: &StackContext, providers: &Providers) -> anyhow::Result<Stack> {
    let mut graph = TaskGraph::new();

    let instance = server::add_instance(&mut graph, ctx, providers)?;
    let database = database::add_database(&mut graph, ctx, providers)?;

    let docker = services::docker::add(&mut graph, ctx, providers, &instance)?;
    let gcloud = services::gcloud::add(
        &mut graph,
        ctx,
        providers,
        &instance.remote,
        std::slice::from_ref(&docker.last),
    )?;
    let traefik = services::traefik::add(
        &mut graph,
        ctx,
        providers,
        &instance.remote,
        std::slice::from_ref(&gcloud.last),
    )?;
    let base = std::slice::from_ref(&traefik.last);

    let mailcow = services::mailcow::add(&mut graph, ctx, providers, &instance, base)?;
    let simplelogin =
        services::simplelogin::add(&mut graph, ctx, providers, &instance, &database, base)?;
    services::roundcube::add(
        &mut graph,
        ctx,
        providers,
        &instance,
        &database,
        &mailcow.api_read_write,
        base,
    )?;
    services::ntfy::add(&mut graph, ctx, providers, &instance, base)?;

    outputs::add_ssh_key_file(&mut graph, ctx, providers, &instance)?;

    graph.validate()?;
    tracing::info!(stack = %ctx.stack, tasks = graph.len(), "Stack graph built");

    Ok(Stack {
        graph,
        instance,
        dkim: simplelogin.dkim,
    })
}
