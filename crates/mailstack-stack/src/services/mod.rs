//! Services installed on the instance, in dependency order:
//! docker → gcloud → traefik → {mailcow, simplelogin, roundcube, ntfy}.

pub mod docker;
pub mod gcloud;
pub mod mailcow;
pub mod ntfy;
pub mod roundcube;
pub mod simplelogin;
pub mod traefik;

use crate::records::RecordSpec;
use crate::tasks::DnsRecordTask;
use mailstack_cloud::DnsProvider;
use mailstack_core::{TaskGraph, TaskId};
use std::sync::Arc;

pub(crate) fn publish(
    graph: &mut TaskGraph,
    records: impl IntoIterator<Item = RecordSpec>,
    dns: &Arc<dyn DnsProvider>,
) -> anyhow::Result<Vec<TaskId>> {
    let mut ids = Vec::new();
    for record in records {
        ids.push(graph.add(DnsRecordTask::new(record, dns.clone()))?);
    }
    Ok(ids)
}
