use crate::records::{RECORD_TTL, RecordSpec};
use async_trait::async_trait;
use mailstack_cloud::{DnsProvider, DnsRecord};
use mailstack_core::{Deps, Inputs, Outputs, Task, TaskId};
use std::sync::Arc;

/// Upserts one record set.
pub struct DnsRecordTask {
    id: TaskId,
    deps: Deps,
    spec: RecordSpec,
    provider: Arc<dyn DnsProvider>,
}

impl DnsRecordTask {
    pub fn new(spec: RecordSpec, provider: Arc<dyn DnsProvider>) -> Self {
        let id = TaskId::new(format!(
            "dns:{}:{}",
            spec.record_type.to_string().to_lowercase(),
            spec.name
        ));
        Self {
            id,
            deps: Deps::new().uses_all(&spec.values),
            spec,
            provider,
        }
    }

    fn record(&self, inputs: &Inputs<'_>) -> mailstack_core::Result<DnsRecord> {
        Ok(DnsRecord {
            name: self.spec.name.clone(),
            record_type: self.spec.record_type,
            zone: self.spec.zone.clone(),
            project: self.spec.project.clone(),
            ttl: RECORD_TTL,
            values: inputs.resolve_all(&self.spec.values)?,
        })
    }
}

#[async_trait]
impl Task for DnsRecordTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "dns-record"
    }

    fn describe(&self) -> String {
        format!(
            "{} {} ({}/{})",
            self.spec.record_type, self.spec.name, self.spec.project, self.spec.zone
        )
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        let record = self.record(inputs)?;
        let mut triggers = vec![record.zone, record.project, record.ttl.to_string()];
        triggers.extend(record.values);
        Ok(triggers)
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let record = self.record(inputs)?;
        self.provider.ensure_record(&record).await?;
        Ok(Outputs::new().with("fqdn", format!("{}.", record.name)))
    }
}
