use super::Remote;
use crate::source::Source;
use async_trait::async_trait;
use mailstack_core::{Deps, Inputs, Outputs, RunPolicy, Task, TaskId, Value, hash_bytes};

/// Shell script run as root on the instance.
pub struct RemoteCommand {
    id: TaskId,
    deps: Deps,
    remote: Remote,
    script: Source,
    triggers: Vec<Value>,
    policy: RunPolicy,
}

impl RemoteCommand {
    pub fn new(id: impl Into<TaskId>, remote: &Remote, script: Source) -> Self {
        let deps = Deps::new()
            .uses_all(remote.values())
            .uses_all(script.values());
        Self {
            id: id.into(),
            deps,
            remote: remote.clone(),
            script,
            triggers: Vec::new(),
            policy: RunPolicy::OnChange,
        }
    }

    pub fn after(mut self, tasks: &[TaskId]) -> Self {
        self.deps = self.deps.after_all(tasks);
        self
    }

    pub fn triggered_by(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        for value in values {
            self.deps = self.deps.uses(&value);
            self.triggers.push(value);
        }
        self
    }

    /// Run on first apply only.
    pub fn once(mut self) -> Self {
        self.policy = RunPolicy::CreateOnly;
        self
    }
}

#[async_trait]
impl Task for RemoteCommand {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "remote-command"
    }

    fn describe(&self) -> String {
        format!("run {}", self.script.describe())
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    fn policy(&self) -> RunPolicy {
        self.policy
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        let mut triggers = vec![hash_bytes(self.script.load(inputs)?)];
        triggers.extend(inputs.resolve_all(&self.triggers)?);
        Ok(triggers)
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let conn = self.remote.connect(inputs)?;
        let script = self.script.load(inputs)?;
        let stdout = self.remote.executor.run_script(&conn, &script).await?;
        tracing::debug!(task = %self.id, lines = stdout.lines().count(), "Remote command finished");
        Ok(Outputs::new().with("script_hash", hash_bytes(&script)))
    }
}
