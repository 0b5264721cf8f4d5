use crate::context::GLOBAL_NAME;
use crate::crypto::{generate_rsa_blocking, pem_body, random_password};
use crate::records::dkim_txt;
use async_trait::async_trait;
use mailstack_cloud::SecretStore;
use mailstack_core::{Deps, Inputs, Outputs, RunPolicy, Task, TaskId, Value};
use std::sync::Arc;

/// Generates named alphanumeric passwords once.
pub struct GenerateSecrets {
    id: TaskId,
    deps: Deps,
    fields: Vec<(String, usize)>,
}

impl GenerateSecrets {
    pub fn new<'a>(
        id: impl Into<TaskId>,
        fields: impl IntoIterator<Item = (&'a str, usize)>,
    ) -> Self {
        Self {
            id: id.into(),
            deps: Deps::new(),
            fields: fields
                .into_iter()
                .map(|(name, len)| (name.to_string(), len))
                .collect(),
        }
    }
}

#[async_trait]
impl Task for GenerateSecrets {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "random-password"
    }

    fn describe(&self) -> String {
        let names: Vec<&str> = self.fields.iter().map(|(n, _)| n.as_str()).collect();
        format!("generate {}", names.join(", "))
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    fn policy(&self) -> RunPolicy {
        RunPolicy::CreateOnly
    }

    async fn triggers(&self, _inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        Ok(self
            .fields
            .iter()
            .map(|(name, len)| format!("{name}:{len}"))
            .collect())
    }

    async fn run(&self, _inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let mut outputs = Outputs::new();
        for (name, len) in &self.fields {
            outputs.insert(name.clone(), random_password(*len));
        }
        Ok(outputs)
    }
}

/// Generates an RSA key pair once.
///
/// Outputs `private_key` (PKCS#1 PEM), `public_key_pem`, `public_key_openssh`
/// and `public_key` (PEM body on one line). DKIM keys also output
/// `dkim_record`, the TXT value for the selectors.
pub struct RsaKeyTask {
    id: TaskId,
    deps: Deps,
    bits: usize,
    dkim: bool,
}

impl RsaKeyTask {
    pub fn ssh(id: impl Into<TaskId>, bits: usize) -> Self {
        Self {
            id: id.into(),
            deps: Deps::new(),
            bits,
            dkim: false,
        }
    }

    pub fn dkim(id: impl Into<TaskId>, bits: usize) -> Self {
        Self {
            dkim: true,
            ..Self::ssh(id, bits)
        }
    }
}

#[async_trait]
impl Task for RsaKeyTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "rsa-key"
    }

    fn describe(&self) -> String {
        let purpose = if self.dkim { "DKIM" } else { "SSH" };
        format!("{purpose} RSA-{} key", self.bits)
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    fn policy(&self) -> RunPolicy {
        RunPolicy::CreateOnly
    }

    async fn triggers(&self, _inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        Ok(vec![self.bits.to_string()])
    }

    async fn run(&self, _inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let pair = generate_rsa_blocking(self.bits).await?;
        let body = pem_body(&pair.public_pem);

        let mut outputs = Outputs::new()
            .with("private_key", pair.private_pem)
            .with("public_key_pem", pair.public_pem)
            .with("public_key_openssh", pair.public_openssh)
            .with("public_key", body.clone());
        if self.dkim {
            outputs.insert("dkim_record", dkim_txt(&body));
        }
        Ok(outputs)
    }
}

/// Mirrors a JSON object of values into the secret store.
///
/// Best-effort: a failed write is logged and the task still succeeds, but
/// stays unsettled so the next run writes again.
pub struct SecretWrite {
    id: TaskId,
    deps: Deps,
    key: String,
    fields: Vec<(String, Value)>,
    store: Arc<dyn SecretStore>,
}

impl SecretWrite {
    pub fn new<'a>(
        key: impl Into<String>,
        fields: impl IntoIterator<Item = (&'a str, Value)>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        let key = key.into();
        let fields: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self {
            id: TaskId::new(format!("vault:{key}")),
            deps: Deps::new().uses_all(fields.iter().map(|(_, v)| v)),
            key,
            fields,
            store,
        }
    }
}

#[async_trait]
impl Task for SecretWrite {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "vault-secret"
    }

    fn describe(&self) -> String {
        format!("{GLOBAL_NAME}/{}", self.key)
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    fn settled(&self, outputs: &Outputs) -> bool {
        outputs.get("written") == Some("true")
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        let mut triggers = Vec::with_capacity(self.fields.len() * 2);
        for (name, value) in &self.fields {
            triggers.push(name.clone());
            triggers.push(inputs.resolve(value)?);
        }
        Ok(triggers)
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let mut data = serde_json::Map::new();
        for (name, value) in &self.fields {
            data.insert(name.clone(), serde_json::Value::String(inputs.resolve(value)?));
        }

        match self
            .store
            .write(GLOBAL_NAME, &self.key, &serde_json::Value::Object(data))
            .await
        {
            Ok(()) => Ok(Outputs::new().with("written", "true")),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to mirror secret; continuing");
                Ok(Outputs::new().with("written", "false"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use std::collections::{BTreeMap, BTreeSet};

    fn run_inputs<'a>(
        id: &'a TaskId,
        declared: &'a BTreeSet<TaskId>,
        outputs: &'a BTreeMap<TaskId, Outputs>,
    ) -> Inputs<'a> {
        Inputs::new(id, declared, outputs)
    }

    #[tokio::test]
    async fn test_generate_secrets() {
        let task = GenerateSecrets::new("mailcow:secrets", [("redis", 16), ("flask", 32)]);
        assert_eq!(task.policy(), RunPolicy::CreateOnly);

        let (declared, outputs) = (BTreeSet::new(), BTreeMap::new());
        let produced = task
            .run(&run_inputs(task.id(), &declared, &outputs))
            .await
            .unwrap();
        assert_eq!(produced.get("redis").unwrap().len(), 16);
        assert_eq!(produced.get("flask").unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_secret_write_is_best_effort() {
        let recorder = Arc::new(Recorder {
            fail_secrets: true,
            ..Default::default()
        });
        let task = SecretWrite::new(
            "postgresql-connection",
            [("host", Value::literal("db")), ("port", Value::literal("5432"))],
            recorder.clone(),
        );
        assert_eq!(task.id().as_str(), "vault:postgresql-connection");

        let (declared, outputs) = (BTreeSet::new(), BTreeMap::new());
        let produced = task
            .run(&run_inputs(task.id(), &declared, &outputs))
            .await
            .unwrap();
        assert_eq!(produced.get("written"), Some("false"));
        assert!(!task.settled(&produced));
        assert!(task.settled(&Outputs::new().with("written", "true")));
    }

    #[tokio::test]
    async fn test_secret_write_resolves_outputs() {
        let recorder = Arc::new(Recorder::default());
        let secrets = TaskId::new("mailcow:secrets");
        let task = SecretWrite::new(
            "mailcow-api",
            [
                ("read_write", Value::output(&secrets, "api_read_write")),
                ("read", Value::output(&secrets, "api_read")),
            ],
            recorder.clone(),
        );
        assert!(task.dependencies().contains(&secrets));

        let declared = task.dependencies().as_set().clone();
        let outputs = BTreeMap::from([(
            secrets,
            Outputs::new()
                .with("api_read_write", "rw")
                .with("api_read", "ro"),
        )]);
        let inputs = run_inputs(task.id(), &declared, &outputs);
        assert_eq!(
            task.triggers(&inputs).await.unwrap(),
            vec!["read_write", "rw", "read", "ro"]
        );
        task.run(&inputs).await.unwrap();
        assert_eq!(recorder.calls(), vec!["secret mail-services/mailcow-api"]);
    }

    #[tokio::test]
    async fn test_dkim_key_outputs_record() {
        let task = RsaKeyTask::dkim("simplelogin:dkim", 1024);
        let (declared, outputs) = (BTreeSet::new(), BTreeMap::new());
        let produced = task
            .run(&run_inputs(task.id(), &declared, &outputs))
            .await
            .unwrap();

        let record = produced.get("dkim_record").unwrap();
        assert!(record.starts_with("\"v=DKIM1; k=rsa; t=s; s=email; p=MI"));
        assert!(!produced.get("public_key").unwrap().contains('\n'));
        assert!(produced.get("private_key").unwrap().contains("RSA PRIVATE KEY"));
    }
}
