use super::Remote;
use crate::source::Source;
use crate::version::VersionSource;
use anyhow::Context as _;
use async_trait::async_trait;
use mailstack_cloud::ObjectStore;
use mailstack_core::{Deps, Inputs, Outputs, Task, TaskId, hash_bytes};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Mirror {
    bucket: String,
    path: String,
    store: Arc<dyn ObjectStore>,
}

/// Renders or loads a file and places it locally, in the bucket and/or on
/// the instance.
///
/// Outputs `hash` (SHA-256 of the content) and, when configured, `version`.
pub struct FileTask {
    id: TaskId,
    deps: Deps,
    source: Source,
    local: Option<(PathBuf, bool)>,
    mirror: Option<Mirror>,
    remote: Option<(Remote, String)>,
    version: Option<VersionSource>,
}

impl FileTask {
    pub fn new(id: impl Into<TaskId>, source: Source) -> Self {
        let deps = Deps::new().uses_all(source.values());
        Self {
            id: id.into(),
            deps,
            source,
            local: None,
            mirror: None,
            remote: None,
            version: None,
        }
    }

    /// Write to a local path.
    pub fn local(mut self, path: PathBuf) -> Self {
        self.local = Some((path, false));
        self
    }

    /// Write to a local path with mode 0600.
    pub fn local_private(mut self, path: PathBuf) -> Self {
        self.local = Some((path, true));
        self
    }

    pub fn mirror(
        mut self,
        bucket: impl Into<String>,
        path: impl Into<String>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        self.mirror = Some(Mirror {
            bucket: bucket.into(),
            path: path.into(),
            store,
        });
        self
    }

    pub fn remote(mut self, remote: &Remote, path: impl Into<String>) -> Self {
        self.deps = self.deps.uses_all(remote.values());
        self.remote = Some((remote.clone(), path.into()));
        self
    }

    pub fn version(mut self, version: VersionSource) -> Self {
        self.version = Some(version);
        self
    }

    pub fn after(mut self, tasks: &[TaskId]) -> Self {
        self.deps = self.deps.after_all(tasks);
        self
    }
}

fn write_local(path: &Path, content: &str, private: bool) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("ファイルを書き込めません: {}", path.display()))?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    Ok(())
}

#[async_trait]
impl Task for FileTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        if self.remote.is_some() {
            "remote-copy"
        } else {
            "file"
        }
    }

    fn describe(&self) -> String {
        let target = match (&self.remote, &self.local) {
            (Some((_, path)), _) => path.clone(),
            (None, Some((path, _))) => path.display().to_string(),
            (None, None) => self
                .mirror
                .as_ref()
                .map(|m| format!("gs://{}/{}", m.bucket, m.path))
                .unwrap_or_default(),
        };
        format!("{} → {}", self.source.describe(), target)
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        let content = self.source.load(inputs)?;
        Ok(vec![
            hash_bytes(content),
            self.remote
                .as_ref()
                .map(|(_, path)| path.clone())
                .unwrap_or_default(),
            self.mirror
                .as_ref()
                .map(|m| format!("{}/{}", m.bucket, m.path))
                .unwrap_or_default(),
        ])
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        let content = self.source.load(inputs)?;

        if let Some((path, private)) = &self.local {
            write_local(path, &content, *private)?;
            tracing::debug!(path = %path.display(), "Wrote local file");
        }
        if let Some(mirror) = &self.mirror {
            mirror
                .store
                .upload(&mirror.bucket, &mirror.path, content.as_bytes())
                .await?;
            tracing::info!(bucket = %mirror.bucket, path = %mirror.path, "Uploaded file");
        }
        if let Some((remote, path)) = &self.remote {
            let conn = remote.connect(inputs)?;
            remote
                .executor
                .copy_file(&conn, content.as_bytes(), path)
                .await?;
        }

        let mut outputs = Outputs::new().with("hash", hash_bytes(&content));
        if let Some(version) = &self.version {
            outputs.insert("version", version.extract(&content));
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use mailstack_core::Value;
    use std::collections::{BTreeMap, BTreeSet};

    #[tokio::test]
    async fn test_file_task_writes_uploads_and_copies() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("docker-compose.yml.j2");
        std::fs::write(
            &template,
            "services:\n  app:\n    image: simplelogin/app:{{ tag }}\n",
        )
        .unwrap();
        let local = dir.path().join("outputs").join("simplelogin_docker-compose.yml");

        let recorder = Arc::new(Recorder::default());
        let remote = Remote {
            host: Value::literal("10.10.1.10"),
            private_key: Value::literal("pem"),
            executor: recorder.clone(),
        };
        let task = FileTask::new(
            "simplelogin:compose",
            Source::template(template, [("tag", Value::literal("v4.70.0"))]),
        )
        .local(local.clone())
        .mirror("mail-config", "mail-services/prod/compose.yml", recorder.clone())
        .remote(&remote, "/opt/simplelogin/docker-compose.yml")
        .version(VersionSource::image("app"));

        let id = task.id().clone();
        let declared = BTreeSet::new();
        let outputs = BTreeMap::new();
        let inputs = Inputs::new(&id, &declared, &outputs);

        let produced = task.run(&inputs).await.unwrap();
        assert_eq!(produced.get("version"), Some("v4.70.0"));
        assert_eq!(
            produced.get("hash"),
            Some(hash_bytes(std::fs::read(&local).unwrap()).as_str())
        );
        assert_eq!(
            recorder.calls(),
            vec![
                "upload gs://mail-config/mail-services/prod/compose.yml",
                "copy 10.10.1.10 /opt/simplelogin/docker-compose.yml",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh.key");
        let task = FileTask::new("ssh:export", Source::Inline("secret".into()))
            .local_private(path.clone());

        let id = task.id().clone();
        let declared = BTreeSet::new();
        let outputs = BTreeMap::new();
        task.run(&Inputs::new(&id, &declared, &outputs)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_triggers_follow_content() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("nginx.conf");
        std::fs::write(&asset, "server {}").unwrap();
        let task = FileTask::new("roundcube:file:nginx.conf", Source::Asset(asset.clone()));

        let id = task.id().clone();
        let declared = BTreeSet::new();
        let outputs = BTreeMap::new();
        let inputs = Inputs::new(&id, &declared, &outputs);

        let before = task.triggers(&inputs).await.unwrap();
        std::fs::write(&asset, "server { listen 80; }").unwrap();
        let after = task.triggers(&inputs).await.unwrap();
        assert_ne!(before[0], after[0]);
    }
}
