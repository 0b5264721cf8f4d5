//! Per-service bootstrap chain.
//!
//! ```text
//! prepare ─┬─ compose ──┐
//!          ├─ configs ──┤
//!          ├─ systemd ──┼─ install ── postinstall files ── postinstall
//!          └─ cron files ── cron
//! ```
//!
//! Every copy publishes the hash of its content and the install command is
//! triggered by those hashes, so a service is reinstalled exactly when one
//! of its files changes.

use crate::context::{Providers, StackContext};
use crate::source::Source;
use crate::tasks::{FileTask, Remote, RemoteCommand};
use crate::version::VersionSource;
use mailstack_core::{TaskGraph, TaskId, Value};

/// Ids other services and exports hang off.
#[derive(Debug, Clone)]
pub struct ServiceTasks {
    pub install: TaskId,
    /// Postinstall when present, otherwise install.
    pub last: TaskId,
}

struct Compose {
    file: String,
    vars: Vec<(String, Value)>,
    version: VersionSource,
}

/// File copied to a fixed path on the instance.
///
/// Rendered templates are also written to `outputs/<service>_<file>`.
pub struct Placement {
    file: String,
    source: Source,
    remote_path: String,
    mirror: bool,
}

impl Placement {
    pub fn new(file: impl Into<String>, source: Source, remote_path: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            source,
            remote_path: remote_path.into(),
            mirror: false,
        }
    }

    /// Also upload to the config bucket under the stack prefix.
    pub fn mirrored(mut self) -> Self {
        self.mirror = true;
        self
    }
}

enum Install {
    Asset,
    Template(Vec<(String, Value)>),
    /// Rendered, copied to `/opt/<name>/install.sh` and run from there.
    Uploaded(Vec<(String, Value)>),
}

pub struct ServiceInstall<'a> {
    name: String,
    ctx: &'a StackContext,
    providers: &'a Providers,
    remote: &'a Remote,
    after: Vec<TaskId>,
    prepare: bool,
    compose: Option<Compose>,
    copies: Vec<Placement>,
    files: Vec<FileTask>,
    systemd: bool,
    install: Install,
    install_files: Vec<(String, std::path::PathBuf)>,
    once: bool,
    cron: bool,
    postinstall: Option<Vec<Placement>>,
}

fn owned(vars: impl IntoIterator<Item = (&'static str, Value)>) -> Vec<(String, Value)> {
    vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

impl<'a> ServiceInstall<'a> {
    pub fn new(
        name: impl Into<String>,
        ctx: &'a StackContext,
        providers: &'a Providers,
        remote: &'a Remote,
    ) -> Self {
        Self {
            name: name.into(),
            ctx,
            providers,
            remote,
            after: Vec::new(),
            prepare: true,
            compose: None,
            copies: Vec::new(),
            files: Vec::new(),
            systemd: false,
            install: Install::Asset,
            install_files: Vec::new(),
            once: false,
            cron: false,
            postinstall: None,
        }
    }

    pub fn after(mut self, tasks: &[TaskId]) -> Self {
        self.after.extend(tasks.iter().cloned());
        self
    }

    pub fn without_prepare(mut self) -> Self {
        self.prepare = false;
        self
    }

    /// `docker-compose.yml.j2`, versioned by the image tag of `image_of`.
    pub fn compose(
        mut self,
        image_of: &str,
        vars: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        self.compose = Some(Compose {
            file: "docker-compose.yml.j2".to_string(),
            vars: owned(vars),
            version: VersionSource::image(image_of),
        });
        self
    }

    /// `docker-compose.override.yml.j2`, versioned by its `#version:` line.
    pub fn compose_override(
        mut self,
        vars: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        self.compose = Some(Compose {
            file: "docker-compose.override.yml.j2".to_string(),
            vars: owned(vars),
            version: VersionSource::CommentedKey,
        });
        self
    }

    pub fn config(mut self, placement: Placement) -> Self {
        self.copies.push(placement);
        self
    }

    /// Prebuilt file task the install depends on.
    pub fn file(mut self, task: FileTask) -> Self {
        self.files.push(task);
        self
    }

    pub fn systemd(mut self) -> Self {
        self.systemd = true;
        self
    }

    pub fn install_template(mut self, vars: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        self.install = Install::Template(owned(vars));
        self
    }

    pub fn install_uploaded(mut self, vars: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        self.install = Install::Uploaded(owned(vars));
        self
    }

    /// Template variable holding the content of another asset of the service.
    pub fn install_file_var(mut self, key: &str, file: &str) -> Self {
        let path = self.ctx.asset(&self.name, file);
        self.install_files.push((key.to_string(), path));
        self
    }

    /// Install runs on the first apply only.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn cron(mut self) -> Self {
        self.cron = true;
        self
    }

    /// Run `postinstall.sh`; without files it runs once.
    pub fn postinstall(mut self) -> Self {
        self.postinstall.get_or_insert_with(Vec::new);
        self
    }

    pub fn postinstall_file(mut self, placement: Placement) -> Self {
        self.postinstall.get_or_insert_with(Vec::new).push(placement);
        self
    }

    fn copy_task(&self, id: String, copy: Placement) -> FileTask {
        let rendered = matches!(copy.source, Source::Template { .. });
        let output_name = format!("{}_{}", self.name, copy.file);
        let mut task = FileTask::new(id, copy.source).remote(self.remote, copy.remote_path);
        if rendered {
            task = task.local(self.ctx.outputs_dir.join(&output_name));
        }
        if copy.mirror {
            task = task.mirror(
                self.ctx.settings.bucket_id.clone(),
                format!("{}/{}", self.ctx.bucket_path(), output_name),
                self.providers.objects.clone(),
            );
        }
        task
    }

    fn template_source(&self, vars: Vec<(String, Value)>, version: &Option<Value>) -> Source {
        let mut vars = vars;
        if let Some(version) = version {
            vars.push(("version".to_string(), version.clone()));
        }
        let mut source = Source::Template {
            path: self.ctx.asset(&self.name, "install.sh.j2"),
            vars,
            files: Vec::new(),
        };
        for (key, path) in &self.install_files {
            source = source.with_file(key, path.clone());
        }
        source
    }

    pub fn build(mut self, graph: &mut TaskGraph) -> anyhow::Result<ServiceTasks> {
        let (ctx, remote) = (self.ctx, self.remote);
        let name = self.name.clone();
        let asset = |file: &str| ctx.asset(&name, file);

        let base = if self.prepare {
            let prepare = graph.add(
                RemoteCommand::new(
                    format!("{name}:prepare"),
                    remote,
                    Source::Asset(asset("prepare.sh")),
                )
                .after(&self.after)
                .once(),
            )?;
            vec![prepare]
        } else {
            self.after.clone()
        };

        let mut triggers: Vec<Value> = Vec::new();

        if self.systemd {
            let unit = format!("{name}.service");
            let id = graph.add(
                FileTask::new(format!("{name}:systemd"), Source::Asset(asset(&unit)))
                    .remote(remote, format!("/etc/systemd/system/{unit}"))
                    .after(&base),
            )?;
            triggers.push(Value::output(&id, "hash"));
        }

        let mut version = None;
        if let Some(compose) = self.compose.take() {
            let rendered = compose.file.trim_end_matches(".j2").to_string();
            let source = Source::Template {
                path: asset(&compose.file),
                vars: compose.vars,
                files: Vec::new(),
            };
            let id = graph.add(
                FileTask::new(format!("{name}:compose"), source)
                    .local(ctx.outputs_dir.join(format!("{name}_{rendered}")))
                    .remote(remote, format!("/opt/{name}/{rendered}"))
                    .version(compose.version)
                    .after(&base),
            )?;
            triggers.push(Value::output(&id, "hash"));
            version = Some(Value::output(&id, "version"));
        }

        for copy in std::mem::take(&mut self.copies) {
            let id = format!("{name}:config:{}", copy.file);
            let id = graph.add(self.copy_task(id, copy).after(&base))?;
            triggers.push(Value::output(&id, "hash"));
        }
        for file in std::mem::take(&mut self.files) {
            let id = graph.add(file.after(&base))?;
            triggers.push(Value::output(&id, "hash"));
        }

        let script = match std::mem::replace(&mut self.install, Install::Asset) {
            Install::Asset => Source::Asset(asset("install.sh")),
            Install::Template(vars) => self.template_source(vars, &version),
            Install::Uploaded(vars) => {
                let path = format!("/opt/{name}/install.sh");
                let id = graph.add(
                    FileTask::new(
                        format!("{name}:install-script"),
                        self.template_source(vars, &version),
                    )
                    .local(ctx.outputs_dir.join(format!("{name}_install.sh")))
                    .remote(remote, path.clone())
                    .after(&base),
                )?;
                triggers.push(Value::output(&id, "hash"));
                Source::Inline(format!("bash {path}"))
            }
        };
        triggers.extend(version);

        let mut install = RemoteCommand::new(format!("{name}:install"), remote, script)
            .after(&base)
            .triggered_by(triggers);
        if self.once {
            install = install.once();
        }
        let install = graph.add(install)?;

        if self.cron {
            let settings = &ctx.settings;
            let backup = graph.add(
                FileTask::new(
                    format!("{name}:cron-backup"),
                    Source::template(
                        asset(&format!("cron/{name}-backup.j2")),
                        [
                            ("project", Value::literal(settings.dns.project.clone())),
                            ("bucket.id", Value::literal(settings.backup_bucket_id.clone())),
                            ("bucket.path", Value::literal(ctx.bucket_path())),
                        ],
                    ),
                )
                .local(ctx.outputs_dir.join(format!("{name}_backup")))
                .remote(remote, format!("/bin/{name}-backup"))
                .after(&base),
            )?;
            let cron_file = graph.add(
                FileTask::new(format!("{name}:cron-file"), Source::Asset(asset("cron/cron")))
                    .remote(remote, format!("/etc/cron.d/{name}"))
                    .after(&base),
            )?;
            graph.add(
                RemoteCommand::new(
                    format!("{name}:cron"),
                    remote,
                    Source::Asset(asset("cron/install.sh")),
                )
                .after(&base)
                .triggered_by([
                    Value::output(&cron_file, "hash"),
                    Value::output(&backup, "hash"),
                ]),
            )?;
        }

        let mut last = install.clone();
        if let Some(copies) = self.postinstall.take() {
            let once = copies.is_empty();
            let mut post_triggers = Vec::with_capacity(copies.len());
            for copy in copies {
                let id = format!("{name}:postinstall:{}", copy.file);
                let id = graph.add(self.copy_task(id, copy).after(std::slice::from_ref(&install)))?;
                post_triggers.push(Value::output(&id, "hash"));
            }
            let mut postinstall = RemoteCommand::new(
                format!("{name}:postinstall"),
                remote,
                Source::Asset(asset("postinstall.sh")),
            )
            .after(std::slice::from_ref(&install))
            .triggered_by(post_triggers);
            if once {
                postinstall = postinstall.once();
            }
            last = graph.add(postinstall)?;
        }

        tracing::debug!(service = %name, tasks = graph.len(), "Service chain built");
        Ok(ServiceTasks { install, last })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, context, providers};
    use mailstack_core::Task;
    use std::sync::Arc;

    fn remote(recorder: &Arc<Recorder>) -> Remote {
        let server = TaskId::new("hetzner:server");
        let key = TaskId::new("ssh:key");
        Remote {
            host: Value::output(&server, "ssh_host"),
            private_key: Value::output(&key, "private_key"),
            executor: recorder.clone(),
        }
    }

    fn deps_of(graph: &TaskGraph, id: &str) -> Vec<String> {
        graph
            .get(&TaskId::new(id))
            .unwrap()
            .dependencies()
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    #[test]
    fn test_install_depends_on_every_copy() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let remote = remote(&recorder);
        let mut graph = TaskGraph::new();

        let tasks = ServiceInstall::new("traefik", &ctx, &providers, &remote)
            .after(&[TaskId::new("hetzner:server")])
            .compose("traefik", [("gcpProject", Value::literal("dns-project"))])
            .config(Placement::new(
                "traefik.yml",
                Source::template(ctx.asset("traefik", "traefik.yml.j2"), []),
                "/opt/traefik/traefik.yml",
            ))
            .systemd()
            .build(&mut graph)
            .unwrap();

        assert_eq!(tasks.install.as_str(), "traefik:install");
        assert_eq!(tasks.last, tasks.install);

        let deps = deps_of(&graph, "traefik:install");
        for expected in [
            "traefik:prepare",
            "traefik:systemd",
            "traefik:compose",
            "traefik:config:traefik.yml",
        ] {
            assert!(deps.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(deps_of(&graph, "traefik:prepare"), vec!["hetzner:server", "ssh:key"]);
        assert_eq!(
            graph.get(&TaskId::new("traefik:prepare")).unwrap().policy(),
            mailstack_core::RunPolicy::CreateOnly
        );
    }

    #[test]
    fn test_cron_runs_beside_install() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let remote = remote(&recorder);
        let mut graph = TaskGraph::new();

        ServiceInstall::new("ntfy", &ctx, &providers, &remote)
            .compose("ntfy", [])
            .systemd()
            .cron()
            .postinstall()
            .build(&mut graph)
            .unwrap();

        let cron = deps_of(&graph, "ntfy:cron");
        assert!(cron.contains(&"ntfy:prepare".to_string()));
        assert!(cron.contains(&"ntfy:cron-file".to_string()));
        assert!(cron.contains(&"ntfy:cron-backup".to_string()));
        assert!(!cron.contains(&"ntfy:install".to_string()));

        let post = graph.get(&TaskId::new("ntfy:postinstall")).unwrap();
        assert!(post.dependencies().contains(&TaskId::new("ntfy:install")));
        assert_eq!(post.policy(), mailstack_core::RunPolicy::CreateOnly);
    }

    #[test]
    fn test_uploaded_install_and_postinstall_files() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let remote = remote(&recorder);
        let mut graph = TaskGraph::new();

        let tasks = ServiceInstall::new("mailcow", &ctx, &providers, &remote)
            .compose_override([])
            .install_uploaded([("bucket.id", Value::literal("mail-backup"))])
            .postinstall_file(Placement::new(
                "extra.cf",
                Source::Asset(ctx.asset("mailcow", "config/extra.cf")),
                "/opt/mailcow/data/conf/postfix/extra.cf",
            ))
            .build(&mut graph)
            .unwrap();

        assert_eq!(tasks.last.as_str(), "mailcow:postinstall");
        assert!(deps_of(&graph, "mailcow:install").contains(&"mailcow:install-script".to_string()));
        let post = deps_of(&graph, "mailcow:postinstall");
        assert!(post.contains(&"mailcow:postinstall:extra.cf".to_string()));
        assert_eq!(
            graph.get(&TaskId::new("mailcow:postinstall")).unwrap().policy(),
            mailstack_core::RunPolicy::OnChange
        );
    }

    #[test]
    fn test_without_prepare_uses_given_dependencies() {
        let recorder = Arc::new(Recorder::default());
        let (ctx, providers) = (context(), providers(&recorder));
        let remote = remote(&recorder);
        let mut graph = TaskGraph::new();

        ServiceInstall::new("docker", &ctx, &providers, &remote)
            .after(&[TaskId::new("hetzner:server")])
            .without_prepare()
            .install_template([])
            .once()
            .build(&mut graph)
            .unwrap();

        assert!(!graph.contains(&TaskId::new("docker:prepare")));
        assert!(deps_of(&graph, "docker:install").contains(&"hetzner:server".to_string()));
    }
}
