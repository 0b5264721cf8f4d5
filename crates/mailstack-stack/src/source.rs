//! Content of files and scripts handed to remote tasks.

use anyhow::Context as _;
use mailstack_core::{Inputs, TemplateProcessor, Value};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Source {
    /// Asset file used verbatim.
    Asset(PathBuf),
    /// `.j2` asset rendered with dotted-path variables.
    Template {
        path: PathBuf,
        vars: Vec<(String, Value)>,
        /// Variables holding the content of another asset.
        files: Vec<(String, PathBuf)>,
    },
    Inline(String),
    /// Output of another task (generated keys, credentials).
    Output(Value),
}

impl Source {
    pub fn template<'a>(
        path: PathBuf,
        vars: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Self {
        Source::Template {
            path,
            vars: vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            files: Vec::new(),
        }
    }

    /// Expose the content of `path` as template variable `key`.
    pub fn with_file(mut self, key: &str, path: PathBuf) -> Self {
        if let Source::Template { files, .. } = &mut self {
            files.push((key.to_string(), path));
        }
        self
    }

    /// Values that must be produced before the content can be loaded.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Source::Template { vars, .. } => vars.iter().map(|(_, v)| v).collect(),
            Source::Output(value) => vec![value],
            Source::Asset(_) | Source::Inline(_) => Vec::new(),
        }
    }

    pub fn load(&self, inputs: &Inputs<'_>) -> anyhow::Result<String> {
        match self {
            Source::Asset(path) => std::fs::read_to_string(path)
                .with_context(|| format!("アセットを読み込めません: {}", path.display())),
            Source::Template { path, vars, files } => {
                let mut resolved = Vec::with_capacity(vars.len() + files.len());
                for (key, value) in vars {
                    resolved.push((key.as_str(), JsonValue::String(inputs.resolve(value)?)));
                }
                for (key, file) in files {
                    let content = std::fs::read_to_string(file)
                        .with_context(|| format!("アセットを読み込めません: {}", file.display()))?;
                    resolved.push((key.as_str(), JsonValue::String(content)));
                }
                let mut processor = TemplateProcessor::new();
                processor.add_path_variables(resolved);
                Ok(processor.render_file(path)?)
            }
            Source::Inline(content) => Ok(content.clone()),
            Source::Output(value) => Ok(inputs.resolve(value)?),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Source::Asset(path) | Source::Template { path, .. } => path.display().to_string(),
            Source::Inline(content) => content.lines().next().unwrap_or_default().to_string(),
            Source::Output(Value::Output { task, key }) => format!("{task}.{key}"),
            Source::Output(Value::Literal(_)) => "(literal)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailstack_core::{Outputs, TaskId};
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn test_template_resolves_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.j2");
        std::fs::write(&path, "user={{ db.user }} pw={{ db.password }}").unwrap();

        let secrets = TaskId::new("secrets");
        let source = Source::template(
            path,
            [
                ("db.user", Value::literal("mailcow")),
                ("db.password", Value::output(&secrets, "db")),
            ],
        );
        assert_eq!(source.values().len(), 2);

        let me = TaskId::new("me");
        let declared = BTreeSet::from([secrets.clone()]);
        let outputs = BTreeMap::from([(secrets, Outputs::new().with("db", "pw1"))]);
        let inputs = Inputs::new(&me, &declared, &outputs);

        assert_eq!(source.load(&inputs).unwrap(), "user=mailcow pw=pw1");
    }

    #[test]
    fn test_template_with_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = dir.path().join("daemon.json");
        std::fs::write(&daemon, "{\"ipv6\": true}").unwrap();
        let path = dir.path().join("install.sh.j2");
        std::fs::write(&path, "echo '{{ daemonJson }}' > /etc/docker/daemon.json").unwrap();

        let source = Source::template(path, Vec::<(&str, Value)>::new()).with_file("daemonJson", daemon);
        let me = TaskId::new("me");
        let (declared, outputs) = (BTreeSet::new(), BTreeMap::new());
        let inputs = Inputs::new(&me, &declared, &outputs);

        assert_eq!(
            source.load(&inputs).unwrap(),
            "echo '{\"ipv6\": true}' > /etc/docker/daemon.json"
        );
    }

    #[test]
    fn test_missing_asset_is_an_error() {
        let me = TaskId::new("me");
        let declared = BTreeSet::new();
        let outputs = BTreeMap::new();
        let inputs = Inputs::new(&me, &declared, &outputs);

        let err = Source::Asset(PathBuf::from("/nonexistent/prepare.sh"))
            .load(&inputs)
            .unwrap_err();
        assert!(err.to_string().contains("prepare.sh"));
    }
}
