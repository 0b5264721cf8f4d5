//! Task identifiers, deferred values and recorded outputs.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable identifier of a task, e.g. `mailcow:install`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A value that is either known while the graph is built or produced by
/// another task at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Literal(String),
    Output { task: TaskId, key: String },
}

impl Value {
    pub fn literal(value: impl Into<String>) -> Self {
        Value::Literal(value.into())
    }

    pub fn output(task: &TaskId, key: impl Into<String>) -> Self {
        Value::Output {
            task: task.clone(),
            key: key.into(),
        }
    }

    /// Task that has to run before this value is known.
    pub fn source_task(&self) -> Option<&TaskId> {
        match self {
            Value::Literal(_) => None,
            Value::Output { task, .. } => Some(task),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::literal(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Literal(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::literal(value.clone())
    }
}

/// Key/value outputs recorded for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outputs(BTreeMap<String, String>);

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read-only view of upstream outputs, restricted to the task's declared
/// dependencies.
pub struct Inputs<'a> {
    task: &'a TaskId,
    declared: &'a BTreeSet<TaskId>,
    outputs: &'a BTreeMap<TaskId, Outputs>,
}

impl<'a> Inputs<'a> {
    pub fn new(
        task: &'a TaskId,
        declared: &'a BTreeSet<TaskId>,
        outputs: &'a BTreeMap<TaskId, Outputs>,
    ) -> Self {
        Self {
            task,
            declared,
            outputs,
        }
    }

    pub fn task(&self) -> &TaskId {
        self.task
    }

    pub fn output(&self, task: &TaskId, key: &str) -> Result<&'a str> {
        if !self.declared.contains(task) {
            return Err(CoreError::UndeclaredInput {
                task: self.task.clone(),
                input: task.clone(),
            });
        }
        self.outputs
            .get(task)
            .and_then(|outputs| outputs.get(key))
            .ok_or_else(|| CoreError::MissingOutput {
                task: task.clone(),
                key: key.to_string(),
            })
    }

    pub fn resolve(&self, value: &Value) -> Result<String> {
        match value {
            Value::Literal(v) => Ok(v.clone()),
            Value::Output { task, key } => self.output(task, key).map(str::to_string),
        }
    }

    pub fn resolve_all(&self, values: &[Value]) -> Result<Vec<String>> {
        values.iter().map(|v| self.resolve(v)).collect()
    }
}
