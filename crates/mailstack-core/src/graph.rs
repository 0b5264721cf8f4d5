//! Typed task graph
//!
//! Every provisioning step is a [`Task`] with an explicit set of
//! dependencies. Values produced by other tasks are referenced through
//! [`Value::Output`], and referencing a task always makes it a dependency,
//! so a step can never observe an input that has not been produced yet.
//!
//! [`TaskGraph::levels`] runs Kahn's algorithm and groups tasks into levels:
//! every task in level `n` only depends on tasks in levels `< n`.

use crate::error::{CoreError, Result};
use crate::value::{Inputs, Outputs, TaskId, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// When a task is (re-)executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPolicy {
    /// Run on first apply and whenever the trigger hash changes.
    OnChange,
    /// Run once; later trigger changes are ignored.
    CreateOnly,
}

/// A node of the provisioning graph.
#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> &TaskId;

    /// Short resource kind shown in plans (e.g. "remote-command").
    fn kind(&self) -> &'static str;

    fn describe(&self) -> String;

    fn dependencies(&self) -> &Deps;

    fn policy(&self) -> RunPolicy {
        RunPolicy::OnChange
    }

    /// Whether the outputs of the last run are final. An unsettled task
    /// runs again even when its triggers are unchanged.
    fn settled(&self, _outputs: &Outputs) -> bool {
        true
    }

    /// Values whose change makes the task run again.
    ///
    /// Must be free of side effects; it is evaluated during `plan`.
    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>>;

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs>;
}

/// Declared dependencies of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deps(BTreeSet<TaskId>);

impl Deps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after(mut self, task: &TaskId) -> Self {
        self.0.insert(task.clone());
        self
    }

    pub fn after_all<'a>(mut self, tasks: impl IntoIterator<Item = &'a TaskId>) -> Self {
        self.0.extend(tasks.into_iter().cloned());
        self
    }

    /// Depend on the task producing `value`, if any.
    pub fn uses(mut self, value: &Value) -> Self {
        if let Some(task) = value.source_task() {
            self.0.insert(task.clone());
        }
        self
    }

    pub fn uses_all<'a>(mut self, values: impl IntoIterator<Item = &'a Value>) -> Self {
        for value in values {
            self = self.uses(value);
        }
        self
    }

    pub fn contains(&self, task: &TaskId) -> bool {
        self.0.contains(task)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.0.iter()
    }

    pub fn as_set(&self) -> &BTreeSet<TaskId> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Graph of tasks in insertion order.
#[derive(Default)]
pub struct TaskGraph {
    tasks: Vec<Box<dyn Task>>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task and return its id.
    pub fn add(&mut self, task: impl Task + 'static) -> Result<TaskId> {
        self.add_boxed(Box::new(task))
    }

    pub fn add_boxed(&mut self, task: Box<dyn Task>) -> Result<TaskId> {
        let id = task.id().clone();
        if self.index.contains_key(&id) {
            return Err(CoreError::DuplicateTask(id));
        }
        self.index.insert(id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&dyn Task> {
        self.index.get(id).map(|&i| self.tasks[i].as_ref())
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Task> {
        self.tasks.iter().map(|t| t.as_ref())
    }

    /// Check that every dependency exists and that the graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        self.levels().map(|_| ())
    }

    /// Topological levels (Kahn). Within a level tasks keep insertion order.
    pub fn levels(&self) -> Result<Vec<Vec<TaskId>>> {
        let mut in_degree = vec![0usize; self.tasks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];

        for (i, task) in self.tasks.iter().enumerate() {
            for dep in task.dependencies().iter() {
                let &j = self
                    .index
                    .get(dep)
                    .ok_or_else(|| CoreError::UnknownDependency {
                        task: task.id().clone(),
                        dependency: dep.clone(),
                    })?;
                in_degree[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut current: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut levels = Vec::new();
        let mut visited = 0;

        while !current.is_empty() {
            visited += current.len();
            let mut next = Vec::new();
            for &i in &current {
                for &d in &dependents[i] {
                    in_degree[d] -= 1;
                    if in_degree[d] == 0 {
                        next.push(d);
                    }
                }
            }
            next.sort_unstable();
            levels.push(current.iter().map(|&i| self.tasks[i].id().clone()).collect());
            current = next;
        }

        if visited != self.tasks.len() {
            let remaining: Vec<&str> = (0..self.tasks.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.tasks[i].id().as_str())
                .collect();
            return Err(CoreError::CircularDependency(remaining.join(", ")));
        }

        Ok(levels)
    }

    /// Flattened topological order.
    pub fn order(&self) -> Result<Vec<TaskId>> {
        Ok(self.levels()?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop {
        id: TaskId,
        deps: Deps,
    }

    impl Noop {
        fn new(id: &str, deps: &[&str]) -> Self {
            let deps = deps
                .iter()
                .fold(Deps::new(), |d, dep| d.after(&TaskId::new(*dep)));
            Self {
                id: TaskId::new(id),
                deps,
            }
        }
    }

    #[async_trait]
    impl Task for Noop {
        fn id(&self) -> &TaskId {
            &self.id
        }

        fn kind(&self) -> &'static str {
            "noop"
        }

        fn describe(&self) -> String {
            self.id.to_string()
        }

        fn dependencies(&self) -> &Deps {
            &self.deps
        }

        async fn triggers(&self, _inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn run(&self, _inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
            Ok(Outputs::new())
        }
    }

    fn position(order: &[TaskId], id: &str) -> usize {
        order.iter().position(|t| t.as_str() == id).unwrap()
    }

    #[test]
    fn test_order_respects_dependencies() {
        let mut graph = TaskGraph::new();
        graph.add(Noop::new("install", &["compose", "config", "prepare"])).unwrap();
        graph.add(Noop::new("compose", &["prepare"])).unwrap();
        graph.add(Noop::new("config", &["prepare"])).unwrap();
        graph.add(Noop::new("prepare", &[])).unwrap();

        let order = graph.order().unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "prepare") < position(&order, "compose"));
        assert!(position(&order, "prepare") < position(&order, "config"));
        assert!(position(&order, "compose") < position(&order, "install"));
        assert!(position(&order, "config") < position(&order, "install"));
    }

    #[test]
    fn test_levels_group_independent_tasks() {
        let mut graph = TaskGraph::new();
        graph.add(Noop::new("server", &[])).unwrap();
        graph.add(Noop::new("mailcow", &["server"])).unwrap();
        graph.add(Noop::new("ntfy", &["server"])).unwrap();
        graph.add(Noop::new("export", &["mailcow", "ntfy"])).unwrap();

        let levels = graph.levels().unwrap();
        let names: Vec<Vec<&str>> = levels
            .iter()
            .map(|l| l.iter().map(TaskId::as_str).collect())
            .collect();
        assert_eq!(names, vec![vec!["server"], vec!["mailcow", "ntfy"], vec!["export"]]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = TaskGraph::new();
        graph.add(Noop::new("a", &["c"])).unwrap();
        graph.add(Noop::new("b", &["a"])).unwrap();
        graph.add(Noop::new("c", &["b"])).unwrap();
        graph.add(Noop::new("d", &[])).unwrap();

        match graph.validate() {
            Err(CoreError::CircularDependency(tasks)) => {
                assert!(tasks.contains('a'));
                assert!(!tasks.contains('d'));
            }
            other => panic!("expected circular dependency, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let mut graph = TaskGraph::new();
        graph.add(Noop::new("install", &["missing"])).unwrap();

        let err = graph.validate().unwrap_err();
        assert!(matches!(err, CoreError::UnknownDependency { .. }));
    }

    #[test]
    fn test_duplicate_task_is_rejected() {
        let mut graph = TaskGraph::new();
        graph.add(Noop::new("a", &[])).unwrap();
        let err = graph.add(Noop::new("a", &[])).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTask(_)));
    }

    #[test]
    fn test_deps_uses_output_values() {
        let server = TaskId::new("server");
        let deps = Deps::new()
            .uses(&Value::literal("10.0.0.2"))
            .uses(&Value::output(&server, "ipv4"));
        assert_eq!(deps.len(), 1);
        assert!(deps.contains(&server));
    }
}
