//! Plan and apply reports

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What `plan` decided for one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub action_type: ActionType,
    /// Task kind, e.g. `hetzner-server` or `remote-command`
    pub resource_type: String,
    pub description: String,
    /// Inputs come from a task that is itself pending; the outcome is
    /// only known after apply.
    pub deferred: bool,
    pub details: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    /// Never ran before
    Create,
    /// Triggers changed since the last run
    Update,
    NoOp,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::NoOp => "no-op",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `apply`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<TaskReport>,
    pub unchanged: Vec<String>,
    pub failed: Vec<TaskReport>,
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn ran(&mut self, task: String, action: ActionType) {
        self.succeeded.push(TaskReport {
            task,
            action: Some(action),
            error: None,
        });
    }

    pub fn skipped(&mut self, task: String) {
        self.unchanged.push(task);
    }

    pub fn fail(&mut self, task: String, error: String) {
        self.failed.push(TaskReport {
            task,
            action: None,
            error: Some(error),
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task: String,
    pub action: Option<ActionType>,
    pub error: Option<String>,
}

/// One action per task, in topological order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn summary(&self) -> PlanSummary {
        self.actions
            .iter()
            .fold(PlanSummary::default(), |mut summary, action| {
                match action.action_type {
                    ActionType::Create => summary.create += 1,
                    ActionType::Update => summary.update += 1,
                    ActionType::NoOp => summary.no_change += 1,
                }
                if action.deferred {
                    summary.deferred += 1;
                }
                summary
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub no_change: usize,
    pub deferred: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} unchanged",
            self.create, self.update, self.no_change
        )?;
        if self.deferred > 0 {
            write!(f, " ({} known after apply)", self.deferred)?;
        }
        Ok(())
    }
}
