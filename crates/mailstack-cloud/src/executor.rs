//! Two-phase plan/apply over a [`TaskGraph`].
//!
//! `plan` never runs a task. It evaluates triggers against the outputs
//! recorded in state and reports, per task, whether it would run.
//! `apply` walks the topological levels, runs the tasks of a level
//! concurrently (bounded), records outputs and persists state after every
//! level. The first failing level stops the run; completed work stays
//! recorded so the next run continues from there.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::error::{CloudError, Result};
use crate::state::{GlobalState, StateManager, TaskState};
use futures_util::stream::{self, StreamExt};
use mailstack_core::{
    CoreError, Inputs, Outputs, RunPolicy, Task, TaskGraph, TaskId, hash_triggers,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

pub const DEFAULT_PARALLELISM: usize = 4;

/// Progress notification emitted during apply
#[derive(Debug, Clone)]
pub enum ApplyEvent {
    Started { id: TaskId, description: String },
    Finished { id: TaskId, action: ActionType },
    Unchanged { id: TaskId },
    Failed { id: TaskId, error: String },
}

type Observer = Box<dyn Fn(&ApplyEvent) + Send + Sync>;

pub struct Executor<'g> {
    graph: &'g TaskGraph,
    parallelism: usize,
    observer: Option<Observer>,
}

enum Outcome {
    Unchanged,
    Ran {
        action: ActionType,
        trigger_hash: String,
        outputs: Outputs,
    },
}

impl<'g> Executor<'g> {
    pub fn new(graph: &'g TaskGraph) -> Self {
        Self {
            graph,
            parallelism: DEFAULT_PARALLELISM,
            observer: None,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_observer(mut self, observer: impl Fn(&ApplyEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn emit(&self, event: ApplyEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    fn task(&self, id: &TaskId) -> Result<&'g dyn Task> {
        self.graph
            .get(id)
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()))
    }

    /// Compute the action of every task without side effects.
    pub async fn plan(&self, state: &GlobalState) -> Result<Plan> {
        let order = self.graph.order()?;
        let known = state.outputs_map();
        let mut pending: BTreeSet<TaskId> = BTreeSet::new();
        let mut actions = Vec::with_capacity(order.len());

        for id in &order {
            let task = self.task(id)?;
            let prior = state.task(id);
            let upstream_pending = task.dependencies().iter().any(|d| pending.contains(d));

            let (action_type, deferred) = if task.policy() == RunPolicy::CreateOnly
                && prior.is_some()
            {
                (ActionType::NoOp, false)
            } else {
                let inputs = Inputs::new(id, task.dependencies().as_set(), &known);
                match task.triggers(&inputs).await {
                    Ok(triggers) => {
                        let hash = hash_triggers(&triggers);
                        match prior {
                            None => (ActionType::Create, upstream_pending),
                            Some(p) if p.trigger_hash != hash || !task.settled(&p.outputs) => {
                                (ActionType::Update, upstream_pending)
                            }
                            Some(_) if upstream_pending => (ActionType::Update, true),
                            Some(_) => (ActionType::NoOp, false),
                        }
                    }
                    Err(e) if is_missing_input(&e) => {
                        let action = if prior.is_some() {
                            ActionType::Update
                        } else {
                            ActionType::Create
                        };
                        (action, true)
                    }
                    Err(e) => {
                        return Err(CloudError::TaskFailed {
                            task: id.to_string(),
                            message: format!("{e:#}"),
                        });
                    }
                }
            };

            if action_type != ActionType::NoOp {
                pending.insert(id.clone());
            }

            let mut details = BTreeMap::new();
            details.insert(
                "policy".to_string(),
                serde_json::to_value(task.policy())?,
            );
            if !task.dependencies().is_empty() {
                details.insert(
                    "depends_on".to_string(),
                    serde_json::json!(
                        task.dependencies()
                            .iter()
                            .map(TaskId::as_str)
                            .collect::<Vec<_>>()
                    ),
                );
            }

            actions.push(Action {
                id: id.to_string(),
                action_type,
                resource_type: task.kind().to_string(),
                description: task.describe(),
                deferred,
                details,
            });
        }

        Ok(Plan::new(actions))
    }

    /// Execute the graph, persisting state after every level.
    pub async fn apply(
        &self,
        state: &mut GlobalState,
        manager: &StateManager,
    ) -> Result<ApplyResult> {
        let start = Instant::now();
        let levels = self.graph.levels()?;
        let mut outputs = state.outputs_map();
        let mut result = ApplyResult::new();

        for (index, level) in levels.iter().enumerate() {
            tracing::debug!(level = index, tasks = level.len(), "Applying level");

            let outcomes: Vec<(TaskId, anyhow::Result<Outcome>)> = {
                let known = &outputs;
                let current: &GlobalState = state;
                stream::iter(level.iter().map(|id| async move {
                    let outcome = match self.task(id) {
                        Ok(task) => self.apply_task(task, current.task(id), known).await,
                        Err(e) => Err(e.into()),
                    };
                    (id.clone(), outcome)
                }))
                .buffer_unordered(self.parallelism)
                .collect()
                .await
            };

            for (id, outcome) in outcomes {
                match outcome {
                    Ok(Outcome::Unchanged) => {
                        result.skipped(id.to_string());
                        self.emit(ApplyEvent::Unchanged { id });
                    }
                    Ok(Outcome::Ran {
                        action,
                        trigger_hash,
                        outputs: produced,
                    }) => {
                        let kind = self.task(&id)?.kind();
                        outputs.insert(id.clone(), produced.clone());
                        state.record(id.clone(), kind, trigger_hash, produced);
                        result.ran(id.to_string(), action);
                        self.emit(ApplyEvent::Finished { id, action });
                    }
                    Err(e) => {
                        let message = format!("{e:#}");
                        tracing::error!(task = %id, error = %message, "Task failed");
                        result.fail(id.to_string(), message.clone());
                        self.emit(ApplyEvent::Failed { id, error: message });
                    }
                }
            }

            manager.save(state).await?;

            if !result.is_success() {
                tracing::warn!(
                    failed = result.failed.len(),
                    "Stopping after failed level; re-run to converge"
                );
                break;
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn apply_task(
        &self,
        task: &dyn Task,
        prior: Option<&TaskState>,
        known: &BTreeMap<TaskId, Outputs>,
    ) -> anyhow::Result<Outcome> {
        let id = task.id();
        if task.policy() == RunPolicy::CreateOnly && prior.is_some() {
            return Ok(Outcome::Unchanged);
        }

        let inputs = Inputs::new(id, task.dependencies().as_set(), known);
        let triggers = task.triggers(&inputs).await?;
        let trigger_hash = hash_triggers(&triggers);

        let action = match prior {
            Some(p) if p.trigger_hash == trigger_hash && task.settled(&p.outputs) => {
                return Ok(Outcome::Unchanged);
            }
            Some(_) => ActionType::Update,
            None => ActionType::Create,
        };

        self.emit(ApplyEvent::Started {
            id: id.clone(),
            description: task.describe(),
        });
        tracing::info!(task = %id, kind = task.kind(), %action, "Running task");

        let outputs = task.run(&inputs).await?;
        Ok(Outcome::Ran {
            action,
            trigger_hash,
            outputs,
        })
    }
}

fn is_missing_input(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<CoreError>(),
        Some(CoreError::MissingOutput { .. })
    )
}
