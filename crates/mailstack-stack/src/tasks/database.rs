use async_trait::async_trait;
use mailstack_cloud::DatabaseAdmin;
use mailstack_core::{Deps, Inputs, Outputs, Task, TaskId, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum DatabaseOp {
    Role { name: String, password: Value },
    Database { name: String, owner: String },
}

/// Role or database on the upstream PostgreSQL server.
pub struct DatabaseTask {
    id: TaskId,
    deps: Deps,
    op: DatabaseOp,
    admin: Arc<dyn DatabaseAdmin>,
}

impl DatabaseTask {
    pub fn new(id: impl Into<TaskId>, op: DatabaseOp, admin: Arc<dyn DatabaseAdmin>) -> Self {
        let deps = match &op {
            DatabaseOp::Role { password, .. } => Deps::new().uses(password),
            DatabaseOp::Database { .. } => Deps::new(),
        };
        Self {
            id: id.into(),
            deps,
            op,
            admin,
        }
    }

    pub fn after(mut self, task: &TaskId) -> Self {
        self.deps = self.deps.after(task);
        self
    }
}

#[async_trait]
impl Task for DatabaseTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        match self.op {
            DatabaseOp::Role { .. } => "postgresql-role",
            DatabaseOp::Database { .. } => "postgresql-database",
        }
    }

    fn describe(&self) -> String {
        match &self.op {
            DatabaseOp::Role { name, .. } => format!("role {name}"),
            DatabaseOp::Database { name, owner } => format!("database {name} (owner {owner})"),
        }
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        Ok(match &self.op {
            DatabaseOp::Role { name, password } => vec![name.clone(), inputs.resolve(password)?],
            DatabaseOp::Database { name, owner } => vec![name.clone(), owner.clone()],
        })
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        match &self.op {
            DatabaseOp::Role { name, password } => {
                self.admin
                    .ensure_role(name, &inputs.resolve(password)?)
                    .await?;
                Ok(Outputs::new().with("name", name.clone()))
            }
            DatabaseOp::Database { name, owner } => {
                self.admin.ensure_database(name, owner).await?;
                Ok(Outputs::new()
                    .with("name", name.clone())
                    .with("owner", owner.clone()))
            }
        }
    }
}
