use async_trait::async_trait;
use mailstack_cloud::IamProvider;
use mailstack_core::{Deps, Inputs, Outputs, RunPolicy, Task, TaskId, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum IamOp {
    ServiceAccount {
        project: String,
        account_id: String,
        display_name: String,
    },
    /// New key for the account; created once.
    Key { email: Value },
    /// Role bindings for the account. Failures are logged only.
    Bindings {
        email: Value,
        bucket: Vec<(String, String)>,
        project: Vec<(String, String)>,
    },
}

pub struct IamTask {
    id: TaskId,
    deps: Deps,
    op: IamOp,
    provider: Arc<dyn IamProvider>,
}

impl IamTask {
    pub fn new(id: impl Into<TaskId>, op: IamOp, provider: Arc<dyn IamProvider>) -> Self {
        let deps = match &op {
            IamOp::ServiceAccount { .. } => Deps::new(),
            IamOp::Key { email } | IamOp::Bindings { email, .. } => Deps::new().uses(email),
        };
        Self {
            id: id.into(),
            deps,
            op,
            provider,
        }
    }
}

#[async_trait]
impl Task for IamTask {
    fn id(&self) -> &TaskId {
        &self.id
    }

    fn kind(&self) -> &'static str {
        match self.op {
            IamOp::ServiceAccount { .. } => "gcp-service-account",
            IamOp::Key { .. } => "gcp-service-account-key",
            IamOp::Bindings { .. } => "gcp-iam-binding",
        }
    }

    fn describe(&self) -> String {
        match &self.op {
            IamOp::ServiceAccount {
                project,
                account_id,
                ..
            } => format!("service account {account_id} in {project}"),
            IamOp::Key { .. } => "service account key".to_string(),
            IamOp::Bindings {
                bucket, project, ..
            } => format!("{} role bindings", bucket.len() + project.len()),
        }
    }

    fn dependencies(&self) -> &Deps {
        &self.deps
    }

    fn policy(&self) -> RunPolicy {
        match self.op {
            IamOp::Key { .. } => RunPolicy::CreateOnly,
            _ => RunPolicy::OnChange,
        }
    }

    async fn triggers(&self, inputs: &Inputs<'_>) -> anyhow::Result<Vec<String>> {
        Ok(match &self.op {
            IamOp::ServiceAccount {
                project,
                account_id,
                display_name,
            } => vec![project.clone(), account_id.clone(), display_name.clone()],
            IamOp::Key { email } => vec![inputs.resolve(email)?],
            IamOp::Bindings {
                email,
                bucket,
                project,
            } => {
                let mut t = vec![inputs.resolve(email)?];
                t.extend(bucket.iter().map(|(b, role)| format!("{b}:{role}")));
                t.extend(project.iter().map(|(p, role)| format!("{p}:{role}")));
                t
            }
        })
    }

    async fn run(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        match &self.op {
            IamOp::ServiceAccount {
                project,
                account_id,
                display_name,
            } => {
                let email = self
                    .provider
                    .ensure_service_account(project, account_id, display_name)
                    .await?;
                Ok(Outputs::new().with("email", email))
            }
            IamOp::Key { email } => {
                let credentials = self
                    .provider
                    .create_service_account_key(&inputs.resolve(email)?)
                    .await?;
                Ok(Outputs::new().with("credentials", credentials))
            }
            IamOp::Bindings {
                email,
                bucket,
                project,
            } => {
                let member = format!("serviceAccount:{}", inputs.resolve(email)?);
                let mut applied = 0usize;
                for (name, role) in bucket {
                    match self.provider.add_bucket_binding(name, &member, role).await {
                        Ok(()) => applied += 1,
                        Err(e) => {
                            tracing::warn!(bucket = %name, role = %role, error = %e, "Bucket binding failed")
                        }
                    }
                }
                for (name, role) in project {
                    match self.provider.add_project_binding(name, &member, role).await {
                        Ok(()) => applied += 1,
                        Err(e) => {
                            tracing::warn!(project = %name, role = %role, error = %e, "Project binding failed")
                        }
                    }
                }
                Ok(Outputs::new().with("applied", applied.to_string()))
            }
        }
    }
}
