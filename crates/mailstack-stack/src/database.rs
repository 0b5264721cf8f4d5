//! Roles and databases on the upstream PostgreSQL server.

use crate::context::{Providers, StackContext};
use crate::crypto::DEFAULT_PASSWORD_LENGTH;
use crate::error::StackError;
use crate::tasks::{DatabaseOp, DatabaseTask, GenerateSecrets, SecretWrite};
use mailstack_core::{TaskGraph, TaskId, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct DatabaseUser {
    pub password: Value,
    pub role: TaskId,
}

/// Provisioned users and databases, by name.
#[derive(Debug, Clone, Default)]
pub struct Database {
    pub users: BTreeMap<String, DatabaseUser>,
    pub databases: BTreeMap<String, TaskId>,
}

impl Database {
    pub fn user(&self, name: &str) -> crate::Result<&DatabaseUser> {
        self.users
            .get(name)
            .ok_or_else(|| StackError::UnknownDatabaseUser(name.to_string()))
    }

    /// Tasks that must finish before a service can connect as `user` to `db`.
    pub fn ready(&self, user: &str, db: &str) -> Vec<TaskId> {
        self.users
            .get(user)
            .map(|u| u.role.clone())
            .into_iter()
            .chain(self.databases.get(db).cloned())
            .collect()
    }
}

pub fn add_database(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
) -> anyhow::Result<Database> {
    let config = &ctx.settings.database;
    let postgres = &ctx.postgres;
    let mut database = Database::default();

    graph.add(SecretWrite::new(
        "postgresql-connection",
        [
            ("port", Value::literal(postgres.port.to_string())),
            ("host", Value::literal(postgres.address.clone())),
        ],
        providers.secrets.clone(),
    ))?;

    for user in &config.users {
        let secret = graph.add(GenerateSecrets::new(
            format!("postgresql:password:{user}"),
            [("password", DEFAULT_PASSWORD_LENGTH)],
        ))?;
        let password = Value::output(&secret, "password");

        let role = graph.add(DatabaseTask::new(
            format!("postgresql:role:{user}"),
            DatabaseOp::Role {
                name: user.clone(),
                password: password.clone(),
            },
            providers.database.clone(),
        ))?;
        graph.add(SecretWrite::new(
            format!("postgresql-user-{user}"),
            [
                ("user", Value::literal(user.clone())),
                ("password", password.clone()),
            ],
            providers.secrets.clone(),
        ))?;

        database
            .users
            .insert(user.clone(), DatabaseUser { password, role });
    }

    for (name, owner) in &config.database {
        let owner_role = database.user(owner)?.role.clone();
        let id = graph.add(
            DatabaseTask::new(
                format!("postgresql:database:{name}"),
                DatabaseOp::Database {
                    name: name.clone(),
                    owner: owner.clone(),
                },
                providers.database.clone(),
            )
            .after(&owner_role),
        )?;
        graph.add(SecretWrite::new(
            format!("postgresql-database-{name}"),
            [("name", Value::literal(name.clone()))],
            providers.secrets.clone(),
        ))?;
        database.databases.insert(name.clone(), id);
    }

    tracing::debug!(
        users = database.users.len(),
        databases = database.databases.len(),
        "Database tasks built"
    );
    Ok(database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, context, providers};
    use mailstack_cloud::{Executor, GlobalState, StateManager};
    use mailstack_core::Task;
    use std::sync::Arc;

    #[test]
    fn test_database_graph() {
        let recorder = Arc::new(Recorder::default());
        let mut graph = TaskGraph::new();
        let db = add_database(&mut graph, &context(), &providers(&recorder)).unwrap();

        assert_eq!(db.users.len(), 2);
        assert_eq!(
            db.ready("roundcube", "roundcube"),
            vec![
                TaskId::new("postgresql:role:roundcube"),
                TaskId::new("postgresql:database:roundcube"),
            ]
        );
        assert!(graph.contains(&TaskId::new("vault:postgresql-connection")));
        assert!(graph.contains(&TaskId::new("vault:postgresql-user-simplelogin")));
        assert!(graph.contains(&TaskId::new("vault:postgresql-database-simplelogin")));

        let database = graph
            .get(&TaskId::new("postgresql:database:simplelogin"))
            .unwrap();
        assert!(
            database
                .dependencies()
                .contains(&TaskId::new("postgresql:role:simplelogin"))
        );
        graph.validate().unwrap();
    }

    #[test]
    fn test_unknown_user() {
        let db = Database::default();
        assert!(matches!(
            db.user("nobody"),
            Err(StackError::UnknownDatabaseUser(name)) if name == "nobody"
        ));
    }

    #[tokio::test]
    async fn test_apply_creates_roles_before_databases() {
        let recorder = Arc::new(Recorder::default());
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::testing::context_in(dir.path());
        let mut graph = TaskGraph::new();
        add_database(&mut graph, &ctx, &providers(&recorder)).unwrap();

        let manager = StateManager::new(dir.path(), "prod");
        let mut state = GlobalState::new("prod");
        let result = Executor::new(&graph)
            .with_parallelism(2)
            .apply(&mut state, &manager)
            .await
            .unwrap();
        assert!(result.is_success());

        let calls = recorder.calls();
        let role = calls.iter().position(|c| c == "role simplelogin").unwrap();
        let db = calls
            .iter()
            .position(|c| c == "database simplelogin simplelogin")
            .unwrap();
        assert!(role < db);
        assert!(calls.iter().any(|c| c == "secret mail-services/postgresql-connection"));
    }
}
