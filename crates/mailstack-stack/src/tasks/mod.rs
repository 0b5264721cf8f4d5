//! Task implementations used by the stack graph.

mod command;
mod compute;
mod database;
mod dns;
mod file;
mod iam;
mod secret;
mod storage;

pub use command::RemoteCommand;
pub use compute::{ComputeOp, ComputeTask, ServerTemplate};
pub use database::{DatabaseOp, DatabaseTask};
pub use dns::DnsRecordTask;
pub use file::FileTask;
pub use iam::{IamOp, IamTask};
pub use secret::{GenerateSecrets, RsaKeyTask, SecretWrite};
pub use storage::{StorageOp, StorageTask};

use mailstack_cloud::{Connection, RemoteExecutor};
use mailstack_core::{Inputs, Value};
use std::sync::Arc;

/// SSH target of the instance, resolved from task outputs.
#[derive(Clone)]
pub struct Remote {
    pub host: Value,
    pub private_key: Value,
    pub executor: Arc<dyn RemoteExecutor>,
}

impl Remote {
    pub fn values(&self) -> [&Value; 2] {
        [&self.host, &self.private_key]
    }

    pub fn connect(&self, inputs: &Inputs<'_>) -> mailstack_core::Result<Connection> {
        Ok(Connection {
            host: inputs.resolve(&self.host)?,
            user: "root".to_string(),
            private_key: inputs.resolve(&self.private_key)?,
        })
    }
}
