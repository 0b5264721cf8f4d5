//! PostgreSQL administration through the `psql` client.
//!
//! Connects with the upstream credentials; the password is passed through
//! `PGPASSWORD` and statements are piped on stdin.

use crate::error::{Result, StackError};
use async_trait::async_trait;
use mailstack_cloud::DatabaseAdmin;
use mailstack_config::PostgresConnection;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maintenance database the admin session connects to.
const ADMIN_DATABASE: &str = "postgres";

pub struct Psql {
    connection: PostgresConnection,
}

impl Psql {
    pub fn new(connection: PostgresConnection) -> Self {
        Self { connection }
    }

    async fn run(&self, sql: &str) -> Result<String> {
        let conn = &self.connection;
        let port = conn.port.to_string();
        let mut cmd = Command::new("psql");
        cmd.args([
            "--no-psqlrc",
            "--quiet",
            "--tuples-only",
            "--no-align",
            "-v",
            "ON_ERROR_STOP=1",
            "-h",
            &conn.address,
            "-p",
            &port,
            "-U",
            &conn.username,
            "-d",
            ADMIN_DATABASE,
        ]);
        cmd.env("PGPASSWORD", &conn.password);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(host = %conn.address, port = conn.port, "Running psql");

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StackError::PsqlNotFound,
            _ => StackError::Io(e),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(sql.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StackError::Psql(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `"name"` with embedded quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `'value'` with embedded quotes doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Creates the login role or resets its password.
pub fn role_sql(name: &str, password: &str) -> String {
    let ident = quote_ident(name);
    let pw = quote_literal(password);
    format!(
        "DO $$\nBEGIN\n  IF EXISTS (SELECT FROM pg_roles WHERE rolname = {lit}) THEN\n    \
         ALTER ROLE {ident} WITH LOGIN PASSWORD {pw};\n  ELSE\n    \
         CREATE ROLE {ident} WITH LOGIN PASSWORD {pw};\n  END IF;\nEND\n$$;\n",
        lit = quote_literal(name),
    )
}

pub fn database_exists_sql(name: &str) -> String {
    format!(
        "SELECT 1 FROM pg_database WHERE datname = {};\n",
        quote_literal(name)
    )
}

pub fn create_database_sql(name: &str, owner: &str) -> String {
    format!(
        "CREATE DATABASE {} OWNER {};\n",
        quote_ident(name),
        quote_ident(owner)
    )
}

#[async_trait]
impl DatabaseAdmin for Psql {
    async fn ensure_role(&self, name: &str, password: &str) -> mailstack_cloud::Result<()> {
        self.run(&role_sql(name, password)).await?;
        tracing::info!(role = %name, "Ensured PostgreSQL role");
        Ok(())
    }

    async fn ensure_database(&self, name: &str, owner: &str) -> mailstack_cloud::Result<()> {
        // CREATE DATABASE cannot run inside a DO block.
        let exists = self.run(&database_exists_sql(name)).await?;
        if exists == "1" {
            tracing::debug!(database = %name, "Database already exists");
            return Ok(());
        }
        self.run(&create_database_sql(name, owner)).await?;
        tracing::info!(database = %name, owner = %owner, "Created PostgreSQL database");
        Ok(())
    }
}
