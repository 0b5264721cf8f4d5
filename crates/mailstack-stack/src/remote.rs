//! Remote execution over the system `ssh` client.
//!
//! Scripts are piped to `bash -s`; files are streamed into
//! `mkdir -p <dir> && cat > <path>`. The private key is written to a
//! temporary 0600 file for the duration of one invocation.

use crate::error::{Result, StackError};
use async_trait::async_trait;
use mailstack_cloud::{Connection, RemoteExecutor};
use std::io::Write as _;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Quote for a POSIX shell.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Remote command that writes stdin to `remote_path`.
pub fn copy_command(remote_path: &str) -> String {
    let dir = Path::new(remote_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/".to_string());
    format!(
        "mkdir -p {} && cat > {}",
        shell_escape(&dir),
        shell_escape(remote_path)
    )
}

pub fn ssh_args(key_path: &Path, target: &str, command: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        key_path.display().to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        target.to_string(),
        command.to_string(),
    ]
}

#[derive(Debug, Default, Clone)]
pub struct SshExecutor;

impl SshExecutor {
    pub fn new() -> Self {
        Self
    }

    fn key_file(private_key: &str) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new().prefix("mailstack-ssh-").tempfile()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(private_key.as_bytes())?;
        if !private_key.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(file)
    }

    async fn ssh(&self, conn: &Connection, command: &str, stdin: &[u8]) -> Result<String> {
        let key = Self::key_file(&conn.private_key)?;
        let target = format!("{}@{}", conn.user, conn.host);

        let mut cmd = Command::new("ssh");
        cmd.args(ssh_args(key.path(), &target, command));
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(target = %target, command = %command, "Running ssh");

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StackError::SshNotFound,
            _ => StackError::Io(e),
        })?;
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin).await?;
            // Closing stdin ends `bash -s` and `cat`.
            drop(pipe);
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StackError::Remote {
                host: conn.host.clone(),
                message: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run_script(&self, conn: &Connection, script: &str) -> mailstack_cloud::Result<String> {
        let stdout = self.ssh(conn, "bash -s", script.as_bytes()).await?;
        Ok(stdout)
    }

    async fn copy_file(
        &self,
        conn: &Connection,
        content: &[u8],
        remote_path: &str,
    ) -> mailstack_cloud::Result<()> {
        self.ssh(conn, &copy_command(remote_path), content).await?;
        tracing::debug!(host = %conn.host, path = %remote_path, "Copied file");
        Ok(())
    }
}
