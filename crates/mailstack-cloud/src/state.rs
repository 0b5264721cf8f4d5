//! State management for provisioned tasks
//!
//! Manages `.mailstack/<stack>/state.json`, which records the trigger hash
//! and outputs of every task that has run, plus the stack's exported
//! outputs.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Duration, Utc};
use mailstack_core::{Outputs, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".mailstack";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_STAGING: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Stale locks older than this are taken over.
const LOCK_STALE_HOURS: i64 = 1;

/// Global state of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Stack name
    pub stack: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Tasks indexed by id
    pub tasks: BTreeMap<TaskId, TaskState>,

    /// Exported stack outputs
    #[serde(default)]
    pub outputs: serde_json::Value,
}

impl GlobalState {
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            stack: stack.into(),
            updated_at: Utc::now(),
            tasks: BTreeMap::new(),
            outputs: serde_json::Value::Null,
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskState> {
        self.tasks.get(id)
    }

    /// Record a successful run, keeping the original creation time.
    pub fn record(&mut self, id: TaskId, kind: &str, trigger_hash: String, outputs: Outputs) {
        let now = Utc::now();
        let created_at = self.tasks.get(&id).map(|t| t.created_at).unwrap_or(now);
        self.tasks.insert(
            id,
            TaskState {
                kind: kind.to_string(),
                trigger_hash,
                outputs,
                created_at,
                updated_at: now,
            },
        );
        self.updated_at = now;
    }

    /// Outputs of every recorded task.
    pub fn outputs_map(&self) -> BTreeMap<TaskId, Outputs> {
        self.tasks
            .iter()
            .map(|(id, t)| (id.clone(), t.outputs.clone()))
            .collect()
    }

    pub fn set_exports(&mut self, outputs: serde_json::Value) {
        self.outputs = outputs;
        self.updated_at = Utc::now();
    }
}

/// State of a single task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    /// Resource kind
    pub kind: String,

    /// Hash of the triggers at the last run
    pub trigger_hash: String,

    /// Outputs produced by the last run
    pub outputs: Outputs,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Reads and writes `.mailstack/<stack>/` and guards it with `lock.json`.
pub struct StateManager {
    dir: PathBuf,
    stack: String,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        Self {
            dir: project_root.as_ref().join(STATE_DIR).join(&stack),
            stack,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    /// Empty state when nothing has been applied yet.
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.dir.join(STATE_FILE);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(stack = %self.stack, "No state yet");
                return Ok(GlobalState::new(self.stack.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_slice(&raw)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} was written by a newer mailstack (version {}, supported {})",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        if state.stack != self.stack {
            return Err(CloudError::StateError(format!(
                "{} is for stack '{}', not '{}'",
                path.display(),
                state.stack,
                self.stack
            )));
        }

        tracing::debug!(stack = %self.stack, tasks = state.tasks.len(), "Loaded state");
        Ok(state)
    }

    /// Write through a temporary file; the previous state becomes the backup.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(STATE_FILE);
        let staging = self.dir.join(STATE_STAGING);

        fs::write(&staging, serde_json::to_vec_pretty(state)?).await?;
        restrict_permissions(&staging).await?;
        if fs::try_exists(&path).await? {
            fs::copy(&path, self.dir.join(STATE_BACKUP)).await?;
        }
        fs::rename(&staging, &path).await?;

        tracing::debug!(stack = %self.stack, tasks = state.tasks.len(), "Saved state");
        Ok(())
    }

    /// Take `lock.json`, replacing it only when older than the stale limit.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;
        let lock_path = self.dir.join(LOCK_FILE);

        if let Some(held) = read_lock(&lock_path).await? {
            let age = Utc::now() - held.acquired_at;
            if age < Duration::hours(LOCK_STALE_HOURS) {
                return Err(CloudError::LockError(format!(
                    "stack '{}' is held by {} since {}",
                    self.stack, held.holder, held.acquired_at
                )));
            }
            tracing::warn!(holder = %held.holder, since = %held.acquired_at, "Taking over stale lock");
            fs::remove_file(&lock_path).await?;
        }

        let info = LockInfo {
            holder: lock_holder(),
            acquired_at: Utc::now(),
        };
        let created = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path);
        let mut file = match created {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CloudError::LockError(format!(
                    "stack '{}' was locked concurrently",
                    self.stack
                )));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::to_writer_pretty(&mut file, &info)?;

        tracing::debug!(holder = %info.holder, "Locked state");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }

    /// Remove the lock regardless of its holder. Returns whether a lock existed.
    pub async fn force_unlock(&self) -> Result<bool> {
        match fs::remove_file(self.dir.join(LOCK_FILE)).await {
            Ok(()) => {
                tracing::warn!(stack = %self.stack, "Lock removed by force");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_lock(path: &Path) -> Result<Option<LockInfo>> {
    match fs::read(path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `<host>:<pid>`
fn lock_holder() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string());
    format!("{}:{}", host, std::process::id())
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// Held lock. Dropping it without `release` still removes the file.
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {
                tracing::debug!("Unlocked state");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "prod");

        let mut state = GlobalState::new("prod");
        state.record(
            TaskId::new("server"),
            "server",
            "abc".to_string(),
            Outputs::new().with("ipv4", "192.0.2.1"),
        );
        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        let server = loaded.task(&TaskId::new("server")).unwrap();
        assert_eq!(server.trigger_hash, "abc");
        assert_eq!(server.outputs.get("ipv4"), Some("192.0.2.1"));
        assert!(temp_dir.path().join(".mailstack/prod/state.json").exists());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "dev");

        let state = manager.load().await.unwrap();
        assert!(state.tasks.is_empty());
        assert_eq!(state.stack, "dev");
    }

    #[tokio::test]
    async fn test_backup_is_kept() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "prod");
        let state = GlobalState::new("prod");

        manager.save(&state).await.unwrap();
        manager.save(&state).await.unwrap();

        assert!(
            temp_dir
                .path()
                .join(".mailstack/prod/state.json.backup")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_record_keeps_created_at() {
        let mut state = GlobalState::new("prod");
        let id = TaskId::new("mailcow:install");
        state.record(id.clone(), "remote-command", "h1".to_string(), Outputs::new());
        let created = state.task(&id).unwrap().created_at;

        state.record(id.clone(), "remote-command", "h2".to_string(), Outputs::new());
        let task = state.task(&id).unwrap();
        assert_eq!(task.created_at, created);
        assert_eq!(task.trigger_hash, "h2");
    }

    #[tokio::test]
    async fn test_stack_mismatch_is_rejected() {
        let temp_dir = tempdir().unwrap();
        StateManager::new(temp_dir.path(), "prod")
            .save(&GlobalState::new("dev"))
            .await
            .unwrap();

        let err = StateManager::new(temp_dir.path(), "prod")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::StateError(_)));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "prod");

        let lock = manager.acquire_lock().await.unwrap();
        let err = manager.acquire_lock().await.err().unwrap();
        assert!(matches!(err, CloudError::LockError(_)));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!manager.force_unlock().await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path(), "prod");
        std::fs::create_dir_all(manager.state_dir()).unwrap();

        let stale = LockInfo {
            holder: "old-host".to_string(),
            acquired_at: Utc::now() - Duration::hours(2),
        };
        std::fs::write(
            manager.state_dir().join(LOCK_FILE),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        assert!(manager.acquire_lock().await.is_ok());
    }
}
