//! 沙箱运行时契约：启动、挂载、进程、文件系统、`server-ready` 事件。

use super::config::CommandSpec;
use super::fs::{FsError, SandboxFs};
use super::runtime::BoxFuture;
use crate::models::MountTree;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum RuntimeError {
    BootFailed(String),
    NotBooted,
    Mount(FsError),
    Spawn { command: String, message: String },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::BootFailed(msg) => write!(f, "sandbox failed to boot: {}", msg),
            RuntimeError::NotBooted => write!(f, "sandbox is not booted"),
            RuntimeError::Mount(e) => write!(f, "failed to mount file tree: {}", e),
            RuntimeError::Spawn { command, message } => {
                write!(f, "failed to spawn `{}`: {}", command, message)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<FsError> for RuntimeError {
    fn from(e: FsError) -> Self {
        RuntimeError::Mount(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Handle to a spawned process. `output` carries combined stdout/stderr
/// chunks and closes when the process stops writing; `exit` resolves with the
/// exit status (a dropped sender means the process vanished).
pub struct SpawnedProcess {
    pub output: mpsc::UnboundedReceiver<String>,
    pub input: mpsc::UnboundedSender<String>,
    pub exit: oneshot::Receiver<i32>,
}

pub trait SandboxRuntime: Send + Sync {
    fn boot(&self) -> BoxFuture<'_, Result<(), RuntimeError>>;

    fn mount<'a>(&'a self, tree: &'a MountTree) -> BoxFuture<'a, Result<(), RuntimeError>>;

    fn spawn<'a>(
        &'a self,
        command: &'a CommandSpec,
    ) -> BoxFuture<'a, Result<SpawnedProcess, RuntimeError>>;

    fn fs(&self) -> Arc<dyn SandboxFs>;

    /// Every receiver gets each subsequent `server-ready` notification.
    fn server_ready(&self) -> mpsc::UnboundedReceiver<ServerReady>;
}
