//! 运行时会话控制器：启动 → 安装依赖 → 启动开发服务器。
//!
//! 阶段单调前进（`booting → installing → starting → ready`），任何阶段都可
//! 进入终止态 `failed`。

use crate::kernel::observe::{lock, Observers, Subscription};
use crate::kernel::services::ports::{RuntimeError, SandboxFs, ServerReady, SpawnedProcess};
use crate::kernel::services::SessionContext;
use crate::models::MountTree;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Boot(String),
    Install { code: i32 },
    Serve(String),
    ServeTimeout,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Boot(msg) => write!(f, "boot failed: {}", msg),
            FailureReason::Install { code } => write!(f, "install exited with code {}", code),
            FailureReason::Serve(msg) => write!(f, "dev server failed: {}", msg),
            FailureReason::ServeTimeout => write!(f, "dev server did not become ready in time"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Booting,
    Installing,
    Starting,
    Ready,
    Failed(FailureReason),
}

impl Phase {
    fn rank(&self) -> u8 {
        match self {
            Phase::Booting => 0,
            Phase::Installing => 1,
            Phase::Starting => 2,
            Phase::Ready => 3,
            Phase::Failed(_) => 4,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Phase::Failed(_))
    }

    /// Loading message shown while the workspace is not ready.
    pub fn progress_message(&self) -> Option<&'static str> {
        match self {
            Phase::Booting => Some("Booting Web Container!"),
            Phase::Installing => Some("Installing Node Modules!"),
            Phase::Starting => Some("Initializing Development Server!"),
            Phase::Ready | Phase::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PhaseChanged(Phase),
    BaseUrlChanged(Option<String>),
    InstallExited(i32),
    /// One-time milestone; fires after the install process exits.
    PackagesInstalled,
    Failed(FailureReason),
}

#[derive(Debug)]
pub enum SessionError {
    AlreadyBooted,
    NotBooted,
    NotInstalled,
    Failed(FailureReason),
    Runtime(RuntimeError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyBooted => write!(f, "session already booted"),
            SessionError::NotBooted => write!(f, "session is not booted"),
            SessionError::NotInstalled => write!(f, "dependencies are not installed"),
            SessionError::Failed(reason) => write!(f, "session failed: {}", reason),
            SessionError::Runtime(e) => write!(f, "runtime error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RuntimeError> for SessionError {
    fn from(e: RuntimeError) -> Self {
        SessionError::Runtime(e)
    }
}

#[derive(Default)]
struct SessionState {
    phase: Option<Phase>,
    base_url: Option<String>,
    reloading_url: Option<String>,
    boot_started: bool,
    booted: bool,
    install_exit: Option<i32>,
    shell_input: Option<mpsc::UnboundedSender<String>>,
}

struct Inner {
    ctx: SessionContext,
    state: Mutex<SessionState>,
    observers: Observers<SessionEvent>,
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                state: Mutex::new(SessionState::default()),
                observers: Observers::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    pub fn phase(&self) -> Phase {
        lock(&self.inner.state)
            .phase
            .clone()
            .unwrap_or(Phase::Booting)
    }

    pub fn base_url(&self) -> Option<String> {
        lock(&self.inner.state).base_url.clone()
    }

    pub fn progress_message(&self) -> Option<&'static str> {
        self.phase().progress_message()
    }

    pub fn is_booted(&self) -> bool {
        lock(&self.inner.state).booted
    }

    pub fn packages_installed(&self) -> bool {
        lock(&self.inner.state).install_exit.is_some()
    }

    pub fn install_exit_code(&self) -> Option<i32> {
        lock(&self.inner.state).install_exit
    }

    /// True between `restart` and the next `on_frame`.
    pub fn is_reloading(&self) -> bool {
        lock(&self.inner.state).reloading_url.is_some()
    }

    /// Boots the runtime and mounts `tree`. One-shot: a failed boot is
    /// final and a second call is rejected.
    pub async fn boot(&self, tree: &MountTree) -> Result<Arc<dyn SandboxFs>, SessionError> {
        {
            let mut state = lock(&self.inner.state);
            if state.boot_started {
                return Err(SessionError::AlreadyBooted);
            }
            state.boot_started = true;
        }
        self.set_phase(Phase::Booting);
        tracing::info!("booting sandbox");

        let runtime = self.inner.ctx.runtime();
        if let Err(e) = runtime.boot().await {
            return Err(self.fail(FailureReason::Boot(e.to_string())));
        }
        if let Err(e) = runtime.mount(tree).await {
            return Err(self.fail(FailureReason::Boot(e.to_string())));
        }

        lock(&self.inner.state).booted = true;
        self.set_phase(Phase::Installing);
        tracing::info!("sandbox booted");
        Ok(runtime.fs())
    }

    /// Runs the install command, echoing it and streaming its output to the
    /// terminal line by line, and fires the packages-installed milestone.
    pub async fn install(&self) -> Result<i32, SessionError> {
        if !self.is_booted() {
            return Err(SessionError::NotBooted);
        }
        let config = self.inner.ctx.config();
        let command = &config.install.command;
        let terminal = self.inner.ctx.terminal();
        terminal.writeln(&command.command_line());

        let code = match self.inner.ctx.runtime().spawn(command).await {
            Ok(process) => {
                let SpawnedProcess {
                    mut output, exit, ..
                } = process;
                while let Some(chunk) = output.recv().await {
                    terminal.writeln(&chunk);
                }
                exit.await.unwrap_or(-1)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn install command");
                terminal.writeln(&e.to_string());
                -1
            }
        };

        lock(&self.inner.state).install_exit = Some(code);
        self.inner.observers.notify(&SessionEvent::InstallExited(code));
        self.inner.observers.notify(&SessionEvent::PackagesInstalled);

        if code != 0 {
            tracing::warn!(code, "install exited with non-zero status");
            terminal.writeln(&format!("Install exited with code {}", code));
            if config.install.fail_on_error {
                return Err(self.fail(FailureReason::Install { code }));
            }
        }
        self.set_phase(Phase::Starting);
        Ok(code)
    }

    /// Starts the dev server and waits for its first `server-ready`.
    pub async fn serve(&self) -> Result<ServerReady, SessionError> {
        {
            let state = lock(&self.inner.state);
            if let Some(Phase::Failed(reason)) = &state.phase {
                return Err(SessionError::Failed(reason.clone()));
            }
            if state.install_exit.is_none() {
                return Err(SessionError::NotInstalled);
            }
        }
        let ctx = &self.inner.ctx;
        let config = ctx.config();
        let command = &config.serve.command;
        let runtime = ctx.runtime();

        let mut ready = runtime.server_ready();
        ctx.terminal().writeln(&command.command_line());
        let process = match runtime.spawn(command).await {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn dev server");
                return Err(self.fail(FailureReason::Serve(e.to_string())));
            }
        };
        self.pipe_output(process.output);

        let next = ready.recv();
        let event = match config.serve.ready_timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), next).await {
                Ok(event) => event,
                Err(_) => return Err(self.fail(FailureReason::ServeTimeout)),
            },
            None => next.await,
        };
        let Some(event) = event else {
            return Err(self.fail(FailureReason::Serve(
                "runtime stopped reporting server readiness".to_string(),
            )));
        };

        tracing::info!(port = event.port, url = %event.url, "dev server ready");
        lock(&self.inner.state).base_url = Some(event.url.clone());
        self.inner
            .observers
            .notify(&SessionEvent::BaseUrlChanged(Some(event.url.clone())));
        self.set_phase(Phase::Ready);
        Ok(event)
    }

    /// Clears the base URL so the live view unloads; `on_frame` brings it
    /// back. Install and serve are not re-run.
    pub fn restart(&self) -> bool {
        let url = {
            let mut state = lock(&self.inner.state);
            let Some(url) = state.base_url.take() else {
                return false;
            };
            state.reloading_url = Some(url);
            state.base_url.clone()
        };
        self.inner
            .observers
            .notify(&SessionEvent::BaseUrlChanged(url));
        true
    }

    /// Next render frame: restores a URL cleared by `restart`.
    pub fn on_frame(&self) {
        let restored = {
            let mut state = lock(&self.inner.state);
            let Some(url) = state.reloading_url.take() else {
                return;
            };
            state.base_url = Some(url.clone());
            url
        };
        self.inner
            .observers
            .notify(&SessionEvent::BaseUrlChanged(Some(restored)));
    }

    /// Starts the interactive shell; its output goes to the terminal and
    /// `terminal_input` feeds it.
    pub async fn open_shell(&self) -> Result<(), SessionError> {
        if !self.is_booted() {
            return Err(SessionError::NotBooted);
        }
        let command = &self.inner.ctx.config().shell;
        let process = self.inner.ctx.runtime().spawn(command).await?;
        lock(&self.inner.state).shell_input = Some(process.input);
        self.pipe_output(process.output);
        tracing::info!(shell = %command.command_line(), "shell started");
        Ok(())
    }

    /// Forwards terminal input to the shell. False when no shell is running.
    pub fn terminal_input(&self, data: &str) -> bool {
        let mut state = lock(&self.inner.state);
        let Some(input) = state.shell_input.as_ref() else {
            return false;
        };
        if input.send(data.to_string()).is_ok() {
            return true;
        }
        state.shell_input = None;
        false
    }

    fn pipe_output(&self, mut output: mpsc::UnboundedReceiver<String>) {
        let terminal = Arc::clone(self.inner.ctx.terminal());
        self.inner.ctx.spawn_future(async move {
            while let Some(chunk) = output.recv().await {
                terminal.write(&chunk);
            }
        });
    }

    /// Forward-only transition; stale or backward moves are ignored.
    fn set_phase(&self, next: Phase) {
        {
            let mut state = lock(&self.inner.state);
            if let Some(current) = &state.phase {
                if current.is_failed() || next.rank() <= current.rank() {
                    if *current != next {
                        tracing::debug!(?current, ?next, "ignoring backward phase transition");
                    }
                    return;
                }
            }
            state.phase = Some(next.clone());
        }
        self.inner.observers.notify(&SessionEvent::PhaseChanged(next));
    }

    fn fail(&self, reason: FailureReason) -> SessionError {
        tracing::error!(%reason, "workspace session failed");
        self.inner
            .ctx
            .terminal()
            .writeln(&format!("Error: {}", reason));
        self.set_phase(Phase::Failed(reason.clone()));
        self.inner
            .observers
            .notify(&SessionEvent::Failed(reason.clone()));
        SessionError::Failed(reason)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/session.rs"]
mod tests;
