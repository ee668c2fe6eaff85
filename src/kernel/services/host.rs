use std::future::Future;
use std::sync::Arc;

use super::ports::{
    AsyncExecutor, BoxFuture, CodeIntel, PreferenceStore, SandboxFs, SandboxRuntime,
    TerminalSink, WorkspaceConfig,
};

/// Collaborators of one workspace session, handed to every component at
/// construction. Cloning shares the same collaborators.
#[derive(Clone)]
pub struct SessionContext {
    runtime: Arc<dyn SandboxRuntime>,
    terminal: Arc<dyn TerminalSink>,
    intel: Arc<dyn CodeIntel>,
    preferences: Arc<dyn PreferenceStore>,
    executor: Arc<dyn AsyncExecutor>,
    config: Arc<WorkspaceConfig>,
}

impl SessionContext {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        terminal: Arc<dyn TerminalSink>,
        intel: Arc<dyn CodeIntel>,
        preferences: Arc<dyn PreferenceStore>,
        executor: Arc<dyn AsyncExecutor>,
    ) -> Self {
        Self {
            runtime,
            terminal,
            intel,
            preferences,
            executor,
            config: Arc::new(WorkspaceConfig::default()),
        }
    }

    pub fn with_config(mut self, config: WorkspaceConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        &self.runtime
    }

    pub fn fs(&self) -> Arc<dyn SandboxFs> {
        self.runtime.fs()
    }

    pub fn terminal(&self) -> &Arc<dyn TerminalSink> {
        &self.terminal
    }

    pub fn intel(&self) -> &Arc<dyn CodeIntel> {
        &self.intel
    }

    pub fn preferences(&self) -> &Arc<dyn PreferenceStore> {
        &self.preferences
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<dyn AsyncExecutor> {
        &self.executor
    }

    pub fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.executor.spawn(task);
    }

    pub fn spawn_future<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.executor.spawn(Box::pin(task));
    }
}
