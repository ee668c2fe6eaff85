use crate::kernel::services::adapters::{
    BufferTerminal, MemoryPreferenceStore, MemorySandbox, QueuedExecutor, RecordingCodeIntel,
};
use crate::kernel::services::ports::WorkspaceConfig;
use crate::kernel::services::SessionContext;
use std::future::Future;
use std::sync::Arc;

/// Drives `future` to completion on a fresh current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build test runtime")
        .block_on(future)
}

/// In-memory collaborators wired into one `SessionContext`.
pub(crate) struct Harness {
    pub sandbox: Arc<MemorySandbox>,
    pub terminal: Arc<BufferTerminal>,
    pub intel: Arc<RecordingCodeIntel>,
    pub preferences: Arc<MemoryPreferenceStore>,
    pub executor: Arc<QueuedExecutor>,
    pub ctx: SessionContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(WorkspaceConfig::default())
    }

    pub fn with_config(config: WorkspaceConfig) -> Self {
        let sandbox = Arc::new(MemorySandbox::new());
        let terminal = Arc::new(BufferTerminal::new());
        let intel = Arc::new(RecordingCodeIntel::new());
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let executor = Arc::new(QueuedExecutor::new());
        let ctx = SessionContext::new(
            sandbox.clone(),
            terminal.clone(),
            intel.clone(),
            preferences.clone(),
            executor.clone(),
        )
        .with_config(config);
        Self {
            sandbox,
            terminal,
            intel,
            preferences,
            executor,
            ctx,
        }
    }
}
