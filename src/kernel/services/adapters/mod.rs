//! Service adapters: in-memory, recording and host-backed implementations of the ports.

pub mod executor;
#[cfg(feature = "local")]
pub mod local;
pub mod memory;
pub mod recording;
pub mod settings;

pub use executor::{QueuedExecutor, TokioExecutor};
#[cfg(feature = "local")]
pub use local::{load_config, load_mount_tree, LocalFs, LocalSandbox};
pub use memory::{MemoryFs, MemorySandbox, ScriptedProcess};
pub use recording::{BufferTerminal, RecordingCodeIntel, StdoutTerminal};
pub use settings::{
    ensure_log_dir, get_log_dir, get_preferences_path, JsonPreferenceStore, MemoryPreferenceStore,
};
