//! Service ports: traits + data contracts.

pub mod config;
pub mod fs;
pub mod intel;
pub mod runtime;
pub mod sandbox;
pub mod search;
pub mod settings;
pub mod terminal;

pub use config::{CommandSpec, ConfigError, WorkspaceConfig};
pub use fs::{
    DirEntryInfo, FsError, RemoveOptions, Result as FsResult, SandboxFs, WatchCallback,
    WatchEvent, WatchEventKind,
};
pub use intel::CodeIntel;
pub use runtime::{AsyncExecutor, BoxFuture};
pub use sandbox::{RuntimeError, SandboxRuntime, ServerReady, SpawnedProcess};
pub use search::{FileMatches, MatchRange, SearchError, SearchFlags};
pub use settings::{ColorMode, PreferenceStore, COLOR_MODE_KEY};
pub use terminal::TerminalSink;
