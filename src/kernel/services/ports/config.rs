use super::fs::FsError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONFIG_FILE: &str = "sandbench.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub command: CommandSpec,
    /// A non-zero exit stops the workspace before the dev server starts.
    pub fail_on_error: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            command: CommandSpec::new("npm", ["install"]),
            fail_on_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub command: CommandSpec,
    /// Unset waits for `server-ready` indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_timeout_ms: Option<u64>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            command: CommandSpec::new("npm", ["run", "dev"]),
            ready_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub exclude_dirs: Vec<String>,
    pub exclude_files: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: vec!["node_modules".to_string()],
            exclude_files: vec!["package-lock.json".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub install: InstallConfig,
    pub serve: ServeConfig,
    pub shell: CommandSpec,
    pub initial_tabs: Vec<String>,
    /// Compiler configuration file, relative to the project root.
    pub compiler_config: String,
    /// Host marker splitting a live-view location into base and route.
    pub route_host_marker: String,
    pub search: SearchConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            install: InstallConfig::default(),
            serve: ServeConfig::default(),
            shell: CommandSpec::new("jsh", Vec::<String>::new()),
            initial_tabs: vec!["/src/app.tsx".to_string()],
            compiler_config: "tsconfig.json".to_string(),
            route_host_marker: "local-corp.webcontainer-api.io".to_string(),
            search: SearchConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Fs(FsError),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Fs(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<FsError> for ConfigError {
    fn from(e: FsError) -> Self {
        ConfigError::Fs(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}
