//! 从本地项目目录加载挂载树与工作区配置。

use crate::kernel::services::ports::config::CONFIG_FILE;
use crate::kernel::services::ports::{ConfigError, WorkspaceConfig};
use crate::models::MountTree;
use ignore::WalkBuilder;
use std::io;
use std::path::Path;

/// Directories never copied into the sandbox; the install step recreates them.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

/// Reads every UTF-8 file below `dir` into a mount tree. Ignore files are
/// honored; hidden files are kept since dotfiles are part of a project.
pub fn load_mount_tree(dir: &Path) -> io::Result<MountTree> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("project directory not found: {}", dir.display()),
        ));
    }

    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !SKIPPED_DIRS.contains(&name.as_ref())
        })
        .build();

    let mut tree = MountTree::new();
    let mut loaded = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        match std::fs::read_to_string(entry.path()) {
            Ok(contents) => {
                tree.insert_file(&relative, contents);
                loaded += 1;
            }
            Err(e) => tracing::warn!(path = %relative, error = %e, "skipping non-text file"),
        }
    }
    tracing::info!(dir = %dir.display(), files = loaded, "loaded project files");
    Ok(tree)
}

/// Reads the workspace config next to the project; a missing file yields
/// the defaults.
pub fn load_config(dir: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) => WorkspaceConfig::from_json(&text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(WorkspaceConfig::default()),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/local/template.rs"]
mod tests;
