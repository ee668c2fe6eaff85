//! 沙箱文件系统契约。
//!
//! 路径使用虚拟路径（见 `models::path`），根目录为空串。

use super::runtime::BoxFuture;
use crate::kernel::observe::Subscription;
use std::fmt;
use std::io;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Debug)]
pub enum FsError {
    NotFound(String),
    AlreadyExists(String),
    NotADirectory(String),
    NotAFile(String),
    DirectoryNotEmpty(String),
    InvalidName(String),
    Io(io::Error),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound(path) => write!(f, "no such file or directory: {}", path),
            FsError::AlreadyExists(path) => write!(f, "already exists: {}", path),
            FsError::NotADirectory(path) => write!(f, "not a directory: {}", path),
            FsError::NotAFile(path) => write!(f, "not a file: {}", path),
            FsError::DirectoryNotEmpty(path) => write!(f, "directory not empty: {}", path),
            FsError::InvalidName(name) => write!(f, "invalid entry name: {:?}", name),
            FsError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        FsError::Io(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

impl DirEntryInfo {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub recursive: bool,
    /// Missing paths are not an error.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// An entry appeared, disappeared or was renamed.
    Rename,
    /// File contents changed.
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Virtual path of the entry that changed.
    pub path: String,
}

pub type WatchCallback = Arc<dyn Fn(&WatchEvent) + Send + Sync>;

pub trait SandboxFs: Send + Sync {
    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<String>>;

    fn write_file<'a>(&'a self, path: &'a str, contents: &'a str) -> BoxFuture<'a, Result<()>>;

    fn read_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<DirEntryInfo>>>;

    fn mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>>;

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, Result<()>>;

    fn rm<'a>(&'a self, path: &'a str, options: RemoveOptions) -> BoxFuture<'a, Result<()>>;

    /// Watching a directory reports changes to its direct entries; watching a
    /// file reports changes to that file. Notifications stop when the
    /// returned subscription is dropped.
    fn watch(&self, path: &str, callback: WatchCallback) -> Result<Subscription>;
}
