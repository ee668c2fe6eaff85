//! 本地目录上的沙箱文件系统
//!
//! 虚拟路径映射到根目录下的相对路径；监听基于 notify，非递归。

use crate::kernel::observe::Subscription;
use crate::kernel::services::ports::{
    BoxFuture, DirEntryInfo, FsError, FsResult, RemoveOptions, SandboxFs, WatchCallback,
    WatchEvent, WatchEventKind,
};
use crate::models::path;
use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Component, Path, PathBuf};

pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a virtual path. `..` segments are rejected.
    pub fn resolve(&self, target: &str) -> FsResult<PathBuf> {
        let normalized = path::normalize(target);
        let mut resolved = self.root.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                return Err(FsError::InvalidName(target.to_string()));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    /// Virtual path of a host path below the root.
    pub fn to_virtual(&self, host: &Path) -> Option<String> {
        let relative = host.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();
        Some(path::canonical(&segments.join("/")))
    }

    async fn read_file_at(&self, target: &str) -> FsResult<String> {
        let host = self.resolve(target)?;
        match tokio::fs::metadata(&host).await {
            Ok(meta) if meta.is_dir() => return Err(FsError::NotAFile(path::canonical(target))),
            Ok(_) => {}
            Err(e) => return Err(map_io(e, target)),
        }
        tokio::fs::read_to_string(&host)
            .await
            .map_err(|e| map_io(e, target))
    }

    async fn write_file_at(&self, target: &str, contents: &str) -> FsResult<()> {
        let host = self.resolve(target)?;
        if host == self.root {
            return Err(FsError::NotAFile(String::new()));
        }
        if tokio::fs::metadata(&host).await.is_ok_and(|m| m.is_dir()) {
            return Err(FsError::NotAFile(path::canonical(target)));
        }
        tokio::fs::write(&host, contents)
            .await
            .map_err(|e| map_io(e, path::parent(&path::canonical(target))))
    }

    async fn read_dir_at(&self, target: &str) -> FsResult<Vec<DirEntryInfo>> {
        let host = self.resolve(target)?;
        let mut dir = tokio::fs::read_dir(&host)
            .await
            .map_err(|e| map_io(e, target))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = match entry.file_type().await {
                // 符号链接按目标类型列出；悬空链接当作文件
                Ok(file_type) if file_type.is_symlink() => tokio::fs::metadata(entry.path())
                    .await
                    .is_ok_and(|meta| meta.is_dir()),
                Ok(file_type) => file_type.is_dir(),
                Err(e) => {
                    tracing::debug!(name = %name, error = %e, "skipping entry without file type");
                    continue;
                }
            };
            entries.push(DirEntryInfo { name, is_dir });
        }
        Ok(entries)
    }

    async fn mkdir_at(&self, target: &str) -> FsResult<()> {
        let host = self.resolve(target)?;
        if tokio::fs::metadata(&host).await.is_ok() {
            return Err(FsError::AlreadyExists(path::canonical(target)));
        }
        tokio::fs::create_dir(&host)
            .await
            .map_err(|e| map_io(e, path::parent(&path::canonical(target))))
    }

    async fn rename_at(&self, from: &str, to: &str) -> FsResult<()> {
        let source = self.resolve(from)?;
        let dest = self.resolve(to)?;
        if tokio::fs::metadata(&source).await.is_err() {
            return Err(FsError::NotFound(path::canonical(from)));
        }
        if dest == self.root || tokio::fs::metadata(&dest).await.is_ok() {
            return Err(FsError::AlreadyExists(path::canonical(to)));
        }
        tokio::fs::rename(&source, &dest)
            .await
            .map_err(|e| map_io(e, to))
    }

    async fn rm_at(&self, target: &str, options: RemoveOptions) -> FsResult<()> {
        let host = self.resolve(target)?;
        if host == self.root {
            return Err(FsError::InvalidName(String::new()));
        }
        let meta = match tokio::fs::symlink_metadata(&host).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound && options.force => return Ok(()),
            Err(e) => return Err(map_io(e, target)),
        };
        if !meta.is_dir() {
            return tokio::fs::remove_file(&host)
                .await
                .map_err(|e| map_io(e, target));
        }
        if options.recursive {
            return tokio::fs::remove_dir_all(&host)
                .await
                .map_err(|e| map_io(e, target));
        }
        let mut dir = tokio::fs::read_dir(&host).await?;
        if dir.next_entry().await?.is_some() {
            return Err(FsError::DirectoryNotEmpty(path::canonical(target)));
        }
        tokio::fs::remove_dir(&host)
            .await
            .map_err(|e| map_io(e, target))
    }
}

fn map_io(e: io::Error, target: &str) -> FsError {
    match e.kind() {
        io::ErrorKind::NotFound => FsError::NotFound(path::canonical(target)),
        io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path::canonical(target)),
        _ => FsError::Io(e),
    }
}

fn watch_kind(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => Some(WatchEventKind::Rename),
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchEventKind::Rename),
        EventKind::Modify(_) => Some(WatchEventKind::Change),
        _ => None,
    }
}

impl SandboxFs for LocalFs {
    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, FsResult<String>> {
        Box::pin(self.read_file_at(path))
    }

    fn write_file<'a>(&'a self, path: &'a str, contents: &'a str) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(self.write_file_at(path, contents))
    }

    fn read_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, FsResult<Vec<DirEntryInfo>>> {
        Box::pin(self.read_dir_at(path))
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(self.mkdir_at(path))
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(self.rename_at(from, to))
    }

    fn rm<'a>(&'a self, path: &'a str, options: RemoveOptions) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(self.rm_at(path, options))
    }

    fn watch(&self, target: &str, callback: WatchCallback) -> FsResult<Subscription> {
        let host = self.resolve(target)?;
        let root = self.root.clone();
        let fs = LocalFs { root };
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else { return };
                let Some(kind) = watch_kind(&event.kind) else {
                    return;
                };
                for changed in &event.paths {
                    if let Some(path) = fs.to_virtual(changed) {
                        callback(&WatchEvent { kind, path });
                    }
                }
            },
            Config::default(),
        )
        .map_err(|e| FsError::Io(io::Error::other(e)))?;
        watcher
            .watch(&host, RecursiveMode::NonRecursive)
            .map_err(|e| match e.kind {
                notify::ErrorKind::PathNotFound => FsError::NotFound(path::canonical(target)),
                _ => FsError::Io(io::Error::other(e)),
            })?;
        tracing::debug!(path = %host.display(), "watching");
        Ok(Subscription::new(move || drop(watcher)))
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/local/fs.rs"]
mod tests;
