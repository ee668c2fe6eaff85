//! 虚拟文件树缓存。
//!
//! 目录列表按需读取并缓存；首次列出某目录时注册监听，文件系统变更使对应
//! 条目失效并在后台重新读取。重命名/删除先乐观更新本地显示，失败时回滚。

use crate::kernel::observe::{lock, Observers, Subscription};
use crate::kernel::services::ports::{
    AsyncExecutor, DirEntryInfo, FsError, RemoveOptions, SandboxFs, WatchEvent,
};
use crate::models::file_tree::{flatten_for_view, FileTreeRow, Listing, NodeKind};
use crate::models::path;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// The cached listing of this directory is out of date.
    Invalidated(String),
    /// Local display changed (listing stored, optimistic edit applied or reverted).
    Changed(String),
}

#[derive(Default)]
struct CacheEntry {
    listing: Option<Listing>,
    stale: bool,
    generation: u64,
    watch: Option<Subscription>,
}

#[derive(Default)]
struct TreeState {
    entries: FxHashMap<String, CacheEntry>,
    expanded: FxHashSet<String>,
}

struct Inner {
    fs: Arc<dyn SandboxFs>,
    executor: Arc<dyn AsyncExecutor>,
    state: Mutex<TreeState>,
    observers: Observers<TreeEvent>,
}

#[derive(Clone)]
pub struct FileTreeCache {
    inner: Arc<Inner>,
}

/// Undo record of an optimistic rename or removal.
struct Snapshot {
    parent: String,
    listing: Option<Listing>,
    /// `(current key, original key, entry)` of cache entries moved or removed.
    entries: Vec<(Option<String>, String, CacheEntry)>,
    expanded: Vec<(Option<String>, String)>,
}

impl FileTreeCache {
    pub fn new(fs: Arc<dyn SandboxFs>, executor: Arc<dyn AsyncExecutor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fs,
                executor,
                state: Mutex::new(TreeState::default()),
                observers: Observers::new(),
            }),
        }
    }

    pub fn fs(&self) -> Arc<dyn SandboxFs> {
        Arc::clone(&self.inner.fs)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TreeEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    /// Children of `dir`, from cache unless invalidated.
    pub async fn list_children(&self, dir: &str) -> Result<Listing, FsError> {
        let key = path::canonical(dir);
        let (generation, needs_watch) = {
            let mut state = lock(&self.inner.state);
            let entry = state.entries.entry(key.clone()).or_default();
            if let (Some(listing), false) = (&entry.listing, entry.stale) {
                return Ok(listing.clone());
            }
            (entry.generation, entry.watch.is_none())
        };

        if needs_watch {
            self.register_watch(&key);
        }

        let entries = self.inner.fs.read_dir(&key).await?;
        let listing = Listing::from_entries(entries.into_iter().map(entry_kind));

        let stored = {
            let mut state = lock(&self.inner.state);
            let current = state.entries.get(&key).map(|entry| entry.generation);
            if current == Some(generation) {
                let vanished = vanished_dirs(
                    state.entries.get(&key).and_then(|e| e.listing.as_ref()),
                    &listing,
                );
                if let Some(entry) = state.entries.get_mut(&key) {
                    entry.listing = Some(listing.clone());
                    entry.stale = false;
                }
                for dir in vanished {
                    prune(&mut state, &path::join(&key, &dir));
                }
                true
            } else {
                false
            }
        };

        if stored {
            self.inner.observers.notify(&TreeEvent::Changed(key));
        } else {
            tracing::debug!(path = %key, "discarding listing superseded by invalidation");
        }
        Ok(listing)
    }

    /// Cached listing without touching the filesystem.
    pub fn cached(&self, dir: &str) -> Option<Listing> {
        let key = path::canonical(dir);
        lock(&self.inner.state)
            .entries
            .get(&key)
            .and_then(|entry| entry.listing.clone())
    }

    pub fn is_stale(&self, dir: &str) -> bool {
        let key = path::canonical(dir);
        lock(&self.inner.state)
            .entries
            .get(&key)
            .map_or(true, |entry| entry.stale || entry.listing.is_none())
    }

    pub fn invalidate(&self, dir: &str) {
        invalidate_inner(&self.inner, &path::canonical(dir));
    }

    /// Invalidates every cached listing.
    pub fn refresh(&self) {
        let keys: Vec<String> = lock(&self.inner.state).entries.keys().cloned().collect();
        for key in keys {
            invalidate_inner(&self.inner, &key);
        }
    }

    pub fn is_expanded(&self, dir: &str) -> bool {
        let key = path::canonical(dir);
        key.is_empty() || lock(&self.inner.state).expanded.contains(&key)
    }

    pub async fn expand(&self, dir: &str) -> Result<Listing, FsError> {
        let key = path::canonical(dir);
        if !key.is_empty() {
            lock(&self.inner.state).expanded.insert(key.clone());
        }
        self.list_children(&key).await
    }

    /// Collapsing drops the cached descendants of `dir` and their watches.
    pub fn collapse(&self, dir: &str) {
        let key = path::canonical(dir);
        if key.is_empty() {
            return;
        }
        let removed = {
            let mut state = lock(&self.inner.state);
            state.expanded.remove(&key);
            let descendants: Vec<String> = state
                .entries
                .keys()
                .filter(|k| **k != key && path::is_within(k, &key))
                .cloned()
                .collect();
            state
                .expanded
                .retain(|e| !(e != &key && path::is_within(e, &key)));
            descendants
                .into_iter()
                .filter_map(|k| state.entries.remove(&k))
                .collect::<Vec<_>>()
        };
        drop(removed);
        self.inner.observers.notify(&TreeEvent::Changed(key));
    }

    pub async fn toggle(&self, dir: &str) -> Result<(), FsError> {
        if self.is_expanded(dir) {
            self.collapse(dir);
            Ok(())
        } else {
            self.expand(dir).await.map(|_| ())
        }
    }

    /// Expands every ancestor directory of `target` (and `target` itself
    /// when it is a directory path).
    pub async fn expand_to(&self, target: &str) -> Result<(), FsError> {
        let target = path::canonical(target);
        let mut dirs = Vec::new();
        let mut current = target.as_str();
        while !current.is_empty() {
            dirs.push(current.to_string());
            current = path::parent(current);
        }
        self.list_children("").await?;
        for dir in dirs.into_iter().rev() {
            let parent = path::parent(&dir).to_string();
            let is_dir = self
                .cached(&parent)
                .and_then(|listing| listing.kind_of(path::file_name(&dir)))
                == Some(NodeKind::Dir);
            if !is_dir {
                break;
            }
            self.expand(&dir).await?;
        }
        Ok(())
    }

    pub fn visible_rows(&self) -> Vec<FileTreeRow> {
        let state = lock(&self.inner.state);
        flatten_for_view(
            path::ROOT,
            |dir| state.entries.get(dir).and_then(|e| e.listing.clone()),
            |dir| state.expanded.contains(dir),
        )
    }

    /// Creates an empty file or directory under `parent`. Empty names are
    /// ignored.
    pub async fn create_entry(
        &self,
        parent: &str,
        name: &str,
        kind: NodeKind,
    ) -> Result<Option<String>, FsError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if name.contains('/') {
            return Err(FsError::InvalidName(name.to_string()));
        }
        let parent = path::canonical(parent);
        let target = path::join(&parent, name);
        match kind {
            NodeKind::File => self.inner.fs.write_file(&target, "").await?,
            NodeKind::Dir => self.inner.fs.mkdir(&target).await?,
        }
        tracing::info!(path = %target, ?kind, "created entry");
        self.invalidate(&parent);
        Ok(Some(target))
    }

    /// Renames `target` within its directory. The new name shows at once;
    /// a rejected rename restores the previous display.
    pub async fn rename(&self, target: &str, new_name: &str) -> Result<Option<String>, FsError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Ok(None);
        }
        if new_name.contains('/') {
            return Err(FsError::InvalidName(new_name.to_string()));
        }
        let from = path::canonical(target);
        let to = path::sibling(&from, new_name);
        if from == to {
            return Ok(Some(to));
        }

        let snapshot = self.apply_rename(&from, &to);
        self.notify_changed(&snapshot.parent);

        match self.inner.fs.rename(&from, &to).await {
            Ok(()) => {
                self.commit_moved(&to);
                self.invalidate(&snapshot.parent);
                tracing::info!(from = %from, to = %to, "renamed entry");
                Ok(Some(to))
            }
            Err(e) => {
                tracing::warn!(from = %from, to = %to, error = %e, "rename rejected, reverting");
                let parent = snapshot.parent.clone();
                self.revert(snapshot);
                self.notify_changed(&parent);
                Err(e)
            }
        }
    }

    /// Removes `target`. The entry disappears at once and comes back when
    /// the filesystem rejects the removal.
    pub async fn remove(&self, target: &str, recursive: bool) -> Result<(), FsError> {
        let key = path::canonical(target);
        if key.is_empty() {
            return Err(FsError::InvalidName(String::new()));
        }
        let snapshot = self.apply_remove(&key);
        self.notify_changed(&snapshot.parent);

        let options = RemoveOptions {
            recursive,
            force: true,
        };
        match self.inner.fs.rm(&key, options).await {
            Ok(()) => {
                let parent = snapshot.parent.clone();
                drop(snapshot);
                self.invalidate(&parent);
                tracing::info!(path = %key, "removed entry");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "remove rejected, reverting");
                let parent = snapshot.parent.clone();
                self.revert(snapshot);
                self.notify_changed(&parent);
                Err(e)
            }
        }
    }

    fn notify_changed(&self, dir: &str) {
        self.inner
            .observers
            .notify(&TreeEvent::Changed(dir.to_string()));
    }

    fn register_watch(&self, key: &str) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let watched = key.to_string();
        let callback = Arc::new(move |event: &WatchEvent| {
            if let Some(inner) = weak.upgrade() {
                tracing::trace!(path = %watched, changed = %event.path, "watch event");
                invalidate_inner(&inner, &watched);
            }
        });
        match self.inner.fs.watch(key, callback) {
            Ok(subscription) => {
                let mut state = lock(&self.inner.state);
                match state.entries.get_mut(key) {
                    Some(entry) if entry.watch.is_none() => entry.watch = Some(subscription),
                    _ => drop(subscription),
                }
            }
            Err(e) => tracing::warn!(path = %key, error = %e, "failed to watch directory"),
        }
    }

    fn apply_rename(&self, from: &str, to: &str) -> Snapshot {
        let parent = path::parent(from).to_string();
        let mut state = lock(&self.inner.state);
        let listing = state.entries.get(&parent).and_then(|e| e.listing.clone());
        if let Some(entry) = state.entries.get_mut(&parent) {
            if let Some(current) = entry.listing.as_mut() {
                current.rename(path::file_name(from), path::file_name(to));
            }
        }

        let moved_keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| path::is_within(k, from))
            .cloned()
            .collect();
        let mut entries = Vec::new();
        for old in moved_keys {
            if let (Some(entry), Some(new)) = (state.entries.remove(&old), path::rebase(&old, from, to)) {
                state.entries.insert(new.clone(), entry);
                entries.push((Some(new), old, CacheEntry::default()));
            }
        }

        let moved_expanded: Vec<String> = state
            .expanded
            .iter()
            .filter(|k| path::is_within(k, from))
            .cloned()
            .collect();
        let mut expanded = Vec::new();
        for old in moved_expanded {
            state.expanded.remove(&old);
            if let Some(new) = path::rebase(&old, from, to) {
                state.expanded.insert(new.clone());
                expanded.push((Some(new), old));
            }
        }

        Snapshot {
            parent,
            listing,
            entries,
            expanded,
        }
    }

    /// Moved entries keep their listings for display but are re-read, and
    /// re-watched, on next access.
    fn commit_moved(&self, root: &str) {
        let mut state = lock(&self.inner.state);
        let keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| path::is_within(k, root))
            .cloned()
            .collect();
        for key in keys {
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.watch = None;
                entry.stale = true;
                entry.generation += 1;
            }
        }
    }

    fn apply_remove(&self, key: &str) -> Snapshot {
        let parent = path::parent(key).to_string();
        let mut state = lock(&self.inner.state);
        let listing = state.entries.get(&parent).and_then(|e| e.listing.clone());
        if let Some(entry) = state.entries.get_mut(&parent) {
            if let Some(current) = entry.listing.as_mut() {
                current.remove(path::file_name(key));
            }
        }

        let removed_keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| path::is_within(k, key))
            .cloned()
            .collect();
        let entries = removed_keys
            .into_iter()
            .filter_map(|k| state.entries.remove(&k).map(|entry| (None, k, entry)))
            .collect();

        let removed_expanded: Vec<String> = state
            .expanded
            .iter()
            .filter(|k| path::is_within(k, key))
            .cloned()
            .collect();
        let expanded = removed_expanded
            .into_iter()
            .map(|k| {
                state.expanded.remove(&k);
                (None, k)
            })
            .collect();

        Snapshot {
            parent,
            listing,
            entries,
            expanded,
        }
    }

    fn revert(&self, snapshot: Snapshot) {
        let mut state = lock(&self.inner.state);
        for (current, original, saved) in snapshot.entries {
            let entry = match current {
                Some(current) => state.entries.remove(&current).unwrap_or(saved),
                None => saved,
            };
            state.entries.insert(original, entry);
        }
        for (current, original) in snapshot.expanded {
            if let Some(current) = current {
                state.expanded.remove(&current);
            }
            state.expanded.insert(original);
        }
        if let Some(entry) = state.entries.get_mut(&snapshot.parent) {
            entry.listing = snapshot.listing;
        }
    }
}

/// Marks `key` stale and, when a listing was already shown, schedules a
/// refetch that stores the fresh listing.
fn invalidate_inner(inner: &Arc<Inner>, key: &str) {
    let refetch = {
        let mut state = lock(&inner.state);
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        entry.generation += 1;
        entry.stale = true;
        entry.listing.is_some()
    };
    inner
        .observers
        .notify(&TreeEvent::Invalidated(key.to_string()));

    if refetch {
        let weak = Arc::downgrade(inner);
        let key = key.to_string();
        inner.executor.spawn(Box::pin(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let cache = FileTreeCache { inner };
            if let Err(e) = cache.list_children(&key).await {
                tracing::debug!(path = %key, error = %e, "refetch failed");
            }
        }));
    }
}

fn entry_kind(entry: DirEntryInfo) -> (String, NodeKind) {
    let kind = if entry.is_dir {
        NodeKind::Dir
    } else {
        NodeKind::File
    };
    (entry.name, kind)
}

fn vanished_dirs(previous: Option<&Listing>, next: &Listing) -> Vec<String> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    previous
        .directories
        .iter()
        .filter(|dir| !next.directories.contains(dir))
        .cloned()
        .collect()
}

fn prune(state: &mut TreeState, root: &str) {
    state.entries.retain(|k, _| !path::is_within(k, root));
    state.expanded.retain(|k| !path::is_within(k, root));
}

/// Recursively collects file paths under `root`, skipping entries for which
/// `skip` returns true. A directory that cannot be read is logged and
/// skipped. Files of a directory come before those of its subdirectories.
pub async fn walk_files<F>(fs: &dyn SandboxFs, root: &str, skip: F) -> Vec<String>
where
    F: Fn(&DirEntryInfo) -> bool,
{
    let mut files = Vec::new();
    let mut stack = vec![path::canonical(root)];

    while let Some(dir) = stack.pop() {
        let entries = match fs.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %dir, error = %e, "skipping unreadable directory");
                continue;
            }
        };
        let listing = Listing::from_entries(
            entries
                .into_iter()
                .filter(|entry| !skip(entry))
                .map(entry_kind),
        );
        files.extend(listing.files.iter().map(|name| path::join(&dir, name)));
        for name in listing.directories.iter().rev() {
            stack.push(path::join(&dir, name));
        }
    }

    files
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/tree.rs"]
mod tests;
