//! 内存沙箱：完整的虚拟文件系统 + 脚本化进程。
//!
//! 监听通知同步派发（写操作返回前回调已执行），供测试与嵌入方使用。

use crate::kernel::observe::{lock, Subscription};
use crate::kernel::services::ports::{
    BoxFuture, CommandSpec, DirEntryInfo, FsError, FsResult, RemoveOptions, RuntimeError,
    SandboxFs, SandboxRuntime, ServerReady, SpawnedProcess, WatchCallback, WatchEvent,
    WatchEventKind,
};
use crate::models::{path, MountNode, MountTree};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

new_key_type! { struct WatcherId; }

#[derive(Debug, Clone)]
enum Entry {
    File(String),
    Dir,
}

struct Watcher {
    path: String,
    callback: WatchCallback,
}

#[derive(Default)]
struct FsState {
    /// Keyed by normalized path; the root is implicit.
    nodes: BTreeMap<String, Entry>,
    failures: FxHashSet<String>,
}

#[derive(Default)]
pub struct MemoryFs {
    state: Mutex<FsState>,
    watchers: Arc<Mutex<SlotMap<WatcherId, Watcher>>>,
    read_dir_calls: AtomicUsize,
    read_file_calls: AtomicUsize,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tree(tree: &MountTree) -> Self {
        let fs = Self::new();
        fs.load_tree(tree);
        fs
    }

    /// Writes the tree without notifying watchers.
    pub fn load_tree(&self, tree: &MountTree) {
        let mut state = lock(&self.state);
        load_into(&mut state.nodes, "", tree);
    }

    /// Creates or overwrites a file from outside the workspace, creating
    /// missing parents, and notifies watchers.
    pub fn insert_file(&self, file: &str, contents: &str) {
        let key = path::normalize(file);
        let created = {
            let mut state = lock(&self.state);
            let mut parent = path::parent(&key);
            while !parent.is_empty() {
                state.nodes.insert(parent.to_string(), Entry::Dir);
                parent = path::parent(parent);
            }
            state
                .nodes
                .insert(key.clone(), Entry::File(contents.to_string()))
                .is_none()
        };
        let kind = if created {
            WatchEventKind::Rename
        } else {
            WatchEventKind::Change
        };
        self.emit(kind, &key);
    }

    /// Every subsequent operation touching `path` fails with an IO error.
    pub fn fail_on(&self, target: &str) {
        lock(&self.state).failures.insert(path::normalize(target));
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    pub fn contents(&self, file: &str) -> Option<String> {
        match lock(&self.state).nodes.get(&path::normalize(file)) {
            Some(Entry::File(contents)) => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, target: &str) -> bool {
        let key = path::normalize(target);
        key.is_empty() || lock(&self.state).nodes.contains_key(&key)
    }

    pub fn read_dir_calls(&self) -> usize {
        self.read_dir_calls.load(Ordering::SeqCst)
    }

    pub fn read_file_calls(&self) -> usize {
        self.read_file_calls.load(Ordering::SeqCst)
    }

    pub fn watcher_count(&self) -> usize {
        lock(&self.watchers).len()
    }

    fn check_failure(state: &FsState, key: &str) -> FsResult<()> {
        if state.failures.contains(key) {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure: {}", path::canonical(key)),
            )));
        }
        Ok(())
    }

    fn is_dir(state: &FsState, key: &str) -> bool {
        key.is_empty() || matches!(state.nodes.get(key), Some(Entry::Dir))
    }

    fn require_parent(state: &FsState, key: &str) -> FsResult<()> {
        let parent = path::parent(key);
        if Self::is_dir(state, parent) {
            Ok(())
        } else if state.nodes.contains_key(parent) {
            Err(FsError::NotADirectory(path::canonical(parent)))
        } else {
            Err(FsError::NotFound(path::canonical(parent)))
        }
    }

    fn descendants(state: &FsState, key: &str) -> Vec<String> {
        let prefix = format!("{key}/");
        state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Notifies watchers of `key` itself and of its parent directory.
    fn emit(&self, kind: WatchEventKind, key: &str) {
        let parent = path::parent(key);
        let callbacks: Vec<WatchCallback> = lock(&self.watchers)
            .values()
            .filter(|w| w.path == key || w.path == parent)
            .map(|w| Arc::clone(&w.callback))
            .collect();
        let event = WatchEvent {
            kind,
            path: path::canonical(key),
        };
        for callback in callbacks {
            callback(&event);
        }
    }

    fn read_file_now(&self, file: &str) -> FsResult<String> {
        self.read_file_calls.fetch_add(1, Ordering::SeqCst);
        let key = path::normalize(file);
        let state = lock(&self.state);
        Self::check_failure(&state, &key)?;
        match state.nodes.get(&key) {
            Some(Entry::File(contents)) => Ok(contents.clone()),
            Some(Entry::Dir) => Err(FsError::NotAFile(path::canonical(&key))),
            None => Err(FsError::NotFound(path::canonical(&key))),
        }
    }

    fn write_file_now(&self, file: &str, contents: &str) -> FsResult<()> {
        let key = path::normalize(file);
        if key.is_empty() {
            return Err(FsError::NotAFile(String::new()));
        }
        let created = {
            let mut state = lock(&self.state);
            Self::check_failure(&state, &key)?;
            Self::require_parent(&state, &key)?;
            if let Some(Entry::Dir) = state.nodes.get(&key) {
                return Err(FsError::NotAFile(path::canonical(&key)));
            }
            state
                .nodes
                .insert(key.clone(), Entry::File(contents.to_string()))
                .is_none()
        };
        let kind = if created {
            WatchEventKind::Rename
        } else {
            WatchEventKind::Change
        };
        self.emit(kind, &key);
        Ok(())
    }

    fn read_dir_now(&self, dir: &str) -> FsResult<Vec<DirEntryInfo>> {
        self.read_dir_calls.fetch_add(1, Ordering::SeqCst);
        let key = path::normalize(dir);
        let state = lock(&self.state);
        Self::check_failure(&state, &key)?;
        if !Self::is_dir(&state, &key) {
            return Err(match state.nodes.get(&key) {
                Some(_) => FsError::NotADirectory(path::canonical(&key)),
                None => FsError::NotFound(path::canonical(&key)),
            });
        }
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };
        Ok(state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, entry)| {
                let name = &k[prefix.len()..];
                if name.contains('/') {
                    return None;
                }
                Some(match entry {
                    Entry::Dir => DirEntryInfo::dir(name),
                    Entry::File(_) => DirEntryInfo::file(name),
                })
            })
            .collect())
    }

    fn mkdir_now(&self, dir: &str) -> FsResult<()> {
        let key = path::normalize(dir);
        {
            let mut state = lock(&self.state);
            Self::check_failure(&state, &key)?;
            if Self::is_dir(&state, &key) || state.nodes.contains_key(&key) {
                return Err(FsError::AlreadyExists(path::canonical(&key)));
            }
            Self::require_parent(&state, &key)?;
            state.nodes.insert(key.clone(), Entry::Dir);
        }
        self.emit(WatchEventKind::Rename, &key);
        Ok(())
    }

    fn rename_now(&self, from: &str, to: &str) -> FsResult<()> {
        let from_key = path::normalize(from);
        let to_key = path::normalize(to);
        {
            let mut state = lock(&self.state);
            Self::check_failure(&state, &from_key)?;
            Self::check_failure(&state, &to_key)?;
            if !state.nodes.contains_key(&from_key) {
                return Err(FsError::NotFound(path::canonical(&from_key)));
            }
            if to_key.is_empty() || state.nodes.contains_key(&to_key) {
                return Err(FsError::AlreadyExists(path::canonical(&to_key)));
            }
            Self::require_parent(&state, &to_key)?;

            let mut moved = vec![from_key.clone()];
            moved.extend(Self::descendants(&state, &from_key));
            for old in moved {
                if let Some(entry) = state.nodes.remove(&old) {
                    let new = format!("{to_key}{}", &old[from_key.len()..]);
                    state.nodes.insert(new, entry);
                }
            }
        }
        self.emit(WatchEventKind::Rename, &from_key);
        self.emit(WatchEventKind::Rename, &to_key);
        Ok(())
    }

    fn rm_now(&self, target: &str, options: RemoveOptions) -> FsResult<()> {
        let key = path::normalize(target);
        {
            let mut state = lock(&self.state);
            Self::check_failure(&state, &key)?;
            if !state.nodes.contains_key(&key) {
                return if options.force {
                    Ok(())
                } else {
                    Err(FsError::NotFound(path::canonical(&key)))
                };
            }
            let descendants = Self::descendants(&state, &key);
            if !descendants.is_empty() && !options.recursive {
                return Err(FsError::DirectoryNotEmpty(path::canonical(&key)));
            }
            for child in descendants {
                state.nodes.remove(&child);
            }
            state.nodes.remove(&key);
        }
        self.emit(WatchEventKind::Rename, &key);
        Ok(())
    }
}

fn load_into(nodes: &mut BTreeMap<String, Entry>, prefix: &str, tree: &MountTree) {
    for (name, node) in tree.entries() {
        let key = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };
        match node {
            MountNode::File { contents } => {
                nodes.insert(key, Entry::File(contents.clone()));
            }
            MountNode::Directory(children) => {
                nodes.insert(key.clone(), Entry::Dir);
                load_into(nodes, &key, children);
            }
        }
    }
}

impl SandboxFs for MemoryFs {
    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, FsResult<String>> {
        Box::pin(async move { self.read_file_now(path) })
    }

    fn write_file<'a>(&'a self, path: &'a str, contents: &'a str) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(async move { self.write_file_now(path, contents) })
    }

    fn read_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, FsResult<Vec<DirEntryInfo>>> {
        Box::pin(async move { self.read_dir_now(path) })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(async move { self.mkdir_now(path) })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(async move { self.rename_now(from, to) })
    }

    fn rm<'a>(&'a self, path: &'a str, options: RemoveOptions) -> BoxFuture<'a, FsResult<()>> {
        Box::pin(async move { self.rm_now(path, options) })
    }

    fn watch(&self, target: &str, callback: WatchCallback) -> FsResult<Subscription> {
        let id = lock(&self.watchers).insert(Watcher {
            path: path::normalize(target),
            callback,
        });
        let watchers = Arc::downgrade(&self.watchers);
        Ok(Subscription::new(move || {
            if let Some(watchers) = watchers.upgrade() {
                lock(&watchers).remove(id);
            }
        }))
    }
}

/// Scripted behavior of one command line. Output is delivered in full at
/// spawn time, after which the output stream closes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProcess {
    pub output: Vec<String>,
    /// `None` keeps the process running for the sandbox lifetime.
    pub exit_code: Option<i32>,
    pub server_ready: Option<ServerReady>,
    pub spawn_error: Option<String>,
}

impl ScriptedProcess {
    pub fn exits(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn running() -> Self {
        Self::default()
    }

    pub fn spawn_fails(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_output<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_server_ready(mut self, port: u16, url: impl Into<String>) -> Self {
        self.server_ready = Some(ServerReady {
            port,
            url: url.into(),
        });
        self
    }
}

/// Exit sender of a process that never exits.
struct LiveProcess {
    _exit: oneshot::Sender<i32>,
}

#[derive(Default)]
struct SandboxState {
    booted: bool,
    boot_error: Option<String>,
    boot_calls: usize,
    mounted: Vec<MountTree>,
    scripts: FxHashMap<String, ScriptedProcess>,
    spawned: Vec<String>,
    stdin: FxHashMap<String, mpsc::UnboundedReceiver<String>>,
    live: Vec<LiveProcess>,
    ready_subscribers: Vec<mpsc::UnboundedSender<ServerReady>>,
}

#[derive(Default)]
pub struct MemorySandbox {
    fs: Arc<MemoryFs>,
    state: Mutex<SandboxState>,
}

impl MemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory_fs(&self) -> Arc<MemoryFs> {
        Arc::clone(&self.fs)
    }

    pub fn fail_boot(&self, message: impl Into<String>) {
        lock(&self.state).boot_error = Some(message.into());
    }

    pub fn script(&self, command_line: impl Into<String>, process: ScriptedProcess) {
        lock(&self.state)
            .scripts
            .insert(command_line.into(), process);
    }

    pub fn boot_calls(&self) -> usize {
        lock(&self.state).boot_calls
    }

    pub fn mounted(&self) -> Vec<MountTree> {
        lock(&self.state).mounted.clone()
    }

    /// Command lines in spawn order.
    pub fn spawned(&self) -> Vec<String> {
        lock(&self.state).spawned.clone()
    }

    /// Input written so far to the most recent process started with `command_line`.
    pub fn take_stdin(&self, command_line: &str) -> Vec<String> {
        let mut state = lock(&self.state);
        let Some(rx) = state.stdin.get_mut(command_line) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        while let Ok(data) = rx.try_recv() {
            out.push(data);
        }
        out
    }

    pub fn emit_server_ready(&self, port: u16, url: impl Into<String>) {
        let event = ServerReady {
            port,
            url: url.into(),
        };
        lock(&self.state)
            .ready_subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn spawn_now(&self, command: &CommandSpec) -> Result<SpawnedProcess, RuntimeError> {
        let command_line = command.command_line();
        let mut state = lock(&self.state);
        if !state.booted {
            return Err(RuntimeError::NotBooted);
        }
        let script = state
            .scripts
            .get(&command_line)
            .cloned()
            .unwrap_or_else(ScriptedProcess::running);
        if let Some(message) = script.spawn_error {
            return Err(RuntimeError::Spawn {
                command: command_line,
                message,
            });
        }
        state.spawned.push(command_line.clone());

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        for chunk in script.output {
            let _ = output_tx.send(chunk);
        }
        drop(output_tx);
        state.stdin.insert(command_line, input_rx);
        match script.exit_code {
            Some(code) => {
                let _ = exit_tx.send(code);
            }
            None => state.live.push(LiveProcess { _exit: exit_tx }),
        }
        if let Some(ready) = script.server_ready {
            state
                .ready_subscribers
                .retain(|tx| tx.send(ready.clone()).is_ok());
        }

        Ok(SpawnedProcess {
            output: output_rx,
            input: input_tx,
            exit: exit_rx,
        })
    }
}

impl SandboxRuntime for MemorySandbox {
    fn boot(&self) -> BoxFuture<'_, Result<(), RuntimeError>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.boot_calls += 1;
            if let Some(message) = state.boot_error.clone() {
                return Err(RuntimeError::BootFailed(message));
            }
            state.booted = true;
            Ok(())
        })
    }

    fn mount<'a>(&'a self, tree: &'a MountTree) -> BoxFuture<'a, Result<(), RuntimeError>> {
        Box::pin(async move {
            {
                let mut state = lock(&self.state);
                if !state.booted {
                    return Err(RuntimeError::NotBooted);
                }
                state.mounted.push(tree.clone());
            }
            self.fs.load_tree(tree);
            Ok(())
        })
    }

    fn spawn<'a>(
        &'a self,
        command: &'a CommandSpec,
    ) -> BoxFuture<'a, Result<SpawnedProcess, RuntimeError>> {
        Box::pin(async move { self.spawn_now(command) })
    }

    fn fs(&self) -> Arc<dyn SandboxFs> {
        self.fs.clone()
    }

    fn server_ready(&self) -> mpsc::UnboundedReceiver<ServerReady> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).ready_subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/adapters/memory.rs"]
mod tests;
