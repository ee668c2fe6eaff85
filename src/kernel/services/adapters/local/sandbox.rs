//! 本地沙箱：在一个临时工作目录里挂载文件树并运行真实进程。
//!
//! - stdout/stderr 以块为单位合并转发
//! - 输出里出现本地开发服务器地址时发出一次 `server-ready`
//! - 沙箱 shell `jsh` 映射到 `$SHELL`（缺省 `sh`）

use super::fs::LocalFs;
use crate::kernel::observe::lock;
use crate::kernel::services::ports::{
    BoxFuture, CommandSpec, RuntimeError, SandboxFs, SandboxRuntime, ServerReady, SpawnedProcess,
};
use crate::models::MountTree;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

pub const SANDBOX_SHELL: &str = "jsh";

const READ_CHUNK: usize = 4096;

/// Finds the first local server address in terminal output.
pub struct ReadyDetector {
    ansi: Regex,
    address: Regex,
}

impl ReadyDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            ansi: Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]")?,
            address: Regex::new(
                r"https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1\]):(\d{1,5})",
            )?,
        })
    }

    pub fn detect(&self, text: &str) -> Option<ServerReady> {
        let plain = self.ansi.replace_all(text, "");
        let captures = self.address.captures(&plain)?;
        let port: u16 = captures.get(1)?.as_str().parse().ok()?;
        Some(ServerReady {
            port,
            url: format!("http://localhost:{port}"),
        })
    }
}

type ReadySubscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<ServerReady>>>>;

pub struct LocalSandbox {
    fs: Arc<LocalFs>,
    booted: AtomicBool,
    detector: Arc<ReadyDetector>,
    ready_subscribers: ReadySubscribers,
}

impl LocalSandbox {
    /// Creates `root` when missing; mounted files land below it.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let detector = ReadyDetector::new().map_err(io::Error::other)?;
        Ok(Self {
            fs: Arc::new(LocalFs::new(root)),
            booted: AtomicBool::new(false),
            detector: Arc::new(detector),
            ready_subscribers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn root(&self) -> &Path {
        self.fs.root()
    }

    async fn boot_now(&self) -> Result<(), RuntimeError> {
        match tokio::fs::metadata(self.root()).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(RuntimeError::BootFailed(format!(
                    "{} is not a directory",
                    self.root().display()
                )))
            }
            Err(e) => return Err(RuntimeError::BootFailed(e.to_string())),
        }
        self.booted.store(true, Ordering::SeqCst);
        tracing::info!(root = %self.root().display(), "local sandbox booted");
        Ok(())
    }

    async fn mount_now(&self, tree: &MountTree) -> Result<(), RuntimeError> {
        if !self.booted.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotBooted);
        }
        for dir in tree.directories() {
            let host = self.fs.resolve(&dir)?;
            tokio::fs::create_dir_all(&host)
                .await
                .map_err(|e| RuntimeError::Mount(e.into()))?;
        }
        let files = tree.files();
        for (file, contents) in &files {
            let host = self.fs.resolve(file)?;
            tokio::fs::write(&host, contents)
                .await
                .map_err(|e| RuntimeError::Mount(e.into()))?;
        }
        tracing::debug!(files = files.len(), "mounted file tree");
        Ok(())
    }

    async fn spawn_now(&self, spec: &CommandSpec) -> Result<SpawnedProcess, RuntimeError> {
        if !self.booted.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotBooted);
        }
        let command_line = spec.command_line();
        let spawn_error = |message: String| RuntimeError::Spawn {
            command: command_line.clone(),
            message,
        };

        let mut cmd = Command::new(host_program(&spec.program));
        cmd.args(&spec.args)
            .current_dir(self.root())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error("stderr unavailable".to_string()))?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let announced = Arc::new(AtomicBool::new(false));

        for reader in [
            Box::new(stdout) as Box<dyn AsyncRead + Send + Unpin>,
            Box::new(stderr),
        ] {
            tokio::spawn(output_loop(
                command_line.clone(),
                reader,
                output_tx.clone(),
                ReadyWatch {
                    detector: Arc::clone(&self.detector),
                    subscribers: Arc::clone(&self.ready_subscribers),
                    announced: Arc::clone(&announced),
                },
            ));
        }
        drop(output_tx);
        tokio::spawn(input_loop(command_line.clone(), stdin, input_rx));
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to wait for process");
                    -1
                }
            };
            tracing::debug!(code, "process exited");
            let _ = exit_tx.send(code);
        });

        tracing::info!(command = %command_line, "spawned process");
        Ok(SpawnedProcess {
            output: output_rx,
            input: input_tx,
            exit: exit_rx,
        })
    }
}

fn host_program(program: &str) -> String {
    if program == SANDBOX_SHELL {
        return std::env::var("SHELL").unwrap_or_else(|_| "sh".to_string());
    }
    program.to_string()
}

struct ReadyWatch {
    detector: Arc<ReadyDetector>,
    subscribers: ReadySubscribers,
    /// Shared by the stdout and stderr readers of one process.
    announced: Arc<AtomicBool>,
}

impl ReadyWatch {
    fn scan(&self, text: &str) {
        if self.announced.load(Ordering::SeqCst) {
            return;
        }
        let Some(ready) = self.detector.detect(text) else {
            return;
        };
        if self.announced.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(port = ready.port, url = %ready.url, "server ready");
        lock(&self.subscribers).retain(|tx| tx.send(ready.clone()).is_ok());
    }
}

async fn output_loop(
    command: String,
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    output: mpsc::UnboundedSender<String>,
    ready: ReadyWatch,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut decoder = Utf8Decoder::default();
    // Unterminated last line, so addresses split across reads are still found.
    let mut line = String::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(command = %command, error = %e, "output read failed");
                break;
            }
        };
        let chunk = decoder.decode(&buf[..n]);
        if chunk.is_empty() {
            continue;
        }
        line.push_str(&chunk);
        ready.scan(&line);
        if let Some(index) = line.rfind('\n') {
            line.replace_range(..=index, "");
        }
        if line.len() > READ_CHUNK * 4 {
            line.clear();
        }
        let _ = output.send(chunk);
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = output.send(rest);
    }
    tracing::debug!(command = %command, "output loop ended");
}

/// Decodes a byte stream as UTF-8, holding back a character split across
/// reads until its remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flushes bytes of a character the stream never completed.
    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

async fn input_loop(
    command: String,
    mut stdin: tokio::process::ChildStdin,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(data) = rx.recv().await {
        if stdin.write_all(data.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdin.flush().await;
    }
    tracing::debug!(command = %command, "input loop ended");
}

impl SandboxRuntime for LocalSandbox {
    fn boot(&self) -> BoxFuture<'_, Result<(), RuntimeError>> {
        Box::pin(self.boot_now())
    }

    fn mount<'a>(&'a self, tree: &'a MountTree) -> BoxFuture<'a, Result<(), RuntimeError>> {
        Box::pin(self.mount_now(tree))
    }

    fn spawn<'a>(
        &'a self,
        command: &'a CommandSpec,
    ) -> BoxFuture<'a, Result<SpawnedProcess, RuntimeError>> {
        Box::pin(self.spawn_now(command))
    }

    fn fs(&self) -> Arc<dyn SandboxFs> {
        self.fs.clone()
    }

    fn server_ready(&self) -> mpsc::UnboundedReceiver<ServerReady> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.ready_subscribers).push(tx);
        rx
    }
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/local/sandbox.rs"]
mod tests;
