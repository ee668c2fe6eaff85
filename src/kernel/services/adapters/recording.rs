//! 记录型外部协作者：终端与代码智能层的内存实现。

use crate::kernel::compiler_options::CompilerOptions;
use crate::kernel::observe::lock;
use crate::kernel::services::ports::{CodeIntel, TerminalSink};
use lsp_types::Url;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// Collects everything written to the terminal.
#[derive(Default)]
pub struct BufferTerminal {
    chunks: Mutex<Vec<String>>,
}

impl BufferTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> Vec<String> {
        lock(&self.chunks).clone()
    }

    pub fn text(&self) -> String {
        lock(&self.chunks).concat()
    }

    /// Terminal text split on `\r\n`, without the trailing empty line.
    pub fn lines(&self) -> Vec<String> {
        let text = self.text();
        let mut lines: Vec<String> = text.split("\r\n").map(str::to_string).collect();
        if lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }
        lines
    }
}

impl TerminalSink for BufferTerminal {
    fn write(&self, text: &str) {
        lock(&self.chunks).push(text.to_string());
    }
}

/// Writes terminal output to the process stdout.
#[derive(Default)]
pub struct StdoutTerminal;

impl TerminalSink for StdoutTerminal {
    fn write(&self, text: &str) {
        use std::io::Write;
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.replace("\r\n", "\n").as_bytes());
        let _ = stdout.flush();
    }
}

#[derive(Default)]
struct IntelState {
    models: FxHashMap<Url, String>,
    active: Option<Url>,
    extra_libs: Vec<(Url, String)>,
    compiler_options: Vec<CompilerOptions>,
}

/// In-memory code-intelligence layer that records every call.
#[derive(Default)]
pub struct RecordingCodeIntel {
    state: Mutex<IntelState>,
}

impl RecordingCodeIntel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self, uri: &Url) -> Option<String> {
        lock(&self.state).models.get(uri).cloned()
    }

    pub fn model_count(&self) -> usize {
        lock(&self.state).models.len()
    }

    pub fn active_model(&self) -> Option<Url> {
        lock(&self.state).active.clone()
    }

    pub fn extra_libs(&self) -> Vec<(Url, String)> {
        lock(&self.state).extra_libs.clone()
    }

    pub fn compiler_options(&self) -> Vec<CompilerOptions> {
        lock(&self.state).compiler_options.clone()
    }
}

impl CodeIntel for RecordingCodeIntel {
    fn has_model(&self, uri: &Url) -> bool {
        lock(&self.state).models.contains_key(uri)
    }

    fn create_model(&self, contents: &str, uri: &Url) {
        lock(&self.state)
            .models
            .entry(uri.clone())
            .or_insert_with(|| contents.to_string());
    }

    fn set_active_model(&self, uri: &Url) {
        lock(&self.state).active = Some(uri.clone());
    }

    fn add_extra_lib(&self, source: &str, uri: &Url) {
        lock(&self.state)
            .extra_libs
            .push((uri.clone(), source.to_string()));
    }

    fn set_compiler_options(&self, options: &CompilerOptions) {
        lock(&self.state).compiler_options.push(options.clone());
    }
}
