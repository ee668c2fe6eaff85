//! 多文件搜索与替换。
//!
//! 查询按标志组合成正则：非正则模式先转义，全词匹配包裹 `\b…\b`，默认不区分
//! 大小写。每次组合结果或运行时就绪状态变化都会重新扫描；较新的扫描使较旧
//! 的结果作废。

use crate::kernel::observe::{lock, Generation, Observers, Subscription};
use crate::kernel::services::ports::{
    DirEntryInfo, FileMatches, MatchRange, SearchError, SearchFlags,
};
use crate::kernel::services::SessionContext;
use crate::kernel::tree::walk_files;
use crate::models::path;
use regex::{NoExpand, Regex, RegexBuilder};
use std::sync::{Arc, Mutex};

pub fn compose_pattern(query: &str, flags: SearchFlags) -> String {
    let pattern = if flags.is_regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    if flags.is_whole_word {
        format!(r"\b{pattern}\b")
    } else {
        pattern
    }
}

pub fn compose_regex(query: &str, flags: SearchFlags) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&compose_pattern(query, flags))
        .case_insensitive(!flags.is_case_sensitive)
        .build()
}

/// Every non-overlapping match, as byte ranges.
pub fn matched_ranges(regex: &Regex, source: &str) -> Vec<MatchRange> {
    regex
        .find_iter(source)
        .map(|m| MatchRange::new(m.start(), m.end()))
        .collect()
}

/// First match only; used for single-line previews.
pub fn first_match(regex: &Regex, source: &str) -> Option<MatchRange> {
    regex
        .find(source)
        .map(|m| MatchRange::new(m.start(), m.end()))
}

/// Replaces `delete_count` bytes at `start` with `insert`. Out-of-range
/// values are clamped and offsets inside a character move back to its start.
pub fn splice_string(source: &str, start: usize, delete_count: usize, insert: &str) -> String {
    let start = floor_char_boundary(source, start.min(source.len()));
    let end = floor_char_boundary(source, start.saturating_add(delete_count).min(source.len()));
    let mut out = String::with_capacity(source.len() - (end - start) + insert.len());
    out.push_str(&source[..start]);
    out.push_str(insert);
    out.push_str(&source[end..]);
    out
}

fn floor_char_boundary(source: &str, mut index: usize) -> usize {
    while index > 0 && !source.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// Results replaced; carries the number of files with matches.
    Results(usize),
    Error(String),
}

#[derive(Default)]
struct SearchState {
    query: String,
    flags: SearchFlags,
    ready: bool,
    results: Vec<FileMatches>,
    error: Option<String>,
    scans: usize,
}

impl SearchState {
    /// `None` when there is nothing to search for.
    fn composed(&self) -> Option<String> {
        (!self.query.is_empty()).then(|| {
            format!(
                "{}/{}",
                compose_pattern(&self.query, self.flags),
                self.flags.is_case_sensitive
            )
        })
    }
}

struct Inner {
    ctx: SessionContext,
    state: Mutex<SearchState>,
    generation: Generation,
    observers: Observers<SearchEvent>,
}

#[derive(Clone)]
pub struct SearchEngine {
    inner: Arc<Inner>,
}

impl SearchEngine {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                state: Mutex::new(SearchState::default()),
                generation: Generation::new(),
                observers: Observers::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SearchEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    pub fn query(&self) -> String {
        lock(&self.inner.state).query.clone()
    }

    pub fn flags(&self) -> SearchFlags {
        lock(&self.inner.state).flags
    }

    pub fn results(&self) -> Vec<FileMatches> {
        lock(&self.inner.state).results.clone()
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.inner.state).error.clone()
    }

    /// Number of filesystem scans performed so far.
    pub fn scans(&self) -> usize {
        lock(&self.inner.state).scans
    }

    pub fn set_query(&self, query: &str) {
        self.update(|state| state.query = query.to_string());
    }

    pub fn set_flags(&self, flags: SearchFlags) {
        self.update(|state| state.flags = flags);
    }

    /// Runtime readiness gates scanning.
    pub fn set_ready(&self, ready: bool) {
        self.update(|state| state.ready = ready);
    }

    fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut SearchState),
    {
        let changed = {
            let mut state = lock(&self.inner.state);
            let before = (state.composed(), state.ready);
            apply(&mut state);
            before != (state.composed(), state.ready)
        };
        if changed {
            let engine = self.clone();
            self.inner.ctx.spawn_future(async move {
                if let Err(e) = engine.search().await {
                    tracing::debug!(error = %e, "background search failed");
                }
            });
        }
    }

    /// Recomputes results for the current query. An empty query or a runtime
    /// that is not ready clears results without scanning.
    pub async fn search(&self) -> Result<Vec<FileMatches>, SearchError> {
        let generation = self.inner.generation.next();
        let (query, flags, ready) = {
            let state = lock(&self.inner.state);
            (state.query.clone(), state.flags, state.ready)
        };

        if query.is_empty() || !ready {
            self.store(generation, Vec::new(), None);
            return Ok(Vec::new());
        }

        let regex = match compose_regex(&query, flags) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::debug!(query = %query, error = %e, "invalid search pattern");
                self.store(generation, Vec::new(), Some(e.to_string()));
                return Err(SearchError::InvalidRegex(e));
            }
        };

        lock(&self.inner.state).scans += 1;
        let results = self.scan(&regex).await;
        if !self.store(generation, results.clone(), None) {
            tracing::debug!(generation, "discarding superseded search results");
        }
        Ok(results)
    }

    async fn scan(&self, regex: &Regex) -> Vec<FileMatches> {
        let fs = self.inner.ctx.fs();
        let config = &self.inner.ctx.config().search;
        let skip = |entry: &DirEntryInfo| {
            let excluded = if entry.is_dir {
                &config.exclude_dirs
            } else {
                &config.exclude_files
            };
            excluded.iter().any(|name| *name == entry.name)
        };
        let files = walk_files(fs.as_ref(), path::ROOT, skip).await;

        let mut results = Vec::new();
        for file in files {
            let source = match fs.read_file(&file).await {
                Ok(source) => source,
                Err(e) => {
                    tracing::debug!(path = %file, error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let ranges = matched_ranges(regex, &source);
            if !ranges.is_empty() {
                results.push(FileMatches {
                    path: file,
                    source,
                    ranges,
                });
            }
        }
        results
    }

    /// Stores results of `generation` if no newer search started.
    fn store(&self, generation: u64, results: Vec<FileMatches>, error: Option<String>) -> bool {
        if !self.inner.generation.is_current(generation) {
            return false;
        }
        let files = results.len();
        {
            let mut state = lock(&self.inner.state);
            state.results = results;
            state.error = error.clone();
        }
        let event = match error {
            Some(message) => SearchEvent::Error(message),
            None => SearchEvent::Results(files),
        };
        self.inner.observers.notify(&event);
        true
    }

    /// Replaces every match in every result file. Files changed since the
    /// search are skipped. Returns the number of replaced matches.
    pub async fn replace_all(&self, replacement: &str) -> Result<usize, SearchError> {
        let targets: Vec<String> = lock(&self.inner.state)
            .results
            .iter()
            .map(|file| file.path.clone())
            .collect();
        let mut replaced = 0;
        for target in targets {
            match self.replace_file_matches(&target, replacement).await {
                Ok(count) => replaced += count,
                Err(SearchError::StaleMatch(path)) => {
                    tracing::warn!(path = %path, "file changed since search, not replacing");
                }
                Err(e) => return Err(e),
            }
        }
        self.search().await?;
        Ok(replaced)
    }

    /// Replaces every match in one result file.
    pub async fn replace_in_file(&self, target: &str, replacement: &str) -> Result<usize, SearchError> {
        let replaced = self.replace_file_matches(target, replacement).await?;
        self.search().await?;
        Ok(replaced)
    }

    /// Replaces the `index`-th match of a result file.
    pub async fn replace_match(
        &self,
        target: &str,
        index: usize,
        replacement: &str,
    ) -> Result<(), SearchError> {
        let (regex, flags, file) = self.prepare(target)?;
        let Some(range) = file.ranges.get(index).copied() else {
            return Ok(());
        };
        let fs = self.inner.ctx.fs();
        let current = fs.read_file(&file.path).await?;
        if current != file.source {
            return Err(SearchError::StaleMatch(file.path));
        }

        let insert = if flags.is_regex {
            let mut expanded = String::new();
            if let Some(caps) = regex.captures_at(&current, range.start) {
                caps.expand(replacement, &mut expanded);
            }
            expanded
        } else {
            replacement.to_string()
        };
        let updated = splice_string(&current, range.start, range.end - range.start, &insert);
        fs.write_file(&file.path, &updated).await?;
        tracing::info!(path = %file.path, index, "replaced match");
        self.search().await?;
        Ok(())
    }

    async fn replace_file_matches(
        &self,
        target: &str,
        replacement: &str,
    ) -> Result<usize, SearchError> {
        let (regex, flags, file) = self.prepare(target)?;
        let fs = self.inner.ctx.fs();
        let current = fs.read_file(&file.path).await?;
        if current != file.source {
            return Err(SearchError::StaleMatch(file.path));
        }
        let updated = if flags.is_regex {
            regex.replace_all(&current, replacement)
        } else {
            regex.replace_all(&current, NoExpand(replacement))
        };
        fs.write_file(&file.path, &updated).await?;
        tracing::info!(path = %file.path, matches = file.ranges.len(), "replaced matches");
        Ok(file.ranges.len())
    }

    fn prepare(&self, target: &str) -> Result<(Regex, SearchFlags, FileMatches), SearchError> {
        let target = path::canonical(target);
        let state = lock(&self.inner.state);
        let regex = compose_regex(&state.query, state.flags)?;
        let file = state
            .results
            .iter()
            .find(|file| file.path == target)
            .cloned()
            .ok_or(SearchError::StaleMatch(target))?;
        Ok((regex, state.flags, file))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/search.rs"]
mod tests;
