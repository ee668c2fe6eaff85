//! 类型声明获取：从 "Cannot find module" 诊断中收集缺失的包名，在依赖安装完成
//! 后从 `node_modules` 读取 `*.d.ts` 与 `package.json` 注册给代码智能层；
//! 同时监听编译配置文件并同步编译选项。

use crate::kernel::compiler_options::CompilerOptions;
use crate::kernel::observe::{lock, Generation, Observers, Subscription};
use crate::kernel::services::ports::{ConfigError, WatchEvent};
use crate::kernel::services::SessionContext;
use crate::kernel::tree::walk_files;
use crate::models::path;
use compact_str::CompactString;
use lsp_types::Diagnostic;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex, OnceLock, Weak};

const NODE_MODULES: &str = "node_modules";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationEvent {
    Pending(Vec<CompactString>),
    Registered {
        package: CompactString,
        files: usize,
    },
    CompilerOptionsApplied,
}

fn missing_module_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Cannot find module '([^']+)'").ok())
        .as_ref()
}

/// Package named by a "Cannot find module" message: the module specifier up
/// to its first `/`.
pub fn missing_package(message: &str) -> Option<&str> {
    let specifier = missing_module_pattern()?
        .captures(message)?
        .get(1)?
        .as_str();
    let package = specifier.split('/').next().unwrap_or(specifier);
    (!package.is_empty()).then_some(package)
}

fn is_declaration_source(file: &str) -> bool {
    let name = path::file_name(file);
    name.ends_with(".d.ts") || name == "package.json"
}

#[derive(Default)]
struct DeclarationState {
    pending: FxHashSet<CompactString>,
    installed: FxHashSet<CompactString>,
    packages_installed: bool,
    resolve_scheduled: bool,
    config_watch: Option<Subscription>,
}

struct Inner {
    ctx: SessionContext,
    state: Mutex<DeclarationState>,
    batches: Generation,
    observers: Observers<DeclarationEvent>,
}

#[derive(Clone)]
pub struct DeclarationService {
    inner: Arc<Inner>,
}

impl DeclarationService {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                state: Mutex::new(DeclarationState::default()),
                batches: Generation::new(),
                observers: Observers::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeclarationEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    pub fn pending(&self) -> Vec<CompactString> {
        let mut pending: Vec<_> = lock(&self.inner.state).pending.iter().cloned().collect();
        pending.sort();
        pending
    }

    pub fn installed(&self) -> Vec<CompactString> {
        let mut installed: Vec<_> = lock(&self.inner.state).installed.iter().cloned().collect();
        installed.sort();
        installed
    }

    pub fn is_pending(&self, package: &str) -> bool {
        lock(&self.inner.state).pending.contains(package)
    }

    pub fn is_installed(&self, package: &str) -> bool {
        lock(&self.inner.state).installed.contains(package)
    }

    /// Collects packages from "Cannot find module" diagnostics. Once the
    /// install milestone passed, new names schedule a resolution batch.
    pub fn on_diagnostics(&self, diagnostics: &[Diagnostic]) -> Vec<CompactString> {
        let (added, schedule) = {
            let mut state = lock(&self.inner.state);
            let mut added = Vec::new();
            for diagnostic in diagnostics {
                let Some(package) = missing_package(&diagnostic.message) else {
                    continue;
                };
                if state.pending.contains(package) || state.installed.contains(package) {
                    continue;
                }
                let package = CompactString::from(package);
                state.pending.insert(package.clone());
                added.push(package);
            }
            let schedule =
                !added.is_empty() && state.packages_installed && !state.resolve_scheduled;
            if schedule {
                state.resolve_scheduled = true;
            }
            (added, schedule)
        };

        if added.is_empty() {
            return added;
        }
        tracing::debug!(packages = ?added, "missing declarations");
        self.inner
            .observers
            .notify(&DeclarationEvent::Pending(added.clone()));
        if schedule {
            let service = self.clone();
            self.inner.ctx.spawn_future(async move {
                lock(&service.inner.state).resolve_scheduled = false;
                service.resolve_pending().await;
            });
        }
        added
    }

    pub fn packages_installed(&self) -> bool {
        lock(&self.inner.state).packages_installed
    }

    /// Records the install milestone. Resolution is only possible afterwards.
    pub fn mark_packages_installed(&self) {
        lock(&self.inner.state).packages_installed = true;
    }

    /// Fetches declaration sources of every pending package and registers
    /// them. Returns the number of registered sources; a batch superseded by
    /// a newer one registers nothing.
    pub async fn resolve_pending(&self) -> usize {
        let (batch, generation) = {
            let state = lock(&self.inner.state);
            if !state.packages_installed || state.pending.is_empty() {
                return 0;
            }
            let mut batch: Vec<CompactString> = state.pending.iter().cloned().collect();
            batch.sort();
            (batch, self.inner.batches.next())
        };

        let fs = self.inner.ctx.fs();
        let mut fetched = Vec::with_capacity(batch.len());
        for package in &batch {
            let root = path::join(NODE_MODULES, package);
            let files = walk_files(fs.as_ref(), &root, |entry| {
                !entry.is_dir && !is_declaration_source(&entry.name)
            })
            .await;
            if files.is_empty() {
                tracing::warn!(package = %package, "no declaration sources found");
            }

            let mut sources = Vec::with_capacity(files.len());
            for file in files {
                match fs.read_file(&file).await {
                    Ok(source) => sources.push((file, source)),
                    Err(e) => {
                        tracing::warn!(
                            package = %package,
                            path = %file,
                            error = %e,
                            "failed to read declaration source"
                        );
                    }
                }
            }
            fetched.push((package.clone(), sources));
        }

        if !self.inner.batches.is_current(generation) {
            tracing::debug!(generation, "discarding superseded declaration batch");
            return 0;
        }

        let intel = self.inner.ctx.intel();
        let mut registered = 0;
        for (package, sources) in &fetched {
            for (file, source) in sources {
                let Some(uri) = path::virtual_uri(file) else {
                    continue;
                };
                intel.add_extra_lib(source, &uri);
                registered += 1;
            }
            tracing::info!(package = %package, files = sources.len(), "registered declarations");
        }

        {
            let mut state = lock(&self.inner.state);
            for package in &batch {
                state.pending.remove(package);
                state.installed.insert(package.clone());
            }
        }
        for (package, sources) in fetched {
            self.inner.observers.notify(&DeclarationEvent::Registered {
                package,
                files: sources.len(),
            });
        }
        registered
    }

    /// Reads the compiler configuration at `config_path` and hands the
    /// translated options to the code-intelligence layer.
    pub async fn apply_compiler_config(
        &self,
        config_path: &str,
    ) -> Result<CompilerOptions, ConfigError> {
        let fs = self.inner.ctx.fs();
        let text = fs.read_file(config_path).await?;
        let options = CompilerOptions::from_config_json(&text)?;
        self.inner.ctx.intel().set_compiler_options(&options);
        tracing::info!(path = %config_path, "applied compiler options");
        self.inner
            .observers
            .notify(&DeclarationEvent::CompilerOptionsApplied);
        Ok(options)
    }

    /// Applies the compiler configuration now and again on every change of
    /// the file. A broken config keeps the previously applied options.
    pub async fn watch_compiler_config(
        &self,
        config_path: &str,
    ) -> Result<CompilerOptions, ConfigError> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let watched = config_path.to_string();
        let callback = Arc::new(move |event: &WatchEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tracing::debug!(path = %event.path, "compiler config changed");
            let service = DeclarationService { inner };
            let watched = watched.clone();
            service.inner.ctx.clone().spawn_future(async move {
                if let Err(e) = service.apply_compiler_config(&watched).await {
                    tracing::warn!(path = %watched, error = %e, "keeping previous compiler options");
                }
            });
        });
        let subscription = self
            .inner
            .ctx
            .fs()
            .watch(config_path, callback)
            .map_err(ConfigError::Fs)?;
        lock(&self.inner.state).config_watch = Some(subscription);
        self.apply_compiler_config(config_path).await
    }

    /// Creates an editor model for every project file outside
    /// `node_modules`, never replacing an existing one.
    pub async fn seed_models(&self) -> usize {
        let fs = self.inner.ctx.fs();
        let intel = self.inner.ctx.intel();
        let files = walk_files(fs.as_ref(), path::ROOT, |entry| {
            entry.is_dir && entry.name == NODE_MODULES
        })
        .await;

        let mut created = 0;
        for file in files {
            let Some(uri) = path::virtual_uri(&file) else {
                continue;
            };
            if intel.has_model(&uri) {
                continue;
            }
            match fs.read_file(&file).await {
                Ok(contents) => {
                    intel.create_model(&contents, &uri);
                    created += 1;
                }
                Err(e) => tracing::warn!(path = %file, error = %e, "failed to seed model"),
            }
        }
        tracing::info!(models = created, "seeded editor models");
        created
    }
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/declarations.rs"]
mod tests;
