//! 工作台：把会话、文件树缓存、标签页、类型声明与搜索组装成一个工作区。
//!
//! 职责：
//! - 按顺序驱动 启动 → 安装 → 开发服务器
//! - 活动标签变化时确保编辑器模型存在并切换
//! - 文件树的创建/重命名/删除同步到标签页
//! - 把终端输入、诊断、预览页消息转交给对应组件

use crate::kernel::services::ports::{FsError, ServerReady};
use crate::kernel::services::SessionContext;
use crate::kernel::{
    DeclarationService, FileTreeCache, PendingEntry, SearchEngine, SessionController,
    SessionError, SessionEvent, Subscription, TabEvent, Workspace,
};
use crate::models::file_tree::NodeKind;
use crate::models::{path, MountTree};
use compact_str::CompactString;
use lsp_types::Diagnostic;

pub struct Workbench {
    ctx: SessionContext,
    session: SessionController,
    tree: FileTreeCache,
    declarations: DeclarationService,
    search: SearchEngine,
    workspace: Workspace,
    _subscriptions: Vec<Subscription>,
}

impl Workbench {
    pub fn new(ctx: SessionContext) -> Self {
        let session = SessionController::new(ctx.clone());
        let tree = FileTreeCache::new(ctx.fs(), ctx.executor().clone());
        let declarations = DeclarationService::new(ctx.clone());
        let search = SearchEngine::new(ctx.clone());
        let workspace = Workspace::new(ctx.clone());

        let milestone = {
            let declarations = declarations.clone();
            let ctx = ctx.clone();
            session.subscribe(move |event| {
                if *event != SessionEvent::PackagesInstalled {
                    return;
                }
                declarations.mark_packages_installed();
                let declarations = declarations.clone();
                ctx.spawn_future(async move {
                    declarations.resolve_pending().await;
                });
            })
        };

        Self {
            ctx,
            session,
            tree,
            declarations,
            search,
            workspace,
            _subscriptions: vec![milestone],
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn tree(&self) -> &FileTreeCache {
        &self.tree
    }

    pub fn declarations(&self) -> &DeclarationService {
        &self.declarations
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Boots the runtime with `files`, prepares the editor and runs install
    /// and the dev server. Shell, model and compiler-config failures are
    /// logged and do not stop the pipeline.
    pub async fn start(&self, files: &MountTree) -> Result<ServerReady, SessionError> {
        self.session.boot(files).await?;
        self.search.set_ready(true);

        if let Err(e) = self.session.open_shell().await {
            tracing::warn!(error = %e, "failed to start shell");
        }
        self.declarations.seed_models().await;
        let compiler_config = self.ctx.config().compiler_config.clone();
        if let Err(e) = self
            .declarations
            .watch_compiler_config(&compiler_config)
            .await
        {
            tracing::warn!(path = %compiler_config, error = %e, "compiler config not applied");
        }
        if let Some(active) = self.workspace.active_tab() {
            if let Err(e) = self.activate_model(&active).await {
                tracing::warn!(path = %active, error = %e, "failed to open active tab");
            }
        }

        self.session.install().await?;
        self.session.serve().await
    }

    /// Loading message for the live view; `None` once it can be shown.
    pub fn loading_message(&self) -> Option<&'static str> {
        self.session.progress_message()
    }

    pub fn live_url(&self) -> Option<String> {
        self.workspace.live_url(self.session.base_url().as_deref())
    }

    pub fn restart(&self) -> bool {
        self.session.restart()
    }

    pub fn on_frame(&self) {
        self.session.on_frame();
    }

    pub fn on_url_changed(&self, location: &str) -> bool {
        self.workspace.on_url_changed(location)
    }

    pub fn terminal_input(&self, data: &str) -> bool {
        self.session.terminal_input(data)
    }

    pub fn on_diagnostics(&self, diagnostics: &[Diagnostic]) -> Vec<CompactString> {
        self.declarations.on_diagnostics(diagnostics)
    }

    /// Opens `target` in a tab and shows it.
    pub async fn open_file(&self, target: &str) -> Result<(), FsError> {
        let mut events = self.workspace.add_tab(target);
        events.extend(self.workspace.set_active_tab(target));
        self.follow(&events).await
    }

    pub async fn set_active_tab(&self, target: &str) -> Result<(), FsError> {
        let events = self.workspace.set_active_tab(target);
        self.follow(&events).await
    }

    pub async fn close_tab(&self, target: &str) -> Result<(), FsError> {
        let events = self.workspace.close_tab(target);
        self.follow(&events).await
    }

    /// Explorer click on a directory: toggles it and selects it as the
    /// target of new entries.
    pub async fn click_directory(&self, dir: &str) -> Result<(), FsError> {
        self.workspace.select_directory(Some(dir));
        self.tree.toggle(dir).await
    }

    /// Starts the inline new-entry input and expands its directory and
    /// every ancestor.
    pub async fn begin_new_entry(&self, kind: NodeKind) -> Result<PendingEntry, FsError> {
        let entry = self.workspace.begin_new_entry(kind);
        self.tree.expand_to(&entry.path).await?;
        Ok(entry)
    }

    /// Submits the inline new-entry input. New files open in a tab.
    pub async fn submit_new_entry(&self, name: &str) -> Result<Option<String>, FsError> {
        let Some(entry) = self.workspace.take_new_entry() else {
            return Ok(None);
        };
        let Some(created) = self.tree.create_entry(&entry.path, name, entry.kind).await? else {
            return Ok(None);
        };
        if entry.kind == NodeKind::File {
            self.open_file(&created).await?;
        }
        Ok(Some(created))
    }

    /// Renames an entry in place and moves the tabs below it.
    pub async fn rename_entry(&self, target: &str, new_name: &str) -> Result<Option<String>, FsError> {
        let from = path::canonical(target);
        let Some(to) = self.tree.rename(&from, new_name).await? else {
            return Ok(None);
        };
        let events = self.workspace.rename_tabs(&from, &to);
        self.follow(&events).await?;
        Ok(Some(to))
    }

    /// Deletes an entry and closes the tabs below it.
    pub async fn delete_entry(&self, target: &str, recursive: bool) -> Result<(), FsError> {
        self.tree.remove(target, recursive).await?;
        let events = self.workspace.close_tabs_under(target);
        self.follow(&events).await
    }

    async fn follow(&self, events: &[TabEvent]) -> Result<(), FsError> {
        let activated = events.iter().rev().find_map(|event| match event {
            TabEvent::ActiveChanged(Some(active)) => Some(active.clone()),
            _ => None,
        });
        match activated {
            Some(active) => self.activate_model(&active).await,
            None => Ok(()),
        }
    }

    /// Shows the editor model of `target`, creating it from the file when
    /// the editor has none yet.
    async fn activate_model(&self, target: &str) -> Result<(), FsError> {
        let Some(uri) = path::virtual_uri(target) else {
            return Ok(());
        };
        let intel = self.ctx.intel();
        if !intel.has_model(&uri) {
            let contents = self.ctx.fs().read_file(target).await?;
            intel.create_model(&contents, &uri);
        }
        intel.set_active_model(&uri);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/app/workbench.rs"]
mod tests;
