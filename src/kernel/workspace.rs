//! 工作区根状态：标签页、选中目录、待创建条目、实时预览路由与配色偏好。
//!
//! 活动标签变化时清除选中目录；配色模式从偏好存储读取，每次修改都写回。

use crate::kernel::observe::{lock, Observers, Subscription};
use crate::kernel::services::ports::{ColorMode, COLOR_MODE_KEY};
use crate::kernel::services::SessionContext;
use crate::kernel::tabs::{TabEvent, Tabs};
use crate::models::file_tree::NodeKind;
use crate::models::path;
use std::sync::{Arc, Mutex};

pub const DEFAULT_ROUTE: &str = "/";

/// Inline "new file / new folder" input: `path` is the parent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub path: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    Tab(TabEvent),
    SelectedDirectory(Option<String>),
    PendingEntry(Option<PendingEntry>),
    Route(String),
    ColorMode(ColorMode),
}

struct WorkspaceData {
    tabs: Tabs,
    selected_directory: Option<String>,
    pending_entry: Option<PendingEntry>,
    route: String,
    color_mode: ColorMode,
}

struct Inner {
    ctx: SessionContext,
    data: Mutex<WorkspaceData>,
    observers: Observers<WorkspaceEvent>,
}

#[derive(Clone)]
pub struct Workspace {
    inner: Arc<Inner>,
}

impl Workspace {
    /// Opens the configured initial tabs and restores the persisted color mode.
    pub fn new(ctx: SessionContext) -> Self {
        let color_mode = ctx
            .preferences()
            .get(COLOR_MODE_KEY)
            .and_then(|value| ColorMode::parse(&value))
            .unwrap_or_default();
        let tabs = Tabs::with_initial(&ctx.config().initial_tabs);
        Self {
            inner: Arc::new(Inner {
                ctx,
                data: Mutex::new(WorkspaceData {
                    tabs,
                    selected_directory: None,
                    pending_entry: None,
                    route: DEFAULT_ROUTE.to_string(),
                    color_mode,
                }),
                observers: Observers::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&WorkspaceEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    pub fn tabs(&self) -> Vec<String> {
        lock(&self.inner.data).tabs.tabs().to_vec()
    }

    pub fn active_tab(&self) -> Option<String> {
        lock(&self.inner.data).tabs.active().map(str::to_string)
    }

    pub fn selected_directory(&self) -> Option<String> {
        lock(&self.inner.data).selected_directory.clone()
    }

    pub fn pending_entry(&self) -> Option<PendingEntry> {
        lock(&self.inner.data).pending_entry.clone()
    }

    pub fn route(&self) -> String {
        lock(&self.inner.data).route.clone()
    }

    pub fn color_mode(&self) -> ColorMode {
        lock(&self.inner.data).color_mode
    }

    pub fn add_tab(&self, target: &str) -> Vec<TabEvent> {
        self.update_tabs(|tabs| tabs.add(target))
    }

    pub fn set_active_tab(&self, target: &str) -> Vec<TabEvent> {
        self.update_tabs(|tabs| tabs.set_active(target))
    }

    pub fn close_tab(&self, target: &str) -> Vec<TabEvent> {
        self.update_tabs(|tabs| tabs.close(target))
    }

    pub fn close_tabs_under(&self, root: &str) -> Vec<TabEvent> {
        self.update_tabs(|tabs| tabs.close_under(root))
    }

    pub fn rename_tabs(&self, from: &str, to: &str) -> Vec<TabEvent> {
        self.update_tabs(|tabs| tabs.rename_path(from, to))
    }

    fn update_tabs<F>(&self, apply: F) -> Vec<TabEvent>
    where
        F: FnOnce(&mut Tabs) -> Vec<TabEvent>,
    {
        let (events, cleared) = {
            let mut data = lock(&self.inner.data);
            let events = apply(&mut data.tabs);
            let active_changed = events
                .iter()
                .any(|event| matches!(event, TabEvent::ActiveChanged(_)));
            let cleared = active_changed && data.selected_directory.take().is_some();
            (events, cleared)
        };
        for event in &events {
            self.inner
                .observers
                .notify(&WorkspaceEvent::Tab(event.clone()));
        }
        if cleared {
            self.inner
                .observers
                .notify(&WorkspaceEvent::SelectedDirectory(None));
        }
        events
    }

    pub fn select_directory(&self, dir: Option<&str>) {
        let dir = dir.map(path::canonical);
        {
            let mut data = lock(&self.inner.data);
            if data.selected_directory == dir {
                return;
            }
            data.selected_directory = dir.clone();
        }
        self.inner
            .observers
            .notify(&WorkspaceEvent::SelectedDirectory(dir));
    }

    /// Parent directory for a new entry: the selected directory, else the
    /// directory of the active tab, else the root.
    pub fn new_entry_parent(&self) -> String {
        let data = lock(&self.inner.data);
        if let Some(dir) = &data.selected_directory {
            return dir.clone();
        }
        data.tabs
            .active()
            .map(|active| path::parent(active).to_string())
            .unwrap_or_default()
    }

    pub fn begin_new_entry(&self, kind: NodeKind) -> PendingEntry {
        let entry = PendingEntry {
            path: self.new_entry_parent(),
            kind,
        };
        lock(&self.inner.data).pending_entry = Some(entry.clone());
        self.inner
            .observers
            .notify(&WorkspaceEvent::PendingEntry(Some(entry.clone())));
        entry
    }

    /// Ends the inline input, returning what it was for.
    pub fn take_new_entry(&self) -> Option<PendingEntry> {
        let taken = lock(&self.inner.data).pending_entry.take();
        if taken.is_some() {
            self.inner
                .observers
                .notify(&WorkspaceEvent::PendingEntry(None));
        }
        taken
    }

    pub fn set_route(&self, route: &str) {
        let route = if route.is_empty() {
            DEFAULT_ROUTE.to_string()
        } else {
            route.to_string()
        };
        {
            let mut data = lock(&self.inner.data);
            if data.route == route {
                return;
            }
            data.route = route.clone();
        }
        tracing::debug!(route = %route, "route changed");
        self.inner.observers.notify(&WorkspaceEvent::Route(route));
    }

    /// Route part of a location reported by the running app; `None` when the
    /// location is not served from the sandbox host.
    pub fn route_from_location<'a>(&self, location: &'a str) -> Option<&'a str> {
        let marker = self.inner.ctx.config().route_host_marker.as_str();
        if marker.is_empty() {
            return None;
        }
        location.split(marker).nth(1)
    }

    /// Handles a "url-changed" message from the live view.
    pub fn on_url_changed(&self, location: &str) -> bool {
        match self.route_from_location(location) {
            Some(route) => {
                self.set_route(route);
                true
            }
            None => {
                tracing::debug!(location = %location, "ignoring location outside the sandbox host");
                false
            }
        }
    }

    /// URL of the live view, present once the dev server has a base URL.
    pub fn live_url(&self, base_url: Option<&str>) -> Option<String> {
        base_url.map(|base| format!("{}{}", base, self.route()))
    }

    pub fn set_color_mode(&self, mode: ColorMode) {
        {
            let mut data = lock(&self.inner.data);
            if data.color_mode == mode {
                return;
            }
            data.color_mode = mode;
        }
        if let Err(e) = self.inner.ctx.preferences().set(COLOR_MODE_KEY, mode.as_str()) {
            tracing::warn!(error = %e, "failed to persist color mode");
        }
        self.inner
            .observers
            .notify(&WorkspaceEvent::ColorMode(mode));
    }

    pub fn toggle_color_mode(&self) -> ColorMode {
        let next = self.color_mode().toggled();
        self.set_color_mode(next);
        next
    }
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/workspace.rs"]
mod tests;
