//! 打开的标签页与当前活动路径。
//!
//! 不变式：标签非空时活动标签必在列表中；关闭活动标签时选择前一个，
//! 关闭首个标签时选择后一个，列表为空则没有活动标签。

use crate::models::path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    /// Scroll the tab strip so this tab is visible.
    Reveal(String),
    ActiveChanged(Option<String>),
    Changed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tabs {
    tabs: Vec<String>,
    active: Option<String>,
}

impl Tabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `paths` in order and activates the first one.
    pub fn with_initial<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tabs = Self::new();
        for p in paths {
            tabs.add(p.as_ref());
        }
        tabs
    }

    pub fn tabs(&self) -> &[String] {
        &self.tabs
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn contains(&self, path: &str) -> bool {
        let path = path::canonical(path);
        self.tabs.iter().any(|tab| *tab == path)
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Appends unless already open. The first tab opened into an empty strip
    /// becomes active.
    pub fn add(&mut self, path: &str) -> Vec<TabEvent> {
        let path = path::canonical(path);
        if self.tabs.contains(&path) {
            return Vec::new();
        }
        self.tabs.push(path.clone());
        let mut events = vec![TabEvent::Changed];
        if self.active.is_none() {
            events.extend(self.activate(path));
        }
        events
    }

    pub fn set_active(&mut self, path: &str) -> Vec<TabEvent> {
        let path = path::canonical(path);
        let mut events = Vec::new();
        if !self.tabs.contains(&path) {
            self.tabs.push(path.clone());
            events.push(TabEvent::Changed);
        }
        if self.active.as_deref() != Some(path.as_str()) {
            events.extend(self.activate(path));
        }
        events
    }

    pub fn close(&mut self, path: &str) -> Vec<TabEvent> {
        let path = path::canonical(path);
        let Some(index) = self.tabs.iter().position(|tab| *tab == path) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        if self.active.as_deref() == Some(path.as_str()) {
            let neighbor = if index == 0 {
                self.tabs.get(1).cloned()
            } else {
                self.tabs.get(index - 1).cloned()
            };
            match neighbor {
                Some(next) => events.extend(self.activate(next)),
                None => {
                    self.active = None;
                    events.push(TabEvent::ActiveChanged(None));
                }
            }
        }
        self.tabs.retain(|tab| *tab != path);
        events.insert(0, TabEvent::Changed);
        events
    }

    /// Closes `root` and every tab below it.
    pub fn close_under(&mut self, root: &str) -> Vec<TabEvent> {
        let doomed: Vec<String> = self
            .tabs
            .iter()
            .filter(|tab| path::is_within(tab, root))
            .cloned()
            .collect();
        let mut events = Vec::new();
        for tab in doomed {
            events.extend(self.close(&tab));
        }
        events
    }

    /// Rewrites tabs at or below `from` to live under `to`, keeping positions.
    /// A renamed tab replaces any other tab already open at its new path.
    pub fn rename_path(&mut self, from: &str, to: &str) -> Vec<TabEvent> {
        let rebased: Vec<(String, bool)> = self
            .tabs
            .iter()
            .map(|tab| match path::rebase(tab, from, to) {
                Some(moved) => (moved, true),
                None => (tab.clone(), false),
            })
            .collect();
        if !rebased.iter().any(|(_, moved)| *moved) {
            return Vec::new();
        }

        let mut kept: Vec<String> = Vec::with_capacity(rebased.len());
        for (tab, moved) in &rebased {
            let displaced = !moved
                && rebased
                    .iter()
                    .any(|(other, other_moved)| *other_moved && other == tab);
            if displaced || kept.contains(tab) {
                continue;
            }
            kept.push(tab.clone());
        }
        self.tabs = kept;

        let mut events = vec![TabEvent::Changed];
        if let Some(active) = self.active.as_deref() {
            if let Some(rebased) = path::rebase(active, from, to) {
                self.active = Some(rebased.clone());
                events.push(TabEvent::ActiveChanged(Some(rebased)));
            }
        }
        events
    }

    fn activate(&mut self, path: String) -> Vec<TabEvent> {
        self.active = Some(path.clone());
        vec![
            TabEvent::ActiveChanged(Some(path.clone())),
            TabEvent::Reveal(path),
        ]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/tabs.rs"]
mod tests;
