//! 启动时挂载进沙箱的初始文件树。
//!
//! 序列化格式与沙箱运行时的挂载格式一致：
//! `{ "src": { "directory": { "app.tsx": { "file": { "contents": "..." } } } } }`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountTree {
    entries: BTreeMap<String, MountNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountNode {
    File { contents: String },
    Directory(MountTree),
}

impl MountTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a nested tree from `(relative path, contents)` pairs; the last
    /// segment of each path is the file, every earlier segment a directory.
    pub fn from_flat<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut tree = Self::new();
        for (path, contents) in files {
            tree.insert_file(path.as_ref(), contents);
        }
        tree
    }

    pub fn insert_file(&mut self, path: &str, contents: impl Into<String>) {
        let parts: Vec<&str> = path
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();
        let Some((file, dirs)) = parts.split_last() else {
            return;
        };

        let mut current = self;
        for dir in dirs {
            let node = current
                .entries
                .entry((*dir).to_string())
                .or_insert_with(|| MountNode::Directory(MountTree::new()));
            if let MountNode::File { .. } = node {
                *node = MountNode::Directory(MountTree::new());
            }
            current = match node {
                MountNode::Directory(tree) => tree,
                MountNode::File { .. } => return,
            };
        }
        current.entries.insert(
            (*file).to_string(),
            MountNode::File {
                contents: contents.into(),
            },
        );
    }

    pub fn insert_dir(&mut self, name: impl Into<String>, tree: MountTree) {
        self.entries.insert(name.into(), MountNode::Directory(tree));
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MountNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&MountNode> {
        let mut parts = path.split('/').filter(|p| !p.is_empty() && *p != ".");
        let mut node = self.entries.get(parts.next()?)?;
        for part in parts {
            match node {
                MountNode::Directory(tree) => node = tree.entries.get(part)?,
                MountNode::File { .. } => return None,
            }
        }
        Some(node)
    }

    /// Depth-first `(relative path, contents)` listing of every file.
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        self.collect_files("", &mut out);
        out
    }

    /// Depth-first listing of every directory, parents before children.
    pub fn directories(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_dirs("", &mut out);
        out
    }

    fn collect_files<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, node) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match node {
                MountNode::File { contents } => out.push((path, contents.as_str())),
                MountNode::Directory(tree) => tree.collect_files(&path, out),
            }
        }
    }

    fn collect_dirs(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, node) in &self.entries {
            if let MountNode::Directory(tree) = node {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                out.push(path.clone());
                tree.collect_dirs(&path, out);
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/mount_tree.rs"]
mod tests;
