//! 文件树数据模型：目录列表与展开后的可见行。

use std::cmp::Ordering;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

/// Case-insensitive lexicographic order; names equal ignoring case fall back
/// to byte order so the result is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

/// Children of one directory, each group sorted by [`compare_names`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

impl Listing {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, NodeKind)>,
    {
        let mut listing = Self::default();
        for (name, kind) in entries {
            match kind {
                NodeKind::Dir => listing.directories.push(name),
                NodeKind::File => listing.files.push(name),
            }
        }
        listing.directories.sort_by(|a, b| compare_names(a, b));
        listing.files.sort_by(|a, b| compare_names(a, b));
        listing
    }

    pub fn kind_of(&self, name: &str) -> Option<NodeKind> {
        if self.directories.iter().any(|d| d == name) {
            Some(NodeKind::Dir)
        } else if self.files.iter().any(|f| f == name) {
            Some(NodeKind::File)
        } else {
            None
        }
    }

    pub fn insert(&mut self, name: &str, kind: NodeKind) {
        if self.kind_of(name).is_some() {
            return;
        }
        let group = self.group_mut(kind);
        let index = group
            .binary_search_by(|probe| compare_names(probe, name))
            .unwrap_or_else(|index| index);
        group.insert(index, name.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<NodeKind> {
        let kind = self.kind_of(name)?;
        self.group_mut(kind).retain(|entry| entry != name);
        Some(kind)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Option<NodeKind> {
        let kind = self.remove(from)?;
        self.insert(to, kind);
        Some(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }

    /// Directories first, then files.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeKind)> {
        self.directories
            .iter()
            .map(|name| (name.as_str(), NodeKind::Dir))
            .chain(self.files.iter().map(|name| (name.as_str(), NodeKind::File)))
    }

    fn group_mut(&mut self, kind: NodeKind) -> &mut Vec<String> {
        match kind {
            NodeKind::Dir => &mut self.directories,
            NodeKind::File => &mut self.files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTreeRow {
    pub path: String,
    pub name: String,
    pub kind: NodeKind,
    pub depth: u16,
    pub is_expanded: bool,
}

/// Flattens cached listings depth-first in display order. `listing` returns
/// the cached children of a directory path, `is_expanded` its expansion flag.
pub fn flatten_for_view<L, E>(root: &str, listing: L, is_expanded: E) -> Vec<FileTreeRow>
where
    L: Fn(&str) -> Option<Listing>,
    E: Fn(&str) -> bool,
{
    let mut result = Vec::new();
    let mut stack: Vec<(String, String, NodeKind, u16)> = Vec::new();
    push_children(&mut stack, root, listing(root).as_ref(), 0);

    while let Some((path, name, kind, depth)) = stack.pop() {
        let expanded = kind == NodeKind::Dir && is_expanded(&path);
        if expanded {
            push_children(&mut stack, &path, listing(&path).as_ref(), depth + 1);
        }
        result.push(FileTreeRow {
            path,
            name,
            kind,
            depth,
            is_expanded: expanded,
        });
    }

    result
}

fn push_children(
    stack: &mut Vec<(String, String, NodeKind, u16)>,
    parent: &str,
    listing: Option<&Listing>,
    depth: u16,
) {
    let Some(listing) = listing else {
        return;
    };
    let children: Vec<_> = listing.iter().collect();
    for (name, kind) in children.into_iter().rev() {
        stack.push((
            super::path::join(parent, name),
            name.to_string(),
            kind,
            depth,
        ));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/file_tree.rs"]
mod tests;
