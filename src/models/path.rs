//! 虚拟文件系统路径：`/` 分隔，根目录为空串，子路径为 `父路径 + "/" + 名称`。

use lsp_types::Url;

pub const ROOT: &str = "";

pub fn join(parent: &str, name: &str) -> String {
    format!("{parent}/{name}")
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => ROOT,
    }
}

pub fn sibling(path: &str, name: &str) -> String {
    join(parent(path), name)
}

/// Repository-relative form without leading `./` or `/`: `./src//a.ts` -> `src/a.ts`.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Display form used by the tree and the tab strip: `src/a.ts` -> `/src/a.ts`, root -> ``.
pub fn canonical(path: &str) -> String {
    let normalized = normalize(path);
    if normalized.is_empty() {
        String::new()
    } else {
        format!("/{normalized}")
    }
}

pub fn is_within(path: &str, ancestor: &str) -> bool {
    let path = canonical(path);
    let ancestor = canonical(ancestor);
    if ancestor.is_empty() {
        return true;
    }
    path == ancestor
        || path
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Rebases `path` from `from` onto `to` when it lies inside `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    let path = canonical(path);
    let from = canonical(from);
    if path == from {
        return Some(canonical(to));
    }
    let rest = path.strip_prefix(from.as_str())?;
    rest.starts_with('/')
        .then(|| format!("{}{rest}", canonical(to)))
}

/// Virtual-file URI used to key editor models and extra declaration sources.
pub fn virtual_uri(path: &str) -> Option<Url> {
    Url::parse(&format!("file:///{}", normalize(path))).ok()
}

#[cfg(test)]
#[path = "../../tests/unit/models/path.rs"]
mod tests;
