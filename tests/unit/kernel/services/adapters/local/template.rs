use super::*;
use crate::models::MountNode;
use std::fs;
use tempfile::tempdir;

fn file_contents<'a>(tree: &'a MountTree, path: &str) -> Option<&'a str> {
    match tree.get(path)? {
        MountNode::File { contents } => Some(contents.as_str()),
        MountNode::Directory(_) => None,
    }
}

#[test]
fn loads_project_files_without_dependencies() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("node_modules/zod")).unwrap();
    fs::write(root.join("package.json"), "{}").unwrap();
    fs::write(root.join(".env"), "PORT=1").unwrap();
    fs::write(root.join("src/app.tsx"), "export {}").unwrap();
    fs::write(root.join("node_modules/zod/index.js"), "").unwrap();
    fs::write(root.join("logo.bin"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

    let tree = load_mount_tree(root).unwrap();
    assert_eq!(file_contents(&tree, "src/app.tsx"), Some("export {}"));
    assert_eq!(file_contents(&tree, "package.json"), Some("{}"));
    assert_eq!(file_contents(&tree, ".env"), Some("PORT=1"));
    assert!(tree.get("node_modules").is_none());
    assert!(tree.get("logo.bin").is_none());
}

#[test]
fn gitignored_files_are_skipped() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join(".gitignore"), "dist/\n").unwrap();
    fs::create_dir_all(root.join("dist")).unwrap();
    fs::write(root.join("dist/bundle.js"), "").unwrap();
    fs::write(root.join("index.html"), "<div></div>").unwrap();

    let tree = load_mount_tree(root).unwrap();
    assert!(tree.get("dist").is_none());
    assert_eq!(file_contents(&tree, "index.html"), Some("<div></div>"));
}

#[test]
fn missing_project_directory_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load_mount_tree(&dir.path().join("nope")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}

#[test]
fn config_defaults_when_absent() {
    let dir = tempdir().unwrap();
    assert_eq!(load_config(dir.path()).unwrap(), WorkspaceConfig::default());
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE),
        r#"{ "initial_tabs": ["/src/main.ts"], "install": { "fail_on_error": false } }"#,
    )
    .unwrap();
    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.initial_tabs, ["/src/main.ts"]);
    assert!(!config.install.fail_on_error);
    assert_eq!(config.install.command.command_line(), "npm install");

    fs::write(dir.path().join(CONFIG_FILE), "{ broken").unwrap();
    assert!(matches!(load_config(dir.path()), Err(ConfigError::Parse(_))));
}
