use super::*;
use crate::kernel::services::adapters::{MemoryFs, QueuedExecutor};
use crate::models::MountTree;
use crate::test_support::block_on;

fn watched_fixture() -> (Arc<MemoryFs>, Arc<QueuedExecutor>, FileTreeCache) {
    let fs = Arc::new(MemoryFs::from_tree(&MountTree::from_flat([
        ("package.json", "{}"),
        ("README.md", "# demo"),
        ("src/app.tsx", "export default 1"),
        ("src/Components/Button.tsx", ""),
        ("src/lib/util.ts", ""),
        ("node_modules/solid-js/package.json", "{}"),
    ])));
    let executor = Arc::new(QueuedExecutor::new());
    let cache = FileTreeCache::new(fs.clone(), executor.clone());
    (fs, executor, cache)
}

fn fixture() -> (Arc<MemoryFs>, FileTreeCache) {
    let (fs, _executor, cache) = watched_fixture();
    (fs, cache)
}

#[test]
fn listing_is_sorted_and_cached() {
    let (fs, cache) = fixture();
    let root = block_on(cache.list_children("")).unwrap();
    assert_eq!(root.directories, ["node_modules", "src"]);
    assert_eq!(root.files, ["package.json", "README.md"]);

    let src = block_on(cache.list_children("/src")).unwrap();
    assert_eq!(src.directories, ["Components", "lib"]);
    assert_eq!(src.files, ["app.tsx"]);

    block_on(cache.list_children("/src")).unwrap();
    assert_eq!(fs.read_dir_calls(), 2);
}

#[test]
fn external_change_invalidates_and_notifies() {
    let (fs, cache) = fixture();
    block_on(cache.list_children("/src")).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let events = events.clone();
        cache.subscribe(move |event| lock(&events).push(event.clone()))
    };

    fs.insert_file("/src/added.ts", "");
    assert!(cache.is_stale("/src"));
    assert_eq!(
        *lock(&events),
        [TreeEvent::Invalidated("/src".to_string())]
    );

    let src = block_on(cache.list_children("/src")).unwrap();
    assert_eq!(src.files, ["added.ts", "app.tsx"]);
    assert!(!cache.is_stale("/src"));
}

#[test]
fn external_change_refetches_in_background() {
    let (fs, executor, cache) = watched_fixture();
    block_on(cache.list_children("")).unwrap();
    let reads = fs.read_dir_calls();

    fs.insert_file("zzz_new.ts", "");
    assert_eq!(executor.pending(), 1);
    block_on(executor.run_pending());

    assert_eq!(fs.read_dir_calls(), reads + 1);
    assert!(!cache.is_stale(""));
    let rows: Vec<String> = cache.visible_rows().into_iter().map(|row| row.path).collect();
    assert!(rows.iter().any(|row| row == "/zzz_new.ts"));
}

#[test]
fn removing_an_already_deleted_entry_succeeds() {
    let (fs, cache) = fixture();
    block_on(cache.list_children("/src")).unwrap();
    block_on(fs.rm("/src/app.tsx", RemoveOptions::default())).unwrap();

    block_on(cache.remove("/src/app.tsx", false)).unwrap();
    assert!(!cache
        .cached("/src")
        .unwrap()
        .files
        .iter()
        .any(|name| name == "app.tsx"));
}

#[test]
fn create_entry_is_visible_on_next_listing() {
    let (fs, cache) = fixture();
    block_on(cache.list_children("/src")).unwrap();

    let created = block_on(cache.create_entry("/src", "new.ts", NodeKind::File)).unwrap();
    assert_eq!(created.as_deref(), Some("/src/new.ts"));
    assert_eq!(fs.contents("/src/new.ts").as_deref(), Some(""));
    let src = block_on(cache.list_children("/src")).unwrap();
    assert!(src.files.contains(&"new.ts".to_string()));

    block_on(cache.create_entry("", "assets", NodeKind::Dir)).unwrap();
    let root = block_on(cache.list_children("")).unwrap();
    assert_eq!(root.directories, ["assets", "node_modules", "src"]);
}

#[test]
fn create_entry_ignores_empty_name() {
    let (fs, cache) = fixture();
    assert_eq!(
        block_on(cache.create_entry("/src", "  ", NodeKind::File)).unwrap(),
        None
    );
    assert_eq!(fs.read_dir_calls(), 0);
}

#[test]
fn rename_commits_to_sibling_path() {
    let (fs, cache) = fixture();
    block_on(cache.list_children("/src")).unwrap();
    let renamed = block_on(cache.rename("/src/app.tsx", "main.tsx")).unwrap();
    assert_eq!(renamed.as_deref(), Some("/src/main.tsx"));
    assert!(fs.exists("/src/main.tsx"));
    assert_eq!(
        block_on(cache.list_children("/src")).unwrap().files,
        ["main.tsx"]
    );
}

#[test]
fn rejected_rename_restores_display() {
    let (fs, cache) = fixture();
    block_on(cache.expand("/src")).unwrap();
    block_on(cache.expand("/src/lib")).unwrap();
    fs.fail_on("/src/lib");

    let result = block_on(cache.rename("/src/lib", "core"));
    assert!(matches!(result, Err(FsError::Io(_))));
    assert_eq!(
        cache.cached("/src").unwrap().directories,
        ["Components", "lib"]
    );
    assert!(cache.is_expanded("/src/lib"));
    assert!(cache.cached("/src/lib").is_some());
    assert!(cache.cached("/src/core").is_none());
}

#[test]
fn rejected_remove_restores_entry() {
    let (fs, cache) = fixture();
    block_on(cache.list_children("")).unwrap();
    let result = block_on(cache.remove("/src", false));
    assert!(matches!(result, Err(FsError::DirectoryNotEmpty(_))));
    assert_eq!(
        cache.cached("").unwrap().directories,
        ["node_modules", "src"]
    );
    assert!(fs.exists("/src/app.tsx"));

    block_on(cache.remove("/src", true)).unwrap();
    assert_eq!(
        block_on(cache.list_children("")).unwrap().directories,
        ["node_modules"]
    );
}

#[test]
fn collapse_drops_descendants_and_their_watches() {
    let (fs, cache) = fixture();
    block_on(cache.list_children("")).unwrap();
    block_on(cache.expand("/src")).unwrap();
    block_on(cache.expand("/src/lib")).unwrap();
    assert_eq!(fs.watcher_count(), 3);

    cache.collapse("/src");
    assert!(!cache.is_expanded("/src"));
    assert!(!cache.is_expanded("/src/lib"));
    assert!(cache.cached("/src/lib").is_none());
    assert!(cache.cached("/src").is_some());
    assert_eq!(fs.watcher_count(), 2);
}

#[test]
fn visible_rows_follow_expansion() {
    let (_fs, cache) = fixture();
    block_on(cache.list_children("")).unwrap();
    block_on(cache.toggle("/src")).unwrap();

    let rows: Vec<(String, u16)> = cache
        .visible_rows()
        .into_iter()
        .map(|row| (row.path, row.depth))
        .collect();
    assert_eq!(
        rows,
        [
            ("/node_modules".to_string(), 0),
            ("/src".to_string(), 0),
            ("/src/Components".to_string(), 1),
            ("/src/lib".to_string(), 1),
            ("/src/app.tsx".to_string(), 1),
            ("/package.json".to_string(), 0),
            ("/README.md".to_string(), 0),
        ]
    );

    block_on(cache.toggle("/src")).unwrap();
    assert_eq!(cache.visible_rows().len(), 4);
}

#[test]
fn expand_to_opens_ancestors() {
    let (_fs, cache) = fixture();
    block_on(cache.expand_to("/src/lib")).unwrap();
    assert!(cache.is_expanded("/src"));
    assert!(cache.is_expanded("/src/lib"));
    assert!(cache.cached("/src/lib").is_some());
}

#[test]
fn walk_files_skips_excluded_entries() {
    let (fs, _cache) = fixture();
    let files = block_on(walk_files(fs.as_ref(), "", |entry| {
        entry.name == "node_modules" || entry.name == "package.json"
    }));
    assert_eq!(
        files,
        [
            "/README.md",
            "/src/app.tsx",
            "/src/Components/Button.tsx",
            "/src/lib/util.ts",
        ]
    );
}

#[test]
fn walk_files_survives_unreadable_directory() {
    let (fs, _cache) = fixture();
    fs.fail_on("/src/lib");
    let files = block_on(walk_files(fs.as_ref(), "/src", |_| false));
    assert_eq!(files, ["/src/app.tsx", "/src/Components/Button.tsx"]);
}
