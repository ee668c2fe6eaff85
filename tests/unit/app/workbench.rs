use super::*;
use crate::kernel::services::adapters::ScriptedProcess;
use crate::kernel::services::ports::{RemoveOptions, SandboxFs, WorkspaceConfig};
use crate::kernel::Phase;
use crate::test_support::{block_on, Harness};
use lsp_types::{Range, Url};

const BASE_URL: &str = "https://abc.local-corp.webcontainer-api.io";

fn uri(target: &str) -> Url {
    path::virtual_uri(target).unwrap()
}

fn missing(module: &str) -> Diagnostic {
    Diagnostic::new_simple(
        Range::default(),
        format!("Cannot find module '{module}' or its corresponding type declarations."),
    )
}

fn project() -> MountTree {
    MountTree::from_flat([
        ("package.json", r#"{ "name": "demo" }"#),
        ("tsconfig.json", r#"{ "compilerOptions": { "jsx": "preserve" } }"#),
        ("src/app.tsx", "import { z } from 'zod'"),
        ("src/a.ts", "export const a = 1"),
        ("src/c.ts", "export const c = 3"),
        ("node_modules/zod/package.json", r#"{ "name": "zod" }"#),
        ("node_modules/zod/index.d.ts", "export declare const z: unknown"),
    ])
}

fn loaded(initial_tabs: &[&str]) -> (Harness, Workbench) {
    let config = WorkspaceConfig {
        initial_tabs: initial_tabs.iter().map(|tab| tab.to_string()).collect(),
        ..WorkspaceConfig::default()
    };
    let harness = Harness::with_config(config);
    harness.sandbox.memory_fs().load_tree(&project());
    let bench = Workbench::new(harness.ctx.clone());
    (harness, bench)
}

#[test]
fn start_runs_pipeline_and_resolves_declarations() {
    let harness = Harness::new();
    harness
        .sandbox
        .script("npm install", ScriptedProcess::exits(0).with_output(["added 1 package"]));
    harness.sandbox.script(
        "npm run dev",
        ScriptedProcess::running().with_server_ready(3000, BASE_URL),
    );
    let bench = Workbench::new(harness.ctx.clone());
    assert_eq!(bench.loading_message(), Some("Booting Web Container!"));

    assert_eq!(bench.on_diagnostics(&[missing("zod/mini")]), ["zod"]);
    let ready = block_on(bench.start(&project())).unwrap();
    assert_eq!(ready.url, BASE_URL);
    assert_eq!(bench.session().phase(), Phase::Ready);
    assert_eq!(bench.loading_message(), None);
    assert_eq!(bench.live_url().as_deref(), Some(format!("{BASE_URL}/").as_str()));

    block_on(harness.executor.run_pending());
    assert!(bench.declarations().is_installed("zod"));
    assert_eq!(harness.intel.extra_libs().len(), 2);
    assert_eq!(harness.intel.compiler_options().len(), 1);
    assert_eq!(harness.intel.active_model(), Some(uri("/src/app.tsx")));
    assert_eq!(
        harness.intel.model(&uri("/src/a.ts")).as_deref(),
        Some("export const a = 1")
    );
    assert_eq!(
        harness.sandbox.spawned(),
        ["jsh", "npm install", "npm run dev"]
    );
    assert!(bench.terminal_input("ls\r"));
}

#[test]
fn tab_activation_opens_editor_models() {
    let (harness, bench) = loaded(&[]);
    block_on(bench.open_file("/src/a.ts")).unwrap();
    block_on(bench.open_file("/src/c.ts")).unwrap();
    assert_eq!(bench.workspace().tabs(), ["/src/a.ts", "/src/c.ts"]);
    assert_eq!(harness.intel.active_model(), Some(uri("/src/c.ts")));

    block_on(bench.close_tab("/src/c.ts")).unwrap();
    assert_eq!(bench.workspace().active_tab().as_deref(), Some("/src/a.ts"));
    assert_eq!(harness.intel.active_model(), Some(uri("/src/a.ts")));
    assert_eq!(harness.intel.model_count(), 2);
}

#[test]
fn missing_file_is_reported_on_activation() {
    let (_harness, bench) = loaded(&[]);
    let err = block_on(bench.open_file("/src/ghost.ts")).unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
    assert_eq!(bench.workspace().tabs(), ["/src/ghost.ts"]);
}

#[test]
fn rename_moves_tab_in_place() {
    let (harness, bench) = loaded(&["/src/a.ts", "/src/c.ts"]);
    block_on(bench.tree().expand("/src")).unwrap();

    let renamed = block_on(bench.rename_entry("/src/a.ts", "b.ts")).unwrap();
    assert_eq!(renamed.as_deref(), Some("/src/b.ts"));
    assert_eq!(bench.workspace().tabs(), ["/src/b.ts", "/src/c.ts"]);
    assert_eq!(bench.workspace().active_tab().as_deref(), Some("/src/b.ts"));
    assert_eq!(harness.intel.active_model(), Some(uri("/src/b.ts")));

    let listing = bench.tree().cached("/src").unwrap();
    assert!(listing.files.iter().any(|name| name == "b.ts"));
    assert!(!listing.files.iter().any(|name| name == "a.ts"));
}

#[test]
fn rename_onto_externally_deleted_tab_keeps_tabs_unique() {
    let (harness, bench) = loaded(&["/src/a.ts", "/src/c.ts"]);
    block_on(bench.tree().expand("/src")).unwrap();
    let fs = harness.sandbox.memory_fs();
    block_on(fs.rm("/src/c.ts", RemoveOptions::default())).unwrap();

    let renamed = block_on(bench.rename_entry("/src/a.ts", "c.ts")).unwrap();
    assert_eq!(renamed.as_deref(), Some("/src/c.ts"));
    assert_eq!(bench.workspace().tabs(), ["/src/c.ts"]);
    assert_eq!(bench.workspace().active_tab().as_deref(), Some("/src/c.ts"));
    assert_eq!(fs.contents("/src/c.ts").as_deref(), Some("export const a = 1"));
}

#[test]
fn rejected_rename_keeps_tabs() {
    let (harness, bench) = loaded(&["/src/a.ts"]);
    block_on(bench.tree().expand("/src")).unwrap();
    harness.sandbox.memory_fs().fail_on("src/a.ts");

    assert!(block_on(bench.rename_entry("/src/a.ts", "b.ts")).is_err());
    assert_eq!(bench.workspace().tabs(), ["/src/a.ts"]);
    let listing = bench.tree().cached("/src").unwrap();
    assert!(listing.files.iter().any(|name| name == "a.ts"));
}

#[test]
fn delete_closes_tabs_below() {
    let (harness, bench) = loaded(&["/package.json", "/src/a.ts", "/src/c.ts"]);
    block_on(bench.set_active_tab("/src/c.ts")).unwrap();
    block_on(bench.tree().expand("/src")).unwrap();

    block_on(bench.delete_entry("/src", true)).unwrap();
    assert_eq!(bench.workspace().tabs(), ["/package.json"]);
    assert_eq!(bench.workspace().active_tab().as_deref(), Some("/package.json"));
    assert_eq!(harness.intel.active_model(), Some(uri("/package.json")));
    assert!(!harness.sandbox.memory_fs().exists("src"));
}

#[test]
fn new_file_opens_in_tab() {
    let (harness, bench) = loaded(&["/src/a.ts"]);
    let entry = block_on(bench.begin_new_entry(NodeKind::File)).unwrap();
    assert_eq!(entry.path, "/src");
    assert!(bench.tree().is_expanded("/src"));

    let created = block_on(bench.submit_new_entry("util.ts")).unwrap();
    assert_eq!(created.as_deref(), Some("/src/util.ts"));
    assert_eq!(bench.workspace().tabs(), ["/src/a.ts", "/src/util.ts"]);
    assert_eq!(bench.workspace().active_tab().as_deref(), Some("/src/util.ts"));
    assert_eq!(
        harness.sandbox.memory_fs().contents("/src/util.ts").as_deref(),
        Some("")
    );
    assert_eq!(bench.workspace().pending_entry(), None);
}

#[test]
fn new_folder_goes_to_selected_directory() {
    let (harness, bench) = loaded(&["/package.json"]);
    block_on(bench.click_directory("/src")).unwrap();
    assert!(bench.tree().is_expanded("/src"));

    block_on(bench.begin_new_entry(NodeKind::Dir)).unwrap();
    let created = block_on(bench.submit_new_entry("components")).unwrap();
    assert_eq!(created.as_deref(), Some("/src/components"));
    assert_eq!(bench.workspace().tabs(), ["/package.json"]);
    assert!(harness.sandbox.memory_fs().exists("src/components"));

    block_on(bench.begin_new_entry(NodeKind::File)).unwrap();
    assert_eq!(block_on(bench.submit_new_entry("  ")).unwrap(), None);
    assert_eq!(bench.workspace().pending_entry(), None);
}

#[test]
fn restart_and_route_update_live_url() {
    let harness = Harness::new();
    harness.sandbox.script("npm install", ScriptedProcess::exits(0));
    harness.sandbox.script(
        "npm run dev",
        ScriptedProcess::running().with_server_ready(3000, BASE_URL),
    );
    let bench = Workbench::new(harness.ctx.clone());
    block_on(bench.start(&project())).unwrap();

    assert!(bench.on_url_changed(&format!("{BASE_URL}/about")));
    assert_eq!(
        bench.live_url().as_deref(),
        Some("https://abc.local-corp.webcontainer-api.io/about")
    );
    assert!(bench.restart());
    assert_eq!(bench.live_url(), None);
    bench.on_frame();
    assert_eq!(
        bench.live_url().as_deref(),
        Some("https://abc.local-corp.webcontainer-api.io/about")
    );
}
