use super::*;

fn tabs(paths: &[&str], active: &str) -> Tabs {
    let mut tabs = Tabs::with_initial(paths.iter().copied());
    tabs.set_active(active);
    tabs
}

fn assert_invariant(tabs: &Tabs) {
    if tabs.is_empty() {
        assert_eq!(tabs.active(), None);
    } else {
        let active = tabs.active().expect("non-empty strip has an active tab");
        assert!(tabs.tabs().iter().any(|tab| tab == active));
    }
}

#[test]
fn add_is_idempotent() {
    let mut tabs = Tabs::new();
    tabs.add("/a");
    tabs.add("/b");
    assert!(tabs.add("/a").is_empty());
    assert_eq!(tabs.tabs(), ["/a", "/b"]);
    assert_eq!(tabs.active(), Some("/a"));
}

#[test]
fn set_active_opens_missing_tab() {
    let mut tabs = tabs(&["/a"], "/a");
    let events = tabs.set_active("/b");
    assert_eq!(tabs.tabs(), ["/a", "/b"]);
    assert_eq!(tabs.active(), Some("/b"));
    assert!(events.contains(&TabEvent::Reveal("/b".to_string())));
}

#[test]
fn closing_active_middle_tab_selects_previous() {
    let mut tabs = tabs(&["/a", "/b", "/c"], "/b");
    tabs.close("/b");
    assert_eq!(tabs.tabs(), ["/a", "/c"]);
    assert_eq!(tabs.active(), Some("/a"));
}

#[test]
fn closing_active_first_tab_selects_next() {
    let mut tabs = tabs(&["/a", "/b", "/c"], "/a");
    tabs.close("/a");
    assert_eq!(tabs.tabs(), ["/b", "/c"]);
    assert_eq!(tabs.active(), Some("/b"));
}

#[test]
fn closing_last_remaining_tab_empties_the_strip() {
    let mut tabs = tabs(&["/a"], "/a");
    let events = tabs.close("/a");
    assert!(tabs.is_empty());
    assert_eq!(tabs.active(), None);
    assert!(events.contains(&TabEvent::ActiveChanged(None)));
}

#[test]
fn closing_inactive_or_absent_tab_keeps_active() {
    let mut tabs = tabs(&["/a", "/b", "/c"], "/c");
    tabs.close("/a");
    assert_eq!(tabs.active(), Some("/c"));
    assert!(tabs.close("/zzz").is_empty());
    assert_eq!(tabs.tabs(), ["/b", "/c"]);
}

#[test]
fn invariant_holds_across_operation_sequences() {
    let mut tabs = Tabs::new();
    let script: &[(&str, &str)] = &[
        ("add", "/a"),
        ("add", "/b"),
        ("active", "/c"),
        ("close", "/c"),
        ("close", "/a"),
        ("add", "/d"),
        ("active", "/a"),
        ("close", "/b"),
        ("close", "/a"),
        ("close", "/d"),
        ("add", "/e"),
    ];
    for (op, path) in script {
        match *op {
            "add" => tabs.add(path),
            "active" => tabs.set_active(path),
            _ => tabs.close(path),
        };
        assert_invariant(&tabs);
    }
    assert_eq!(tabs.tabs(), ["/e"]);
}

#[test]
fn rename_rewrites_nested_tabs_in_place() {
    let mut tabs = tabs(&["/src/a.ts", "/src/lib/b.ts", "/srcx/c.ts"], "/src/lib/b.ts");
    tabs.rename_path("/src", "/app");
    assert_eq!(tabs.tabs(), ["/app/a.ts", "/app/lib/b.ts", "/srcx/c.ts"]);
    assert_eq!(tabs.active(), Some("/app/lib/b.ts"));
}

#[test]
fn close_under_removes_subtree_and_reselects() {
    let mut tabs = tabs(&["/a.ts", "/dir/b.ts", "/dir/c.ts"], "/dir/c.ts");
    tabs.close_under("/dir");
    assert_eq!(tabs.tabs(), ["/a.ts"]);
    assert_eq!(tabs.active(), Some("/a.ts"));
}

#[test]
fn paths_are_canonicalized() {
    let mut tabs = Tabs::new();
    tabs.add("src/app.tsx");
    assert!(tabs.contains("/src/app.tsx"));
    assert_eq!(tabs.active(), Some("/src/app.tsx"));
}

#[test]
fn rename_onto_open_tab_leaves_one_entry() {
    let mut tabs = tabs(&["/src/a.ts", "/src/b.ts", "/src/c.ts"], "/src/c.ts");
    tabs.rename_path("/src/a.ts", "/src/c.ts");
    assert_eq!(tabs.tabs(), ["/src/c.ts", "/src/b.ts"]);
    assert_eq!(tabs.active(), Some("/src/c.ts"));
    assert_invariant(&tabs);
}

#[test]
fn rename_of_folder_onto_open_tabs_dedupes() {
    let mut tabs = tabs(&["/old/x.ts", "/new/x.ts", "/new/y.ts"], "/old/x.ts");
    tabs.rename_path("/old", "/new");
    assert_eq!(tabs.tabs(), ["/new/x.ts", "/new/y.ts"]);
    assert_eq!(tabs.active(), Some("/new/x.ts"));
    assert_invariant(&tabs);
}
