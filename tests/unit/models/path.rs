use super::*;

#[test]
fn join_builds_paths_from_root() {
    assert_eq!(join(ROOT, "src"), "/src");
    assert_eq!(join("/src", "app.tsx"), "/src/app.tsx");
}

#[test]
fn name_and_parent() {
    assert_eq!(file_name("/src/app.tsx"), "app.tsx");
    assert_eq!(parent("/src/app.tsx"), "/src");
    assert_eq!(parent("/src"), ROOT);
    assert_eq!(sibling("/src/a.ts", "b.ts"), "/src/b.ts");
}

#[test]
fn normalize_and_canonical_agree() {
    assert_eq!(normalize("./src//a.ts"), "src/a.ts");
    assert_eq!(normalize("/src/a.ts"), "src/a.ts");
    assert_eq!(canonical("src/a.ts"), "/src/a.ts");
    assert_eq!(canonical("."), "");
    assert_eq!(canonical(""), "");
}

#[test]
fn within_respects_segment_boundaries() {
    assert!(is_within("/src/a.ts", "/src"));
    assert!(is_within("/src", "/src"));
    assert!(!is_within("/srcx/a.ts", "/src"));
    assert!(is_within("/anything", ROOT));
}

#[test]
fn rebase_moves_descendants() {
    assert_eq!(rebase("/src/a.ts", "/src/a.ts", "/src/b.ts"), Some("/src/b.ts".to_string()));
    assert_eq!(rebase("/lib/x/y.ts", "/lib", "/pkg"), Some("/pkg/x/y.ts".to_string()));
    assert_eq!(rebase("/library/y.ts", "/lib", "/pkg"), None);
}

#[test]
fn virtual_uri_uses_file_scheme() {
    let uri = virtual_uri("./src/app.tsx").unwrap();
    assert_eq!(uri.as_str(), "file:///src/app.tsx");
    assert_eq!(virtual_uri("/src/app.tsx").unwrap(), uri);
    assert_eq!(
        virtual_uri("node_modules/solid-js/package.json").unwrap().as_str(),
        "file:///node_modules/solid-js/package.json"
    );
}
