use super::*;
use serde_json::json;

#[test]
fn option_names_match_case_insensitively() {
    assert_eq!(ScriptTarget::parse("esnext"), Some(ScriptTarget::ESNext));
    assert_eq!(ScriptTarget::parse("ESNEXT"), Some(ScriptTarget::ESNext));
    assert_eq!(ScriptTarget::parse("es2020"), Some(ScriptTarget::ES2020));
    assert_eq!(ModuleKind::parse("commonjs"), Some(ModuleKind::CommonJS));
    assert_eq!(JsxEmit::parse("react-jsx"), Some(JsxEmit::ReactJSX));
    assert_eq!(JsxEmit::parse("preserve"), Some(JsxEmit::Preserve));
    assert_eq!(ScriptTarget::parse("es1999"), None);
}

#[test]
fn translates_special_options_and_passes_the_rest_through() {
    let options = CompilerOptions::from_config_json(
        r#"{
            "compilerOptions": {
                "target": "ESNext",
                "module": "ESNext",
                "moduleResolution": "node",
                "jsx": "preserve",
                "jsxImportSource": "solid-js",
                "strict": true,
                "paths": { "~/*": ["./src/*"] }
            }
        }"#,
    )
    .unwrap();

    assert_eq!(options.target, Some(ScriptTarget::ESNext));
    assert_eq!(options.module, Some(ModuleKind::ESNext));
    assert_eq!(options.module_resolution, ModuleResolution::NodeJs);
    assert_eq!(options.jsx, Some(JsxEmit::Preserve));
    assert_eq!(
        options.paths,
        vec![("~/*".to_string(), vec!["file:///src/*".to_string()])]
    );
    assert_eq!(options.rest.get("strict"), Some(&json!(true)));

    let native = options.to_json();
    assert_eq!(native["target"], json!(99));
    assert_eq!(native["module"], json!(99));
    assert_eq!(native["moduleResolution"], json!(2));
    assert_eq!(native["jsx"], json!(1));
    assert_eq!(native["jsxImportSource"], json!("solid-js"));
    assert_eq!(native["paths"]["~/*"], json!(["file:///src/*"]));
}

#[test]
fn unknown_values_stay_unset_and_resolution_defaults_to_node() {
    let options = CompilerOptions::from_config_json(
        r#"{ "compilerOptions": { "target": "es1999", "moduleResolution": "wat" } }"#,
    )
    .unwrap();
    assert_eq!(options.target, None);
    assert_eq!(options.module_resolution, ModuleResolution::NodeJs);
    assert!(options.to_json().get("target").is_none());
}

#[test]
fn missing_compiler_options_block_is_empty() {
    let options = CompilerOptions::from_config_json("{}").unwrap();
    assert_eq!(options, CompilerOptions::default());
}

#[test]
fn malformed_config_is_an_error() {
    assert!(CompilerOptions::from_config_json("{ \"compilerOptions\": ").is_err());
}
