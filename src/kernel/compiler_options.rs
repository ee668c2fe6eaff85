//! 项目编译配置（`tsconfig.json`）到代码智能层原生选项的转换。
//!
//! `target`/`module`/`moduleResolution`/`jsx` 映射为数值枚举，`paths` 中的 `./`
//! 前缀改写为 `file:///`，其余选项原样透传。

use serde::Deserialize;
use serde_json::{Map, Value};

/// Option names are compared after lowercasing and dropping `-`/`_`, so
/// `ESNext`, `esnext` and `es_next` are the same value.
fn fold(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! numeric_option {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn parse(name: &str) -> Option<Self> {
                let folded = fold(name);
                $(
                    if folded == fold(stringify!($variant)) {
                        return Some($name::$variant);
                    }
                )+
                None
            }

            pub fn value(self) -> u32 {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }
    };
}

numeric_option!(ScriptTarget {
    ES3 = 0,
    ES5 = 1,
    ES2015 = 2,
    ES2016 = 3,
    ES2017 = 4,
    ES2018 = 5,
    ES2019 = 6,
    ES2020 = 7,
    ES2021 = 8,
    ES2022 = 9,
    ESNext = 99,
    JSON = 100,
});

numeric_option!(ModuleKind {
    None = 0,
    CommonJS = 1,
    AMD = 2,
    UMD = 3,
    System = 4,
    ES2015 = 5,
    ES2020 = 6,
    ES2022 = 7,
    ESNext = 99,
    Node16 = 100,
    NodeNext = 199,
});

numeric_option!(ModuleResolution {
    Classic = 1,
    NodeJs = 2,
    Node16 = 3,
    NodeNext = 99,
    Bundler = 100,
});

numeric_option!(JsxEmit {
    None = 0,
    Preserve = 1,
    React = 2,
    ReactNative = 3,
    ReactJSX = 4,
    ReactJSXDev = 5,
});

impl Default for ModuleResolution {
    fn default() -> Self {
        ModuleResolution::NodeJs
    }
}

impl ModuleResolution {
    fn parse_with_alias(name: &str) -> Option<Self> {
        match fold(name).as_str() {
            "node" | "node10" => Some(ModuleResolution::NodeJs),
            _ => Self::parse(name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerOptions {
    pub target: Option<ScriptTarget>,
    pub module: Option<ModuleKind>,
    pub module_resolution: ModuleResolution,
    pub jsx: Option<JsxEmit>,
    /// Alias -> rewritten lookup locations, in declaration order.
    pub paths: Vec<(String, Vec<String>)>,
    pub rest: Map<String, Value>,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "compilerOptions")]
    compiler_options: Map<String, Value>,
}

impl CompilerOptions {
    /// Parses a compiler configuration document. Unknown values leave the
    /// corresponding option unset.
    pub fn from_config_json(text: &str) -> Result<Self, serde_json::Error> {
        let file: ConfigFile = serde_json::from_str(text)?;
        Ok(Self::from_compiler_options(file.compiler_options))
    }

    pub fn from_compiler_options(mut raw: Map<String, Value>) -> Self {
        let target = raw.remove("target");
        let module = raw.remove("module");
        let module_resolution = raw.remove("moduleResolution");
        let jsx = raw.remove("jsx");
        let paths = raw.remove("paths");

        Self {
            target: as_str(&target).and_then(ScriptTarget::parse),
            module: as_str(&module).and_then(ModuleKind::parse),
            module_resolution: as_str(&module_resolution)
                .and_then(ModuleResolution::parse_with_alias)
                .unwrap_or_default(),
            jsx: as_str(&jsx).and_then(JsxEmit::parse),
            paths: paths.map(rewrite_paths).unwrap_or_default(),
            rest: raw,
        }
    }

    /// Native option object handed to the code-intelligence layer.
    pub fn to_json(&self) -> Value {
        let mut out = self.rest.clone();
        if let Some(target) = self.target {
            out.insert("target".into(), target.value().into());
        }
        if let Some(module) = self.module {
            out.insert("module".into(), module.value().into());
        }
        out.insert(
            "moduleResolution".into(),
            self.module_resolution.value().into(),
        );
        if let Some(jsx) = self.jsx {
            out.insert("jsx".into(), jsx.value().into());
        }
        if !self.paths.is_empty() {
            let paths: Map<String, Value> = self
                .paths
                .iter()
                .map(|(alias, targets)| (alias.clone(), Value::from(targets.clone())))
                .collect();
            out.insert("paths".into(), Value::Object(paths));
        }
        Value::Object(out)
    }
}

fn as_str(value: &Option<Value>) -> Option<&str> {
    value.as_ref().and_then(Value::as_str)
}

fn rewrite_paths(value: Value) -> Vec<(String, Vec<String>)> {
    let Value::Object(map) = value else {
        return Vec::new();
    };
    map.into_iter()
        .map(|(alias, targets)| {
            let targets = match targets {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|target| target.replacen("./", "file:///", 1))
                    .collect(),
                _ => Vec::new(),
            };
            (alias, targets)
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/kernel/compiler_options.rs"]
mod tests;
