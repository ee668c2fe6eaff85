use crate::kernel::observe::lock;
use crate::kernel::services::ports::PreferenceStore;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const PREFERENCES_DIR: &str = ".sandbench";
const PREFERENCES_FILE: &str = "preferences.json";

pub fn get_preferences_path() -> Option<PathBuf> {
    get_cache_dir().map(|dir| dir.join(PREFERENCES_DIR).join(PREFERENCES_FILE))
}

/// Preferences kept in a JSON object file, keyed by preference name.
pub struct JsonPreferenceStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonPreferenceStore {
    /// A missing or unreadable file starts out empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str::<Map<String, Value>>(&data).ok())
            .unwrap_or_default();
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn open_default() -> std::io::Result<Self> {
        let path = get_preferences_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Cannot determine preferences directory",
            )
        })?;
        Ok(Self::open(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values)
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let content = {
            let mut values = lock(&self.values);
            values.insert(key.to_string(), Value::String(value.to_string()));
            serde_json::to_string_pretty(&*values).map_err(std::io::Error::other)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)
    }
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<FxHashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub(crate) fn get_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        return std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library/Caches"));
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            return Some(PathBuf::from(xdg));
        }
        return std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".cache"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return Some(PathBuf::from(local));
        }
        return std::env::var("APPDATA").ok().map(PathBuf::from);
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

/// 日志目录：`<cache>/.sandbench/logs`
pub fn get_log_dir() -> Option<PathBuf> {
    get_cache_dir().map(|dir| dir.join(PREFERENCES_DIR).join("logs"))
}

/// 确保日志目录存在
pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let dir = get_log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Cannot determine log directory",
        )
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/adapters/settings.rs"]
mod tests;
