use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const MAX_ITEMS_FLOOR: u32 = 1;
pub const MAX_ITEMS_CEIL: u32 = 1000;
pub const DEFAULT_MAX_ITEMS: u32 = 120;

pub struct AppPaths {
    pub base_dir: PathBuf,
    pub history_path: PathBuf,
    pub queue_path: PathBuf,
    pub settings_path: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl AppPaths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .expect("Could not determine home directory")
            .join(".clipstack");
        Self::from_base(base)
    }

    pub fn from_base(base: PathBuf) -> Self {
        Self {
            history_path: base.join("history.json"),
            queue_path: base.join("queue.json"),
            settings_path: base.join("settings.json"),
            pid_file: base.join("clipstack.pid"),
            log_file: base.join("clipstack.log"),
            base_dir: base,
        }
    }
}

/// Flat key-value settings persisted as JSON. Out-of-range values are
/// clamped on load and on set, never rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub max_items_limit: u32,
    pub retention_days: u32,
    pub keep_pinned_on_clear: bool,
    pub auto_remove_after_paste: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_items_limit: DEFAULT_MAX_ITEMS,
            retention_days: 0,
            keep_pinned_on_clear: true,
            auto_remove_after_paste: true,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        let mut settings: Settings = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        settings.clamp();
        settings
    }

    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(raw) => {
                if let Err(e) = fs::write(path, raw) {
                    tracing::warn!("failed to write settings: {}", e);
                }
            }
            Err(e) => tracing::warn!("failed to encode settings: {}", e),
        }
    }

    pub fn clamp(&mut self) {
        self.max_items_limit = self.max_items_limit.clamp(MAX_ITEMS_FLOOR, MAX_ITEMS_CEIL);
    }

    pub fn set_max_items(&mut self, value: u32) {
        self.max_items_limit = value.clamp(MAX_ITEMS_FLOOR, MAX_ITEMS_CEIL);
    }

    pub fn set_retention_days(&mut self, value: u32) {
        self.retention_days = value;
    }
}
