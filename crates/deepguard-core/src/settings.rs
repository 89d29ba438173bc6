use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_ENDPOINT: &str = "http://127.0.0.1:5000";

/// User configuration, read by the core and written by an external
/// settings UI. Field names follow the persisted storage keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub auto_scan: bool,
    pub show_warnings: bool,
    pub enable_instagram: bool,
    pub enable_facebook: bool,
    pub api_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_scan: true,
            show_warnings: true,
            enable_instagram: true,
            enable_facebook: true,
            api_endpoint: DEFAULT_API_ENDPOINT.to_owned(),
        }
    }
}

impl Settings {
    /// Whether scanning is enabled for a platform tag. Only the platforms
    /// with explicit toggles can be disabled; everything else is always on.
    pub fn platform_enabled(&self, platform: &str) -> bool {
        match platform.to_ascii_lowercase().as_str() {
            "instagram" => self.enable_instagram,
            "facebook" => self.enable_facebook,
            _ => true,
        }
    }
}

/// Shared handle to the current settings. Reads take a snapshot; a change
/// notification replaces the whole value atomically, so the next decision
/// point sees the new configuration. Nothing caches a snapshot across a
/// controller's lifetime.
#[derive(Clone, Debug, Default)]
pub struct SettingsStore {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }

    pub fn replace(&self, settings: Settings) {
        *self.inner.write() = settings;
    }
}
