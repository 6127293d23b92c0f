//! Worker configuration management.
//!
//! Holds the page origin, the cache version and generation prefixes, the
//! static manifest, the offline page and notification settings.
//!
//! Configuration is stored at `~/.config/swcache/config.json`. Missing files
//! and missing fields fall back to defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "swcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin of the controlled pages, e.g. `https://quiz.example`
    pub origin: String,
    /// Suffix appended to both generation names. Bumping it is the upgrade path.
    pub cache_version: String,
    pub static_cache_prefix: String,
    pub dynamic_cache_prefix: String,
    /// Root-relative paths pre-cached at install time, in order
    pub static_manifest: Vec<String>,
    /// Served for failed navigations when present in cache
    pub offline_page: String,
    pub app_title: String,
    pub default_push_body: String,
    pub icon: String,
    pub badge: String,
    pub open_action_icon: String,
    pub close_action_icon: String,
    pub vibrate: Vec<u32>,
    pub answer_sync_tag: String,
    pub reminder_tag: String,
    pub reminder_body: String,
    pub reminder_threshold_hours: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            cache_version: "v1".to_string(),
            static_cache_prefix: "quiz-static".to_string(),
            dynamic_cache_prefix: "quiz-dynamic".to_string(),
            static_manifest: [
                "/",
                "/index.html",
                "/offline.html",
                "/css/styles.css",
                "/js/app.js",
                "/manifest.json",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            offline_page: "/offline.html".to_string(),
            app_title: "Quiz App".to_string(),
            default_push_body: "New content available".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/icon-72x72.png".to_string(),
            open_action_icon: "/icons/checkmark.png".to_string(),
            close_action_icon: "/icons/xmark.png".to_string(),
            vibrate: vec![100, 50, 100],
            answer_sync_tag: "sync-answers".to_string(),
            reminder_tag: "daily-reminder".to_string(),
            reminder_body: "Time for today's practice!".to_string(),
            reminder_threshold_hours: 24,
        }
    }
}

impl WorkerConfig {
    /// Load from an explicit path, or the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn static_cache_name(&self) -> String {
        format!("{}-{}", self.static_cache_prefix, self.cache_version)
    }

    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-{}", self.dynamic_cache_prefix, self.cache_version)
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin).with_context(|| format!("Invalid origin: {}", self.origin))
    }
}
