//! Engine configuration
//!
//! Loaded from `config.toml` in the data directory. Every section has
//! defaults, so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::certificate::LearnerIdentity;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telemetry: TelemetryConfig,
    pub completion: CompletionConfig,
    pub gate: GateConfig,
    pub notifications: NotificationConfig,
    pub integrity: IntegrityConfig,
    pub sync: SyncConfig,
    pub identity: LearnerIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Coalescing window for play-position samples
    pub debounce_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Watch thresholds as whole percentages of lesson duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub min_watch_percent: u32,
    pub completion_percent: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            min_watch_percent: 40,
            completion_percent: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Jump to the next lesson after a watch-gated lesson completes
    pub auto_advance: bool,
    pub auto_advance_delay_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            auto_advance: true,
            auto_advance_delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub incomplete_min_percent: u8,
    pub inactive_after_days: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            incomplete_min_percent: 50,
            inactive_after_days: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub screenshot_window_secs: i64,
    pub paste_threshold: u32,
    pub copy_threshold: u32,
    /// Average seconds per question while the assessment is open
    pub pace_floor_secs: f64,
    /// Average seconds per question at submission time
    pub submission_floor_secs: f64,
    /// Seconds spent on a single answer
    pub answer_floor_secs: f64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            screenshot_window_secs: 5,
            paste_threshold: 3,
            copy_threshold: 5,
            pace_floor_secs: 3.0,
            submission_floor_secs: 2.0,
            answer_floor_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub backend: SyncBackend,
}

/// Supported remote progress mirrors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncBackend {
    /// Local-only mode
    #[default]
    None,
    /// JSON mirror file (shared folder, mounted volume)
    File { path: PathBuf },
    /// REST endpoint; token read from COURSEGATE_MIRROR_TOKEN
    Http { url: String },
}

impl Config {
    /// Load configuration, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        Ok(())
    }
}

/// Resolve the data directory: `./.coursegate` if present, else `~/.coursegate`
pub fn data_dir() -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let project_dir = cwd.join(".coursegate");
    if project_dir.exists() {
        return Ok(project_dir);
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".coursegate"))
}
