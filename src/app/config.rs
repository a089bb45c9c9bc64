use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    /// Explicit path to the bridge executable. Empty means "search": the
    /// bundled platform-tools copy first, then PATH.
    pub command_path: String,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSettings {
    pub output_dir: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_dir: "output".to_string(),
        }
    }
}

/// Per-operation ceilings, seconds. Backups and restores wait on a human
/// confirming on the device screen, so their ceilings dwarf the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSettings {
    pub command_secs: u64,
    pub shell_secs: u64,
    pub pull_secs: u64,
    pub backup_secs: u64,
    pub restore_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            command_secs: 30,
            shell_secs: 60,
            pull_secs: 300,
            backup_secs: 300,
            restore_secs: 600,
        }
    }
}

impl TimeoutSettings {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn shell(&self) -> Duration {
        Duration::from_secs(self.shell_secs)
    }

    pub fn pull(&self) -> Duration {
        Duration::from_secs(self.pull_secs)
    }

    pub fn backup(&self) -> Duration {
        Duration::from_secs(self.backup_secs)
    }

    pub fn restore(&self) -> Duration {
        Duration::from_secs(self.restore_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogcatSettings {
    pub default_lines: u32,
}

impl Default for LogcatSettings {
    fn default() -> Self {
        Self {
            default_lines: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhatsappSettings {
    /// Candidate storage roots, probed in order. The order encodes the
    /// per-Android-version layout changes and must stay first-match-wins.
    pub root_candidates: Vec<String>,
}

impl Default for WhatsappSettings {
    fn default() -> Self {
        Self {
            root_candidates: default_root_candidates(),
        }
    }
}

pub fn default_root_candidates() -> Vec<String> {
    vec![
        "/sdcard/WhatsApp".to_string(),
        "/storage/emulated/0/WhatsApp".to_string(),
        "/sdcard/Android/media/com.whatsapp".to_string(),
        "/storage/emulated/0/Android/media/com.whatsapp".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub logcat: LogcatSettings,
    #[serde(default)]
    pub whatsapp: WhatsappSettings,
    #[serde(default)]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            adb: AdbSettings::default(),
            output: OutputSettings::default(),
            timeouts: TimeoutSettings::default(),
            logcat: LogcatSettings::default(),
            whatsapp: WhatsappSettings::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DROIDPULL_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".droidpull_config.json")
}

pub fn backup_config_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".droidpull_config.backup.json")
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), ""))?;
    let mut config: AppConfig = serde_json::from_value(value.clone()).unwrap_or_default();
    config = apply_legacy_overrides(config, &value);
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

/// Earlier releases stored a flat file with `adb_path` / `output_dir` keys.
fn apply_legacy_overrides(mut config: AppConfig, value: &serde_json::Value) -> AppConfig {
    if let Some(adb_path) = value.get("adb_path").and_then(|v| v.as_str()) {
        config.adb.command_path = adb_path.to_string();
    }
    if let Some(output_dir) = value.get("output_dir").and_then(|v| v.as_str()) {
        config.output.output_dir = output_dir.to_string();
    }
    if let Some(lines) = value.get("log_lines").and_then(|v| v.as_u64()) {
        config.logcat.default_lines = lines as u32;
    }
    config
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = TimeoutSettings::default();
    if config.timeouts.command_secs < 5 {
        config.timeouts.command_secs = defaults.command_secs;
    }
    if config.timeouts.shell_secs < 5 {
        config.timeouts.shell_secs = defaults.shell_secs;
    }
    if config.timeouts.pull_secs < 30 {
        config.timeouts.pull_secs = defaults.pull_secs;
    }
    if config.timeouts.backup_secs < 60 {
        config.timeouts.backup_secs = defaults.backup_secs;
    }
    if config.timeouts.restore_secs < 60 {
        config.timeouts.restore_secs = defaults.restore_secs;
    }
    if config.logcat.default_lines < 10 {
        config.logcat.default_lines = LogcatSettings::default().default_lines;
    }
    if config.whatsapp.root_candidates.is_empty() {
        config.whatsapp.root_candidates = default_root_candidates();
    }
    config
}
