use serde::{Deserialize, Serialize};

/// Connection state reported by `adb devices -l`, second whitespace token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Device,
    Unauthorized,
    Offline,
    Other(String),
}

impl DeviceState {
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Device,
            "unauthorized" => DeviceState::Unauthorized,
            "offline" => DeviceState::Offline,
            other => DeviceState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceState::Device => "device",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Offline => "offline",
            DeviceState::Other(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
    pub detail: String,
}

impl Device {
    /// Only devices in the `device` state accept commands; `unauthorized`
    /// means the on-screen debugging prompt has not been accepted yet.
    pub fn is_authorized(&self) -> bool {
        self.state == DeviceState::Device
    }
}

/// Curated identity subset of the full `getprop` map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceProfile {
    pub serial: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub device: Option<String>,
    pub android_release: Option<String>,
    pub sdk_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInfo {
    pub package: String,
    pub installed: bool,
    pub version_name: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdbInfo {
    pub available: bool,
    pub version_output: String,
    pub command_path: String,
    pub error: Option<String>,
}

/// Flag set for `adb backup`. Defaults mirror a full device backup:
/// everything except system apps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupOptions {
    pub include_apk: bool,
    pub include_shared: bool,
    pub include_system: bool,
    pub include_all: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            include_apk: true,
            include_shared: true,
            include_system: false,
            include_all: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupResult {
    pub success: bool,
    pub output_path: String,
    pub file_size: Option<u64>,
    pub timed_out: bool,
    pub message: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreResult {
    pub success: bool,
    pub timed_out: bool,
    pub message: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogcatExportResult {
    pub serial: String,
    pub output_path: String,
    pub line_count: usize,
}
