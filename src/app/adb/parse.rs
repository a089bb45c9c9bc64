use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::app::models::{AppInfo, Device, DeviceProfile, DeviceState};

/// Properties dumped verbatim into the device-info JSON artifact.
pub const IMPORTANT_PROPS: &[&str] = &[
    "ro.product.model",
    "ro.product.brand",
    "ro.product.device",
    "ro.build.version.release",
    "ro.build.version.sdk",
    "ro.serialno",
];

/// Parses `adb devices -l` output. Header and daemon-status lines are
/// dropped; each remaining line becomes one record: first token serial,
/// second token state, the rest joined as detail. Lines with fewer than two
/// tokens are dropped silently.
pub fn parse_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            Some(Device {
                serial: tokens[0].to_string(),
                state: DeviceState::from_token(tokens[1]),
                detail: tokens[2..].join(" "),
            })
        })
        .collect()
}

/// Parses `getprop` output lines of the shape `[key]: [value]`.
pub fn parse_getprop_map(output: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('[') {
            continue;
        }
        let Some((key_part, value_part)) = trimmed.split_once("]: [") else {
            continue;
        };
        let key = key_part.trim_start_matches('[').trim();
        let value = value_part.trim_end_matches(']').trim();
        if !key.is_empty() {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

pub fn build_device_profile(serial: &str, getprop_map: &HashMap<String, String>) -> DeviceProfile {
    DeviceProfile {
        serial: serial.to_string(),
        brand: getprop_map.get("ro.product.brand").cloned(),
        model: getprop_map.get("ro.product.model").cloned(),
        device: getprop_map.get("ro.product.device").cloned(),
        android_release: getprop_map.get("ro.build.version.release").cloned(),
        sdk_level: getprop_map.get("ro.build.version.sdk").cloned(),
    }
}

/// Curated subset of the property map, keys passed through verbatim.
/// Sorted map so the JSON artifact is stable across runs.
pub fn curated_properties(getprop_map: &HashMap<String, String>) -> BTreeMap<String, String> {
    let mut curated = BTreeMap::new();
    for prop in IMPORTANT_PROPS {
        if let Some(value) = getprop_map.get(*prop) {
            curated.insert((*prop).to_string(), value.clone());
        }
    }
    curated
}

/// Parses `pm list packages` output: one `package:<name>` per line.
pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn parse_dumpsys_version_name(output: &str) -> Option<String> {
    let re = Regex::new(r"versionName[=:]\s*(\S+)").ok()?;
    re.captures(output)
        .map(|caps| caps[1].trim_matches(['"', '\'']).to_string())
}

pub fn parse_dumpsys_user_id(output: &str) -> Option<String> {
    let re = Regex::new(r"userId[=:]\s*(\d+)").ok()?;
    re.captures(output).map(|caps| caps[1].to_string())
}

pub fn build_app_info(package: &str, installed: bool, dumpsys_output: &str) -> AppInfo {
    AppInfo {
        package: package.to_string(),
        installed,
        version_name: if installed {
            parse_dumpsys_version_name(dumpsys_output)
        } else {
            None
        },
        user_id: if installed {
            parse_dumpsys_user_id(dumpsys_output)
        } else {
            None
        },
    }
}
