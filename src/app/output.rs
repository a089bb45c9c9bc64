use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::app::error::AppError;

/// Replaces characters that are unsafe in filenames. Serials from wireless
/// connections contain `:` which Windows rejects.
pub fn sanitize_filename_component(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// `<prefix>_<component>_<UTC timestamp>.<ext>`
pub fn timestamped_filename(prefix: &str, component: &str, ext: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    format!(
        "{prefix}_{}_{timestamp}.{ext}",
        sanitize_filename_component(component)
    )
}

pub fn ensure_dir(path: &Path, trace_id: &str) -> Result<(), AppError> {
    fs::create_dir_all(path).map_err(|err| {
        AppError::system(
            format!("Failed to create directory {}: {err}", path.display()),
            trace_id,
        )
    })
}

/// Writes a pretty-printed UTF-8 JSON artifact.
pub fn save_json<T: Serialize>(value: &T, path: &Path, trace_id: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent, trace_id)?;
    }
    let payload = serde_json::to_string_pretty(value).map_err(|err| {
        AppError::system(format!("Failed to serialize JSON: {err}"), trace_id)
    })?;
    fs::write(path, payload).map_err(|err| {
        AppError::system(
            format!("Failed to write {}: {err}", path.display()),
            trace_id,
        )
    })?;
    info!(trace_id = %trace_id, path = %path.display(), "artifact saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn sanitizes_wireless_serials() {
        assert_eq!(
            sanitize_filename_component("192.168.1.20:5555"),
            "192.168.1.20_5555"
        );
        assert_eq!(sanitize_filename_component(""), "unknown");
    }

    #[test]
    fn timestamped_filename_has_expected_shape() {
        let name = timestamped_filename("device_info", "ABC:1", "json");
        assert!(name.starts_with("device_info_ABC_1_"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn save_json_is_pretty_and_utf8() {
        let dir = TempDir::new().expect("tmp");
        let path = dir.path().join("nested").join("info.json");
        let mut payload = BTreeMap::new();
        payload.insert("ro.product.model".to_string(), "Pixel 7".to_string());

        save_json(&payload, &path, "t").expect("save");
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\n"));
        assert!(raw.contains("\"ro.product.model\": \"Pixel 7\""));
    }
}
