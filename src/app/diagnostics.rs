use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use zip::write::FileOptions;

use crate::app::adb::locator::probe_adb;
use crate::app::adb::parse::parse_devices;
use crate::app::adb::runner::AdbRunner;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::models::{AdbInfo, Device};
use crate::app::output::sanitize_filename_component;

#[derive(Debug, Serialize)]
struct DiagnosticsManifest {
    app_version: &'static str,
    os: &'static str,
    arch: &'static str,
    timestamp_utc: String,
    trace_id: String,
}

#[derive(Debug, Serialize)]
struct DevicesPayload {
    parsed: Vec<Device>,
    raw_stdout: String,
    raw_stderr: String,
    exit_code: Option<i32>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct DiagnosticsPayload {
    manifest: DiagnosticsManifest,
    adb: AdbInfo,
    devices: DevicesPayload,
}

/// Zips the environment state a bug report needs: tool probe result plus
/// the raw and parsed device list. Works with no tool and no device — the
/// bundle then documents exactly that.
pub fn export_diagnostics_bundle(
    config: &AppConfig,
    output_dir: &Path,
    trace_id: &str,
) -> Result<PathBuf, AppError> {
    fs::create_dir_all(output_dir).map_err(|err| {
        AppError::system(format!("Failed to create output dir: {err}"), trace_id)
    })?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let safe_trace = sanitize_filename_component(trace_id);
    let trace_short = safe_trace.chars().take(8).collect::<String>();
    let bundle_path = output_dir.join(format!("diagnostics_{timestamp}_{trace_short}.zip"));

    let manifest = DiagnosticsManifest {
        app_version: env!("CARGO_PKG_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        timestamp_utc: Utc::now().to_rfc3339(),
        trace_id: trace_id.to_string(),
    };

    let adb = probe_adb(&config.adb.command_path, trace_id);

    let mut devices_payload = DevicesPayload {
        parsed: Vec::new(),
        raw_stdout: String::new(),
        raw_stderr: String::new(),
        exit_code: None,
        error: None,
    };
    if adb.available {
        match AdbRunner::new(adb.command_path.clone(), trace_id) {
            Ok(runner) => {
                let args = vec!["devices".to_string(), "-l".to_string()];
                match runner.run(&args, config.timeouts.command(), trace_id) {
                    Ok(output) => {
                        devices_payload.exit_code = output.exit_code;
                        devices_payload.raw_stdout = output.stdout.clone();
                        devices_payload.raw_stderr = output.stderr.clone();
                        devices_payload.parsed = parse_devices(&output.stdout);
                    }
                    Err(err) => devices_payload.error = Some(err.error),
                }
            }
            Err(err) => devices_payload.error = Some(err.error),
        }
    } else {
        devices_payload.error = adb.error.clone();
    }

    let payload = DiagnosticsPayload {
        manifest,
        adb,
        devices: devices_payload,
    };

    let json = serde_json::to_vec_pretty(&payload).map_err(|err| {
        AppError::system(
            format!("Failed to serialize diagnostics payload: {err}"),
            trace_id,
        )
    })?;

    let file = fs::File::create(&bundle_path)
        .map_err(|err| AppError::system(format!("Failed to create bundle: {err}"), trace_id))?;
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("diagnostics.json", FileOptions::<()>::default())
        .map_err(|err| AppError::system(format!("Failed to write bundle: {err}"), trace_id))?;
    zip.write_all(&json)
        .map_err(|err| AppError::system(format!("Failed to write bundle: {err}"), trace_id))?;
    zip.finish()
        .map_err(|err| AppError::system(format!("Failed to finalize bundle: {err}"), trace_id))?;

    Ok(bundle_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    #[test]
    fn bundle_is_written_even_without_the_tool() {
        let dir = TempDir::new().expect("tmp");
        let mut config = AppConfig::default();
        config.adb.command_path = "/this/path/should/not/exist/adb".to_string();

        let bundle = export_diagnostics_bundle(&config, dir.path(), "trace-test")
            .expect("bundle");

        let bytes = fs::read(&bundle).expect("read bundle");
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("zip");
        let mut file = archive.by_name("diagnostics.json").expect("entry");
        let mut content = String::new();
        file.read_to_string(&mut content).expect("read");

        assert!(content.contains("\"trace_id\": \"trace-test\""));
        assert!(content.contains("\"adb\""));
        assert!(content.contains("\"devices\""));
    }
}
