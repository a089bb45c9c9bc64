use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::app::adb::parse::{
    build_app_info, build_device_profile, parse_devices, parse_getprop_map, parse_package_list,
};
use crate::app::adb::runner::AdbRunner;
use crate::app::config::TimeoutSettings;
use crate::app::error::AppError;
use crate::app::models::{AppInfo, Device, DeviceProfile, LogcatExportResult};
use crate::app::output::timestamped_filename;

/// Enumerates attached devices. An empty list is a normal outcome, not an
/// error; a failed `devices -l` run also yields an empty list (the caller
/// can re-probe with `check` when it needs the distinction).
pub fn list_devices(
    runner: &AdbRunner,
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<Vec<Device>, AppError> {
    let args = vec!["devices".to_string(), "-l".to_string()];
    let output = runner.run(&args, timeouts.command(), trace_id)?;
    if !output.success() {
        warn!(trace_id = %trace_id, stderr = %output.stderr.trim(), "device enumeration failed");
        return Ok(Vec::new());
    }
    Ok(parse_devices(&output.stdout))
}

/// Selection rule: only authorized devices are eligible. A requested serial
/// must name an authorized device; without a request the first authorized
/// device wins.
pub fn select_device<'a>(
    devices: &'a [Device],
    requested: Option<&str>,
    trace_id: &str,
) -> Result<&'a Device, AppError> {
    if devices.is_empty() {
        return Err(AppError::validation(
            "No devices attached. Connect the phone over USB and enable USB debugging.",
            trace_id,
        ));
    }

    if let Some(serial) = requested {
        return match devices.iter().find(|d| d.serial == serial) {
            Some(device) if device.is_authorized() => Ok(device),
            Some(device) => Err(AppError::validation(
                format!(
                    "Device {serial} is {}. Accept the USB debugging prompt on the phone.",
                    device.state.as_str()
                ),
                trace_id,
            )),
            None => Err(AppError::validation(
                format!("No attached device with serial {serial}."),
                trace_id,
            )),
        };
    }

    devices
        .iter()
        .find(|device| device.is_authorized())
        .ok_or_else(|| {
            AppError::validation(
                "No authorized device. Accept the USB debugging prompt on the phone.",
                trace_id,
            )
        })
}

/// Fetches the full property map plus the curated identity profile.
pub fn device_profile(
    runner: &AdbRunner,
    serial: &str,
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<(DeviceProfile, HashMap<String, String>), AppError> {
    let output = runner.shell(Some(serial), "getprop", timeouts.shell(), trace_id)?;
    let map = if output.success() {
        parse_getprop_map(&output.stdout)
    } else {
        warn!(trace_id = %trace_id, serial = %serial, stderr = %output.stderr.trim(), "getprop failed");
        HashMap::new()
    };
    let profile = build_device_profile(serial, &map);
    Ok((profile, map))
}

pub fn installed_packages(
    runner: &AdbRunner,
    serial: &str,
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<Vec<String>, AppError> {
    let output = runner.shell(Some(serial), "pm list packages", timeouts.shell(), trace_id)?;
    if !output.success() {
        return Ok(Vec::new());
    }
    Ok(parse_package_list(&output.stdout))
}

pub fn app_info(
    runner: &AdbRunner,
    serial: &str,
    package: &str,
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<AppInfo, AppError> {
    if package.trim().is_empty() {
        return Err(AppError::validation("package is required", trace_id));
    }
    let command = format!("dumpsys package {package}");
    let output = runner.shell(Some(serial), &command, timeouts.shell(), trace_id)?;
    // dumpsys exits 0 even for unknown packages; an empty or "Unable to find"
    // body is the real signal.
    let installed = output.success()
        && !output.stdout.trim().is_empty()
        && !output.stdout.contains("Unable to find package");
    Ok(build_app_info(package, installed, &output.stdout))
}

pub fn logcat_dump(
    runner: &AdbRunner,
    serial: &str,
    lines: u32,
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<String, AppError> {
    let command = format!("logcat -d -t {lines}");
    let output = runner.shell(Some(serial), &command, timeouts.shell(), trace_id)?;
    if !output.success() {
        return Ok(String::new());
    }
    Ok(output.stdout)
}

/// Captures a bounded logcat snapshot into `<output_dir>/logcat_<serial>_<ts>.txt`.
pub fn save_logcat(
    runner: &AdbRunner,
    serial: &str,
    lines: u32,
    output_dir: &Path,
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<LogcatExportResult, AppError> {
    let payload = logcat_dump(runner, serial, lines, timeouts, trace_id)?;
    fs::create_dir_all(output_dir).map_err(|err| {
        AppError::system(format!("Failed to create output dir: {err}"), trace_id)
    })?;
    let output_path: PathBuf =
        output_dir.join(timestamped_filename("logcat", serial, "txt"));
    let line_count = payload.lines().count();
    fs::write(&output_path, &payload).map_err(|err| {
        AppError::system(format!("Failed to write logcat file: {err}"), trace_id)
    })?;
    info!(trace_id = %trace_id, serial = %serial, path = %output_path.display(), line_count, "logcat saved");
    Ok(LogcatExportResult {
        serial: serial.to_string(),
        output_path: output_path.to_string_lossy().to_string(),
        line_count,
    })
}
