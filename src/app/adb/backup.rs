use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::app::adb::interactive::run_interactive;
use crate::app::adb::runner::{scoped_args, AdbRunner};
use crate::app::error::AppError;
use crate::app::models::{BackupOptions, BackupResult, RestoreResult};

/// Backup archives carry this extension; the format itself is owned by the
/// bridge tool and treated as opaque.
pub const BACKUP_EXTENSION: &str = "ab";

pub fn ensure_backup_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == BACKUP_EXTENSION => path.to_path_buf(),
        _ => {
            let mut with_ext = path.as_os_str().to_owned();
            with_ext.push(".");
            with_ext.push(BACKUP_EXTENSION);
            PathBuf::from(with_ext)
        }
    }
}

/// Flag mapping for `adb backup`. Note the asymmetry the tool requires:
/// system apps are excluded with an explicit `-nosystem`.
pub fn backup_args(options: &BackupOptions, output_path: &str) -> Vec<String> {
    let mut args = vec!["backup".to_string()];
    if options.include_all {
        args.push("-all".to_string());
    }
    if options.include_apk {
        args.push("-apk".to_string());
    }
    if options.include_shared {
        args.push("-shared".to_string());
    }
    if options.include_system {
        args.push("-system".to_string());
    } else {
        args.push("-nosystem".to_string());
    }
    args.push("-f".to_string());
    args.push(output_path.to_string());
    args
}

/// Creates a full-device backup. The operator must confirm on the device
/// screen before the tool starts writing. Success requires both a clean
/// exit and a non-empty archive: `adb backup` exits 0 even when the user
/// declines on screen.
pub fn create_backup(
    runner: &AdbRunner,
    serial: Option<&str>,
    options: &BackupOptions,
    output_path: &Path,
    max_wait: Duration,
    trace_id: &str,
) -> Result<BackupResult, AppError> {
    let output_path = ensure_backup_extension(output_path);
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::system(format!("Failed to create output dir: {err}"), trace_id)
        })?;
    }

    let args = scoped_args(
        serial,
        &backup_args(options, &output_path.to_string_lossy()),
    );
    info!(trace_id = %trace_id, path = %output_path.display(), "starting backup, confirm on the device screen");
    let outcome = run_interactive(runner.program(), &args, max_wait, trace_id)?;

    let display_path = output_path.to_string_lossy().to_string();
    if outcome.timed_out {
        return Ok(BackupResult {
            success: false,
            output_path: display_path,
            file_size: None,
            timed_out: true,
            message: format!("backup timed out after {}s", max_wait.as_secs()),
            stderr: outcome.stderr,
        });
    }

    let file_size = fs::metadata(&output_path)
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len());

    match file_size {
        Some(size) if size > 0 => Ok(BackupResult {
            success: true,
            output_path: display_path,
            file_size: Some(size),
            timed_out: false,
            message: format!("backup created, {size} bytes"),
            stderr: outcome.stderr,
        }),
        _ => {
            warn!(trace_id = %trace_id, path = %output_path.display(), "backup archive missing or empty");
            Ok(BackupResult {
                success: false,
                output_path: display_path,
                file_size,
                timed_out: false,
                message:
                    "backup archive was not created (was the backup declined on the device?)"
                        .to_string(),
                stderr: outcome.stderr,
            })
        }
    }
}

/// Restores a backup archive. Consumes a local file and changes only
/// device-side state, so a clean exit is the whole success criterion.
pub fn restore_backup(
    runner: &AdbRunner,
    serial: Option<&str>,
    backup_file: &Path,
    max_wait: Duration,
    trace_id: &str,
) -> Result<RestoreResult, AppError> {
    if !backup_file.is_file() {
        return Err(AppError::validation(
            format!("Backup file not found: {}", backup_file.display()),
            trace_id,
        ));
    }

    let args = scoped_args(
        serial,
        &[
            "restore".to_string(),
            backup_file.to_string_lossy().to_string(),
        ],
    );
    info!(trace_id = %trace_id, path = %backup_file.display(), "starting restore, confirm on the device screen");
    let outcome = run_interactive(runner.program(), &args, max_wait, trace_id)?;

    if outcome.timed_out {
        return Ok(RestoreResult {
            success: false,
            timed_out: true,
            message: format!("restore timed out after {}s", max_wait.as_secs()),
            stderr: outcome.stderr,
        });
    }

    if outcome.clean_exit() {
        Ok(RestoreResult {
            success: true,
            timed_out: false,
            message: "restore finished".to_string(),
            stderr: outcome.stderr,
        })
    } else {
        Ok(RestoreResult {
            success: false,
            timed_out: false,
            message: format!(
                "restore failed with exit code {:?}",
                outcome.exit_code
            ),
            stderr: outcome.stderr,
        })
    }
}
