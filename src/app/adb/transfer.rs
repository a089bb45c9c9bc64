use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::adb::runner::AdbRunner;
use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResult {
    pub remote_path: String,
    pub local_path: String,
    pub success: bool,
    pub local_size: Option<u64>,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Pulls a remote file or directory. The tool recurses into directories on
/// its own, so one primitive covers both. The tool's exit code is not fully
/// trustworthy for completion: a reported success without a local artifact
/// is downgraded to failure.
pub fn pull(
    runner: &AdbRunner,
    serial: Option<&str>,
    remote_path: &str,
    local_path: &Path,
    timeout: Duration,
    trace_id: &str,
) -> Result<TransferResult, AppError> {
    if remote_path.trim().is_empty() {
        return Err(AppError::validation("remote_path is required", trace_id));
    }
    if let Some(parent) = local_path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::system(format!("Failed to create output dir: {err}"), trace_id)
        })?;
    }

    let args = vec![
        "pull".to_string(),
        remote_path.to_string(),
        local_path.to_string_lossy().to_string(),
    ];
    let output = runner.run_for(serial, &args, timeout, trace_id)?;

    let mut result = TransferResult {
        remote_path: remote_path.to_string(),
        local_path: local_path.to_string_lossy().to_string(),
        success: output.success(),
        local_size: None,
        message: String::new(),
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.exit_code,
    };

    if output.timed_out {
        result.message = "pull timed out".to_string();
        return Ok(result);
    }

    if result.success {
        match fs::metadata(local_path) {
            Ok(metadata) => {
                if metadata.is_file() {
                    result.local_size = Some(metadata.len());
                    result.message = format!("downloaded {} bytes", metadata.len());
                } else {
                    result.message = "downloaded directory".to_string();
                }
                info!(
                    trace_id = %trace_id,
                    remote = %remote_path,
                    local = %local_path.display(),
                    "pull complete"
                );
            }
            Err(_) => {
                // Post-condition failed: the tool claimed success but the
                // artifact is not there.
                result.success = false;
                result.message =
                    "tool reported success but the local file is missing".to_string();
                warn!(
                    trace_id = %trace_id,
                    remote = %remote_path,
                    local = %local_path.display(),
                    "pull post-condition failed"
                );
            }
        }
    } else {
        result.message = format!("pull failed: {}", result.stderr.trim());
    }

    Ok(result)
}

/// Counts regular files under a pulled directory tree.
pub fn local_file_count(root: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };
    let mut count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            count += local_file_count(&path);
        } else if path.is_file() {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_stub(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("adb-stub.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("stub");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path.to_string_lossy().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn success_without_local_artifact_is_downgraded() {
        let dir = TempDir::new().expect("tmp");
        // Stub passes the version probe and "pulls" without writing anything.
        let stub = write_stub(dir.path(), "exit 0");
        let runner = AdbRunner::new(stub, "t").expect("runner");

        let local = dir.path().join("out").join("pulled.db");
        let result = pull(
            &runner,
            Some("SER"),
            "/sdcard/file.db",
            &local,
            Duration::from_secs(5),
            "t",
        )
        .expect("pull");

        assert!(!result.success);
        assert!(result.message.contains("missing"));
        assert_eq!(result.local_size, None);
    }

    #[cfg(unix)]
    #[test]
    fn verified_pull_records_size() {
        let dir = TempDir::new().expect("tmp");
        // Last argument of `pull <remote> <local>` is the destination.
        let stub = write_stub(
            dir.path(),
            "case \"$1\" in version) exit 0;; esac\n\
             for last; do :; done\n\
             printf 'payload' > \"$last\"",
        );
        let runner = AdbRunner::new(stub, "t").expect("runner");

        let local = dir.path().join("pulled.db");
        let result = pull(
            &runner,
            None,
            "/sdcard/file.db",
            &local,
            Duration::from_secs(5),
            "t",
        )
        .expect("pull");

        assert!(result.success);
        assert_eq!(result.local_size, Some(7));
    }

    #[cfg(unix)]
    #[test]
    fn failed_pull_carries_stderr() {
        let dir = TempDir::new().expect("tmp");
        let stub = write_stub(
            dir.path(),
            "case \"$1\" in version) exit 0;; esac\n\
             echo 'remote object does not exist' >&2\n\
             exit 1",
        );
        let runner = AdbRunner::new(stub, "t").expect("runner");

        let result = pull(
            &runner,
            None,
            "/sdcard/nope",
            &dir.path().join("nope"),
            Duration::from_secs(5),
            "t",
        )
        .expect("pull");

        assert!(!result.success);
        assert!(result.message.contains("does not exist"));
    }

    #[test]
    fn local_file_count_walks_recursively() {
        let dir = TempDir::new().expect("tmp");
        fs::create_dir_all(dir.path().join("a/b")).expect("dirs");
        fs::write(dir.path().join("a/one.jpg"), b"1").expect("w");
        fs::write(dir.path().join("a/b/two.jpg"), b"2").expect("w");
        fs::write(dir.path().join("three.jpg"), b"3").expect("w");
        assert_eq!(local_file_count(dir.path()), 3);
        assert_eq!(local_file_count(&dir.path().join("missing")), 0);
    }
}
