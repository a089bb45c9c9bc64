use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::app::error::AppError;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Final state of a long-running interactive invocation. `timed_out` is a
/// distinct failure reason from a non-zero exit; when set, the child has
/// been forcibly terminated and reaped before this value was returned.
#[derive(Debug, Clone)]
pub struct InteractiveOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl InteractiveOutcome {
    pub fn clean_exit(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

fn drain_reader(mut reader: impl Read + Send + 'static) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

/// Runs a command whose completion depends on a human confirming on the
/// device screen. Streams are piped but never driven; the process simply
/// runs until it exits on its own or `max_wait` elapses. The ceiling is the
/// only cancellation mechanism — there is no way to cancel from here once
/// the operation has started.
pub fn run_interactive(
    program: &str,
    args: &[String],
    max_wait: Duration,
    trace_id: &str,
) -> Result<InteractiveOutcome, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AppError::system(format!("Failed to spawn interactive command: {err}"), trace_id)
        })?;

    // Closing stdin immediately: the confirmation happens on the device
    // screen, not on this pipe.
    drop(child.stdin.take());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain_reader(stdout);
    let stderr_handle = drain_reader(stderr);

    info!(trace_id = %trace_id, ?max_wait, "interactive command started, waiting for on-device confirmation");

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > max_wait {
                    // Kill, do not abandon: a hung backup process must not
                    // outlive the caller.
                    let _ = child.kill();
                    let _ = child.wait();
                    let stdout_bytes = stdout_handle.join().unwrap_or_default();
                    let stderr_bytes = stderr_handle.join().unwrap_or_default();
                    warn!(trace_id = %trace_id, ?max_wait, "interactive command timed out, child killed");
                    return Ok(InteractiveOutcome {
                        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
                        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
                        exit_code: None,
                        timed_out: true,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll interactive command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(InteractiveOutcome {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
        timed_out: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path.to_string_lossy().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn completes_within_ceiling() {
        let dir = tempfile::TempDir::new().expect("tmp");
        let script = write_script(dir.path(), "quick.sh", "echo confirmed; exit 0");
        let outcome = run_interactive(&script, &[], Duration::from_secs(5), "t").expect("run");
        assert!(outcome.clean_exit());
        assert!(outcome.stdout.contains("confirmed"));
    }

    #[cfg(unix)]
    #[test]
    fn ceiling_exceeded_kills_the_child() {
        let dir = tempfile::TempDir::new().expect("tmp");
        let pid_file = dir.path().join("child.pid");
        let script = write_script(
            dir.path(),
            "hang.sh",
            &format!("echo $$ > {}\nsleep 60", pid_file.display()),
        );

        let outcome =
            run_interactive(&script, &[], Duration::from_millis(400), "t").expect("run");
        assert!(outcome.timed_out);
        assert!(!outcome.clean_exit());
        assert_eq!(outcome.exit_code, None);

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .expect("pid file")
            .trim()
            .parse()
            .expect("pid");
        std::thread::sleep(Duration::from_millis(100));
        assert!(
            !std::path::Path::new(&format!("/proc/{pid}")).exists()
                || std::fs::read_to_string(format!("/proc/{pid}/stat"))
                    .map(|stat| stat.contains(") Z "))
                    .unwrap_or(true),
            "interactive child survived the timeout"
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_not_a_timeout() {
        let dir = tempfile::TempDir::new().expect("tmp");
        let script = write_script(dir.path(), "fail.sh", "echo denied >&2; exit 3");
        let outcome = run_interactive(&script, &[], Duration::from_secs(5), "t").expect("run");
        assert!(!outcome.timed_out);
        assert!(!outcome.clean_exit());
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.stderr.contains("denied"));
    }
}
