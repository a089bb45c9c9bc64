use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::error::AppError;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Uniform record for one bridge invocation. A timeout is data, not an
/// error: `timed_out` is set, the child has already been killed and reaped.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    fn from_timeout() -> Self {
        Self {
            stdout: String::new(),
            stderr: "command timed out".to_string(),
            exit_code: None,
            timed_out: true,
        }
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

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn command: {err}"), trace_id))?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can
    // block once the pipe buffer fills, and we would incorrectly hit the
    // timeout.
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

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    warn!(trace_id = %trace_id, ?timeout, "command timed out, child killed");
                    return Ok(CommandOutput::from_timeout());
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
        timed_out: false,
    })
}

/// Prepends the device selector when a serial is given.
pub fn scoped_args(serial: Option<&str>, args: &[String]) -> Vec<String> {
    match serial {
        Some(serial) => {
            let mut scoped = Vec::with_capacity(args.len() + 2);
            scoped.push("-s".to_string());
            scoped.push(serial.to_string());
            scoped.extend(args.iter().cloned());
            scoped
        }
        None => args.to_vec(),
    }
}

/// Handle to a validated bridge executable. Construction performs the
/// `version` probe; a runner that exists is a runner that worked once.
#[derive(Debug, Clone)]
pub struct AdbRunner {
    program: String,
}

impl AdbRunner {
    pub fn new(program: impl Into<String>, trace_id: &str) -> Result<Self, AppError> {
        let program = program.into();
        let output = run_command_with_timeout(
            &program,
            &["version".to_string()],
            VERSION_PROBE_TIMEOUT,
            trace_id,
        )
        .map_err(|err| {
            AppError::dependency(
                format!("Bridge executable '{program}' could not be started: {}", err.error),
                trace_id,
            )
        })?;
        if !output.success() {
            return Err(AppError::dependency(
                format!(
                    "Bridge executable '{program}' failed the version probe: {}",
                    output.stderr.trim()
                ),
                trace_id,
            ));
        }
        debug!(trace_id = %trace_id, program = %program, "bridge executable validated");
        Ok(Self { program })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn run(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        run_command_with_timeout(&self.program, args, timeout, trace_id)
    }

    pub fn run_for(
        &self,
        serial: Option<&str>,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        self.run(&scoped_args(serial, args), timeout, trace_id)
    }

    pub fn shell(
        &self,
        serial: Option<&str>,
        command: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        let args = vec!["shell".to_string(), command.to_string()];
        self.run_for(serial, &args, timeout, trace_id)
    }
}
