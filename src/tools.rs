use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, VelocityError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exit status and captured standard output of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an opaque executable to completion.
pub trait ToolRunner {
    fn run(&self, tool: &Path, args: &[OsString]) -> Result<ToolOutput>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for &T {
    fn run(&self, tool: &Path, args: &[OsString]) -> Result<ToolOutput> {
        (**self).run(tool, args)
    }
}

/// Appends the platform executable suffix to a tool base name.
pub fn executable_name(base: &str) -> String {
    if cfg!(windows) {
        format!("{base}.exe")
    } else {
        base.to_string()
    }
}

pub(crate) fn tool_label(tool: &Path) -> String {
    tool.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool.display().to_string())
}

/// Runs tools as child processes, draining stdout before inspecting the exit code.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, tool: &Path, args: &[OsString]) -> Result<ToolOutput> {
        let label = tool_label(tool);
        debug!(tool = %tool.display(), ?args, "spawning external tool");

        let mut child = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VelocityError::ConversionFailed {
                tool: label.clone(),
                reason: format!("failed to start {}: {}", tool.display(), e),
            })?;

        // The reader thread keeps the pipe drained so the child never blocks on a full buffer.
        // Grandchildren can inherit the pipe and hold it open past the child's exit, so the
        // result comes back over a channel that is waited on with the remaining budget.
        let mut stdout = child.stdout.take();
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut buffer = String::new();
            if let Some(out) = stdout.as_mut() {
                let _ = out.read_to_string(&mut buffer);
            }
            let _ = sender.send(buffer);
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    return Err(VelocityError::ConversionFailed {
                        tool: label,
                        reason: format!("failed to wait for process: {e}"),
                    })
                }
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    warn!(tool = %label, ?timeout, "external tool timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(VelocityError::ConversionTimeout {
                        tool: label,
                        seconds: timeout.as_secs(),
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = match self.timeout {
            Some(timeout) => {
                let remaining = timeout.saturating_sub(started.elapsed());
                match receiver.recv_timeout(remaining) {
                    Ok(buffer) => buffer,
                    Err(RecvTimeoutError::Disconnected) => String::new(),
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(tool = %label, ?timeout, "output pipe still open after exit");
                        return Err(VelocityError::ConversionTimeout {
                            tool: label,
                            seconds: timeout.as_secs(),
                        });
                    }
                }
            }
            None => receiver.recv().unwrap_or_default(),
        };
        // Killed by a signal has no code; report it as a failure.
        let exit_code = status.code().unwrap_or(-1);
        info!(tool = %label, exit_code, "external tool finished");

        Ok(ToolOutput { exit_code, stdout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_name() {
        let name = executable_name("midi2csv");
        if cfg!(windows) {
            assert_eq!(name, "midi2csv.exe");
        } else {
            assert_eq!(name, "midi2csv");
        }
    }

    #[test]
    fn test_tool_label_strips_directory_and_suffix() {
        assert_eq!(tool_label(Path::new("/opt/tools/csv2midi.exe")), "csv2midi");
    }

    #[test]
    fn test_missing_executable_is_conversion_failure() {
        let runner = ProcessRunner::new(None);
        let result = runner.run(Path::new("/nonexistent/midi2csv"), &[]);
        assert!(matches!(result, Err(VelocityError::ConversionFailed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_and_exit_code() {
        let runner = ProcessRunner::new(Some(Duration::from_secs(10)));
        let output = runner
            .run(
                Path::new("/bin/sh"),
                &["-c".into(), "echo converted; exit 3".into()],
            )
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "converted");
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_the_tool() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(100)));
        let result = runner.run(Path::new("/bin/sh"), &["-c".into(), "sleep 5".into()]);
        assert!(matches!(result, Err(VelocityError::ConversionTimeout { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_background_child_holding_stdout_does_not_outlast_timeout() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(300)));
        let started = Instant::now();
        let result = runner.run(
            Path::new("/bin/sh"),
            &["-c".into(), "sleep 3 & echo converted".into()],
        );

        assert!(matches!(result, Err(VelocityError::ConversionTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
