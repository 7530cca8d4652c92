//! External command execution
//!
//! Every shell-out in the engine goes through the [`CommandRunner`] seam so
//! that the sequencer, lock and verifier can be exercised against scripted
//! runners in tests.

use std::ffi::OsStr;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Result, UpdateError};

/// Captured result of an external command
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// Exit status of the process (`-1` when terminated by a signal)
    pub status: i32,
    /// Combined stdout and stderr
    pub output: String,
}

impl CmdOutput {
    /// Map a non-zero exit into [`UpdateError::ExternalToolFailed`],
    /// attaching the captured output.
    ///
    /// # Errors
    ///
    /// Returns `ExternalToolFailed` when the status is non-zero.
    pub fn expect_success(self, command: &str) -> Result<String> {
        if self.status == 0 {
            Ok(self.output)
        } else {
            Err(UpdateError::tool(command, self.status, self.output))
        }
    }
}

/// Seam for running external programs
pub trait CommandRunner {
    /// Run a program, capturing combined stdout/stderr.
    ///
    /// A non-zero exit is not an error at this level; callers decide via
    /// [`CmdOutput::expect_success`].
    ///
    /// # Errors
    ///
    /// Returns `ExternalToolFailed` when the program cannot be spawned.
    fn output(&self, program: &str, args: &[&str]) -> Result<CmdOutput>;

    /// Run a program with inherited stdio and return its exit status.
    ///
    /// Used for long-running flash writes whose progress output should
    /// reach the operator directly, and for customization hooks which may
    /// be interactive.
    ///
    /// # Errors
    ///
    /// Returns `ExternalToolFailed` when the program cannot be spawned.
    fn status(&self, program: &str, args: &[&str]) -> Result<i32>;
}

/// Production [`CommandRunner`] backed by [`std::process::Command`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn spawn_error(command: &str, err: &std::io::Error) -> UpdateError {
    UpdateError::tool(command, -1, format!("failed to start: {err}"))
}

impl CommandRunner for SystemRunner {
    fn output(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let line = command_line(program, args);
        debug!(command = %line, "running external command");

        let out = Command::new(program)
            .args(args.iter().map(OsStr::new))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| spawn_error(&line, &e))?;

        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(CmdOutput {
            status: out.status.code().unwrap_or(-1),
            output: combined,
        })
    }

    fn status(&self, program: &str, args: &[&str]) -> Result<i32> {
        let line = command_line(program, args);
        debug!(command = %line, "running external command (inherited stdio)");

        let status = Command::new(program)
            .args(args.iter().map(OsStr::new))
            .status()
            .map_err(|e| spawn_error(&line, &e))?;

        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_success_passes_output_through() -> Result<()> {
        let out = CmdOutput {
            status: 0,
            output: "Verified OK".to_string(),
        };
        assert_eq!(out.expect_success("openssl dgst")?, "Verified OK");
        Ok(())
    }

    #[test]
    fn test_expect_success_maps_nonzero_exit() {
        let out = CmdOutput {
            status: 1,
            output: "Verification failure".to_string(),
        };
        let err = out.expect_success("openssl dgst");
        assert!(matches!(
            err,
            Err(UpdateError::ExternalToolFailed { status: 1, .. })
        ));
    }

    #[test]
    fn test_system_runner_captures_combined_output() -> Result<()> {
        let out = SystemRunner.output("sh", &["-c", "echo out; echo err >&2"])?;
        assert_eq!(out.status, 0);
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
        Ok(())
    }

    #[test]
    fn test_system_runner_reports_exit_status() -> Result<()> {
        let out = SystemRunner.output("sh", &["-c", "exit 42"])?;
        assert_eq!(out.status, 42);
        Ok(())
    }

    #[test]
    fn test_system_runner_spawn_failure_is_tool_error() {
        let err = SystemRunner.output("/nonexistent/definitely-missing", &[]);
        assert!(matches!(err, Err(UpdateError::ExternalToolFailed { .. })));
    }
}
