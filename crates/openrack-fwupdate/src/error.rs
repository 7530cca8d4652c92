//! Error types for firmware update operations

use thiserror::Error;

/// Errors that can occur while orchestrating a firmware update
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Exclusive flash access could not be acquired
    #[error("flash access lock unavailable: {0}")]
    LockUnavailable(String),

    /// Signature verification failed or no trust anchor validated the package
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// The update package is missing an expected file or is otherwise unusable
    #[error("invalid firmware package: {0}")]
    PackageInvalid(String),

    /// A pre-install hook exited with a status outside its contract
    #[error("{target} pre-install hook exited with unrecognized status {status}")]
    HookFailed {
        /// Firmware target the hook was installing
        target: String,
        /// Raw exit status returned by the hook
        status: i32,
    },

    /// An external tool exited with a non-zero status
    #[error("`{command}` exited with status {status}: {output}")]
    ExternalToolFailed {
        /// The command line that was executed
        command: String,
        /// Exit status of the tool
        status: i32,
        /// Captured combined stdout/stderr
        output: String,
    },

    /// The operator declined a confirmation prompt or interrupted the run
    #[error("aborted by user")]
    UserAborted,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Build an [`UpdateError::ExternalToolFailed`] from a command line and
    /// its captured output.
    pub fn tool(command: impl Into<String>, status: i32, output: impl Into<String>) -> Self {
        UpdateError::ExternalToolFailed {
            command: command.into(),
            status,
            output: output.into(),
        }
    }
}

/// Result alias used throughout the engine
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display_carries_output() {
        let err = UpdateError::tool("pflash -i", 3, "no flash device");
        let msg = err.to_string();
        assert!(msg.contains("pflash -i"));
        assert!(msg.contains("status 3"));
        assert!(msg.contains("no flash device"));
    }

    #[test]
    fn test_hook_failed_display() {
        let err = UpdateError::HookFailed {
            target: "Host".to_string(),
            status: 7,
        };
        assert_eq!(
            err.to_string(),
            "Host pre-install hook exited with unrecognized status 7"
        );
    }
}
