//! Error types for xe operations.
//!
//! Every failure falls into one [`ErrorKind`]. The kind decides whether the
//! reconciliation engine may retry, must halt, or has to treat the outcome
//! as ambiguous. Failures that happened after the tool ran keep the full
//! [`ExecutionResult`] so raw tool output is never lost.

use crate::types::ExecutionResult;
use std::time::Duration;
use thiserror::Error;

/// Categories of xe errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input parameters, caught before any process spawn
    Validation,
    /// The external tool could not be started
    Spawn,
    /// The external tool ran too long and was killed
    Timeout,
    /// The external tool reported failure
    NonZeroExit,
    /// The tool succeeded but its output had an unexpected shape
    Parse,
    /// An expected identifier was absent from the output
    NotFound,
    /// The caller requested an unregistered operation
    UnknownOperation,
    /// A side effect may or may not have happened
    AmbiguousState,
}

impl ErrorKind {
    /// Whether a failure of this kind is transient and worth retrying on an
    /// idempotent operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Spawn)
    }

    /// Stable name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::Spawn => "SpawnError",
            Self::Timeout => "TimeoutError",
            Self::NonZeroExit => "NonZeroExit",
            Self::Parse => "ParseError",
            Self::NotFound => "NotFoundError",
            Self::UnknownOperation => "UnknownOperationError",
            Self::AmbiguousState => "AmbiguousStateError",
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid parameters",
            Self::Spawn => "Could not start xe",
            Self::Timeout => "xe timed out",
            Self::NonZeroExit => "xe reported failure",
            Self::Parse => "Unexpected xe output",
            Self::NotFound => "Object not found",
            Self::UnknownOperation => "Unknown operation",
            Self::AmbiguousState => "Outcome unknown",
        }
    }

    /// Get actionable advice for resolving this error kind.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Validation => "Check the parameters passed to the operation",
            Self::Spawn => "Check that xe is installed and executable, or set xe_path",
            Self::Timeout => "Raise timeout_seconds or check hypervisor load",
            Self::NonZeroExit => "Read the xe stderr above for the failing API call",
            Self::Parse => "The xe version may print a different format; inspect stdout",
            Self::NotFound => "Verify the object name with xe directly",
            Self::UnknownOperation => "Run `xectl ops` to list registered operations",
            Self::AmbiguousState => {
                "Inspect the hypervisor (e.g. xe vm-list) before resuming the plan"
            }
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while building, running, or parsing xe commands.
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter was missing, empty, or unsafe
    #[error("{operation}: invalid parameter `{parameter}`: {message}")]
    Validation {
        /// Operation being built
        operation: String,
        /// Offending parameter
        parameter: String,
        /// What is wrong with it
        message: String,
    },

    /// The binary could not be spawned
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its timeout and was killed
    #[error("{command} timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        /// xe subcommand
        command: String,
        /// Timeout that expired
        timeout: Duration,
        /// Output captured before the kill
        result: ExecutionResult,
    },

    /// The process exited with a non-zero code
    #[error("{command} failed with exit code {}: {}", .result.exit_code, first_line(.result))]
    NonZeroExit {
        /// xe subcommand
        command: String,
        /// Full captured result
        result: ExecutionResult,
    },

    /// Output did not match the operation's expected shape
    #[error("{operation}: unexpected output: {message}")]
    Parse {
        /// Operation whose output was parsed
        operation: String,
        /// Description of the mismatch
        message: String,
        /// Full captured result
        result: ExecutionResult,
    },

    /// The expected identifier was not in the output
    #[error("{operation}: {what} not found")]
    NotFound {
        /// Operation whose output was parsed
        operation: String,
        /// What was being looked up
        what: String,
        /// Full captured result
        result: ExecutionResult,
    },

    /// The operation is not registered
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// Requested operation name
        name: String,
    },

    /// Whether the side effect happened cannot be determined
    #[error("{operation}: ambiguous outcome: {message}")]
    AmbiguousState {
        /// Operation that failed
        operation: String,
        /// Why the outcome is unknown
        message: String,
        /// Captured result, when the process ran at all
        result: Option<ExecutionResult>,
    },
}

impl Error {
    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Spawn { .. } => ErrorKind::Spawn,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::UnknownOperation { .. } => ErrorKind::UnknownOperation,
            Error::AmbiguousState { .. } => ErrorKind::AmbiguousState,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// The captured process result, if the tool ran.
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Error::Timeout { result, .. }
            | Error::NonZeroExit { result, .. }
            | Error::Parse { result, .. }
            | Error::NotFound { result, .. } => Some(result),
            Error::AmbiguousState { result, .. } => result.as_ref(),
            Error::Validation { .. } | Error::Spawn { .. } | Error::UnknownOperation { .. } => None,
        }
    }

    /// Convert a transient failure of a non-idempotent operation into an
    /// ambiguous-state error. Other errors pass through unchanged.
    pub fn into_ambiguous(self, operation: &str) -> Self {
        match self {
            Error::Timeout {
                timeout, result, ..
            } => Error::AmbiguousState {
                operation: operation.to_string(),
                message: format!(
                    "timed out after {}s; the operation may have completed on the host",
                    timeout.as_secs_f64()
                ),
                result: Some(result),
            },
            Error::Spawn { program, source } => Error::AmbiguousState {
                operation: operation.to_string(),
                message: format!("failed to spawn {program}: {source}"),
                result: None,
            },
            other => other,
        }
    }

    pub(crate) fn validation(
        operation: &str,
        parameter: &str,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation {
            operation: operation.to_string(),
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }
}

fn first_line(result: &ExecutionResult) -> &str {
    let text = if result.stderr.trim().is_empty() {
        &result.stdout
    } else {
        &result.stderr
    };
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

/// Result type for xe operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code: 1,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_error_kind_retryable() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Spawn.is_retryable());
        assert!(!ErrorKind::NonZeroExit.is_retryable());
        assert!(!ErrorKind::Parse.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
    }

    #[test]
    fn test_timeout_becomes_ambiguous() {
        let err = Error::Timeout {
            command: "vm-import".into(),
            timeout: Duration::from_secs(5),
            result: ExecutionResult {
                stdout: "partial".into(),
                ..Default::default()
            },
        };
        let err = err.into_ambiguous("import-vm");
        assert_eq!(err.kind(), ErrorKind::AmbiguousState);
        assert_eq!(err.result().map(|r| r.stdout.as_str()), Some("partial"));
    }

    #[test]
    fn test_non_retryable_passes_through_into_ambiguous() {
        let err = Error::NonZeroExit {
            command: "vm-start".into(),
            result: failed("boom"),
        };
        assert_eq!(err.into_ambiguous("start-vm").kind(), ErrorKind::NonZeroExit);
    }

    #[test]
    fn test_non_zero_exit_message_uses_first_stderr_line() {
        let err = Error::NonZeroExit {
            command: "sr-list".into(),
            result: failed("\nThe uuid you supplied was invalid.\nuuid: x\n"),
        };
        assert_eq!(
            err.to_string(),
            "sr-list failed with exit code 1: The uuid you supplied was invalid."
        );
    }
}
