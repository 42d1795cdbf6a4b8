//! Process execution abstraction.
//!
//! The [`Executor`] trait is the seam between command building and the
//! outside world, allowing for different implementations (real `xe`
//! binary, scripted fakes for testing).

pub mod process;
pub mod scripted;

use crate::builder::ArgumentVector;
use crate::error::Result;
use crate::types::ExecutionResult;
use std::time::Duration;

/// Runs one xe invocation.
///
/// Implementations must:
/// - pass every token as its own argv entry, with no shell in between
/// - return `Ok` for every completed run, whatever its exit code
/// - return [`Error::Spawn`](crate::Error::Spawn) when the program cannot be
///   started, and [`Error::Timeout`](crate::Error::Timeout) with the output
///   captured so far when `timeout` expires
pub trait Executor: Send + Sync {
    /// Run the command and capture its output.
    fn run(&self, args: &ArgumentVector, timeout: Duration) -> Result<ExecutionResult>;

    /// Human-readable program name for logs.
    fn program(&self) -> &str {
        "xe"
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn run(&self, args: &ArgumentVector, timeout: Duration) -> Result<ExecutionResult> {
        (**self).run(args, timeout)
    }

    fn program(&self) -> &str {
        (**self).program()
    }
}

impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    fn run(&self, args: &ArgumentVector, timeout: Duration) -> Result<ExecutionResult> {
        (**self).run(args, timeout)
    }

    fn program(&self) -> &str {
        (**self).program()
    }
}

/// Get the default executor (the real xe binary).
pub fn default_executor() -> Result<process::ProcessExecutor> {
    process::ProcessExecutor::find()
}
