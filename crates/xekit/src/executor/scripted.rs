//! Scripted executor for testing.
//!
//! Replies are queued per xe subcommand. Each call pops the next reply for
//! its subcommand; the last reply repeats once the queue is down to one.
//! Useful for:
//! - Engine and client tests without an xe binary
//! - Simulating timeouts and spawn failures deterministically

use crate::builder::ArgumentVector;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::types::ExecutionResult;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Canned outcome of one scripted call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The process ran to completion
    Exit(ExecutionResult),
    /// The process was killed after the timeout, with this partial output
    Timeout(ExecutionResult),
    /// The program could not be started
    SpawnFailure,
}

impl Reply {
    /// Exit code 0 with the given stdout.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Reply::Exit(ExecutionResult {
            exit_code: 0,
            stdout: stdout.into(),
            ..Default::default()
        })
    }

    /// Non-zero exit with the given stderr.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Reply::Exit(ExecutionResult {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        })
    }

    /// Timeout with no partial output.
    pub fn timeout() -> Self {
        Reply::Timeout(ExecutionResult {
            exit_code: -1,
            ..Default::default()
        })
    }
}

/// In-memory [`Executor`] that replays queued replies and records calls.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<ArgumentVector>>,
}

impl ScriptedExecutor {
    /// Create an executor with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `subcommand`.
    #[must_use]
    pub fn on(self, subcommand: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subcommand.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Every argument vector received, in call order.
    pub fn calls(&self) -> Vec<ArgumentVector> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made for `subcommand`.
    pub fn count(&self, subcommand: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|args| args.subcommand() == subcommand)
            .count()
    }

    fn next_reply(&self, subcommand: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = replies.get_mut(subcommand)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Executor for ScriptedExecutor {
    fn run(&self, args: &ArgumentVector, timeout: Duration) -> Result<ExecutionResult> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.clone());

        match self.next_reply(args.subcommand()) {
            Some(Reply::Exit(result)) => Ok(result),
            Some(Reply::Timeout(result)) => Err(Error::Timeout {
                command: args.subcommand().to_string(),
                timeout,
                result,
            }),
            Some(Reply::SpawnFailure) => Err(Error::Spawn {
                program: "xe".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            None => Ok(ExecutionResult {
                exit_code: 1,
                stderr: format!("unscripted command: {}\n", args.subcommand()),
                ..Default::default()
            }),
        }
    }

    fn program(&self) -> &str {
        "scripted-xe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_pop_then_repeat_last() {
        let executor = ScriptedExecutor::new()
            .on("vm-start", Reply::timeout())
            .on("vm-start", Reply::stdout("ok"));
        let args = ArgumentVector::from_tokens(["vm-start", "uuid=V"]);
        let t = Duration::from_secs(1);

        assert!(executor.run(&args, t).is_err());
        assert_eq!(executor.run(&args, t).unwrap().stdout, "ok");
        assert_eq!(executor.run(&args, t).unwrap().stdout, "ok");
        assert_eq!(executor.count("vm-start"), 3);
    }

    #[test]
    fn test_unscripted_command_fails() {
        let executor = ScriptedExecutor::new();
        let result = executor
            .run(&ArgumentVector::from_tokens(["vm-list"]), Duration::from_secs(1))
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert_eq!(executor.calls().len(), 1);
    }
}
