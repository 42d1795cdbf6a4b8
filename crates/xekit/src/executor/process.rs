//! Real xe backend using `std::process::Command`.

use crate::builder::ArgumentVector;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::types::ExecutionResult;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Executor that spawns the xe binary directly, without a shell.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Path to the xe executable
    program: PathBuf,
}

impl ProcessExecutor {
    /// Use an explicit program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate xe on this host.
    ///
    /// Returns [`Error::Spawn`] if no xe binary can be found.
    pub fn find() -> Result<Self> {
        find_xe().map(Self::new)
    }

    /// Path of the program this executor runs.
    pub fn path(&self) -> &Path {
        &self.program
    }

    fn spawn(&self, args: &ArgumentVector) -> Result<Child> {
        Command::new(&self.program)
            .args(args.as_slice())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: self.program.display().to_string(),
                source,
            })
    }
}

impl Executor for ProcessExecutor {
    fn run(&self, args: &ArgumentVector, timeout: Duration) -> Result<ExecutionResult> {
        log::debug!("exec: {} {}", self.program.display(), args);
        let start = Instant::now();
        let mut child = self.spawn(args)?;

        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());
        // None when the timeout is too large to represent: no deadline.
        let deadline = start.checked_add(timeout);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let result = ExecutionResult {
                        exit_code: status.code().unwrap_or(-1),
                        stdout: stdout.finish(deadline),
                        stderr: stderr.finish(deadline),
                        duration: start.elapsed(),
                    };
                    log::trace!(
                        "{} exited with {} in {:.2}s",
                        args.subcommand(),
                        result.exit_code,
                        result.duration.as_secs_f64()
                    );
                    return Ok(result);
                }
                Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Descendants may still hold the pipes open; take what
                    // has been read so far instead of joining the readers.
                    let result = ExecutionResult {
                        exit_code: -1,
                        stdout: stdout.snapshot(),
                        stderr: stderr.snapshot(),
                        duration: start.elapsed(),
                    };
                    log::warn!(
                        "{} killed after {:.1}s timeout",
                        args.subcommand(),
                        timeout.as_secs_f64()
                    );
                    return Err(Error::Timeout {
                        command: args.subcommand().to_string(),
                        timeout,
                        result,
                    });
                }
                Ok(None) => {
                    let wait = deadline.map_or(POLL_INTERVAL, |d| {
                        POLL_INTERVAL.min(d.saturating_duration_since(Instant::now()))
                    });
                    thread::sleep(wait);
                }
                Err(source) => {
                    let _ = child.kill();
                    return Err(Error::Spawn {
                        program: self.program.display().to_string(),
                        source,
                    });
                }
            }
        }
    }

    fn program(&self) -> &str {
        self.program.to_str().unwrap_or("xe")
    }
}

/// Background reader that drains one pipe into a shared buffer.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let handle = pipe.map(|mut pipe| {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buf, handle }
    }

    /// Wait for EOF, but no later than `deadline`, and return everything read.
    ///
    /// A descendant of xe can keep the pipe open after xe itself exits; the
    /// reader is then left behind and the output read so far is returned.
    fn finish(mut self, deadline: Option<Instant>) -> String {
        if let Some(handle) = self.handle.take() {
            while !handle.is_finished() && deadline.is_none_or(|d| Instant::now() < d) {
                thread::sleep(POLL_INTERVAL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::debug!("output pipe still open after exit; keeping partial output");
            }
        }
        self.snapshot()
    }

    fn snapshot(&self) -> String {
        let bytes = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Find the xe executable.
fn find_xe() -> Result<PathBuf> {
    let paths = [
        "/opt/xensource/bin/xe", // XenServer dom0
        "/usr/bin/xe",
        "/usr/local/bin/xe",
    ];

    for path in &paths {
        if Path::new(path).exists() {
            return Ok(PathBuf::from(path));
        }
    }

    let not_found = || Error::Spawn {
        program: "xe".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "xe not found in PATH"),
    };

    let output = Command::new("which").arg("xe").output().map_err(|_| not_found())?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    Err(not_found())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sh(script: &str) -> ArgumentVector {
        ArgumentVector::from_tokens(["-c", script])
    }

    #[test]
    fn test_captures_stdout_stderr_and_exit_code() {
        let executor = ProcessExecutor::new("sh");
        let result = executor
            .run(&sh("echo out; echo err >&2; exit 3"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.exited_cleanly());
    }

    #[test]
    fn test_arguments_are_not_shell_interpreted() {
        let executor = ProcessExecutor::new("printf");
        let args = ArgumentVector::from_tokens(["%s|", "a b", "$(id)", "x;y"]);
        let result = executor.run(&args, Duration::from_secs(10)).unwrap();
        assert_eq!(result.stdout, "a b|$(id)|x;y|");
    }

    #[test]
    fn test_timeout_kills_and_keeps_partial_output() {
        let executor = ProcessExecutor::new("sh");
        let start = Instant::now();
        let err = executor
            .run(&sh("echo partial; sleep 5"), Duration::from_millis(500))
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.result().map(|r| r.stdout.as_str()), Some("partial\n"));
    }

    #[test]
    fn test_huge_timeout_means_no_deadline() {
        let executor = ProcessExecutor::new("sh");
        let result = executor
            .run(&sh("echo done"), Duration::from_secs(u64::MAX))
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "done\n");
    }

    #[test]
    fn test_lingering_descendant_does_not_outlast_timeout() {
        let executor = ProcessExecutor::new("sh");
        let start = Instant::now();
        let result = executor
            .run(&sh("echo early; sleep 5 & exit 0"), Duration::from_millis(500))
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "early\n");
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let executor = ProcessExecutor::new("/nonexistent/xe");
        let err = executor
            .run(&ArgumentVector::from_tokens(["sr-list"]), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Spawn);
        assert!(err.to_string().contains("/nonexistent/xe"));
    }
}
