//! Core types for plan execution

use crate::checkpoint::PlanCheckpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use xekit::{ArgumentVector, Error, ErrorKind, Output, RetryConfig};

/// Lifecycle state of a plan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlanState {
    /// Nothing has run (also the state of a dry run)
    Pending,
    /// Step `step` is executing
    Running { step: usize },
    /// Every step completed
    Succeeded,
    /// Step `step` failed and the plan halted
    Failed { step: usize },
    /// Cancelled between steps
    Aborted,
}

impl PlanState {
    /// Check if the plan finished without failure
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for PlanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running { step } => write!(f, "running step {}", step + 1),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed { step } => write!(f, "failed at step {}", step + 1),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// What happened to one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The operation ran and succeeded
    Executed,
    /// The operation failed with a known "already in that state" signal
    AlreadySatisfied,
    /// A lookup result from earlier in the run was reused
    Cached,
    /// Completed by an earlier run of the same plan
    PreviouslyCompleted,
    /// Dry run: the command was built but not executed
    Planned,
    /// The step failed and halted the plan
    Failed,
    /// Not reached
    NotRun,
}

impl StepStatus {
    /// Check if the step counts as done
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            Self::Executed | Self::AlreadySatisfied | Self::Cached | Self::PreviouslyCompleted
        )
    }
}

/// One execution attempt of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed attempt number
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Exit code, when the process ran to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Error kind, when the attempt failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl AttemptRecord {
    /// Check if the attempt succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub operation: String,
    /// Whether the operation changes hypervisor state
    pub write: bool,
    pub status: StepStatus,
    /// Built argument vector, when building succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<ArgumentVector>,
    /// Parsed output, for completed steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl StepRecord {
    pub(crate) fn new(index: usize, operation: &str, write: bool, status: StepStatus) -> Self {
        Self {
            index,
            operation: operation.to_string(),
            write,
            status,
            args: None,
            output: None,
            attempts: Vec::new(),
        }
    }

    /// Check if this step changed hypervisor state
    pub fn is_change(&self) -> bool {
        self.write && self.status == StepStatus::Executed
    }
}

/// The step failure that halted a plan
#[derive(Debug)]
pub struct StepFailure {
    /// Index of the failing step
    pub step: usize,
    /// Operation of the failing step
    pub operation: String,
    pub error: Error,
}

/// Result of running (or resuming) a plan
#[derive(Debug)]
pub struct PlanResult {
    pub plan_id: String,
    pub plan_name: String,
    pub state: PlanState,
    /// One record per plan step
    pub steps: Vec<StepRecord>,
    /// Every captured output, including those restored from a checkpoint
    pub variables: BTreeMap<String, Output>,
    /// Present when the plan did not succeed
    pub checkpoint: Option<PlanCheckpoint>,
    pub failure: Option<StepFailure>,
}

impl PlanResult {
    /// Check if at least one write step actually executed
    pub fn changed(&self) -> bool {
        self.steps.iter().any(StepRecord::is_change)
    }

    /// Total process invocations across all steps
    pub fn total_attempts(&self) -> usize {
        self.steps.iter().map(|s| s.attempts.len()).sum()
    }
}

/// Options for plan execution
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Retry policy for idempotent steps
    pub retry: RetryConfig,
    /// Reuse results of cacheable lookups within a run
    pub cache_lookups: bool,
    /// Build commands without executing them
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            cache_lookups: true,
            dry_run: false,
        }
    }
}
