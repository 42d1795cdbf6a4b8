//! Result and fact reporting
//!
//! Turns a [`PlanResult`] into the flat structure callers consume: whether
//! anything changed, the final state, every captured fact, the discovered
//! identifiers, and (for halted plans) the error and resume checkpoint.

use crate::checkpoint::PlanCheckpoint;
use crate::types::{PlanResult, PlanState, StepRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use xekit::{ErrorKind, Output};

/// Caller-facing outcome of a plan run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub plan_id: String,
    pub plan: String,
    /// True iff at least one write step actually executed
    pub changed: bool,
    pub state: PlanState,
    /// Captured outputs by variable name; composite values also get a
    /// `<name>_structured` entry
    pub facts: BTreeMap<String, Value>,
    /// Captured identifiers by variable name
    pub identifiers: BTreeMap<String, String>,
    pub steps: Vec<StepRecord>,
    /// xe invocations made by this run, retries included
    pub attempts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PlanCheckpoint>,
}

/// Diagnostic details of the failure that halted a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Index of the failing step
    pub step: usize,
    pub operation: String,
    pub kind: ErrorKind,
    /// Stable kind name (e.g. `AmbiguousStateError`)
    pub kind_name: String,
    pub message: String,
    pub description: String,
    pub advice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl Report {
    /// Check if the plan finished without failure
    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }

    /// Steps that are complete, counting those finished by earlier runs
    pub fn steps_done(&self) -> usize {
        self.steps.iter().filter(|s| s.status.is_done()).count()
    }
}

/// Summarize a plan result. Never fails.
pub fn summarize(result: &PlanResult) -> Report {
    let mut facts = BTreeMap::new();
    let mut identifiers = BTreeMap::new();

    for (name, output) in &result.variables {
        facts.insert(name.clone(), Value::String(output.to_variable()));
        match output {
            Output::Identifier(id) => {
                identifiers.insert(name.clone(), id.to_string());
            }
            Output::Value(value) => {
                if let Some(structured) = &value.structured
                    && let Ok(json) = serde_json::to_value(structured)
                {
                    facts.insert(format!("{name}_structured"), json);
                }
            }
            Output::Success | Output::Status(_) => {}
        }
    }

    let error = result.failure.as_ref().map(|failure| {
        let kind = failure.error.kind();
        let raw = failure.error.result();
        ErrorReport {
            step: failure.step,
            operation: failure.operation.clone(),
            kind,
            kind_name: kind.as_str().to_string(),
            message: failure.error.to_string(),
            description: kind.description().to_string(),
            advice: kind.advice().to_string(),
            exit_code: raw.map(|r| r.exit_code),
            stdout: raw.map(|r| r.stdout.clone()),
            stderr: raw.map(|r| r.stderr.clone()),
        }
    });

    Report {
        plan_id: result.plan_id.clone(),
        plan: result.plan_name.clone(),
        changed: result.changed(),
        state: result.state,
        facts,
        identifiers,
        steps: result.steps.clone(),
        attempts: result.total_attempts(),
        error,
        checkpoint: result.checkpoint.clone(),
    }
}
