//! Plan checkpoints
//!
//! A checkpoint is created when a plan starts, advanced after every
//! successful step, and dropped when the plan succeeds. A halted plan hands
//! its checkpoint back to the caller, who may persist it and later resume.

use crate::plan::Plan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xekit::{Error, Output, Result};

/// Progress of one plan run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCheckpoint {
    /// Id of the plan this checkpoint belongs to
    pub plan_id: String,
    /// Operation names of the plan's steps, in order
    pub fingerprint: Vec<String>,
    /// Index of the last step that completed, if any
    pub last_completed_step: Option<usize>,
    /// Outputs captured so far, keyed by variable name
    pub variables: BTreeMap<String, Output>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanCheckpoint {
    /// Fresh checkpoint for `plan`, before any step has run.
    pub fn new(plan: &Plan) -> Self {
        let now = Utc::now();
        Self {
            plan_id: plan.id.clone(),
            fingerprint: plan.fingerprint(),
            last_completed_step: None,
            variables: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Index of the step a resume starts at.
    pub fn next_step(&self) -> usize {
        self.last_completed_step.map_or(0, |i| i + 1)
    }

    /// Record that step `index` completed, capturing its output.
    pub fn advance(&mut self, index: usize, variable: Option<&str>, output: &Output) {
        self.last_completed_step = Some(index);
        if let Some(name) = variable {
            self.variables.insert(name.to_string(), output.clone());
        }
        self.updated_at = Utc::now();
    }

    /// Variable values in the string form steps bind to.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), v.to_variable()))
            .collect()
    }

    /// Check that this checkpoint belongs to `plan`.
    pub fn ensure_matches(&self, plan: &Plan) -> Result<()> {
        let mismatch = |message: String| Error::Validation {
            operation: plan.name.clone(),
            parameter: "checkpoint".to_string(),
            message,
        };

        if self.plan_id != plan.id {
            return Err(mismatch(format!(
                "checkpoint is for plan `{}`, not `{}`",
                self.plan_id, plan.id
            )));
        }
        if self.fingerprint != plan.fingerprint() {
            return Err(mismatch(format!(
                "plan steps changed since the checkpoint was taken ({} vs {})",
                self.fingerprint.join(","),
                plan.fingerprint().join(",")
            )));
        }
        if self.next_step() > plan.steps.len() {
            return Err(mismatch(format!(
                "checkpoint is past the last step ({} of {})",
                self.next_step(),
                plan.steps.len()
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
