//! Saved plans
//!
//! A plan that halts is written to `<state dir>/plans/<plan id>.json`
//! together with its checkpoint and the error that stopped it, so that
//! `xectl resume` can pick it up later. Successful runs remove the file.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reconcile::{ErrorReport, Plan, PlanCheckpoint, Report};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use xekit::ErrorKind;

/// A halted plan waiting to be resumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPlan {
    pub plan: Plan,
    pub checkpoint: PlanCheckpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    pub saved_at: DateTime<Utc>,
}

impl SavedPlan {
    /// Build from a halted run. Returns `None` when the report carries no
    /// checkpoint (the plan succeeded or never started).
    pub fn from_report(plan: &Plan, report: &Report) -> Option<Self> {
        let checkpoint = report.checkpoint.clone()?;
        Some(Self {
            plan: plan.clone(),
            checkpoint,
            error: report.error.clone(),
            saved_at: Utc::now(),
        })
    }

    /// Whether the halt left external state unknown
    pub fn is_ambiguous(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::AmbiguousState)
    }

    /// Steps completed so far, out of the plan's total
    pub fn progress(&self) -> (usize, usize) {
        (self.checkpoint.next_step(), self.plan.steps.len())
    }
}

/// Store of saved plans rooted at one directory
pub struct PlanStore {
    dir: PathBuf,
}

impl PlanStore {
    /// Store in the default state directory
    pub fn open() -> Result<Self> {
        Ok(Self::at(crate::paths::plans_dir()?))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, plan_id: &str) -> Result<PathBuf> {
        if plan_id.is_empty()
            || plan_id.starts_with('.')
            || plan_id.contains(['/', '\\'])
        {
            bail!("Invalid plan id: {plan_id:?}");
        }
        Ok(self.dir.join(format!("{plan_id}.json")))
    }

    pub fn save(&self, saved: &SavedPlan) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory: {}", self.dir.display()))?;

        let path = self.path(&saved.plan.id)?;
        let content = serde_json::to_string_pretty(saved).context("Failed to serialize plan")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write plan file: {}", path.display()))?;

        log::debug!("Saved plan {} to {}", saved.plan.id, path.display());
        Ok(path)
    }

    pub fn load(&self, plan_id: &str) -> Result<SavedPlan> {
        let path = self.path(plan_id)?;
        if !path.exists() {
            bail!("No saved plan named '{plan_id}' (see 'xectl plans list')");
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse plan file: {}", path.display()))
    }

    /// Remove a saved plan. Returns false if there was none.
    pub fn remove(&self, plan_id: &str) -> Result<bool> {
        let path = self.path(plan_id)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove plan file: {}", path.display()))?;
        log::debug!("Removed saved plan {plan_id}");
        Ok(true)
    }

    /// All saved plans, oldest first. Unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<SavedPlan>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;
        let mut plans = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|c| serde_json::from_str::<SavedPlan>(&c).map_err(anyhow::Error::from));
            match parsed {
                Ok(saved) => plans.push(saved),
                Err(e) => log::warn!("Skipping {}: {e}", path.display()),
            }
        }
        plans.sort_by(|a, b| {
            a.saved_at
                .cmp(&b.saved_at)
                .then_with(|| a.plan.id.cmp(&b.plan.id))
        });
        Ok(plans)
    }
}
