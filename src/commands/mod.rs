pub mod config;
pub mod import;
pub mod ops;
pub mod param;
pub mod plans;
pub mod resume;

use anyhow::{Context as _, Result, bail};
use reconcile::{
    CancelToken, Engine, NoProgress, Plan, PlanCheckpoint, PlanResult, PlanState, ProgressCallback,
    Report, StepStatus, summarize,
};
use serde_json::Value;

use crate::Context;
use crate::progress::StepProgress;
use crate::state::{PlanStore, SavedPlan};
use crate::ui;

/// Run (or resume) one plan with terminal progress, then save or forget it.
pub fn run_plan(
    ctx: &Context,
    plan: &Plan,
    checkpoint: Option<PlanCheckpoint>,
    dry_run: bool,
) -> Result<Report> {
    let config = ctx.config()?;
    let client = config.client()?;
    let engine = Engine::new(&client, config.engine_options(dry_run)?);
    let cancel = CancelToken::new();

    let mut progress: Box<dyn ProgressCallback> = if ctx.interactive_output() {
        Box::new(StepProgress::default())
    } else {
        Box::new(NoProgress)
    };

    let result = match checkpoint {
        Some(checkpoint) => engine.resume(plan, checkpoint, progress.as_mut(), &cancel),
        None => engine.execute(plan, progress.as_mut(), &cancel),
    }
    .with_context(|| format!("Plan {} could not run", plan.id))?;

    let report = summarize(&result);
    if !dry_run {
        persist(&PlanStore::open()?, plan, &report)?;
    }
    Ok(report)
}

/// Run independent plans concurrently.
///
/// A plan that cannot run is reported on stderr and the rest are still
/// summarized and saved; the command then fails naming the rejected plans.
pub fn run_plans(ctx: &Context, plans: &[Plan], jobs: usize, dry_run: bool) -> Result<Vec<Report>> {
    let config = ctx.config()?;
    let client = config.client()?;
    let options = config.engine_options(dry_run)?;
    let results = reconcile::execute_many(&client, &options, plans, jobs, &CancelToken::new())?;

    let store = PlanStore::open()?;
    let (reports, rejected) = settle(plans, results, |plan, report| {
        if dry_run {
            Ok(())
        } else {
            persist(&store, plan, report)
        }
    })?;

    if !rejected.is_empty() {
        print_reports(ctx, &reports)?;
        bail!("{} of {} plans could not run: {}", rejected.len(), plans.len(), rejected.join(", "));
    }
    Ok(reports)
}

/// Summarize each plan's result and hand the report to `persist`. Plans
/// that could not run are logged and returned by id.
fn settle(
    plans: &[Plan],
    results: Vec<xekit::Result<PlanResult>>,
    mut persist: impl FnMut(&Plan, &Report) -> Result<()>,
) -> Result<(Vec<Report>, Vec<String>)> {
    let mut reports = Vec::with_capacity(results.len());
    let mut rejected = Vec::new();
    for (plan, result) in plans.iter().zip(results) {
        match result {
            Ok(result) => {
                let report = summarize(&result);
                persist(plan, &report)?;
                reports.push(report);
            }
            Err(e) => {
                ui::error(&format!("Plan {} could not run: {e}", plan.id));
                rejected.push(plan.id.clone());
            }
        }
    }
    Ok((reports, rejected))
}

fn persist(store: &PlanStore, plan: &Plan, report: &Report) -> Result<()> {
    if report.is_success() {
        store.remove(&plan.id)?;
    } else if let Some(saved) = SavedPlan::from_report(plan, report) {
        let path = store.save(&saved)?;
        log::info!("Saved halted plan to {}", path.display());
    }
    Ok(())
}

/// Fail the command unless every plan succeeded (or was only planned).
pub fn ensure_success(reports: &[Report]) -> Result<()> {
    let halted: Vec<_> = reports
        .iter()
        .filter(|r| !matches!(r.state, PlanState::Succeeded | PlanState::Pending))
        .collect();
    match halted.as_slice() {
        [] => Ok(()),
        [report] => bail!("Plan {} {}", report.plan_id, report.state),
        many => bail!("{} plans did not succeed", many.len()),
    }
}

/// Print reports as JSON (one object, or an array for several) or as text.
pub fn print_reports(ctx: &Context, reports: &[Report]) -> Result<()> {
    if ctx.json {
        let json = match reports {
            [report] => serde_json::to_string_pretty(report),
            many => serde_json::to_string_pretty(many),
        }
        .context("Failed to serialize report")?;
        println!("{json}");
        return Ok(());
    }

    for report in reports {
        print_report(ctx, report);
    }
    Ok(())
}

fn print_report(ctx: &Context, report: &Report) {
    if ctx.quiet {
        if let Some(error) = &report.error {
            ui::error(&error.message);
        }
        return;
    }

    ui::header(&format!("{} ({})", report.plan, report.plan_id));
    ui::kv("state", &report.state.to_string());
    ui::kv("changed", &report.changed.to_string());

    let facts: Vec<_> = report
        .facts
        .iter()
        .filter(|(name, _)| !name.ends_with("_structured"))
        .collect();
    if !facts.is_empty() {
        ui::section("Facts");
        for (name, value) in facts {
            ui::kv(name, &fact_text(value));
            if let Some(structured) = report.facts.get(&format!("{name}_structured")) {
                ui::dim(&format!("  {}", fact_text(structured)));
            }
        }
    }

    if ctx.verbose > 0 {
        ui::section(&format!(
            "Steps ({}/{} done, {} xe calls)",
            report.steps_done(),
            report.steps.len(),
            report.attempts
        ));
        for step in &report.steps {
            let args = step
                .args
                .as_ref()
                .map(|a| ui::truncate(&a.to_string(), 60))
                .unwrap_or_default();
            ui::kv(
                &format!("{}. {}", step.index + 1, step.operation),
                &format!("{} {args}", status_text(step.status)),
            );
            for attempt in &step.attempts {
                let outcome = attempt.error.map_or("ok", |kind| kind.as_str());
                ui::dim(&format!(
                    "  attempt {}: {outcome} ({:.2}s)",
                    attempt.attempt,
                    attempt.duration.as_secs_f64()
                ));
            }
        }
    }

    if let Some(error) = &report.error {
        ui::section("Error");
        ui::error(&error.message);
        ui::kv("kind", &error.kind_name);
        ui::kv("step", &format!("{} ({})", error.step + 1, error.operation));
        if let Some(code) = error.exit_code {
            ui::kv("exit code", &code.to_string());
        }
        for (name, text) in [("stdout", &error.stdout), ("stderr", &error.stderr)] {
            if let Some(text) = text
                && !text.trim().is_empty()
            {
                ui::kv(name, "");
                ui::block(text);
            }
        }
        ui::dim(&error.description);
        ui::dim(&error.advice);
    }

    if report.checkpoint.is_some() {
        println!();
        ui::info(&format!(
            "Progress saved. Resume with: xectl resume {}",
            report.plan_id
        ));
    } else if report.state == PlanState::Pending {
        println!();
        ui::dim("Dry run: nothing was executed.");
    }
}

fn fact_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn status_text(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Executed => "executed",
        StepStatus::AlreadySatisfied => "already satisfied",
        StepStatus::Cached => "cached",
        StepStatus::PreviouslyCompleted => "done earlier",
        StepStatus::Planned => "planned",
        StepStatus::Failed => "failed",
        StepStatus::NotRun => "not run",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{EngineOptions, Step, execute_many};
    use xekit::Client;
    use xekit::executor::scripted::{Reply, ScriptedExecutor};

    #[test]
    fn test_settle_keeps_going_after_rejected_plan() {
        let client = Client::with_executor(Box::new(
            ScriptedExecutor::new().on("vm-start", Reply::failure(1, "boom")),
        ));
        let plans = vec![
            Plan::new("broken").with_id("broken").step(Step::new("no-such-operation")),
            Plan::new("start")
                .with_id("start")
                .step(Step::new(xekit::names::START_VM).literal("uuid", "V")),
        ];
        let results = execute_many(
            &client,
            &EngineOptions::default(),
            &plans,
            2,
            &CancelToken::new(),
        )
        .unwrap();

        let mut persisted = Vec::new();
        let (reports, rejected) = settle(&plans, results, |plan, report| {
            persisted.push((plan.id.clone(), report.checkpoint.is_some()));
            Ok(())
        })
        .unwrap();

        assert_eq!(rejected, ["broken"]);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].plan_id, "start");
        assert_eq!(persisted, [("start".to_string(), true)]);
    }
}
