use anyhow::{Context as _, Result};

use crate::Context;
use crate::cli::ResumeArgs;
use crate::state::PlanStore;
use crate::ui;

pub fn run(ctx: &Context, args: ResumeArgs) -> Result<()> {
    let store = PlanStore::open()?;
    let saved = store.load(&args.plan_id)?;
    let (done, total) = saved.progress();

    if saved.is_ambiguous() && !args.dry_run && !ctx.yes {
        if let Some(error) = &saved.error {
            ui::warn(&format!(
                "Step {} ({}) ended in an unknown state: {}",
                error.step + 1,
                error.operation,
                error.message
            ));
            ui::dim(&error.advice);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Resume anyway? The step will run again")
            .default(false)
            .interact()
            .context("Failed to read confirmation (pass --yes to skip it)")?;
        if !confirmed {
            ui::info("Resume cancelled; the plan is still saved.");
            return Ok(());
        }
    }

    if ctx.interactive_output() {
        ui::header(&format!("Resuming {}", saved.plan.id));
        ui::kv("completed", &format!("{done}/{total} steps"));
        println!();
    }

    let report = super::run_plan(ctx, &saved.plan, Some(saved.checkpoint.clone()), args.dry_run)?;
    let reports = [report];
    super::print_reports(ctx, &reports)?;
    super::ensure_success(&reports)
}
