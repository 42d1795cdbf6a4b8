use anyhow::{Context as _, Result};

use crate::Context;
use crate::cli::PlansCommand;
use crate::state::{PlanStore, SavedPlan};
use crate::ui;

pub fn run(ctx: &Context, cmd: PlansCommand) -> Result<()> {
    let store = PlanStore::open()?;
    match cmd {
        PlansCommand::List => list(ctx, &store),
        PlansCommand::Show { plan_id } => show(ctx, &store, &plan_id),
        PlansCommand::Discard { plan_id } => discard(ctx, &store, &plan_id),
    }
}

fn list(ctx: &Context, store: &PlanStore) -> Result<()> {
    let plans = store.list()?;

    if ctx.json {
        let json = serde_json::to_string_pretty(&plans).context("Failed to serialize plans")?;
        println!("{json}");
        return Ok(());
    }

    if plans.is_empty() {
        ui::info("No halted plans.");
        return Ok(());
    }

    ui::header("Halted plans");
    for saved in &plans {
        let (done, total) = saved.progress();
        let reason = saved
            .error
            .as_ref()
            .map_or("cancelled", |e| e.kind_name.as_str());
        ui::kv(
            &saved.plan.id,
            &format!(
                "{done}/{total} steps, {reason}, saved {}",
                saved.saved_at.format("%Y-%m-%d %H:%M:%S")
            ),
        );
    }
    Ok(())
}

fn show(ctx: &Context, store: &PlanStore, plan_id: &str) -> Result<()> {
    let saved = store.load(plan_id)?;

    if ctx.json {
        let json = serde_json::to_string_pretty(&saved).context("Failed to serialize plan")?;
        println!("{json}");
        return Ok(());
    }

    print_saved(&saved);
    Ok(())
}

fn print_saved(saved: &SavedPlan) {
    let (done, _) = saved.progress();

    ui::header(&format!("{} ({})", saved.plan.name, saved.plan.id));
    ui::kv("saved", &saved.saved_at.to_rfc3339());

    ui::section("Inputs");
    for (name, value) in &saved.plan.inputs {
        ui::kv(name, value);
    }

    ui::section("Steps");
    for (index, step) in saved.plan.steps.iter().enumerate() {
        let mark = if index < done { "done" } else { "pending" };
        ui::kv(&format!("{}. {}", index + 1, step.operation), mark);
    }

    if !saved.checkpoint.variables.is_empty() {
        ui::section("Captured");
        for (name, value) in saved.checkpoint.values() {
            ui::kv(&name, &value);
        }
    }

    if let Some(error) = &saved.error {
        ui::section("Error");
        ui::error(&error.message);
        ui::kv("kind", &error.kind_name);
        ui::dim(&error.advice);
    }
}

fn discard(ctx: &Context, store: &PlanStore, plan_id: &str) -> Result<()> {
    if store.remove(plan_id)? {
        if !ctx.quiet {
            ui::success(&format!("Discarded {plan_id}"));
        }
        Ok(())
    } else {
        anyhow::bail!("No saved plan named '{plan_id}'")
    }
}
