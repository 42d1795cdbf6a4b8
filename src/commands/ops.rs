use anyhow::{Context as _, Result};
use colored::Colorize;
use serde::Serialize;
use xekit::{Effect, Operation, Registry};

use crate::Context;
use crate::ui;

/// Serializable view of an operation descriptor
#[derive(Serialize)]
struct OpInfo {
    name: &'static str,
    subcommand: &'static str,
    summary: &'static str,
    required: Vec<&'static str>,
    optional: Vec<&'static str>,
    effect: Effect,
    idempotent: bool,
    cacheable: bool,
}

impl From<&Operation> for OpInfo {
    fn from(op: &Operation) -> Self {
        Self {
            name: op.name,
            subcommand: op.subcommand,
            summary: op.summary,
            required: op.required.iter().map(|p| p.name).collect(),
            optional: op.optional.iter().map(|p| p.name).collect(),
            effect: op.effect,
            idempotent: op.idempotent,
            cacheable: op.cacheable,
        }
    }
}

pub fn run(ctx: &Context) -> Result<()> {
    let registry = Registry::standard();
    let ops: Vec<OpInfo> = registry.operations().map(OpInfo::from).collect();

    if ctx.json {
        let json = serde_json::to_string_pretty(&ops).context("Failed to serialize operations")?;
        println!("{json}");
        return Ok(());
    }

    ui::header(&format!("Operations ({})", ops.len()));
    for op in &ops {
        let safety = if op.idempotent {
            "idempotent".green()
        } else {
            "not idempotent".yellow()
        };
        println!();
        println!("  {} {} {}", op.name.bold(), format!("(xe {})", op.subcommand).dimmed(), safety);
        ui::dim(op.summary);
        ui::kv("  required", &list(&op.required));
        if !op.optional.is_empty() {
            ui::kv("  optional", &list(&op.optional));
        }
    }
    Ok(())
}

fn list(names: &[&str]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}
