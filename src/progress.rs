//! Progress indicators for xectl.
//!
//! One spinner per running step, replaced by a status line when the step
//! finishes.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{Plan, PlanResult, ProgressCallback, Step, StepRecord, StepStatus};
use std::time::Duration;
use xekit::ArgumentVector;

/// Create a spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    println!("{} {}", "✓".green(), msg);
}

pub fn finish_warn(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    println!("{} {}", "⚠".yellow(), msg);
}

pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    eprintln!("{} {}", "✗".red(), msg);
}

/// Terminal progress for a plan run
#[derive(Default)]
pub struct StepProgress {
    total: usize,
    current: Option<ProgressBar>,
}

impl StepProgress {
    fn label(&self, record: &StepRecord) -> String {
        format!(
            "{} {}",
            format!("[{}/{}]", record.index + 1, self.total).blue().bold(),
            record.operation
        )
    }
}

impl ProgressCallback for StepProgress {
    fn on_plan_start(&mut self, plan: &Plan, first_step: usize) {
        self.total = plan.steps.len();
        if first_step > 0 {
            println!(
                "{} resuming {} at step {}/{}",
                "ℹ".blue(),
                plan.id,
                first_step + 1,
                self.total
            );
        }
    }

    fn on_step_start(&mut self, index: usize, step: &Step, args: &ArgumentVector) {
        let msg = format!("[{}/{}] {} ({})", index + 1, self.total, step.operation, args);
        self.current = Some(spinner(&msg));
    }

    fn on_step_complete(&mut self, record: &StepRecord) {
        let label = self.label(record);
        let attempts = record.attempts.len();
        let retried = if attempts > 1 {
            format!(" after {attempts} attempts")
        } else {
            String::new()
        };

        let pb = self.current.take().unwrap_or_else(ProgressBar::hidden);
        match record.status {
            StepStatus::Executed => finish_success(&pb, &format!("{label}{retried}")),
            StepStatus::AlreadySatisfied => {
                finish_success(&pb, &format!("{label} {}", "already satisfied".dimmed()));
            }
            StepStatus::Cached => finish_success(&pb, &format!("{label} {}", "cached".dimmed())),
            StepStatus::Planned => {
                pb.finish_and_clear();
                let args = record.args.as_ref().map(ToString::to_string).unwrap_or_default();
                println!("  {label} {}", args.dimmed());
            }
            StepStatus::Failed => finish_error(&pb, &format!("{label} failed{retried}")),
            _ => finish_warn(&pb, &label),
        }
    }

    fn on_plan_complete(&mut self, _result: &PlanResult) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
    }
}
