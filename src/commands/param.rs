use anyhow::Result;
use reconcile::{ParamAction, Plan, workflows};
use xekit::Params;

use crate::Context;
use crate::cli::ParamArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ParamArgs) -> Result<()> {
    let action = ParamAction::from(args.action);
    let plans = args
        .uuids
        .iter()
        .map(|uuid| workflows::vm_param_plan(&params(action, uuid, &args)))
        .collect::<xekit::Result<Vec<Plan>>>()?;

    let reports = match plans.as_slice() {
        [plan] => {
            if ctx.interactive_output() {
                ui::header(&format!("{action} {} on {}", args.param_name, args.uuids[0]));
                println!();
            }
            vec![super::run_plan(ctx, plan, None, args.dry_run)?]
        }
        many => {
            if ctx.interactive_output() {
                ui::info(&format!(
                    "{action} {} on {} VMs ({} at a time)",
                    args.param_name,
                    many.len(),
                    args.jobs.max(1)
                ));
            }
            super::run_plans(ctx, many, args.jobs, args.dry_run)?
        }
    };

    super::print_reports(ctx, &reports)?;
    super::ensure_success(&reports)
}

fn params(action: ParamAction, uuid: &str, args: &ParamArgs) -> Params {
    let mut params = Params::from([
        ("action".to_string(), action.to_string()),
        ("uuid".to_string(), uuid.to_string()),
        ("param_name".to_string(), args.param_name.clone()),
    ]);
    if let Some(key) = &args.key {
        params.insert("param_key".to_string(), key.clone());
    }
    if let Some(value) = &args.value {
        params.insert("value".to_string(), value.clone());
    }
    params
}
