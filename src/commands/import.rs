use anyhow::Result;
use reconcile::workflows;
use xekit::Params;

use crate::Context;
use crate::cli::ImportArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ImportArgs) -> Result<()> {
    let params = Params::from([
        ("filename".to_string(), args.filename),
        ("name_label".to_string(), args.name_label),
        ("name_description".to_string(), args.name_description),
        ("sr_name".to_string(), args.sr_name),
    ]);
    let plan = workflows::vm_import_plan(&params)?;

    if ctx.interactive_output() {
        ui::header(&format!("Importing {}", params["filename"]));
        ui::kv("plan", &plan.id);
        println!();
    }

    let report = super::run_plan(ctx, &plan, None, args.dry_run)?;
    let reports = [report];
    super::print_reports(ctx, &reports)?;
    super::ensure_success(&reports)
}
