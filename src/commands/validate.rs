//! `converge validate` - configuration-time checks only

use anyhow::Result;
use std::process::ExitCode;

use crate::Context;
use crate::cli::OptionArgs;
use crate::engine::Session;
use crate::ui;

pub fn run(ctx: &Context, args: OptionArgs) -> Result<ExitCode> {
    let session = Session::load(ctx.manifest.as_deref(), &args.set)?;
    let plan = session.plan()?;

    if !ctx.quiet {
        ui::header("Manifest");
        ui::kv("path", &session.loaded.path.display().to_string());
        ui::kv("options", &session.options.len().to_string());
        ui::kv("resources", &plan.len().to_string());
        ui::kv("waves", &plan.graph().waves().len().to_string());

        let purging: Vec<&str> = plan
            .collections()
            .iter()
            .filter(|c| c.purge)
            .map(|c| c.kind.as_str())
            .collect();
        ui::kv("collections", &plan.collections().len().to_string());
        if !purging.is_empty() {
            ui::kv("purging", &purging.join(", "));
        }
        ui::kv("adapters", &plan.adapters().kinds().join(", "));
        println!();
    }

    ui::success("Manifest is valid");
    Ok(ExitCode::SUCCESS)
}
