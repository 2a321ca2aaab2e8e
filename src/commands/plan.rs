//! `converge plan` - show what apply would change

use anyhow::Result;
use chrono::Utc;
use declarative::CancelToken;
use std::process::ExitCode;

use super::exit_status;
use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::{self, BarProgress, RunRecord, Session};
use crate::signal::InterruptWatch;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<ExitCode> {
    let session = Session::load(ctx.manifest.as_deref(), &args.options.set)?;
    let plan = session.plan()?;
    let started_at = Utc::now();

    let cancel = CancelToken::new();
    let _watch = InterruptWatch::start(cancel.clone());
    let opts = session.run_options(&args.run, true, cancel);

    let mut progress = BarProgress::new(!ctx.quiet && console::user_attended(), false);
    let report = plan.execute(&opts, &mut progress);
    progress.finish();

    engine::display_plan(&report, &plan, session.adapters.files.as_deref(), args.diff);

    if let Some(path) = &args.report {
        RunRecord::new(&session.loaded.path, started_at, &report).write(path)?;
        ui::dim(&format!("Report written to {}", path.display()));
    }
    if !report.errors.is_empty() {
        ui::section("Errors");
        for error in &report.errors {
            ui::error(&error.to_string());
        }
    }
    Ok(ExitCode::from(exit_status(&report, false)))
}
