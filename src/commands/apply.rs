//! `converge apply` - converge the host to the manifest

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use declarative::{CancelToken, NoProgress, Plan, RunOptions, RunReport};
use std::process::ExitCode;

use super::exit_status;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, BarProgress, RunRecord, Session};
use crate::signal::InterruptWatch;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<ExitCode> {
    let session = Session::load(ctx.manifest.as_deref(), &args.options.set)?;
    let plan = session.plan()?;
    let started_at = Utc::now();

    let cancel = CancelToken::new();
    let _watch = InterruptWatch::start(cancel.clone());
    let opts = session.run_options(&args.run, args.dry_run, cancel);

    if args.dry_run {
        let report = execute(ctx, &plan, &opts);
        engine::display_plan(&report, &plan, session.adapters.files.as_deref(), false);
        println!();
        ui::info("Dry run - no changes made");
        return finish(&session, started_at, &report, &args);
    }

    // Preview and confirm when someone is watching
    let interactive = !args.yes && !ctx.quiet && console::user_attended();
    if interactive {
        let preview = plan.execute(
            &RunOptions {
                dry_run: true,
                ..opts.clone()
            },
            &mut NoProgress,
        );
        engine::display_plan(&preview, &plan, session.adapters.files.as_deref(), false);

        if preview.pending_count() == 0 && preview.failure_count() == 0 {
            return finish(&session, started_at, &preview, &args);
        }
        if !confirm_proceed()? {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(ExitCode::SUCCESS);
        }
    }

    let report = execute(ctx, &plan, &opts);
    engine::print_summary(&report);
    finish(&session, started_at, &report, &args)
}

fn execute(ctx: &Context, plan: &Plan, opts: &RunOptions) -> RunReport {
    let mut progress = BarProgress::new(!ctx.quiet && console::user_attended(), ctx.verbose > 0);
    let report = plan.execute(opts, &mut progress);
    progress.finish();
    report
}

fn finish(
    session: &Session,
    started_at: chrono::DateTime<Utc>,
    report: &RunReport,
    args: &ApplyArgs,
) -> Result<ExitCode> {
    if let Some(path) = &args.report {
        RunRecord::new(&session.loaded.path, started_at, report).write(path)?;
        ui::dim(&format!("Report written to {}", path.display()));
    }
    Ok(ExitCode::from(exit_status(report, args.detailed_exitcodes)))
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
