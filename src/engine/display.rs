//! Plan and summary display

use crate::adapters::FileAdapter;
use crate::ui;
use colored::{ColoredString, Colorize};
use declarative::{
    DiffSummary, Outcome, Plan, PropertyChange, ResourceId, RunReport, Transition, group_by_kind,
    pending_transition,
};
use serde_json::Value;

fn symbol(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::Pending { changes } => match pending_transition(changes) {
            Transition::Created => "+".green(),
            Transition::Removed => "-".red(),
            _ => "~".yellow(),
        },
        Outcome::WouldRefresh => "↻".cyan(),
        Outcome::WouldPurge => "-".red(),
        other => ui::outcome_symbol(other),
    }
}

fn show(value: Option<&Value>) -> String {
    match value {
        None => "(none)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn describe(changes: &[PropertyChange]) -> String {
    changes
        .iter()
        .map(|c| {
            format!(
                "{}: {} → {}",
                c.property,
                show(c.from.as_ref()),
                show(c.to.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Display what a dry run found, grouped by kind
///
/// With `show_diff`, pending file changes get a content diff.
pub fn display_plan(report: &RunReport, plan: &Plan, files: Option<&FileAdapter>, show_diff: bool) {
    let summary = DiffSummary::from_report(report);
    if !summary.has_changes() && report.failure_count() == 0 {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Convergence Plan".bold()
    );
    println!("│");

    for (kind, entries) in group_by_kind(report) {
        let interesting: Vec<_> = entries
            .into_iter()
            .filter(|(_, o)| o.is_pending() || o.is_failure())
            .collect();
        if interesting.is_empty() {
            continue;
        }
        println!("│ {}", kind.bold());

        for (name, outcome) in interesting {
            let detail = match outcome {
                Outcome::Pending { changes } => describe(changes),
                Outcome::WouldRefresh => "(refresh)".to_string(),
                Outcome::WouldPurge => "(undeclared, will purge)".to_string(),
                Outcome::Failed { cause } | Outcome::PurgeFailed { cause } => cause.clone(),
                Outcome::Blocked { by } => format!("(blocked by {by})"),
                _ => String::new(),
            };
            println!("│   {} {:<30} {}", symbol(outcome), name, detail.dimmed());

            if show_diff && kind == "file" && matches!(outcome, Outcome::Pending { .. }) {
                print_content_diff(plan, files, &ResourceId::new(kind, name));
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to add, {} to change, {} to remove, {} refreshes, {} purges)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red(),
        summary.refreshes.to_string().cyan(),
        summary.purges.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn print_content_diff(plan: &Plan, files: Option<&FileAdapter>, id: &ResourceId) {
    let (Some(files), Some(node)) = (files, plan.graph().index_of(id)) else {
        return;
    };
    let desired = plan.graph().resource(node).desired_state();
    match files.content_diff(&id.name, &desired) {
        Ok(Some(diff)) => {
            for line in diff.lines() {
                let line = match line.chars().next() {
                    Some('+') => line.green(),
                    Some('-') => line.red(),
                    _ => line.dimmed(),
                };
                println!("│       {line}");
            }
        }
        Ok(None) => {}
        Err(e) => log::warn!("Could not diff {id}: {e:#}"),
    }
}

/// Print the final summary of a real run
pub fn print_summary(report: &RunReport) {
    let mut created = 0;
    let mut updated = 0;
    let mut removed = 0;
    let mut refreshed = 0;
    let mut purged = 0;
    let mut failed = 0;
    let mut blocked = 0;
    let mut cancelled = 0;

    for entry in &report.entries {
        match &entry.outcome {
            Outcome::Changed { transition } => match transition {
                Transition::Created => created += 1,
                Transition::Removed => removed += 1,
                Transition::Updated | Transition::Unchanged => updated += 1,
            },
            Outcome::Refreshed => refreshed += 1,
            Outcome::Purged => purged += 1,
            Outcome::Failed { .. } | Outcome::PurgeFailed { .. } => failed += 1,
            Outcome::Blocked { .. } => blocked += 1,
            Outcome::Cancelled => cancelled += 1,
            _ => {}
        }
    }

    println!();
    if report.cancelled {
        println!("  {} Run cancelled", "⚠".yellow().bold());
    } else if !report.is_success() {
        println!("  {} Converged with errors", "⚠".yellow().bold());
    } else if report.has_changes() {
        println!("  {} Converged successfully!", "✓".green().bold());
    } else {
        println!("  {} Already converged, no changes made", "✓".green().bold());
    }

    let lines = [
        (created, "created"),
        (updated, "updated"),
        (removed, "removed"),
        (refreshed, "refreshed"),
        (purged, "purged"),
    ];
    for (count, what) in lines {
        if count > 0 {
            println!("    • {count} resources {what}");
        }
    }
    if failed > 0 {
        println!("    • {} {} failed", failed, "resources".red());
    }
    if blocked > 0 {
        println!("    • {} {} blocked", blocked, "resources".yellow());
    }
    if cancelled > 0 {
        println!("    • {cancelled} resources not started");
    }

    if !report.errors.is_empty() {
        ui::section("Errors");
        for error in &report.errors {
            ui::error(&error.to_string());
        }
    }
}
