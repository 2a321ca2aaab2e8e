//! Notification propagation
//!
//! Runs after every apply wave has completed. Refreshes are scheduled level
//! by level over require and notify edges together, so a target is handled
//! only once all of its sources and requirements have settled, and it is
//! refreshed at most once per run. The pass limit counts notify depth only.

use crate::context::{AdapterRegistry, Phase, ProgressCallback};
use crate::error::RunError;
use crate::executor::{blocked_by_predecessor, converge_resource};
use crate::run::ConvergenceRun;
use crate::types::{Outcome, RunOptions};

/// Refresh every resource notified by a changed resource
pub(crate) fn propagate<P: ProgressCallback>(
    run: &mut ConvergenceRun<'_>,
    adapters: &AdapterRegistry,
    opts: &RunOptions,
    progress: &mut P,
) {
    let graph = run.graph;

    for level in 1..=graph.refresh_depth() {
        if opts.cancel.is_cancelled() {
            return;
        }

        let (targets, over_limit): (Vec<usize>, Vec<usize>) = graph
            .order()
            .iter()
            .copied()
            .filter(|&node| graph.refresh_level(node) == level && is_triggered(run, node))
            .partition(|&node| graph.notify_level(node) <= opts.max_refresh_passes);

        for node in over_limit {
            let id = graph.resource(node).id.clone();
            log::warn!("{id} not refreshed: refresh pass limit reached");
            run.push_error(RunError::RefreshLimit {
                id,
                passes: opts.max_refresh_passes,
            });
        }
        if targets.is_empty() {
            continue;
        }

        log::debug!("Refresh pass {}: {} resource(s)", level, targets.len());
        progress.on_batch_start(Phase::Refresh, targets.len());
        for node in targets {
            if opts.cancel.is_cancelled() {
                break;
            }
            // A requirement may have failed its own refresh
            let outcome = blocked_by_predecessor(run, node)
                .unwrap_or_else(|| converge_resource(adapters, graph.resource(node), opts, true));
            run.record(node, outcome, progress);
        }
        progress.on_batch_complete(Phase::Refresh);
    }
}

/// A target needs a refresh when at least one source changed (or would
/// change), unless the target itself did not converge
fn is_triggered(run: &ConvergenceRun<'_>, node: usize) -> bool {
    if run.status(node).is_some_and(Outcome::blocks_dependents) {
        return false;
    }
    run.graph
        .notified_by(node)
        .iter()
        .any(|&source| run.status(source).is_some_and(Outcome::triggers_refresh))
}
