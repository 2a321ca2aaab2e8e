//! Execution engine - applies resources wave by wave with bounded parallelism

use crate::compose::FeatureFlags;
use crate::context::{AdapterRegistry, ApplyContext, KindAdapter, NoProgress, Phase, ProgressCallback, with_timeout};
use crate::error::Result;
use crate::materialize::DataSource;
use crate::notify;
use crate::planner::Plan;
use crate::purge;
use crate::resource::{Manifest, Resource};
use crate::run::{ConvergenceRun, RunReport};
use crate::types::{Outcome, PropertyChange, RunOptions, Transition};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execute a plan
///
/// Runs the apply waves, then the refresh passes, then the purge of every
/// managed collection. Once the cancel token is set, nothing new is
/// started and the remaining phases are skipped.
pub fn execute<P: ProgressCallback>(plan: &Plan, opts: &RunOptions, progress: &mut P) -> RunReport {
    let mut run = ConvergenceRun::new(plan.graph(), opts.dry_run);

    apply_waves(&mut run, plan.adapters(), opts, progress);

    if !opts.cancel.is_cancelled() {
        notify::propagate(&mut run, plan.adapters(), opts, progress);
    }
    if !opts.cancel.is_cancelled() {
        purge::reconcile(&mut run, plan.collections(), plan.adapters(), opts, progress);
    }

    let cancelled = opts.cancel.is_cancelled();
    if cancelled {
        log::warn!("Run cancelled; remaining resources were not started");
    }
    run.finish(cancelled)
}

/// Simple execution without callbacks
///
/// Builds the plan and runs it in one call. Configuration errors are
/// returned before anything is applied.
pub fn converge(
    manifest: &Manifest,
    flags: &FeatureFlags,
    data: Option<&dyn DataSource>,
    adapters: &AdapterRegistry,
    opts: &RunOptions,
) -> Result<RunReport> {
    let plan = Plan::build(manifest, flags, data, adapters)?;
    Ok(plan.execute(opts, &mut NoProgress))
}

/// Apply every wave in order. A wave is a barrier: its outcomes are
/// recorded before the next wave is scheduled.
fn apply_waves<P: ProgressCallback>(
    run: &mut ConvergenceRun<'_>,
    adapters: &AdapterRegistry,
    opts: &RunOptions,
    progress: &mut P,
) {
    let graph = run.graph;
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(opts.parallelism.max(1))
        .thread_name(|i| format!("converge-worker-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!("Failed to create thread pool, applying sequentially: {e}");
            None
        }
    };

    for (level, wave) in graph.waves().iter().enumerate() {
        log::debug!("Wave {}: {} resource(s)", level, wave.len());
        progress.on_batch_start(Phase::Apply, wave.len());

        let mut outcomes: Vec<Option<Outcome>> = vec![None; wave.len()];
        let mut runnable = Vec::with_capacity(wave.len());

        for (slot, &node) in wave.iter().enumerate() {
            let resource = graph.resource(node);
            if opts.cancel.is_cancelled() {
                outcomes[slot] = Some(Outcome::Cancelled);
            } else if let Some(outcome) = blocked_by_predecessor(run, node) {
                outcomes[slot] = Some(outcome);
            } else if resource.refresh_only {
                outcomes[slot] = Some(Outcome::Idle);
            } else {
                runnable.push((slot, resource));
            }
        }

        let work = |&(slot, resource): &(usize, &Resource)| {
            let outcome = if opts.cancel.is_cancelled() {
                Outcome::Cancelled
            } else {
                converge_resource(adapters, resource, opts, false)
            };
            (slot, outcome)
        };

        let results: Vec<(usize, Outcome)> = match &pool {
            Some(pool) if runnable.len() > 1 => pool.install(|| runnable.par_iter().map(work).collect()),
            _ => runnable.iter().map(work).collect(),
        };
        for (slot, outcome) in results {
            outcomes[slot] = Some(outcome);
        }

        for (&node, outcome) in wave.iter().zip(outcomes) {
            if let Some(outcome) = outcome {
                run.record(node, outcome, progress);
            }
        }
        progress.on_batch_complete(Phase::Apply);
    }
}

/// Outcome forced by a required resource that did not converge
pub(crate) fn blocked_by_predecessor(run: &ConvergenceRun<'_>, node: usize) -> Option<Outcome> {
    let graph = run.graph;
    graph.requires(node).iter().find_map(|&req| match run.status(req) {
        Some(Outcome::Cancelled) => Some(Outcome::Cancelled),
        Some(outcome) if outcome.blocks_dependents() => Some(Outcome::Blocked {
            by: graph.resource(req).id.clone(),
        }),
        _ => None,
    })
}

/// Converge one resource: query, compare, then apply if needed
///
/// With `refresh`, the adapter is called even when in sync and any
/// successful apply is reported as `Refreshed`.
pub(crate) fn converge_resource(
    adapters: &AdapterRegistry,
    resource: &Resource,
    opts: &RunOptions,
    refresh: bool,
) -> Outcome {
    let Some(adapter) = adapters.get(resource.kind()) else {
        // Plans only contain kinds with a registered adapter
        return Outcome::Failed {
            cause: format!("no adapter registered for kind '{}'", resource.kind()),
        };
    };

    let started = Instant::now();
    let mut ctx = ApplyContext::new(opts.dry_run, opts.timeout);
    if refresh {
        ctx = ctx.refreshing();
    }

    let outcome = if refresh && opts.dry_run {
        Outcome::WouldRefresh
    } else {
        match check(adapter, resource, ctx) {
            Err(e) => Outcome::Failed {
                cause: format!("{e:#}"),
            },
            Ok(None) if !refresh => Outcome::Unchanged,
            Ok(changes) if opts.dry_run => Outcome::Pending {
                changes: changes.unwrap_or_default(),
            },
            // Query and apply share one deadline
            Ok(_) => apply(
                adapter,
                resource,
                ApplyContext {
                    timeout: opts.timeout.saturating_sub(started.elapsed()),
                    ..ctx
                },
            ),
        }
    };

    match &outcome {
        Outcome::Failed { cause } => log::warn!("{}: {}", resource.id, cause),
        o if o.is_change() => log::info!("{}: {}", resource.id, o.label()),
        o => log::debug!("{}: {}", resource.id, o.label()),
    }
    outcome
}

/// Query the instance and compare. `None` means in sync; otherwise the
/// property changes, computed only for dry runs.
fn check(
    adapter: &Arc<dyn KindAdapter>,
    resource: &Resource,
    ctx: ApplyContext,
) -> anyhow::Result<Option<Vec<PropertyChange>>> {
    let name = resource.name().to_string();
    let desired = resource.desired_state();
    timed(adapter, ctx.timeout, move |a| {
        let observed = a.query(&name, &ctx)?;
        if a.in_sync(&name, &desired, &observed)? {
            return Ok(None);
        }
        if ctx.dry_run {
            return a.changes(&name, &desired, &observed).map(Some);
        }
        Ok(Some(Vec::new()))
    })
}

fn apply(adapter: &Arc<dyn KindAdapter>, resource: &Resource, ctx: ApplyContext) -> Outcome {
    let name = resource.name().to_string();
    let desired = resource.desired_state();
    match timed(adapter, ctx.timeout, move |a| a.apply(&name, &desired, &ctx)) {
        Ok(_) if ctx.refresh => Outcome::Refreshed,
        Ok(Transition::Unchanged) => Outcome::Unchanged,
        Ok(transition) => Outcome::Changed { transition },
        Err(e) => Outcome::Failed {
            cause: format!("{e:#}"),
        },
    }
}

/// Run an adapter call on its own thread with a deadline
pub(crate) fn timed<T, F>(adapter: &Arc<dyn KindAdapter>, timeout: Duration, call: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn KindAdapter) -> anyhow::Result<T> + Send + 'static,
{
    let adapter = Arc::clone(adapter);
    with_timeout(timeout, move || call(adapter.as_ref()))
}
