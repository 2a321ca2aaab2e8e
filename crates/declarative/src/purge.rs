//! Purge of undeclared collection members

use crate::context::{AdapterRegistry, ApplyContext, Phase, ProgressCallback};
use crate::error::{ApplyError, PartialPurgeError, RunError};
use crate::executor::timed;
use crate::resource::ManagedCollection;
use crate::run::ConvergenceRun;
use crate::types::{Outcome, ResourceId, RunOptions};
use std::collections::BTreeSet;

/// Reconcile every purging collection, in declaration order
///
/// Declared members include those with `ensure = absent`; they were
/// handled by the apply waves and are never deleted here.
pub(crate) fn reconcile<P: ProgressCallback>(
    run: &mut ConvergenceRun<'_>,
    collections: &[ManagedCollection],
    adapters: &AdapterRegistry,
    opts: &RunOptions,
    progress: &mut P,
) {
    for collection in collections.iter().filter(|c| c.purge) {
        if opts.cancel.is_cancelled() {
            return;
        }
        reconcile_one(run, collection, adapters, opts, progress);
    }
}

fn reconcile_one<P: ProgressCallback>(
    run: &mut ConvergenceRun<'_>,
    collection: &ManagedCollection,
    adapters: &AdapterRegistry,
    opts: &RunOptions,
    progress: &mut P,
) {
    let graph = run.graph;
    let id = collection.id();

    let blocker = collection.require.iter().find(|req| {
        graph
            .index_of(req)
            .and_then(|node| run.status(node))
            .is_some_and(Outcome::blocks_dependents)
    });
    if let Some(by) = blocker {
        log::warn!("Skipping purge of '{}': {} did not converge", collection.kind, by);
        run.push_error(RunError::Blocked {
            id: id.clone(),
            by: by.clone(),
        });
        progress.on_batch_start(Phase::Purge, 1);
        run.log_outcome(id, Outcome::Blocked { by: by.clone() }, progress);
        progress.on_batch_complete(Phase::Purge);
        return;
    }

    let Some(adapter) = adapters.get(&collection.kind) else {
        return;
    };
    let ctx = ApplyContext::new(opts.dry_run, opts.timeout);

    let actual = match timed(adapter, ctx.timeout, move |a| a.list(&ctx)) {
        Ok(actual) => actual,
        Err(e) => {
            let cause = format!("{e:#}");
            log::warn!("Failed to list '{}' members: {}", collection.kind, cause);
            run.push_error(RunError::Apply(ApplyError::new(&id, &cause)));
            progress.on_batch_start(Phase::Purge, 1);
            run.log_outcome(id, Outcome::Failed { cause }, progress);
            progress.on_batch_complete(Phase::Purge);
            return;
        }
    };

    let declared: BTreeSet<String> = graph
        .nodes_of_kind(&collection.kind)
        .map(|node| graph.resource(node).name().to_string())
        .collect();
    let undeclared: Vec<String> = actual.difference(&declared).cloned().collect();

    log::debug!(
        "Collection '{}': {} present, {} declared, {} to purge",
        collection.kind,
        actual.len(),
        declared.len(),
        undeclared.len()
    );
    if undeclared.is_empty() {
        return;
    }

    progress.on_batch_start(Phase::Purge, undeclared.len());
    let mut failures = Vec::new();

    for name in undeclared {
        if opts.cancel.is_cancelled() {
            break;
        }
        let member = ResourceId::new(&collection.kind, &name);

        let outcome = if opts.dry_run {
            Outcome::WouldPurge
        } else {
            let target = name.clone();
            match timed(adapter, ctx.timeout, move |a| a.delete(&target, &ctx)) {
                Ok(()) => {
                    log::info!("{member}: purged");
                    Outcome::Purged
                }
                Err(e) => {
                    let cause = format!("{e:#}");
                    log::warn!("{member}: purge failed: {cause}");
                    failures.push((name, cause.clone()));
                    Outcome::PurgeFailed { cause }
                }
            }
        };
        run.log_outcome(member, outcome, progress);
    }

    progress.on_batch_complete(Phase::Purge);

    if !failures.is_empty() {
        run.push_error(RunError::PartialPurge(PartialPurgeError {
            kind: collection.kind.clone(),
            failures,
        }));
    }
}
