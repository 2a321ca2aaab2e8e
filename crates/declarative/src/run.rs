//! Run context and report

use crate::context::ProgressCallback;
use crate::error::{ApplyError, RunError};
use crate::graph::ResourceGraph;
use crate::types::{Outcome, ResourceId};
use serde::Serialize;

/// One line of the run log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: ResourceId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Transient state of a single run
///
/// Owned by the scheduling thread. Workers never touch it; their results
/// are recorded here after each wave barrier.
pub(crate) struct ConvergenceRun<'g> {
    pub graph: &'g ResourceGraph,
    /// Latest outcome per node, indexed like the graph
    status: Vec<Option<Outcome>>,
    log: Vec<LogEntry>,
    errors: Vec<RunError>,
    dry_run: bool,
}

impl<'g> ConvergenceRun<'g> {
    pub fn new(graph: &'g ResourceGraph, dry_run: bool) -> Self {
        Self {
            graph,
            status: vec![None; graph.len()],
            log: Vec::with_capacity(graph.len()),
            errors: Vec::new(),
            dry_run,
        }
    }

    pub fn status(&self, node: usize) -> Option<&Outcome> {
        self.status[node].as_ref()
    }

    /// Record the outcome of a graph node
    pub fn record(&mut self, node: usize, outcome: Outcome, progress: &mut impl ProgressCallback) {
        let id = self.graph.resource(node).id.clone();
        match &outcome {
            Outcome::Failed { cause } => self.errors.push(RunError::Apply(ApplyError::new(&id, cause))),
            Outcome::Blocked { by } => self.errors.push(RunError::Blocked {
                id: id.clone(),
                by: by.clone(),
            }),
            _ => {}
        }
        self.status[node] = Some(outcome.clone());
        self.log_outcome(id, outcome, progress);
    }

    /// Record an outcome for something that is not a graph node, such as
    /// a purged collection member
    pub fn log_outcome(&mut self, id: ResourceId, outcome: Outcome, progress: &mut impl ProgressCallback) {
        progress.on_resource_complete(&id, &outcome);
        self.log.push(LogEntry { id, outcome });
    }

    pub fn push_error(&mut self, error: RunError) {
        self.errors.push(error);
    }

    pub fn finish(self, cancelled: bool) -> RunReport {
        RunReport {
            entries: self.log,
            errors: self.errors,
            dry_run: self.dry_run,
            cancelled,
        }
    }
}

/// Result of a convergence run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Every recorded (resource, outcome) in the order it happened
    pub entries: Vec<LogEntry>,
    /// Captured run errors with identity
    pub errors: Vec<RunError>,
    pub dry_run: bool,
    pub cancelled: bool,
}

impl RunReport {
    /// No errors and not cancelled
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// Number of outcomes that changed the host
    pub fn change_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_change()).count()
    }

    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    /// Number of changes a real run would make (dry run)
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_pending()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }

    /// Final outcome of a resource
    ///
    /// A refreshed resource is logged twice; the later entry wins.
    pub fn outcome_of(&self, id: &ResourceId) -> Option<&Outcome> {
        self.entries
            .iter()
            .rev()
            .find(|e| &e.id == id)
            .map(|e| &e.outcome)
    }

    /// Every outcome recorded for a resource, in order
    pub fn outcomes_of<'a>(&'a self, id: &ResourceId) -> impl Iterator<Item = &'a Outcome> + use<'a> {
        let id = id.clone();
        self.entries
            .iter()
            .filter(move |e| e.id == id)
            .map(|e| &e.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::resource::Resource;
    use crate::types::Transition;
    use std::collections::HashMap;

    #[test]
    fn test_record_captures_errors() {
        let graph = ResourceGraph::build(
            vec![Resource::new("package", "a"), Resource::new("package", "b")],
            &HashMap::new(),
        )
        .unwrap();
        let mut run = ConvergenceRun::new(&graph, false);
        run.record(
            0,
            Outcome::Failed {
                cause: "mirror down".into(),
            },
            &mut NoProgress,
        );
        run.record(
            1,
            Outcome::Blocked {
                by: ResourceId::new("package", "a"),
            },
            &mut NoProgress,
        );

        let report = run.finish(false);
        assert!(!report.is_success());
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.errors[0].resource(), ResourceId::new("package", "a"));
    }

    #[test]
    fn test_later_outcome_wins() {
        let id = ResourceId::new("service", "cobblerd");
        let report = RunReport {
            entries: vec![
                LogEntry {
                    id: id.clone(),
                    outcome: Outcome::Changed {
                        transition: Transition::Updated,
                    },
                },
                LogEntry {
                    id: id.clone(),
                    outcome: Outcome::Refreshed,
                },
            ],
            ..RunReport::default()
        };
        assert_eq!(report.outcome_of(&id), Some(&Outcome::Refreshed));
        assert_eq!(report.outcomes_of(&id).count(), 2);
        let all: Vec<&Outcome> = report
            .outcomes_of(&ResourceId::new("service", "cobblerd"))
            .collect();
        assert_eq!(all.last(), Some(&&Outcome::Refreshed));
        assert_eq!(report.change_count(), 2);
        assert!(report.is_success());
    }

    #[test]
    fn test_report_serializes_flat_entries() {
        let report = RunReport {
            entries: vec![LogEntry {
                id: ResourceId::new("distro", "d3"),
                outcome: Outcome::Purged,
            }],
            ..RunReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["id"], "distro[d3]");
        assert_eq!(json["entries"][0]["status"], "purged");
    }
}
