pub mod apply;
pub mod graph;
pub mod plan;
pub mod validate;

use declarative::RunReport;

/// Process exit status for a finished run
///
/// Plain mode: 0 on success, 1 when anything failed or the run was
/// cancelled. Detailed mode adds 2 when changes were made (or would be,
/// in a dry run) and 4 for failures, so 6 means both.
pub fn exit_status(report: &RunReport, detailed: bool) -> u8 {
    let failed = !report.is_success();
    if !detailed {
        return u8::from(failed);
    }

    let changed = if report.dry_run {
        report.pending_count() > 0
    } else {
        report.has_changes()
    };
    let mut status = 0;
    if changed {
        status |= 2;
    }
    if failed {
        status |= 4;
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ApplyError, LogEntry, Outcome, ResourceId, RunError, Transition};

    fn report(outcomes: Vec<Outcome>, failed: bool) -> RunReport {
        let id = ResourceId::new("package", "cobbler");
        RunReport {
            entries: outcomes
                .into_iter()
                .map(|outcome| LogEntry {
                    id: id.clone(),
                    outcome,
                })
                .collect(),
            errors: if failed {
                vec![RunError::Apply(ApplyError::new(&id, "exit 100"))]
            } else {
                Vec::new()
            },
            ..RunReport::default()
        }
    }

    #[test]
    fn test_plain_exit_status() {
        assert_eq!(exit_status(&report(vec![Outcome::Unchanged], false), false), 0);
        assert_eq!(exit_status(&report(vec![], true), false), 1);
    }

    #[test]
    fn test_detailed_exit_status() {
        let created = Outcome::Changed {
            transition: Transition::Created,
        };
        assert_eq!(exit_status(&report(vec![Outcome::Unchanged], false), true), 0);
        assert_eq!(exit_status(&report(vec![created.clone()], false), true), 2);
        assert_eq!(exit_status(&report(vec![Outcome::Unchanged], true), true), 4);
        assert_eq!(exit_status(&report(vec![created], true), true), 6);
    }

    #[test]
    fn test_dry_run_counts_pending() {
        let mut pending = report(vec![Outcome::WouldRefresh], false);
        pending.dry_run = true;
        assert_eq!(exit_status(&pending, true), 2);
    }

    #[test]
    fn test_cancelled_run_fails() {
        let mut cancelled = report(vec![Outcome::Cancelled], false);
        cancelled.cancelled = true;
        assert_eq!(exit_status(&cancelled, false), 1);
    }
}
