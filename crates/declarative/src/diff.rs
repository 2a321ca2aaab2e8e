//! Diff computation for resources

use crate::run::RunReport;
use crate::types::{DesiredState, Ensure, ObservedState, Outcome, PropertyChange, Transition};
use serde_json::Value;
use std::collections::BTreeMap;

/// Properties that differ between desired and observed state
///
/// `ensure` is compared first. A resource that should be absent only cares
/// about `ensure`; otherwise every desired attribute must equal the observed
/// one. Observed attributes that are not desired are ignored.
pub fn property_changes(desired: &DesiredState, observed: &ObservedState) -> Vec<PropertyChange> {
    let mut changes = Vec::new();

    let present = observed.ensure.unwrap_or(Ensure::Absent);
    if present != desired.ensure {
        changes.push(PropertyChange::new(
            "ensure",
            Some(Value::from(present.as_str())),
            Some(Value::from(desired.ensure.as_str())),
        ));
    }

    if desired.ensure == Ensure::Absent {
        return changes;
    }

    for (key, want) in &desired.attributes {
        let have = observed.attributes.get(key);
        if have != Some(want) {
            changes.push(PropertyChange::new(key, have.cloned(), Some(want.clone())));
        }
    }

    changes
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources created (or to be created)
    pub additions: usize,
    /// Number of resources removed
    pub removals: usize,
    /// Number of resources modified
    pub modifications: usize,
    /// Number of notify targets refreshed
    pub refreshes: usize,
    /// Number of undeclared collection members purged
    pub purges: usize,
}

impl DiffSummary {
    /// Create a summary from the outcomes of a run, real or dry
    pub fn from_report(report: &RunReport) -> Self {
        let mut summary = Self::default();
        for entry in &report.entries {
            match &entry.outcome {
                Outcome::Changed { transition } => match transition {
                    Transition::Created => summary.additions += 1,
                    Transition::Removed => summary.removals += 1,
                    Transition::Updated | Transition::Unchanged => summary.modifications += 1,
                },
                Outcome::Pending { changes } => match pending_transition(changes) {
                    Transition::Created => summary.additions += 1,
                    Transition::Removed => summary.removals += 1,
                    _ => summary.modifications += 1,
                },
                Outcome::Refreshed | Outcome::WouldRefresh => summary.refreshes += 1,
                Outcome::Purged | Outcome::WouldPurge => summary.purges += 1,
                _ => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.refreshes + self.purges
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Transition a pending change set would cause
pub fn pending_transition(changes: &[PropertyChange]) -> Transition {
    let ensure = changes.iter().find(|c| c.property == "ensure");
    let word = |v: &Option<Value>| v.as_ref().and_then(Value::as_str).map(str::to_string);

    match ensure {
        Some(change) if word(&change.to).as_deref() == Some("absent") => Transition::Removed,
        Some(change) if word(&change.from).as_deref() == Some("absent") => Transition::Created,
        _ if changes.is_empty() => Transition::Unchanged,
        _ => Transition::Updated,
    }
}

/// Group outcome entries by resource kind
pub fn group_by_kind(report: &RunReport) -> BTreeMap<&str, Vec<(&str, &Outcome)>> {
    let mut groups: BTreeMap<&str, Vec<(&str, &Outcome)>> = BTreeMap::new();
    for entry in &report.entries {
        groups
            .entry(entry.id.kind.as_str())
            .or_default()
            .push((entry.id.name.as_str(), &entry.outcome));
    }
    groups
}
