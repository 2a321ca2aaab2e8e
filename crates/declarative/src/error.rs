//! Error types for convergence
//!
//! Configuration errors are fatal and raised before any adapter is
//! called. Run errors are captured per resource and reported at the end
//! of the run alongside the full outcome log.

use crate::types::ResourceId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A `kind[name]` reference that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resource reference '{0}' (expected kind[name])")]
pub struct ParseIdError(pub String);

/// Kind of edge between two resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Require,
    Notify,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Require => f.write_str("requires"),
            Self::Notify => f.write_str("notifies"),
        }
    }
}

/// Configuration-time errors. No resource is applied when one occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A resource reaches itself through require edges
    #[error("dependency cycle: {}", chain(.members))]
    Cycle { members: Vec<ResourceId> },

    /// Notify edges form a loop, alone or through require edges
    #[error("notification cycle: {}", chain(.members))]
    NotifyCycle { members: Vec<ResourceId> },

    /// An edge names a resource that is not part of the composed graph
    #[error("{from} {edge} {to}, which is not declared{}", gated_suffix(.gated_by))]
    UnresolvedReference {
        from: ResourceId,
        to: ResourceId,
        edge: EdgeKind,
        /// Gate that excluded the target, if it was declared but gated out
        gated_by: Option<String>,
    },

    /// Two declarations share the same identity
    #[error("duplicate resource {id}{}", key_suffix(.key))]
    DuplicateResource {
        id: ResourceId,
        /// Data source key the duplicate was materialized from
        key: Option<String>,
    },

    /// A declared kind has no registered adapter
    #[error("no adapter registered for kind '{kind}' (needed by {id})")]
    UnknownKind { kind: String, id: ResourceId },

    /// Purge requested for a kind whose adapter cannot enumerate members
    #[error("collection '{kind}' has purge enabled but its adapter cannot list members")]
    UnsupportedPurge { kind: String },

    /// A materialized entry carries an unusable attribute
    #[error("invalid attribute '{attribute}' on {id}: {reason}")]
    InvalidAttribute {
        id: ResourceId,
        attribute: String,
        reason: String,
    },

    /// The external data source failed (as opposed to having no data)
    #[error("data source lookup for '{key}' failed: {cause}")]
    DataSource { key: String, cause: String },
}

/// Result type for configuration-time operations
pub type Result<T> = std::result::Result<T, ConfigError>;

fn chain(members: &[ResourceId]) -> String {
    let mut parts: Vec<String> = members.iter().map(ToString::to_string).collect();
    if let Some(first) = members.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

fn gated_suffix(gate: &Option<String>) -> String {
    gate.as_ref()
        .map(|g| format!(" (excluded by feature flag '{g}')"))
        .unwrap_or_default()
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_ref()
        .map(|k| format!(" in data key '{k}'"))
        .unwrap_or_default()
}

/// A resource whose query or apply failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}[{name}]: {cause}")]
pub struct ApplyError {
    pub kind: String,
    pub name: String,
    pub cause: String,
}

impl ApplyError {
    pub fn new(id: &ResourceId, cause: impl fmt::Display) -> Self {
        Self {
            kind: id.kind.clone(),
            name: id.name.clone(),
            cause: cause.to_string(),
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.kind, &self.name)
    }
}

/// All delete failures of one managed collection
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("failed to purge {} {kind} member(s): {}", .failures.len(), failure_list(.failures))]
pub struct PartialPurgeError {
    pub kind: String,
    /// (member name, cause) in name order
    pub failures: Vec<(String, String)>,
}

fn failure_list(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, cause)| format!("{name} ({cause})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors captured during a run. The run continues past all of them.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunError {
    #[error("apply failed: {0}")]
    Apply(ApplyError),

    /// Skipped because something it requires did not converge
    #[error("{id} skipped: required {by} did not converge")]
    Blocked { id: ResourceId, by: ResourceId },

    #[error("{0}")]
    PartialPurge(PartialPurgeError),

    /// Notification chain deeper than the configured pass limit
    #[error("{id} not refreshed: notification chain exceeds {passes} passes")]
    RefreshLimit { id: ResourceId, passes: usize },
}

impl RunError {
    /// Identity the error is attached to
    pub fn resource(&self) -> ResourceId {
        match self {
            Self::Apply(e) => e.id(),
            Self::Blocked { id, .. } | Self::RefreshLimit { id, .. } => id.clone(),
            Self::PartialPurge(e) => ResourceId::new("collection", &e.kind),
        }
    }
}
