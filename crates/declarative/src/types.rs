//! Core types for resource convergence

use crate::error::ParseIdError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Desired-state properties of a resource, keyed by property name
pub type Attributes = BTreeMap<String, Value>;

/// Identity of a declared resource: `kind[name]`
///
/// Names are unique per kind. The textual form is the one used for
/// `require`/`notify` references in manifests, e.g. `service[cobblerd]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResourceId {
    pub kind: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseIdError(s.to_string());

        let open = s.find('[').ok_or_else(invalid)?;
        let inner = s[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
        let kind = s[..open].trim();
        let name = inner.trim();

        if kind.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(kind, name))
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The `ensure` state a resource should be converged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
    Running,
    Stopped,
    Directory,
    File,
}

impl Ensure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Directory => "directory",
            Self::File => "file",
        }
    }
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ensure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" | "installed" => Ok(Self::Present),
            "absent" | "purged" => Ok(Self::Absent),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "directory" => Ok(Self::Directory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown ensure value '{other}'")),
        }
    }
}

/// What a resource should look like after convergence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub ensure: Ensure,
    #[serde(default)]
    pub attributes: Attributes,
}

impl DesiredState {
    /// Look up a string attribute
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// What an adapter found on the host
///
/// `ensure == None` means the instance does not exist at all.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObservedState {
    pub ensure: Option<Ensure>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ObservedState {
    /// An instance that does not exist
    pub fn absent() -> Self {
        Self::default()
    }

    /// An existing instance in the given state, without attributes
    pub fn with_ensure(ensure: Ensure) -> Self {
        Self {
            ensure: Some(ensure),
            attributes: Attributes::new(),
        }
    }

    /// Attach an observed attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn exists(&self) -> bool {
        !matches!(self.ensure, None | Some(Ensure::Absent))
    }
}

/// State transition reported by an adapter's `apply`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Nothing needed to be done
    Unchanged,
    Created,
    Updated,
    Removed,
}

impl Transition {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A single property that differs between observed and desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    pub from: Option<Value>,
    pub to: Option<Value>,
}

impl PropertyChange {
    pub fn new(property: impl Into<String>, from: Option<Value>, to: Option<Value>) -> Self {
        Self {
            property: property.into(),
            from,
            to,
        }
    }
}

/// Per-resource outcome of a convergence run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Observed state already matched
    Unchanged,
    /// Desired state was applied
    Changed { transition: Transition },
    /// Re-applied because a notifying resource changed
    Refreshed,
    /// Refresh-only action that was not triggered
    Idle,
    /// Dry run: these changes would be applied
    Pending { changes: Vec<PropertyChange> },
    /// Dry run: a refresh would be triggered
    WouldRefresh,
    /// Query or apply failed
    Failed { cause: String },
    /// Skipped because a required resource did not converge
    Blocked { by: ResourceId },
    /// Never started because the run was cancelled
    Cancelled,
    /// Undeclared collection member was removed
    Purged,
    /// Dry run: undeclared collection member would be removed
    WouldPurge,
    /// Undeclared collection member could not be removed
    PurgeFailed { cause: String },
}

impl Outcome {
    /// Whether the host was changed
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed { .. } | Self::Refreshed | Self::Purged)
    }

    /// Whether a change would happen in a real run
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Pending { .. } | Self::WouldRefresh | Self::WouldPurge
        )
    }

    /// Whether this resource ended in an error or blocked state
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::Blocked { .. } | Self::PurgeFailed { .. }
        )
    }

    /// Whether dependents of this resource must not be applied
    pub fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            Self::Failed { .. } | Self::Blocked { .. } | Self::Cancelled
        )
    }

    /// Whether this outcome notifies the resource's notify targets
    pub fn triggers_refresh(&self) -> bool {
        self.is_change() || matches!(self, Self::Pending { .. } | Self::WouldRefresh)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Changed { transition } => match transition {
                Transition::Created => "created",
                Transition::Updated => "updated",
                Transition::Removed => "removed",
                Transition::Unchanged => "unchanged",
            },
            Self::Refreshed => "refreshed",
            Self::Idle => "idle",
            Self::Pending { .. } => "pending",
            Self::WouldRefresh => "would refresh",
            Self::Failed { .. } => "failed",
            Self::Blocked { .. } => "blocked",
            Self::Cancelled => "cancelled",
            Self::Purged => "purged",
            Self::WouldPurge => "would purge",
            Self::PurgeFailed { .. } => "purge failed",
        }
    }
}

/// Shared flag used to stop a run from scheduling new resources
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for a convergence run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Query only, never apply, refresh or delete
    pub dry_run: bool,
    /// Maximum number of resources applied concurrently within a wave
    pub parallelism: usize,
    /// Deadline for converging one resource, shared by its query and
    /// apply. Purge `list` and `delete` calls get it per call.
    pub timeout: Duration,
    /// Upper bound on notification propagation passes
    pub max_refresh_passes: usize,
    /// Cooperative cancellation
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallelism: 4,
            timeout: Duration::from_secs(300),
            max_refresh_passes: 16,
            cancel: CancelToken::new(),
        }
    }
}
