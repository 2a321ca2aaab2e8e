//! Adapter and callback traits
//!
//! These traits let the core converge resources without depending on
//! any concrete package manager, service manager, file writer or UI.

use crate::diff::property_changes;
use crate::types::{DesiredState, ObservedState, Outcome, PropertyChange, ResourceId, Transition};
use anyhow::{Result, anyhow, bail};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Context passed to every adapter call
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Set when the resource is re-applied because a notifying resource
    /// changed. Adapters should reload/restart/execute even if in sync.
    pub refresh: bool,
    /// Deadline for this call; the core abandons the call after it
    pub timeout: Duration,
}

impl ApplyContext {
    pub fn new(dry_run: bool, timeout: Duration) -> Self {
        Self {
            dry_run,
            refresh: false,
            timeout,
        }
    }

    pub fn refreshing(self) -> Self {
        Self {
            refresh: true,
            ..self
        }
    }
}

/// Adapter for one resource kind (package, service, file, ...)
///
/// Implementations own all knowledge of the host. The core only asks for
/// the observed state, compares it, and asks for a transition.
pub trait KindAdapter: Send + Sync {
    /// Observe the current state of an instance
    fn query(&self, name: &str, ctx: &ApplyContext) -> Result<ObservedState>;

    /// Properties that must change to reach the desired state
    ///
    /// Empty means in sync. The default compares `ensure` and every desired
    /// attribute; adapters override this when the comparison needs
    /// kind-specific work (e.g. rendering a template and diffing content).
    fn changes(
        &self,
        _name: &str,
        desired: &DesiredState,
        observed: &ObservedState,
    ) -> Result<Vec<PropertyChange>> {
        Ok(property_changes(desired, observed))
    }

    /// Whether the observed state already satisfies the desired state
    fn in_sync(&self, name: &str, desired: &DesiredState, observed: &ObservedState) -> Result<bool> {
        Ok(self.changes(name, desired, observed)?.is_empty())
    }

    /// Make the instance match the desired state
    fn apply(&self, name: &str, desired: &DesiredState, ctx: &ApplyContext) -> Result<Transition>;

    /// Whether `list` and `delete` are implemented
    fn supports_purge(&self) -> bool {
        false
    }

    /// Enumerate every instance of this kind present on the host
    fn list(&self, _ctx: &ApplyContext) -> Result<BTreeSet<String>> {
        bail!("listing members is not supported by this adapter")
    }

    /// Remove an instance that is not declared
    fn delete(&self, _name: &str, _ctx: &ApplyContext) -> Result<()> {
        bail!("deleting members is not supported by this adapter")
    }
}

/// Adapters keyed by resource kind
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn KindAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, adapter: impl KindAdapter + 'static) -> &mut Self {
        self.register_shared(kind, Arc::new(adapter))
    }

    /// Register an adapter the caller keeps a handle to
    pub fn register_shared(&mut self, kind: impl Into<String>, adapter: Arc<dyn KindAdapter>) -> &mut Self {
        self.adapters.insert(kind.into(), adapter);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn KindAdapter>> {
        self.adapters.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.adapters.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Phases of a convergence run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Apply,
    Refresh,
    Purge,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("apply"),
            Self::Refresh => f.write_str("refresh"),
            Self::Purge => f.write_str("purge"),
        }
    }
}

/// Progress callback for execution operations
///
/// Callbacks are invoked from the scheduling thread, after each wave
/// barrier, never from worker threads.
pub trait ProgressCallback: Send {
    /// Called before a batch (wave, refresh pass, collection purge)
    fn on_batch_start(&mut self, phase: Phase, count: usize);

    /// Called once per recorded outcome
    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &Outcome);

    /// Called when a batch completes
    fn on_batch_complete(&mut self, phase: Phase);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _phase: Phase, _count: usize) {}
    fn on_resource_complete(&mut self, _id: &ResourceId, _outcome: &Outcome) {}
    fn on_batch_complete(&mut self, _phase: Phase) {}
}

/// Run an adapter call with a deadline
///
/// The call runs on its own thread. If the deadline passes first, the
/// result is abandoned and a timeout error returned; the thread is left to
/// finish on its own so the host is never interrupted mid-transition.
pub(crate) fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("converge-call".to_string())
        .spawn(move || {
            // The receiver is gone if the call already timed out
            let _ = tx.send(call());
        })
        .map_err(|e| anyhow!("failed to spawn adapter call: {e}"))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => bail!("timed out after {}s", timeout.as_secs_f64()),
        Err(RecvTimeoutError::Disconnected) => bail!("adapter call panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_timeout_returns_result() {
        let value = with_timeout(Duration::from_secs(5), || Ok(42)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_with_timeout_propagates_error() {
        let err = with_timeout::<(), _>(Duration::from_secs(5), || bail!("boom")).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_with_timeout_expires() {
        let err = with_timeout(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_with_timeout_reports_panic() {
        let err = with_timeout::<(), _>(Duration::from_secs(5), || panic!("adapter bug")).unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_registry_kinds_sorted() {
        struct Nothing;
        impl KindAdapter for Nothing {
            fn query(&self, _: &str, _: &ApplyContext) -> Result<ObservedState> {
                Ok(ObservedState::absent())
            }
            fn apply(&self, _: &str, _: &DesiredState, _: &ApplyContext) -> Result<Transition> {
                Ok(Transition::Unchanged)
            }
        }

        let mut registry = AdapterRegistry::new();
        registry.register("service", Nothing).register("package", Nothing);
        assert_eq!(registry.kinds(), vec!["package", "service"]);
        assert!(!registry.get("package").unwrap().supports_purge());
    }
}
