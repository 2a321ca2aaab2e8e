//! # Declarative
//!
//! Idempotent resource convergence.
//!
//! This crate takes a manifest of declared resources, works out the order
//! they must be converged in, and drives kind-specific adapters until the
//! host matches the declaration. Running the same manifest twice against an
//! unchanged host makes no changes the second time.
//!
//! ## Core Concepts
//!
//! - **Resource**: A declared `kind[name]` with an `ensure` state, attributes
//!   and `require`/`notify` edges
//! - **Gate**: Feature-flag condition that includes or drops a declaration
//! - **Materialization**: Expands external data into many resources of a kind
//! - **ManagedCollection**: A kind whose undeclared members may be purged
//! - **Plan**: A composed, validated resource graph, ready to run
//! - **RunReport**: Ordered per-resource outcomes plus captured errors
//!
//! ## Phases of a run
//!
//! 1. Apply waves: resources with no require path between them are applied
//!    concurrently; each wave is a barrier.
//! 2. Refresh passes: notify targets of changed resources are re-applied,
//!    level by level. Refresh-only resources run here and nowhere else.
//! 3. Purge: undeclared members of purging collections are deleted.
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     AdapterRegistry, Ensure, FeatureFlags, Manifest, Resource, ResourceId,
//!     RunOptions, converge,
//! };
//!
//! let manifest = Manifest::new()
//!     .resource(Resource::new("package", "cobbler"))
//!     .resource(
//!         Resource::new("service", "cobblerd")
//!             .ensure(Ensure::Running)
//!             .require(ResourceId::new("package", "cobbler")),
//!     );
//!
//! let mut adapters = AdapterRegistry::new();
//! adapters
//!     .register("package", PackageAdapter::default())
//!     .register("service", ServiceAdapter::default());
//!
//! let report = converge(&manifest, &FeatureFlags::new(), None, &adapters, &RunOptions::default())?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! The crate never touches the host itself:
//!
//! - [`KindAdapter`]: Observes and changes instances of one resource kind
//! - [`DataSource`]: Hierarchical key/value data for materializations
//! - [`ProgressCallback`]: Receives progress updates

pub mod compose;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod materialize;
mod notify;
pub mod planner;
mod purge;
pub mod resource;
pub mod run;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use compose::{FeatureFlags, FlagValue, Gate, compose};
pub use context::{AdapterRegistry, ApplyContext, KindAdapter, NoProgress, Phase, ProgressCallback};
pub use diff::{DiffSummary, group_by_kind, pending_transition, property_changes};
pub use error::{ApplyError, ConfigError, EdgeKind, PartialPurgeError, RunError};
pub use executor::{converge, execute};
pub use graph::ResourceGraph;
pub use materialize::{DataSource, Entry, materialize};
pub use planner::Plan;
pub use resource::{ManagedCollection, Manifest, Materialization, Resource};
pub use run::{LogEntry, RunReport};
pub use types::{
    Attributes, CancelToken, DesiredState, Ensure, ObservedState, Outcome, PropertyChange,
    ResourceId, RunOptions, Transition,
};
