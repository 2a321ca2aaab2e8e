//! Resource declarations
//!
//! A manifest is a set of declarations owned by the caller:
//! individual [`Resource`]s, [`ManagedCollection`]s whose membership the
//! run may reconcile, and [`Materialization`]s that expand external data
//! into many resources of one kind. The core only reads them.

use crate::compose::Gate;
use crate::types::{Attributes, DesiredState, Ensure, ResourceId};
use serde_json::Value;

/// A single declared resource
///
/// # Example
///
/// ```
/// use declarative::{Ensure, Resource, ResourceId};
///
/// let svc = Resource::new("service", "cobblerd")
///     .ensure(Ensure::Running)
///     .require(ResourceId::new("package", "cobbler"));
///
/// let sync = Resource::new("exec", "cobbler-sync").refresh_only();
/// # let _ = (svc, sync);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub ensure: Ensure,
    pub attributes: Attributes,
    /// Resources that must converge before this one
    pub require: Vec<ResourceId>,
    /// Resources refreshed when this one changes
    pub notify: Vec<ResourceId>,
    /// Only executes when refreshed by a notification
    pub refresh_only: bool,
    /// Feature flag gating inclusion
    pub gate: Option<Gate>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(kind, name),
            ensure: Ensure::default(),
            attributes: Attributes::new(),
            require: Vec::new(),
            notify: Vec::new(),
            refresh_only: false,
            gate: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn ensure(mut self, ensure: Ensure) -> Self {
        self.ensure = ensure;
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn require(mut self, id: ResourceId) -> Self {
        if !self.require.contains(&id) {
            self.require.push(id);
        }
        self
    }

    pub fn notify(mut self, id: ResourceId) -> Self {
        if !self.notify.contains(&id) {
            self.notify.push(id);
        }
        self
    }

    /// Mark as a scheduled action: a no-op unless notified
    pub fn refresh_only(mut self) -> Self {
        self.refresh_only = true;
        self
    }

    pub fn when(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn desired_state(&self) -> DesiredState {
        DesiredState {
            ensure: self.ensure,
            attributes: self.attributes.clone(),
        }
    }
}

/// A kind whose full membership the run is allowed to reconcile
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedCollection {
    pub kind: String,
    /// Remove members present on the host but not declared
    pub purge: bool,
    /// Resources that must have converged before purging (e.g. the
    /// service that owns the registry)
    pub require: Vec<ResourceId>,
    pub gate: Option<Gate>,
}

impl ManagedCollection {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            purge: false,
            require: Vec::new(),
            gate: None,
        }
    }

    pub fn purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    pub fn require(mut self, id: ResourceId) -> Self {
        if !self.require.contains(&id) {
            self.require.push(id);
        }
        self
    }

    pub fn when(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Identity used when reporting on the collection itself
    pub fn id(&self) -> ResourceId {
        ResourceId::new("collection", &self.kind)
    }
}

/// Instruction to expand a data-source key into resources of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct Materialization {
    /// Data source key, e.g. `cobbler::distros`
    pub key: String,
    pub kind: String,
    /// Default ensure, overridable per entry with an `ensure` attribute
    pub ensure: Ensure,
    /// Default attributes, overridden by entry attributes
    pub defaults: Attributes,
    pub require: Vec<ResourceId>,
    pub notify: Vec<ResourceId>,
    pub gate: Option<Gate>,
}

impl Materialization {
    pub fn new(key: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            ensure: Ensure::default(),
            defaults: Attributes::new(),
            require: Vec::new(),
            notify: Vec::new(),
            gate: None,
        }
    }

    pub fn ensure(mut self, ensure: Ensure) -> Self {
        self.ensure = ensure;
        self
    }

    pub fn default_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn require(mut self, id: ResourceId) -> Self {
        if !self.require.contains(&id) {
            self.require.push(id);
        }
        self
    }

    pub fn notify(mut self, id: ResourceId) -> Self {
        if !self.notify.contains(&id) {
            self.notify.push(id);
        }
        self
    }

    pub fn when(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// Everything a run converges, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub resources: Vec<Resource>,
    pub collections: Vec<ManagedCollection>,
    pub materializations: Vec<Materialization>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn collection(mut self, collection: ManagedCollection) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn materialize(mut self, materialization: Materialization) -> Self {
        self.materializations.push(materialization);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_deduplicated() {
        let dep = ResourceId::new("package", "cobbler");
        let r = Resource::new("service", "cobblerd")
            .require(dep.clone())
            .require(dep.clone());
        assert_eq!(r.require, vec![dep]);
    }

    #[test]
    fn test_desired_state_carries_attributes() {
        let r = Resource::new("file", "/etc/cobbler/settings")
            .ensure(Ensure::File)
            .attr("mode", "0644");
        let desired = r.desired_state();
        assert_eq!(desired.ensure, Ensure::File);
        assert_eq!(desired.attr_str("mode"), Some("0644"));
    }
}
