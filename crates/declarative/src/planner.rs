//! Execution planner - composes, materializes and validates a manifest

use crate::compose::{FeatureFlags, compose};
use crate::context::{AdapterRegistry, ProgressCallback};
use crate::error::{ConfigError, EdgeKind, Result};
use crate::executor;
use crate::graph::ResourceGraph;
use crate::materialize::{DataSource, materialize};
use crate::resource::{ManagedCollection, Manifest};
use crate::run::RunReport;
use crate::types::{ResourceId, RunOptions};
use std::collections::HashSet;

/// A validated, ready-to-run manifest
///
/// Building a plan performs every configuration-time check. Once a plan
/// exists, executing it never fails as a whole; errors are per resource.
#[derive(Debug)]
pub struct Plan {
    graph: ResourceGraph,
    collections: Vec<ManagedCollection>,
    adapters: AdapterRegistry,
}

impl Plan {
    /// Compose the manifest under `flags`, expand materializations from
    /// `data`, build the graph and check it against the registered adapters
    pub fn build(
        manifest: &Manifest,
        flags: &FeatureFlags,
        data: Option<&dyn DataSource>,
        adapters: &AdapterRegistry,
    ) -> Result<Self> {
        let composition = compose(manifest, flags);
        let mut resources = composition.resources;
        let mut declared: HashSet<ResourceId> = resources.iter().map(|r| r.id.clone()).collect();

        for spec in &composition.materializations {
            for resource in materialize(spec, data)? {
                if !declared.insert(resource.id.clone()) {
                    return Err(ConfigError::DuplicateResource {
                        id: resource.id,
                        key: Some(spec.key.clone()),
                    });
                }
                resources.push(resource);
            }
        }

        // Instances of a gated-out materialization are reported with its gate
        let mut excluded = composition.excluded;
        if let Some(source) = data {
            for (spec, gate) in &composition.gated_materializations {
                if let Ok(Some(entries)) = source.lookup(&spec.key) {
                    for (name, _) in entries {
                        excluded
                            .entry(ResourceId::new(&spec.kind, &name))
                            .or_insert_with(|| gate.clone());
                    }
                }
            }
        }

        let graph = ResourceGraph::build(resources, &excluded)?;

        for resource in graph.resources() {
            if !adapters.contains(resource.kind()) {
                return Err(ConfigError::UnknownKind {
                    kind: resource.kind().to_string(),
                    id: resource.id.clone(),
                });
            }
        }

        let mut kinds = HashSet::new();
        for collection in &composition.collections {
            let id = collection.id();
            if !kinds.insert(collection.kind.as_str()) {
                return Err(ConfigError::DuplicateResource { id, key: None });
            }

            let adapter = adapters
                .get(&collection.kind)
                .ok_or_else(|| ConfigError::UnknownKind {
                    kind: collection.kind.clone(),
                    id: id.clone(),
                })?;
            if collection.purge && !adapter.supports_purge() {
                return Err(ConfigError::UnsupportedPurge {
                    kind: collection.kind.clone(),
                });
            }

            if let Some(missing) = collection.require.iter().find(|r| graph.index_of(r).is_none()) {
                return Err(ConfigError::UnresolvedReference {
                    from: id,
                    to: missing.clone(),
                    edge: EdgeKind::Require,
                    gated_by: excluded.get(missing).map(ToString::to_string),
                });
            }
        }

        Ok(Self {
            graph,
            collections: composition.collections.into_iter().cloned().collect(),
            adapters: adapters.clone(),
        })
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Collections that survived composition, in declaration order
    pub fn collections(&self) -> &[ManagedCollection] {
        &self.collections
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Number of resources in the plan
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty() && self.collections.is_empty()
    }

    /// Run the plan: apply waves, refresh passes, then purges
    pub fn execute(&self, opts: &RunOptions, progress: &mut impl ProgressCallback) -> RunReport {
        executor::execute(self, opts, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Gate;
    use crate::resource::{Materialization, Resource};
    use crate::testing::{MemoryAdapter, StaticData, registry};
    use std::sync::Arc;

    fn adapters() -> AdapterRegistry {
        registry(&[
            ("package", &Arc::new(MemoryAdapter::new())),
            ("service", &Arc::new(MemoryAdapter::new())),
            ("distro", &Arc::new(MemoryAdapter::new().purgeable())),
        ])
    }

    fn id(s: &str) -> ResourceId {
        s.parse().unwrap()
    }

    #[test]
    fn test_unknown_kind() {
        let manifest = Manifest::new().resource(Resource::new("tftp", "default"));
        let err = Plan::build(&manifest, &FeatureFlags::new(), None, &adapters()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKind { kind, .. } if kind == "tftp"));
    }

    #[test]
    fn test_materialized_collides_with_declared() {
        let manifest = Manifest::new()
            .resource(Resource::new("distro", "centos7"))
            .materialize(Materialization::new("cobbler::distros", "distro"));
        let data = StaticData::new().entries(
            "cobbler::distros",
            vec![("centos7".into(), Default::default())],
        );

        let err = Plan::build(&manifest, &FeatureFlags::new(), Some(&data), &adapters()).unwrap_err();
        match err {
            ConfigError::DuplicateResource { id: dup, key } => {
                assert_eq!(dup, id("distro[centos7]"));
                assert_eq!(key.as_deref(), Some("cobbler::distros"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reference_to_gated_materialization_names_gate() {
        let manifest = Manifest::new()
            .materialize(
                Materialization::new("cobbler::distros", "distro").when(Gate::enabled("manage_distros")),
            )
            .resource(Resource::new("package", "syslinux").require(id("distro[centos7]")));
        let data = StaticData::new().entries(
            "cobbler::distros",
            vec![("centos7".into(), Default::default())],
        );

        let err = Plan::build(&manifest, &FeatureFlags::new(), Some(&data), &adapters()).unwrap_err();
        match err {
            ConfigError::UnresolvedReference { to, gated_by, .. } => {
                assert_eq!(to, id("distro[centos7]"));
                assert_eq!(gated_by.as_deref(), Some("manage_distros"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_purge_requires_listing_adapter() {
        let manifest = Manifest::new().collection(ManagedCollection::new("package").purge(true));
        let err = Plan::build(&manifest, &FeatureFlags::new(), None, &adapters()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedPurge { .. }));

        // Without purge the same collection is fine
        let manifest = Manifest::new().collection(ManagedCollection::new("package"));
        assert!(Plan::build(&manifest, &FeatureFlags::new(), None, &adapters()).is_ok());
    }

    #[test]
    fn test_collection_require_must_resolve() {
        let manifest = Manifest::new()
            .resource(Resource::new("service", "cobblerd").when(Gate::enabled("manage_cobbler")))
            .collection(
                ManagedCollection::new("distro")
                    .purge(true)
                    .require(id("service[cobblerd]")),
            );
        let err = Plan::build(&manifest, &FeatureFlags::new(), None, &adapters()).unwrap_err();
        match err {
            ConfigError::UnresolvedReference { from, gated_by, .. } => {
                assert_eq!(from, id("collection[distro]"));
                assert_eq!(gated_by.as_deref(), Some("manage_cobbler"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_gated_collection_is_dropped() {
        let manifest = Manifest::new().collection(
            ManagedCollection::new("distro")
                .purge(true)
                .when(Gate::enabled("manage_distros")),
        );
        let plan = Plan::build(&manifest, &FeatureFlags::new(), None, &adapters()).unwrap();
        assert!(plan.collections().is_empty());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_duplicate_collection_kind() {
        let manifest = Manifest::new()
            .collection(ManagedCollection::new("distro"))
            .collection(ManagedCollection::new("distro").purge(true));
        let err = Plan::build(&manifest, &FeatureFlags::new(), None, &adapters()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateResource { .. }));
    }
}
