//! Dependency graph for resource evaluation order
//!
//! The graph is built once per run from the composed declarations.
//! Require edges determine the evaluation order (Kahn's algorithm with
//! declaration order as tie-break, so unchanged input always yields the
//! same order) and the apply waves. Notify edges are checked for cycles
//! separately and layered into notification levels, which bound the
//! refresh passes. Refreshes themselves are scheduled over both edge kinds
//! so a refreshed resource still runs after everything it requires.

use crate::compose::Gate;
use crate::error::{ConfigError, EdgeKind, Result};
use crate::resource::Resource;
use crate::types::ResourceId;
use std::collections::{BTreeSet, HashMap};

/// Resources with resolved edges and a valid evaluation order
#[derive(Debug)]
pub struct ResourceGraph {
    nodes: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    /// requires[i] = nodes that i requires
    requires: Vec<Vec<usize>>,
    notifies: Vec<Vec<usize>>,
    notified_by: Vec<Vec<usize>>,
    order: Vec<usize>,
    waves: Vec<Vec<usize>>,
    notify_levels: Vec<usize>,
    refresh_levels: Vec<usize>,
}

impl ResourceGraph {
    /// Build the graph
    ///
    /// `excluded` holds declarations dropped by feature flags; a reference
    /// to one of them is reported with the gate that excluded it.
    pub fn build(resources: Vec<Resource>, excluded: &HashMap<ResourceId, Gate>) -> Result<Self> {
        let mut index = HashMap::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            if index.insert(resource.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateResource {
                    id: resource.id.clone(),
                    key: None,
                });
            }
        }

        let resolve = |from: &Resource, targets: &[ResourceId], edge: EdgeKind| {
            targets
                .iter()
                .map(|to| {
                    index
                        .get(to)
                        .copied()
                        .ok_or_else(|| ConfigError::UnresolvedReference {
                            from: from.id.clone(),
                            to: to.clone(),
                            edge,
                            gated_by: excluded.get(to).map(ToString::to_string),
                        })
                })
                .collect::<Result<Vec<usize>>>()
        };

        let mut requires = Vec::with_capacity(resources.len());
        let mut notifies = Vec::with_capacity(resources.len());
        for resource in &resources {
            requires.push(dedup(resolve(resource, &resource.require, EdgeKind::Require)?));
            notifies.push(dedup(resolve(resource, &resource.notify, EdgeKind::Notify)?));
        }

        let mut notified_by = vec![Vec::new(); resources.len()];
        for (source, targets) in notifies.iter().enumerate() {
            for &target in targets {
                notified_by[target].push(source);
            }
        }

        let order = topological_order(&requires).map_err(|cycle| ConfigError::Cycle {
            members: cycle.iter().map(|&i| resources[i].id.clone()).collect(),
        })?;

        let notify_order =
            topological_order(&notified_by).map_err(|cycle| ConfigError::NotifyCycle {
                members: cycle
                    .iter()
                    .rev()
                    .map(|&i| resources[i].id.clone())
                    .collect(),
            })?;

        let levels = depths(&order, &requires);
        let wave_count = levels.iter().max().map_or(0, |max| max + 1);
        let mut waves = vec![Vec::new(); wave_count];
        for &i in &order {
            waves[levels[i]].push(i);
        }

        let notify_levels = depths(&notify_order, &notified_by);

        // A target must follow its sources and its requirements
        let refresh_prereqs: Vec<Vec<usize>> = requires
            .iter()
            .zip(&notified_by)
            .map(|(req, src)| dedup(req.iter().chain(src).copied().collect()))
            .collect();
        let refresh_order =
            topological_order(&refresh_prereqs).map_err(|cycle| ConfigError::NotifyCycle {
                members: cycle
                    .iter()
                    .rev()
                    .map(|&i| resources[i].id.clone())
                    .collect(),
            })?;
        let refresh_levels = depths(&refresh_order, &refresh_prereqs);

        log::debug!(
            "Built graph: {} resources, {} waves",
            resources.len(),
            waves.len()
        );

        Ok(Self {
            nodes: resources,
            index,
            requires,
            notifies,
            notified_by,
            order,
            waves,
            notify_levels,
            refresh_levels,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn resource(&self, node: usize) -> &Resource {
        &self.nodes[node]
    }

    pub fn resources(&self) -> &[Resource] {
        &self.nodes
    }

    pub fn index_of(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Node indices in evaluation order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Resource ids in evaluation order
    pub fn ordered_ids(&self) -> Vec<&ResourceId> {
        self.order.iter().map(|&i| &self.nodes[i].id).collect()
    }

    /// Groups of nodes with no require path between members of a group.
    /// Every node's predecessors are in earlier waves.
    pub fn waves(&self) -> &[Vec<usize>] {
        &self.waves
    }

    pub fn requires(&self, node: usize) -> &[usize] {
        &self.requires[node]
    }

    pub fn notifies(&self, node: usize) -> &[usize] {
        &self.notifies[node]
    }

    pub fn notified_by(&self, node: usize) -> &[usize] {
        &self.notified_by[node]
    }

    /// Length of the longest notify chain ending at this node
    pub fn notify_level(&self, node: usize) -> usize {
        self.notify_levels[node]
    }

    /// Longest path ending at this node over require and notify edges
    /// together. Nodes on the same refresh level have no path between them.
    pub fn refresh_level(&self, node: usize) -> usize {
        self.refresh_levels[node]
    }

    pub fn refresh_depth(&self) -> usize {
        self.refresh_levels.iter().max().copied().unwrap_or(0)
    }

    /// Nodes of a given kind, in evaluation order
    pub fn nodes_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.order
            .iter()
            .copied()
            .filter(move |&i| self.nodes[i].kind() == kind)
    }
}

fn dedup(mut edges: Vec<usize>) -> Vec<usize> {
    let mut seen = BTreeSet::new();
    edges.retain(|e| seen.insert(*e));
    edges
}

/// Kahn's algorithm over `prereqs[i]` = nodes that must come before i.
///
/// Ready nodes are taken lowest index first. On failure returns one cycle,
/// listed so that each member has the next one as a prerequisite.
fn topological_order(prereqs: &[Vec<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = prereqs.len();
    let mut pending: Vec<usize> = prereqs.iter().map(Vec::len).collect();
    let mut successors = vec![Vec::new(); n];
    for (node, before) in prereqs.iter().enumerate() {
        for &p in before {
            successors[p].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &successors[node] {
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(find_cycle(prereqs, &pending))
    }
}

/// Every node left with pending prerequisites has at least one unfinished
/// prerequisite, so following them from any such node must revisit a node.
fn find_cycle(prereqs: &[Vec<usize>], pending: &[usize]) -> Vec<usize> {
    let stuck = |i: usize| pending[i] > 0;
    let Some(start) = (0..prereqs.len()).find(|&i| stuck(i)) else {
        return Vec::new();
    };

    let mut path = Vec::new();
    let mut position = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&at) = position.get(&current) {
            return path.split_off(at);
        }
        position.insert(current, path.len());
        path.push(current);

        match prereqs[current].iter().copied().find(|&p| stuck(p)) {
            Some(next) => current = next,
            None => return path,
        }
    }
}

/// Longest-path depth of each node along prerequisite edges
fn depths(order: &[usize], prereqs: &[Vec<usize>]) -> Vec<usize> {
    let mut depth = vec![0; prereqs.len()];
    for &node in order {
        depth[node] = prereqs[node]
            .iter()
            .map(|&p| depth[p] + 1)
            .max()
            .unwrap_or(0);
    }
    depth
}
