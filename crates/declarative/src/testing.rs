//! In-memory adapter and data source for tests

use crate::context::{AdapterRegistry, ApplyContext, KindAdapter, Phase, ProgressCallback};
use crate::materialize::{DataSource, Entry};
use crate::types::{Attributes, DesiredState, Ensure, ObservedState, Outcome, ResourceId, Transition};
use anyhow::{Result, bail};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn registry(entries: &[(&str, &Arc<MemoryAdapter>)]) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for (kind, adapter) in entries {
        registry.register_shared(*kind, Arc::clone(adapter) as Arc<dyn KindAdapter>);
    }
    registry
}

/// Progress callback that counts announced and recorded outcomes
#[derive(Default)]
pub struct Tally {
    pub announced: usize,
    pub recorded: usize,
}

impl ProgressCallback for Tally {
    fn on_batch_start(&mut self, _phase: Phase, count: usize) {
        self.announced += count;
    }

    fn on_resource_complete(&mut self, _id: &ResourceId, _outcome: &Outcome) {
        self.recorded += 1;
    }

    fn on_batch_complete(&mut self, _phase: Phase) {}
}

/// Adapter that keeps instances in a map and records every call
#[derive(Default)]
pub struct MemoryAdapter {
    state: Mutex<BTreeMap<String, ObservedState>>,
    applied: Mutex<Vec<(String, bool)>>,
    deleted: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    failing_apply: BTreeSet<String>,
    failing_delete: BTreeSet<String>,
    delay: Option<Duration>,
    purge: bool,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(self, name: &str) -> Self {
        self.set_state(name, ObservedState::with_ensure(Ensure::Present));
        self
    }

    pub fn failing_apply(mut self, name: &str) -> Self {
        self.failing_apply.insert(name.to_string());
        self
    }

    pub fn failing_delete(mut self, name: &str) -> Self {
        self.failing_delete.insert(name.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn purgeable(mut self) -> Self {
        self.purge = true;
        self
    }

    pub fn set_state(&self, name: &str, observed: ObservedState) {
        self.state.lock().unwrap().insert(name.to_string(), observed);
    }

    /// (name, refresh) for every apply call, in call order
    pub fn applied(&self) -> Vec<(String, bool)> {
        self.applied.lock().unwrap().clone()
    }

    /// Successfully deleted members, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Existing instance names
    pub fn members(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.exists())
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
    }
}

impl KindAdapter for MemoryAdapter {
    fn query(&self, name: &str, _ctx: &ApplyContext) -> Result<ObservedState> {
        self.pause();
        Ok(self
            .state
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    fn apply(&self, name: &str, desired: &DesiredState, ctx: &ApplyContext) -> Result<Transition> {
        self.pause();
        self.applied
            .lock()
            .unwrap()
            .push((name.to_string(), ctx.refresh));
        if self.failing_apply.contains(name) {
            bail!("simulated failure applying {name}");
        }

        let mut state = self.state.lock().unwrap();
        let existed = state.get(name).is_some_and(ObservedState::exists);
        if desired.ensure == Ensure::Absent {
            state.remove(name);
            return Ok(if existed {
                Transition::Removed
            } else {
                Transition::Unchanged
            });
        }

        state.insert(
            name.to_string(),
            ObservedState {
                ensure: Some(desired.ensure),
                attributes: desired.attributes.clone(),
            },
        );
        Ok(if existed {
            Transition::Updated
        } else {
            Transition::Created
        })
    }

    fn supports_purge(&self) -> bool {
        self.purge
    }

    fn list(&self, _ctx: &ApplyContext) -> Result<BTreeSet<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.members().into_iter().collect())
    }

    fn delete(&self, name: &str, _ctx: &ApplyContext) -> Result<()> {
        if self.failing_delete.contains(name) {
            bail!("{name} is in use");
        }
        self.state.lock().unwrap().remove(name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Data source backed by a fixed map
#[derive(Default)]
pub struct StaticData {
    data: HashMap<String, Vec<Entry>>,
}

impl StaticData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(mut self, key: &str, entries: Vec<Entry>) -> Self {
        self.data.insert(key.to_string(), entries);
        self
    }
}

impl DataSource for StaticData {
    fn lookup(&self, key: &str) -> Result<Option<Vec<Entry>>> {
        Ok(self.data.get(key).cloned())
    }
}
