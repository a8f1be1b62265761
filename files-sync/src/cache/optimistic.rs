//! Two-phase speculative patches: a patch is applied right away and tagged
//! unconfirmed, then either confirmed by the server or rolled back.

use std::collections::BTreeMap;

use files_core::Node;

use super::store::{FieldKey, FieldValue, NormalizedCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OptimisticId(u64);

/// Prior values of everything one speculative patch touched.
#[derive(Debug, Default)]
struct Layer {
    nodes: Vec<(String, Option<Node>)>,
    fields: Vec<(FieldKey, Option<FieldValue>)>,
}

impl Layer {
    fn capture(before: &NormalizedCache, after: &NormalizedCache) -> Self {
        let mut layer = Layer::default();
        let node_ids = before.nodes.keys().chain(after.nodes.keys());
        for id in node_ids {
            let old = before.nodes.get(id);
            if old != after.nodes.get(id) && !layer.nodes.iter().any(|(seen, _)| seen == id) {
                layer.nodes.push((id.clone(), old.cloned()));
            }
        }
        let keys = before.fields.keys().chain(after.fields.keys());
        for key in keys {
            let old = before.fields.get(key);
            if old != after.fields.get(key) && !layer.fields.iter().any(|(seen, _)| seen == key) {
                layer.fields.push((key.clone(), old.cloned()));
            }
        }
        layer
    }

    fn restore(self, cache: &mut NormalizedCache) {
        for (id, node) in self.nodes {
            match node {
                Some(node) => {
                    cache.nodes.insert(id, node);
                }
                None => {
                    cache.nodes.remove(&id);
                }
            }
        }
        for (key, value) in self.fields {
            match value {
                Some(value) => {
                    cache.fields.insert(key, value);
                }
                None => {
                    cache.fields.remove(&key);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct OptimisticLayers {
    next_id: u64,
    pending: BTreeMap<OptimisticId, Layer>,
}

impl OptimisticLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase one: applies `patch` and records what it changed.
    pub fn apply(
        &mut self,
        cache: &mut NormalizedCache,
        patch: impl FnOnce(&mut NormalizedCache),
    ) -> OptimisticId {
        let before = cache.clone();
        patch(cache);
        self.next_id += 1;
        let id = OptimisticId(self.next_id);
        self.pending.insert(id, Layer::capture(&before, cache));
        id
    }

    pub fn is_pending(&self, id: OptimisticId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Phase two, success: the speculative values become plain cache data.
    pub fn confirm(&mut self, id: OptimisticId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Phase two, failure: every entry the patch touched goes back to its
    /// value from before the patch.
    pub fn rollback(&mut self, cache: &mut NormalizedCache, id: OptimisticId) -> bool {
        match self.pending.remove(&id) {
            Some(layer) => {
                layer.restore(cache);
                true
            }
            None => false,
        }
    }
}
