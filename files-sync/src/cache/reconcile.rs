//! Cache-patch primitives shared by every mutation.

use std::collections::HashSet;

use files_core::Node;
use tracing::debug;

use super::sort::add_node_in_sorted_list;
use super::store::{FieldKey, NormalizedCache};

/// What happened to one cached list during a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    Pruned { removed: usize },
    Evicted,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub lists: Vec<(FieldKey, ListOutcome)>,
}

impl ReconcileReport {
    pub fn evicted(&self) -> impl Iterator<Item = &FieldKey> {
        self.lists
            .iter()
            .filter(|(_, outcome)| *outcome == ListOutcome::Evicted)
            .map(|(key, _)| key)
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// Removes `ids` from one cached list. A list left empty while the server
/// still has pages behind it is evicted as a whole so that the next read
/// refetches it.
pub fn prune_list(
    cache: &mut NormalizedCache,
    key: &FieldKey,
    ids: &HashSet<&str>,
) -> Option<ListOutcome> {
    let list = cache.list_mut(key)?;
    let removed = list.remove_all(ids);
    if removed == 0 {
        return None;
    }
    if list.is_empty() && list.has_more() {
        cache.evict_field(key);
        debug!(?key, "evicted emptied list with more pages");
        return Some(ListOutcome::Evicted);
    }
    Some(ListOutcome::Pruned { removed })
}

/// Membership rule of a cached list: does `node` still belong in `key`?
/// A node that is no longer cached belongs nowhere.
pub fn still_belongs(key: &FieldKey, node: Option<&Node>, me: &str) -> bool {
    let Some(node) = node else {
        return false;
    };
    match key {
        FieldKey::Children { folder_id, .. } => {
            node.parent_id.as_deref() == Some(folder_id.as_str()) && !node.is_trashed()
        }
        FieldKey::FindNodes { filter, .. } => filter.matches(node, me),
        FieldKey::Path { .. } | FieldKey::Versions { .. } => true,
    }
}

/// The filtered-list reconciler: for every cached list accepted by `select`,
/// drops the references among `ids` for which `keep` says no.
pub fn reconcile_lists<S, K>(
    cache: &mut NormalizedCache,
    ids: &[String],
    select: S,
    keep: K,
) -> ReconcileReport
where
    S: Fn(&FieldKey) -> bool,
    K: Fn(&FieldKey, Option<&Node>) -> bool,
{
    let mut report = ReconcileReport::default();
    for key in cache.list_keys_where(&select) {
        let Some(list) = cache.list(&key) else {
            continue;
        };
        let drop: HashSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| list.contains(id))
            .filter(|id| !keep(&key, cache.node(id)))
            .collect();
        if drop.is_empty() {
            continue;
        }
        if let Some(outcome) = prune_list(cache, &key, &drop) {
            report.lists.push((key, outcome));
        }
    }
    report
}

/// Runs [`reconcile_lists`] over every list with the default membership rule.
pub fn reconcile_membership(
    cache: &mut NormalizedCache,
    ids: &[String],
    me: &str,
) -> ReconcileReport {
    reconcile_lists(cache, ids, |_| true, |key, node| still_belongs(key, node, me))
}

/// Places `node_id` in every cached children list of `folder_id` at the
/// position the list's sort asks for. A node already present is moved.
/// Returns false when no children list of the folder is cached.
pub fn add_node_to_folder(cache: &mut NormalizedCache, folder_id: &str, node_id: &str) -> bool {
    let keys = cache.children_keys(folder_id);
    if keys.is_empty() {
        return false;
    }
    for key in keys {
        insert_sorted(cache, &key, node_id);
    }
    true
}

/// Sorted insertion of one reference into one cached list.
pub fn insert_sorted(cache: &mut NormalizedCache, key: &FieldKey, node_id: &str) -> bool {
    let (Some(sort), Some(node)) = (key.sort(), cache.node(node_id)) else {
        return false;
    };
    let Some(list) = cache.list(key) else {
        return false;
    };
    let mut list = list.clone();
    let single: HashSet<&str> = HashSet::from([node_id]);
    list.remove_all(&single);

    let ordered = cache.resolve_ordered(&list);
    let position = add_node_in_sorted_list(ordered.iter().copied(), node, sort)
        .and_then(|index| ordered.get(index))
        .and_then(|follower| list.ordered.iter().position(|id| *id == follower.id));

    match position {
        Some(index) => list.ordered.insert(index, node_id.to_string()),
        // A complete list has no unknown tail: the end is the true position.
        None if !list.has_more() && list.unordered.is_empty() => {
            list.ordered.push(node_id.to_string())
        }
        None => list.unordered.push(node_id.to_string()),
    }

    if let Some(slot) = cache.list_mut(key) {
        *slot = list;
    }
    true
}

pub fn remove_nodes_from_folder(
    cache: &mut NormalizedCache,
    folder_id: &str,
    ids: &[String],
) -> ReconcileReport {
    let set: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut report = ReconcileReport::default();
    for key in cache.children_keys(folder_id) {
        if let Some(outcome) = prune_list(cache, &key, &set) {
            report.lists.push((key, outcome));
        }
    }
    report
}

/// Removes `ids` from every cached list, whatever its filter.
pub fn remove_nodes_everywhere(cache: &mut NormalizedCache, ids: &[String]) -> ReconcileReport {
    let set: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut report = ReconcileReport::default();
    for key in cache.list_keys_where(|_| true) {
        if let Some(outcome) = prune_list(cache, &key, &set) {
            report.lists.push((key, outcome));
        }
    }
    report
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
