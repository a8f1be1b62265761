//! Per-mutation cache reconciliation. Each function runs only after the
//! backend confirmed the mutation, and silently does nothing for data that is
//! not cached.

use std::collections::{BTreeMap, HashSet};

use files_core::{Node, NodeFilter, Share, TRASH_ROOT};
use tracing::debug;

use super::reconcile::{
    ReconcileReport, add_node_to_folder, prune_list, reconcile_lists, reconcile_membership,
    remove_nodes_everywhere, remove_nodes_from_folder, still_belongs,
};
use super::store::{FieldKey, NormalizedCache};

/// The view the mutation was triggered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
    /// Id of the signed-in user.
    pub me: String,
    pub in_search_view: bool,
}

impl ViewContext {
    pub fn new(me: impl Into<String>) -> Self {
        Self {
            me: me.into(),
            in_search_view: false,
        }
    }
}

/// A node created by the backend (folder creation, completed upload, copy).
pub fn on_create(cache: &mut NormalizedCache, node: &Node) -> bool {
    cache.write_node(node.clone());
    match node.parent_id.as_deref() {
        Some(parent_id) => add_node_to_folder(cache, parent_id, &node.id),
        None => false,
    }
}

pub fn on_copy(cache: &mut NormalizedCache, copies: &[Node]) {
    for node in copies {
        on_create(cache, node);
    }
}

pub fn on_delete(cache: &mut NormalizedCache, ids: &[String]) -> ReconcileReport {
    for id in ids {
        cache.evict_node(id);
        cache.evict_field(&FieldKey::Path {
            node_id: id.clone(),
        });
        cache.evict_field(&FieldKey::Versions {
            node_id: id.clone(),
        });
    }
    let report = remove_nodes_everywhere(cache, ids);
    let collected = cache.gc();
    if !collected.is_empty() {
        debug!(count = collected.len(), "collected orphaned cache entries");
    }
    report
}

pub fn on_trash(cache: &mut NormalizedCache, ids: &[String], ctx: &ViewContext) -> ReconcileReport {
    for id in ids {
        cache.modify_node(id, |node| node.root_id = Some(TRASH_ROOT.to_string()));
    }
    let report = reconcile_membership(cache, ids, &ctx.me);
    // The trash list would now contain these nodes at an unknown position.
    cache.evict_fields_where(
        |key| matches!(key, FieldKey::FindNodes { filter, .. } if filter.is_trash()),
    );
    report
}

pub fn on_restore(
    cache: &mut NormalizedCache,
    restored: &[Node],
    ctx: &ViewContext,
) -> ReconcileReport {
    let ids: Vec<String> = restored.iter().map(|n| n.id.clone()).collect();
    for node in restored {
        cache.write_node(node.clone());
    }
    let report = reconcile_membership(cache, &ids, &ctx.me);
    for node in restored {
        if let Some(parent_id) = node.parent_id.as_deref() {
            add_node_to_folder(cache, parent_id, &node.id);
        }
    }
    report
}

/// `moved` holds the nodes as the backend returned them, already carrying
/// their new parent.
pub fn on_move(
    cache: &mut NormalizedCache,
    moved: &[Node],
    destination_id: &str,
) -> ReconcileReport {
    let mut by_previous_parent: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for node in moved {
        cache.evict_field(&FieldKey::Path {
            node_id: node.id.clone(),
        });
        if let Some(previous) = cache.node(&node.id).and_then(|n| n.parent_id.clone()) {
            if previous != destination_id {
                by_previous_parent
                    .entry(previous)
                    .or_default()
                    .push(node.id.clone());
            }
        }
    }

    let mut report = ReconcileReport::default();
    for (parent_id, ids) in &by_previous_parent {
        report
            .lists
            .extend(remove_nodes_from_folder(cache, parent_id, ids).lists);
    }
    for node in moved {
        cache.write_node(node.clone());
    }
    // Position inside the destination is unknown without a fresh fetch.
    let evicted = cache.evict_fields_where(
        |key| matches!(key, FieldKey::Children { folder_id, .. } if folder_id == destination_id),
    );
    debug!(destination_id, evicted, "evicted destination children");
    report
}

pub fn on_flag(
    cache: &mut NormalizedCache,
    ids: &[String],
    flag: bool,
    ctx: &ViewContext,
) -> ReconcileReport {
    for id in ids {
        cache.modify_node(id, |node| node.flagged = flag);
    }
    if flag {
        return ReconcileReport::default();
    }
    reconcile_lists(
        cache,
        ids,
        |key| matches!(key, FieldKey::FindNodes { filter, .. } if filter.flagged == Some(true)),
        |key, node| still_belongs(key, node, &ctx.me),
    )
}

pub fn on_rename(cache: &mut NormalizedCache, node: &Node) -> bool {
    cache.write_node(node.clone());
    match node.parent_id.as_deref() {
        Some(parent_id) => add_node_to_folder(cache, parent_id, &node.id),
        None => false,
    }
}

pub fn on_share_created(cache: &mut NormalizedCache, node_id: &str, share: &Share) -> bool {
    cache.modify_node(node_id, |node| {
        let shares = node.shares.get_or_insert_with(Vec::new);
        shares.retain(|s| s.share_target.id != share.share_target.id);
        shares.push(share.clone());
    })
}

pub fn on_share_updated(cache: &mut NormalizedCache, node_id: &str, share: &Share) -> bool {
    on_share_created(cache, node_id, share)
}

pub fn on_share_deleted(
    cache: &mut NormalizedCache,
    node_id: &str,
    share_target_id: &str,
    ctx: &ViewContext,
) -> ReconcileReport {
    let mut emptied = false;
    let found = cache.modify_node(node_id, |node| {
        if let Some(shares) = node.shares.as_mut() {
            shares.retain(|s| s.share_target.id != share_target_id);
            emptied = shares.is_empty();
        }
    });
    if !found {
        return ReconcileReport::default();
    }

    let ids = vec![node_id.to_string()];
    let single: HashSet<&str> = HashSet::from([node_id]);
    let mut report = ReconcileReport::default();
    if emptied && !ctx.in_search_view {
        for key in cache.list_keys_where(is_shared_by_me) {
            if let Some(outcome) = prune_list(cache, &key, &single) {
                report.lists.push((key, outcome));
            }
        }
    }
    if share_target_id == ctx.me {
        for key in cache.list_keys_where(is_shared_with_me) {
            if let Some(outcome) = prune_list(cache, &key, &single) {
                report.lists.push((key, outcome));
            }
        }
        let parent = cache.node(node_id).and_then(|n| n.parent_id.clone());
        if let Some(parent_id) = parent {
            report
                .lists
                .extend(remove_nodes_from_folder(cache, &parent_id, &ids).lists);
        }
    }
    report
}

pub fn on_versions_deleted(cache: &mut NormalizedCache, node_id: &str, deleted: &[u32]) -> bool {
    match cache.versions_mut(node_id) {
        Some(versions) => {
            versions.retain(|v| !deleted.contains(&v.version));
            true
        }
        None => false,
    }
}

pub fn on_versions_kept(
    cache: &mut NormalizedCache,
    node_id: &str,
    kept: &[u32],
    keep_forever: bool,
) -> bool {
    match cache.versions_mut(node_id) {
        Some(versions) => {
            for version in versions.iter_mut().filter(|v| kept.contains(&v.version)) {
                version.keep_forever = keep_forever;
            }
            true
        }
        None => false,
    }
}

fn is_shared_by_me(key: &FieldKey) -> bool {
    matches!(key, FieldKey::FindNodes { filter, .. } if is_filter(filter, |f| f.shared_by_me))
}

fn is_shared_with_me(key: &FieldKey) -> bool {
    matches!(key, FieldKey::FindNodes { filter, .. } if is_filter(filter, |f| f.shared_with_me))
}

fn is_filter(filter: &NodeFilter, flag: impl Fn(&NodeFilter) -> Option<bool>) -> bool {
    flag(filter) == Some(true)
}

#[cfg(test)]
#[path = "mutations_tests.rs"]
mod tests;
