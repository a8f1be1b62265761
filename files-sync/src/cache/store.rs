use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use files_core::{Node, NodeFilter, NodePage, NodeSort, Version};

/// Identifies one cached list-valued field together with the arguments it was
/// fetched with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Children { folder_id: String, sort: NodeSort },
    FindNodes { filter: NodeFilter, sort: NodeSort },
    Path { node_id: String },
    Versions { node_id: String },
}

impl FieldKey {
    pub fn children(folder_id: impl Into<String>, sort: NodeSort) -> Self {
        FieldKey::Children {
            folder_id: folder_id.into(),
            sort,
        }
    }

    pub fn find_nodes(filter: NodeFilter, sort: NodeSort) -> Self {
        FieldKey::FindNodes { filter, sort }
    }

    pub fn sort(&self) -> Option<NodeSort> {
        match self {
            FieldKey::Children { sort, .. } | FieldKey::FindNodes { sort, .. } => Some(*sort),
            _ => None,
        }
    }

    /// The entity this field hangs from, if any.
    pub fn owner(&self) -> Option<&str> {
        match self {
            FieldKey::Children { folder_id, .. } => Some(folder_id),
            FieldKey::Path { node_id } | FieldKey::Versions { node_id } => Some(node_id),
            FieldKey::FindNodes { .. } => None,
        }
    }
}

/// A cached page of node references. `ordered` follows the sort criterion of
/// the field; `unordered` holds references whose true position is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeList {
    pub ordered: Vec<String>,
    pub unordered: Vec<String>,
    pub page_token: Option<String>,
}

impl NodeList {
    pub fn from_page(page: &NodePage) -> Self {
        Self {
            ordered: page.nodes.iter().map(|n| n.id.clone()).collect(),
            unordered: Vec::new(),
            page_token: page.page_token.clone(),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.ordered.iter().chain(self.unordered.iter())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().any(|candidate| candidate == id)
    }

    pub fn len(&self) -> usize {
        self.ordered.len() + self.unordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty() && self.unordered.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.page_token.is_some()
    }

    /// Removes every reference in `ids`; returns how many were dropped.
    pub fn remove_all(&mut self, ids: &HashSet<&str>) -> usize {
        let before = self.len();
        self.ordered.retain(|id| !ids.contains(id.as_str()));
        self.unordered.retain(|id| !ids.contains(id.as_str()));
        before - self.len()
    }

    /// Appends the next server page. Items already referenced move to the
    /// ordered position the server gave them.
    pub fn append_page(&mut self, page: &NodePage) {
        let incoming: HashSet<&str> = page.nodes.iter().map(|n| n.id.as_str()).collect();
        self.remove_all(&incoming);
        self.ordered.extend(page.nodes.iter().map(|n| n.id.clone()));
        self.page_token = page.page_token.clone();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Nodes(NodeList),
    Path(Vec<String>),
    Versions(Vec<Version>),
}

impl FieldValue {
    fn references(&self) -> Box<dyn Iterator<Item = &String> + '_> {
        match self {
            FieldValue::Nodes(list) => Box::new(list.ids()),
            FieldValue::Path(ids) => Box::new(ids.iter()),
            FieldValue::Versions(_) => Box::new(std::iter::empty()),
        }
    }
}

/// Outcome of a cache read performed for a live query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDiff {
    pub complete: bool,
    pub missing: Vec<String>,
}

/// Client-side store keyed by entity id, where list fields hold references.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCache {
    pub(super) nodes: HashMap<String, Node>,
    pub(super) fields: HashMap<FieldKey, FieldValue>,
}

pub type SharedCache = Arc<Mutex<NormalizedCache>>;

pub fn shared(cache: NormalizedCache) -> SharedCache {
    Arc::new(Mutex::new(cache))
}

/// Locks the shared cache. A poisoned lock still holds consistent data since
/// every patch runs to completion without awaiting.
pub fn lock(cache: &SharedCache) -> MutexGuard<'_, NormalizedCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NormalizedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Stores `node`, keeping previously cached shares when the incoming
    /// payload did not select them.
    pub fn write_node(&mut self, mut node: Node) {
        if node.shares.is_none() {
            if let Some(existing) = self.nodes.get(&node.id) {
                node.shares = existing.shares.clone();
            }
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn modify_node(&mut self, id: &str, patch: impl FnOnce(&mut Node)) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                patch(node);
                true
            }
            None => false,
        }
    }

    pub fn evict_node(&mut self, id: &str) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub fn field(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn list(&self, key: &FieldKey) -> Option<&NodeList> {
        match self.fields.get(key) {
            Some(FieldValue::Nodes(list)) => Some(list),
            _ => None,
        }
    }

    pub fn list_mut(&mut self, key: &FieldKey) -> Option<&mut NodeList> {
        match self.fields.get_mut(key) {
            Some(FieldValue::Nodes(list)) => Some(list),
            _ => None,
        }
    }

    pub fn has_field(&self, key: &FieldKey) -> bool {
        self.fields.contains_key(key)
    }

    pub fn evict_field(&mut self, key: &FieldKey) -> bool {
        self.fields.remove(key).is_some()
    }

    pub fn evict_fields_where(&mut self, predicate: impl Fn(&FieldKey) -> bool) -> usize {
        let before = self.fields.len();
        self.fields.retain(|key, _| !predicate(key));
        before - self.fields.len()
    }

    pub fn field_keys(&self) -> Vec<FieldKey> {
        self.fields.keys().cloned().collect()
    }

    pub fn list_keys_where(&self, predicate: impl Fn(&FieldKey) -> bool) -> Vec<FieldKey> {
        self.fields
            .iter()
            .filter(|(key, value)| matches!(value, FieldValue::Nodes(_)) && predicate(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn children_keys(&self, folder_id: &str) -> Vec<FieldKey> {
        self.list_keys_where(
            |key| matches!(key, FieldKey::Children { folder_id: f, .. } if f == folder_id),
        )
    }

    pub fn write_children(&mut self, folder_id: &str, sort: NodeSort, page: NodePage) {
        self.write_list(FieldKey::children(folder_id, sort), page);
    }

    pub fn append_children(&mut self, folder_id: &str, sort: NodeSort, page: NodePage) {
        self.append_list(FieldKey::children(folder_id, sort), page);
    }

    pub fn write_find_nodes(&mut self, filter: NodeFilter, sort: NodeSort, page: NodePage) {
        self.write_list(FieldKey::find_nodes(filter, sort), page);
    }

    pub fn write_list(&mut self, key: FieldKey, page: NodePage) {
        let list = NodeList::from_page(&page);
        for node in page.nodes {
            self.write_node(node);
        }
        self.fields.insert(key, FieldValue::Nodes(list));
    }

    /// Appends a further page to a cached list, creating the list if absent.
    pub fn append_list(&mut self, key: FieldKey, page: NodePage) {
        let Some(list) = self.list_mut(&key) else {
            self.write_list(key, page);
            return;
        };
        list.append_page(&page);
        for node in page.nodes {
            self.write_node(node);
        }
    }

    pub fn write_path(&mut self, node_id: &str, path: Vec<Node>) {
        let ids = path.iter().map(|n| n.id.clone()).collect();
        for node in path {
            self.write_node(node);
        }
        self.fields.insert(
            FieldKey::Path {
                node_id: node_id.to_string(),
            },
            FieldValue::Path(ids),
        );
    }

    pub fn write_versions(&mut self, node_id: &str, versions: Vec<Version>) {
        self.fields.insert(
            FieldKey::Versions {
                node_id: node_id.to_string(),
            },
            FieldValue::Versions(versions),
        );
    }

    pub fn versions(&self, node_id: &str) -> Option<&[Version]> {
        match self.fields.get(&FieldKey::Versions {
            node_id: node_id.to_string(),
        }) {
            Some(FieldValue::Versions(versions)) => Some(versions),
            _ => None,
        }
    }

    pub fn versions_mut(&mut self, node_id: &str) -> Option<&mut Vec<Version>> {
        match self.fields.get_mut(&FieldKey::Versions {
            node_id: node_id.to_string(),
        }) {
            Some(FieldValue::Versions(versions)) => Some(versions),
            _ => None,
        }
    }

    /// Nodes referenced by a cached list, in list order. Dangling references
    /// are skipped.
    pub fn resolve(&self, key: &FieldKey) -> Option<Vec<&Node>> {
        let list = self.list(key)?;
        Some(list.ids().filter_map(|id| self.nodes.get(id)).collect())
    }

    pub fn resolve_ordered(&self, list: &NodeList) -> Vec<&Node> {
        list.ordered
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Reads a field the way a mounted query would: the read is incomplete
    /// when the field is gone or references an evicted entity.
    pub fn diff(&self, key: &FieldKey) -> CacheDiff {
        let Some(value) = self.fields.get(key) else {
            return CacheDiff {
                complete: false,
                missing: vec![format!("{key:?}")],
            };
        };
        let missing: Vec<String> = value
            .references()
            .filter(|id| !self.nodes.contains_key(id.as_str()))
            .cloned()
            .collect();
        CacheDiff {
            complete: missing.is_empty(),
            missing,
        }
    }

    /// Drops entities that no field references and that own no field.
    pub fn gc(&mut self) -> Vec<String> {
        let mut reachable: HashSet<&str> = HashSet::new();
        for (key, value) in &self.fields {
            if let Some(owner) = key.owner() {
                reachable.insert(owner);
            }
            reachable.extend(value.references().map(String::as_str));
        }
        let orphans: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| !reachable.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &orphans {
            self.nodes.remove(id);
        }
        orphans
    }
}
