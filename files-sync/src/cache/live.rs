use std::collections::BTreeMap;

use super::store::{FieldKey, NormalizedCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveQuery {
    pub key: FieldKey,
    /// False while the view is mounted but its query is paused.
    pub executing: bool,
}

/// What to do with a mounted query after a mutation patched the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchDecision {
    /// The cache can no longer answer the query.
    Refetch,
    /// The mutation made this query irrelevant.
    Skip,
    /// Re-read from the patched cache.
    Default,
}

/// Registry of the list/detail queries currently mounted by views.
#[derive(Debug, Default)]
pub struct LiveQueries {
    next_id: u64,
    queries: BTreeMap<QueryId, LiveQuery>,
}

impl LiveQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, key: FieldKey) -> QueryId {
        self.next_id += 1;
        let id = QueryId(self.next_id);
        self.queries.insert(id, LiveQuery { key, executing: true });
        id
    }

    pub fn unwatch(&mut self, id: QueryId) -> bool {
        self.queries.remove(&id).is_some()
    }

    pub fn set_executing(&mut self, id: QueryId, executing: bool) {
        if let Some(query) = self.queries.get_mut(&id) {
            query.executing = executing;
        }
    }

    pub fn get(&self, id: QueryId) -> Option<&LiveQuery> {
        self.queries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Classifies every executing query against the patched cache. Queries
    /// whose read came back incomplete are refetched; of the rest, those
    /// matched by `skip` are left alone.
    pub fn reconcile(
        &self,
        cache: &NormalizedCache,
        skip: impl Fn(&FieldKey) -> bool,
    ) -> Vec<(QueryId, FieldKey, RefetchDecision)> {
        self.queries
            .iter()
            .filter(|(_, query)| query.executing)
            .map(|(id, query)| {
                let decision = if !cache.diff(&query.key).complete {
                    RefetchDecision::Refetch
                } else if skip(&query.key) {
                    RefetchDecision::Skip
                } else {
                    RefetchDecision::Default
                };
                (*id, query.key.clone(), decision)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::file;
    use files_core::{NodePage, NodeSort};

    #[test]
    fn missing_data_triggers_refetch_before_skip() {
        let mut cache = NormalizedCache::new();
        cache.write_children(
            "a",
            NodeSort::NameAsc,
            NodePage {
                nodes: vec![file("n1", "x", 1)],
                page_token: None,
            },
        );
        let mut live = LiveQueries::new();
        let present = live.watch(FieldKey::children("a", NodeSort::NameAsc));
        let evicted = live.watch(FieldKey::children("b", NodeSort::NameAsc));
        let paused = live.watch(FieldKey::children("c", NodeSort::NameAsc));
        live.set_executing(paused, false);

        let decisions = live.reconcile(&cache, |_| true);

        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].0, present);
        assert_eq!(decisions[0].2, RefetchDecision::Skip);
        assert_eq!(decisions[1].0, evicted);
        assert_eq!(decisions[1].2, RefetchDecision::Refetch);
    }

    #[test]
    fn complete_queries_fall_through_to_default() {
        let mut cache = NormalizedCache::new();
        cache.write_versions("n1", vec![]);
        let mut live = LiveQueries::new();
        let id = live.watch(FieldKey::Versions {
            node_id: "n1".into(),
        });

        let decisions = live.reconcile(&cache, |_| false);
        let versions = FieldKey::Versions {
            node_id: "n1".into(),
        };
        assert_eq!(decisions, vec![(id, versions, RefetchDecision::Default)]);

        assert!(live.unwatch(id));
        assert!(live.is_empty());
    }
}
