//! User-facing file operations. Each mutation calls the backend, patches the
//! shared cache only once the backend confirmed it, then lets mounted queries
//! catch up. Failures are reported once through the notifier and returned.

use std::sync::{Arc, Mutex, MutexGuard};

use files_core::{
    FilesClient, FilesError, Node, NodeFilter, NodePage, NodeSort, Share, SharePermission, Version,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::mutations::{
    on_copy, on_create, on_delete, on_flag, on_move, on_rename, on_restore, on_share_created,
    on_share_deleted, on_share_updated, on_trash, on_versions_deleted, on_versions_kept,
};
use crate::cache::store::lock as lock_cache;
use crate::cache::{
    FieldKey, LiveQueries, OptimisticLayers, QueryId, RefetchDecision, SharedCache, ViewContext,
};
use crate::notify::{Notification, Notifier};
use crate::upload::UploadRetraction;

pub const DEFAULT_PAGE_SIZE: u32 = 25;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Files(#[from] FilesError),
    #[error("a name must not be empty")]
    EmptyName,
    #[error("no more pages for {0:?}")]
    NoMorePages(FieldKey),
}

pub struct Actions {
    client: FilesClient,
    cache: SharedCache,
    live: Mutex<LiveQueries>,
    optimistic: Mutex<OptimisticLayers>,
    view: Mutex<ViewContext>,
    notifier: Arc<dyn Notifier>,
    uploads: Option<Arc<dyn UploadRetraction>>,
    page_size: u32,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Actions {
    pub fn new(
        client: FilesClient,
        cache: SharedCache,
        notifier: Arc<dyn Notifier>,
        view: ViewContext,
    ) -> Self {
        Self {
            client,
            cache,
            live: Mutex::new(LiveQueries::new()),
            optimistic: Mutex::new(OptimisticLayers::new()),
            view: Mutex::new(view),
            notifier,
            uploads: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Deleted and trashed nodes are also retracted from `uploads`.
    pub fn with_uploads(mut self, uploads: Arc<dyn UploadRetraction>) -> Self {
        self.uploads = Some(uploads);
        self
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn client(&self) -> &FilesClient {
        &self.client
    }

    pub fn set_search_view(&self, in_search_view: bool) {
        guard(&self.view).in_search_view = in_search_view;
    }

    pub fn watch(&self, key: FieldKey) -> QueryId {
        guard(&self.live).watch(key)
    }

    pub fn unwatch(&self, id: QueryId) -> bool {
        guard(&self.live).unwatch(id)
    }

    pub fn set_executing(&self, id: QueryId, executing: bool) {
        guard(&self.live).set_executing(id, executing);
    }

    /// Reads a cached list without touching the network. Ordered entries come
    /// first, then the unordered tail.
    pub fn read_list(&self, key: &FieldKey) -> Option<Vec<Node>> {
        let cache = lock_cache(&self.cache);
        cache
            .resolve(key)
            .map(|nodes| nodes.into_iter().cloned().collect())
    }

    pub async fn load_children(
        &self,
        folder_id: &str,
        sort: NodeSort,
    ) -> Result<Vec<Node>, ActionError> {
        let key = FieldKey::children(folder_id, sort);
        self.fetch(&key).await?;
        Ok(self.read_list(&key).unwrap_or_default())
    }

    pub async fn find_nodes(
        &self,
        filter: NodeFilter,
        sort: NodeSort,
    ) -> Result<Vec<Node>, ActionError> {
        let key = FieldKey::find_nodes(filter, sort);
        self.fetch(&key).await?;
        Ok(self.read_list(&key).unwrap_or_default())
    }

    /// Fetches the page after the cached one and appends it.
    pub async fn load_more(&self, key: &FieldKey) -> Result<Vec<Node>, ActionError> {
        let token = lock_cache(&self.cache)
            .list(key)
            .and_then(|list| list.page_token.clone())
            .ok_or_else(|| ActionError::NoMorePages(key.clone()))?;
        let page = match key {
            FieldKey::Children { folder_id, sort } => {
                self.client
                    .get_children(folder_id, *sort, self.page_size, Some(&token))
                    .await?
            }
            FieldKey::FindNodes { filter, sort } => {
                self.client
                    .find_nodes(filter, *sort, self.page_size, Some(&token))
                    .await?
            }
            FieldKey::Path { .. } | FieldKey::Versions { .. } => {
                return Err(ActionError::NoMorePages(key.clone()));
            }
        };
        lock_cache(&self.cache).append_list(key.clone(), page);
        Ok(self.read_list(key).unwrap_or_default())
    }

    pub async fn load_path(&self, node_id: &str) -> Result<Vec<Node>, ActionError> {
        let path = self.client.get_path(node_id).await?;
        lock_cache(&self.cache).write_path(node_id, path.clone());
        Ok(path)
    }

    pub async fn load_versions(&self, node_id: &str) -> Result<Vec<Version>, ActionError> {
        let versions = self.client.get_versions(node_id).await?;
        lock_cache(&self.cache).write_versions(node_id, versions.clone());
        Ok(versions)
    }

    pub async fn create_folder(&self, parent_id: &str, name: &str) -> Result<Node, ActionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActionError::EmptyName);
        }
        let node = self
            .client
            .create_folder(parent_id, name)
            .await
            .map_err(|err| self.fail("create the folder", err))?;
        let spliced = on_create(&mut lock_cache(&self.cache), &node);
        debug!(node_id = %node.id, spliced, "folder created");
        self.refresh(|_| false).await;
        Ok(node)
    }

    /// `skip` names a mounted query the caller knows the move made
    /// irrelevant, such as a preview of the destination.
    pub async fn move_nodes(
        &self,
        node_ids: &[String],
        destination_id: &str,
        skip: Option<&FieldKey>,
    ) -> Result<Vec<Node>, ActionError> {
        let moved = self
            .client
            .move_nodes(node_ids, destination_id)
            .await
            .map_err(|err| self.fail("move the selected items", err))?;
        let report = on_move(&mut lock_cache(&self.cache), &moved, destination_id);
        debug!(moved = moved.len(), lists = report.lists.len(), "nodes moved");
        self.refresh(|key| skip == Some(key)).await;
        Ok(moved)
    }

    pub async fn copy_nodes(
        &self,
        node_ids: &[String],
        destination_id: &str,
    ) -> Result<Vec<Node>, ActionError> {
        let copies = self
            .client
            .copy_nodes(node_ids, destination_id)
            .await
            .map_err(|err| self.fail("copy the selected items", err))?;
        on_copy(&mut lock_cache(&self.cache), &copies);
        self.refresh(|_| false).await;
        Ok(copies)
    }

    pub async fn delete_nodes(&self, node_ids: &[String]) -> Result<Vec<String>, ActionError> {
        let deleted = self
            .client
            .delete_nodes(node_ids)
            .await
            .map_err(|err| self.fail("delete the selected items", err))?;
        on_delete(&mut lock_cache(&self.cache), &deleted);
        self.retract_uploads(&deleted);
        self.refresh(|_| false).await;
        Ok(deleted)
    }

    pub async fn trash_nodes(&self, node_ids: &[String]) -> Result<Vec<String>, ActionError> {
        let trashed = self
            .client
            .trash_nodes(node_ids)
            .await
            .map_err(|err| self.fail("move the selected items to trash", err))?;
        let view = self.view();
        on_trash(&mut lock_cache(&self.cache), &trashed, &view);
        self.retract_uploads(&trashed);
        self.refresh(|_| false).await;
        Ok(trashed)
    }

    pub async fn restore_nodes(&self, node_ids: &[String]) -> Result<Vec<Node>, ActionError> {
        let restored = self
            .client
            .restore_nodes(node_ids)
            .await
            .map_err(|err| self.fail("restore the selected items", err))?;
        let view = self.view();
        on_restore(&mut lock_cache(&self.cache), &restored, &view);
        self.refresh(|_| false).await;
        Ok(restored)
    }

    /// Flags are patched speculatively and rolled back if the backend refuses.
    pub async fn flag_nodes(
        &self,
        node_ids: &[String],
        flag: bool,
    ) -> Result<Vec<String>, ActionError> {
        let view = self.view();
        let layer = {
            let mut cache = lock_cache(&self.cache);
            guard(&self.optimistic).apply(&mut cache, |cache| {
                on_flag(cache, node_ids, flag, &view);
            })
        };

        match self.client.flag_nodes(node_ids, flag).await {
            Ok(flagged) => {
                guard(&self.optimistic).confirm(layer);
                self.refresh(|_| false).await;
                Ok(flagged)
            }
            Err(err) => {
                {
                    let mut cache = lock_cache(&self.cache);
                    guard(&self.optimistic).rollback(&mut cache, layer);
                }
                let action = if flag {
                    "flag the selected items"
                } else {
                    "unflag the selected items"
                };
                Err(self.fail(action, err))
            }
        }
    }

    pub async fn rename_node(&self, node_id: &str, name: &str) -> Result<Node, ActionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActionError::EmptyName);
        }
        let node = self
            .client
            .update_node(node_id, name)
            .await
            .map_err(|err| self.fail("rename the item", err))?;
        on_rename(&mut lock_cache(&self.cache), &node);
        self.refresh(|_| false).await;
        Ok(node)
    }

    pub async fn create_share(
        &self,
        node_id: &str,
        share_target_id: &str,
        permission: SharePermission,
    ) -> Result<Share, ActionError> {
        let share = self
            .client
            .create_share(node_id, share_target_id, permission)
            .await
            .map_err(|err| self.fail("share the item", err))?;
        on_share_created(&mut lock_cache(&self.cache), node_id, &share);
        self.refresh(|_| false).await;
        Ok(share)
    }

    pub async fn update_share(
        &self,
        node_id: &str,
        share_target_id: &str,
        permission: SharePermission,
    ) -> Result<Share, ActionError> {
        let share = self
            .client
            .update_share(node_id, share_target_id, permission)
            .await
            .map_err(|err| self.fail("update the share", err))?;
        on_share_updated(&mut lock_cache(&self.cache), node_id, &share);
        self.refresh(|_| false).await;
        Ok(share)
    }

    pub async fn delete_share(
        &self,
        node_id: &str,
        share_target_id: &str,
    ) -> Result<bool, ActionError> {
        let removed = self
            .client
            .delete_share(node_id, share_target_id)
            .await
            .map_err(|err| self.fail("remove the share", err))?;
        if removed {
            let view = self.view();
            on_share_deleted(&mut lock_cache(&self.cache), node_id, share_target_id, &view);
            self.refresh(|_| false).await;
        }
        Ok(removed)
    }

    pub async fn delete_versions(
        &self,
        node_id: &str,
        versions: &[u32],
    ) -> Result<Vec<u32>, ActionError> {
        let deleted = self
            .client
            .delete_versions(node_id, versions)
            .await
            .map_err(|err| self.fail("delete the selected versions", err))?;
        on_versions_deleted(&mut lock_cache(&self.cache), node_id, &deleted);
        self.refresh(|_| false).await;
        Ok(deleted)
    }

    pub async fn keep_versions(
        &self,
        node_id: &str,
        versions: &[u32],
        keep_forever: bool,
    ) -> Result<Vec<u32>, ActionError> {
        let kept = self
            .client
            .keep_versions(node_id, versions, keep_forever)
            .await
            .map_err(|err| self.fail("update the selected versions", err))?;
        on_versions_kept(&mut lock_cache(&self.cache), node_id, &kept, keep_forever);
        self.refresh(|_| false).await;
        Ok(kept)
    }

    fn view(&self) -> ViewContext {
        guard(&self.view).clone()
    }

    fn fail(&self, action: &str, err: FilesError) -> ActionError {
        warn!(action, error = %err, "files action failed");
        self.notifier
            .notify(Notification::error(format!("Could not {action}")));
        ActionError::Files(err)
    }

    fn retract_uploads(&self, node_ids: &[String]) {
        if let Some(uploads) = &self.uploads {
            uploads.retract(node_ids);
        }
    }

    /// Re-reads the first page of `key` into the cache.
    async fn fetch(&self, key: &FieldKey) -> Result<(), FilesError> {
        match key {
            FieldKey::Children { folder_id, sort } => {
                let page = self
                    .client
                    .get_children(folder_id, *sort, self.page_size, None)
                    .await?;
                lock_cache(&self.cache).write_children(folder_id, *sort, page);
            }
            FieldKey::FindNodes { filter, sort } => {
                let page: NodePage = self
                    .client
                    .find_nodes(filter, *sort, self.page_size, None)
                    .await?;
                lock_cache(&self.cache).write_find_nodes(filter.clone(), *sort, page);
            }
            FieldKey::Path { node_id } => {
                let path = self.client.get_path(node_id).await?;
                lock_cache(&self.cache).write_path(node_id, path);
            }
            FieldKey::Versions { node_id } => {
                let versions = self.client.get_versions(node_id).await?;
                lock_cache(&self.cache).write_versions(node_id, versions);
            }
        }
        Ok(())
    }

    /// Runs after every confirmed mutation: mounted queries the cache can no
    /// longer answer are refetched. A failed refetch leaves the query to its
    /// next mount.
    async fn refresh(&self, skip: impl Fn(&FieldKey) -> bool) -> Vec<(QueryId, RefetchDecision)> {
        let decisions = {
            let cache = lock_cache(&self.cache);
            guard(&self.live).reconcile(&cache, skip)
        };
        for (id, key, decision) in &decisions {
            if *decision != RefetchDecision::Refetch {
                continue;
            }
            if let Err(err) = self.fetch(key).await {
                warn!(query = ?id, error = %err, "refetch after mutation failed");
            }
        }
        decisions
            .into_iter()
            .map(|(id, _, decision)| (id, decision))
            .collect()
    }
}

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;
