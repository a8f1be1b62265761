use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use files_core::upload::is_success;
use files_core::{UploadFailure, UploadResponse, UploadTarget};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::classify::{Rejection, is_probably_directory};
use super::file::UploadFile;
use super::remote::RemoteNodes;
use super::store::QueueState;
use super::transfer::{ProgressFn, TransferOutcome, TransferRequest, UploadTransport};
use super::{UploadError, UploadItem, UploadStatus};
use crate::cache::SharedCache;
use crate::cache::mutations::on_create;
use crate::cache::store::lock as lock_cache;
use crate::notify::{Notification, Notifier};

pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    pub concurrency: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Outcome of one `add` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddReport {
    /// Items registered for transfer, in input order.
    pub accepted: Vec<String>,
    /// Items recorded as failed because they look like directories.
    pub rejected: Vec<String>,
    pub rejection: Rejection,
}

/// Lets other parts of the client retract upload progress for nodes that were
/// deleted or trashed.
pub trait UploadRetraction: Send + Sync {
    fn retract(&self, node_ids: &[String]);
}

struct Completion {
    node_id: String,
    version_upload: bool,
}

pub(super) struct Inner<T, N> {
    state: Mutex<QueueState>,
    transport: T,
    pub(super) remote: N,
    pub(super) cache: SharedCache,
    pub(super) notifier: Arc<dyn Notifier>,
    limit: usize,
    counter: AtomicU64,
    updates: watch::Sender<Vec<UploadItem>>,
}

/// Owns the upload queues. Cloning yields another handle to the same queues.
///
/// Transfers run on the ambient Tokio runtime, so every method that may start
/// one must be called from within it.
pub struct UploadManager<T, N> {
    pub(super) inner: Arc<Inner<T, N>>,
}

impl<T, N> Clone for UploadManager<T, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: UploadTransport, N: RemoteNodes> UploadManager<T, N> {
    pub fn new(
        transport: T,
        remote: N,
        cache: SharedCache,
        notifier: Arc<dyn Notifier>,
        config: UploadConfig,
    ) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                transport,
                remote,
                cache,
                notifier,
                limit: config.concurrency.max(1),
                counter: AtomicU64::new(0),
                updates,
            }),
        }
    }

    /// Receives a fresh snapshot of every item after each state change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadItem>> {
        self.inner.updates.subscribe()
    }

    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.inner.lock().snapshot()
    }

    pub fn item(&self, id: &str) -> Option<UploadItem> {
        self.inner.lock().items.get(id).cloned()
    }

    pub fn loading_ids(&self) -> Vec<String> {
        self.inner.lock().loading.clone()
    }

    pub fn waiting_ids(&self) -> Vec<String> {
        self.inner.lock().waiting.iter().cloned().collect()
    }

    pub fn concurrency(&self) -> usize {
        self.inner.limit
    }

    /// Queues `files` for upload into `parent_id`. With `detect_folders`,
    /// payloads that look like directories are recorded as failed instead.
    pub fn add(&self, files: Vec<UploadFile>, parent_id: &str, detect_folders: bool) -> AddReport {
        let total = files.len();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut start = Vec::new();
        {
            let mut state = self.inner.lock();
            for file in files {
                let item = self.inner.new_item(file, Some(parent_id.to_string()), None);
                let id = item.id.clone();
                if detect_folders && is_probably_directory(&item.file) {
                    debug!(upload_id = %id, name = %item.file.name, "rejected probable directory");
                    state.reject(item);
                    rejected.push(id);
                    continue;
                }
                let target = UploadTarget::NewFile {
                    parent_id: parent_id.to_string(),
                };
                if state.admit(item, target, self.inner.limit) {
                    start.push(id.clone());
                }
                accepted.push(id);
            }
            self.inner.publish(&state);
        }

        let rejection = Rejection::from_counts(rejected.len(), total);
        if let Some(message) = rejection.message() {
            self.inner
                .notifier
                .notify(Notification::warning(message).with_more_info());
        }
        for id in start {
            self.inner.start(id);
        }
        AddReport {
            accepted,
            rejected,
            rejection,
        }
    }

    /// Uploads a new version of `node_id`. Starts right away, outside the
    /// concurrency bound.
    pub fn update(&self, node_id: &str, file: UploadFile, overwrite: bool) -> String {
        let item = self
            .inner
            .new_item(file, None, Some(node_id.to_string()));
        let id = item.id.clone();
        {
            let mut state = self.inner.lock();
            state.admit_unbounded(
                item,
                UploadTarget::Version {
                    node_id: node_id.to_string(),
                    overwrite,
                },
            );
            self.inner.publish(&state);
        }
        self.inner.start(id.clone());
        id
    }

    /// Cancels running transfers among `ids` and forgets every listed item.
    /// Unknown ids are ignored.
    pub fn remove_by_id(&self, ids: &[String]) {
        let promoted = {
            let mut state = self.inner.lock();
            for id in ids {
                if state.remove(id) {
                    debug!(upload_id = %id, "removed loading upload");
                }
            }
            let promoted = state.promote(self.inner.limit);
            self.inner.publish(&state);
            promoted
        };
        for id in promoted {
            self.inner.start(id);
        }
    }

    pub fn remove_by_node_id(&self, node_ids: &[String]) {
        let ids = self.inner.lock().ids_where(|item| {
            item.node_id
                .as_ref()
                .is_some_and(|node_id| node_ids.contains(node_id))
        });
        if !ids.is_empty() {
            self.remove_by_id(&ids);
        }
    }

    pub fn remove_all_completed(&self) {
        let ids = self
            .inner
            .lock()
            .ids_where(|item| item.status == UploadStatus::Completed);
        if !ids.is_empty() {
            self.remove_by_id(&ids);
        }
    }

    /// Restarts failed or queued items. Every id is validated before any item
    /// changes, so an error leaves the queue untouched.
    ///
    /// A retried item takes a loading slot when one is free and otherwise
    /// runs alongside the bounded transfers.
    pub fn retry_by_id(&self, ids: &[String]) -> Result<(), UploadError> {
        let mut start: Vec<String> = Vec::new();
        {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            for id in ids {
                let item = state
                    .items
                    .get(id)
                    .ok_or_else(|| UploadError::UnknownUpload(id.clone()))?;
                if !matches!(item.status, UploadStatus::Failed | UploadStatus::Queued) {
                    return Err(UploadError::NotRetryable {
                        id: id.clone(),
                        status: item.status,
                    });
                }
                if !state.handles.contains_key(id) {
                    return Err(UploadError::NoTransfer(id.clone()));
                }
            }

            for id in ids {
                if start.contains(id) {
                    continue;
                }
                state.waiting.retain(|waiting| waiting != id);
                if !state.loading.contains(id) && state.loading.len() < self.inner.limit {
                    state.loading.push(id.clone());
                }
                if let Some(item) = state.items.get_mut(id) {
                    item.status = UploadStatus::Loading;
                    item.percentage = 0;
                }
                start.push(id.clone());
            }
            self.inner.publish(state);
        }
        for id in start {
            info!(upload_id = %id, "retrying upload");
            self.inner.start(id);
        }
        Ok(())
    }
}

impl<T: UploadTransport, N: RemoteNodes> UploadRetraction for UploadManager<T, N> {
    fn retract(&self, node_ids: &[String]) {
        self.remove_by_node_id(node_ids);
    }
}

impl<T: UploadTransport, N: RemoteNodes> Inner<T, N> {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &QueueState) {
        self.updates.send_replace(state.snapshot());
    }

    fn next_id(&self) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        format!("upload-{sequence}-{millis}")
    }

    fn new_item(
        &self,
        file: UploadFile,
        parent_id: Option<String>,
        node_id: Option<String>,
    ) -> UploadItem {
        UploadItem {
            id: self.next_id(),
            file,
            parent_id,
            node_id,
            percentage: 0,
            status: UploadStatus::Queued,
        }
    }

    fn start(self: &Arc<Self>, id: String) {
        let armed = {
            let mut state = self.lock();
            let file = state.items.get(&id).map(|item| item.file.clone());
            match (file, state.handles.get_mut(&id)) {
                (Some(file), Some(handle)) => {
                    let (cancel, generation) = handle.arm();
                    let request = TransferRequest {
                        upload_id: id.clone(),
                        file,
                        target: handle.target.clone(),
                    };
                    Some((request, cancel, generation))
                }
                _ => None,
            }
        };
        let Some((request, cancel, generation)) = armed else {
            warn!(upload_id = %id, "upload disappeared before its transfer started");
            return;
        };

        debug!(upload_id = %id, generation, "starting upload transfer");
        let progress = self.progress_fn(&id, generation);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner.transport.send(request, progress, cancel).await;
            if let Some(completion) = inner.finish(&id, generation, outcome) {
                inner.after_completion(completion).await;
            }
        });
    }

    fn progress_fn(self: &Arc<Self>, id: &str, generation: u64) -> ProgressFn {
        let inner = Arc::downgrade(self);
        let id = id.to_string();
        Arc::new(move |sent, total| {
            if let Some(inner) = inner.upgrade() {
                inner.on_progress(&id, generation, sent, total);
            }
        })
    }

    fn on_progress(&self, id: &str, generation: u64, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.handles.get(id).map(|handle| handle.generation) != Some(generation) {
            return;
        }
        let Some(item) = state.items.get_mut(id) else {
            return;
        };
        let percentage = (sent.saturating_mul(100) / total).min(100) as u8;
        if item.status != UploadStatus::Loading || percentage <= item.percentage {
            return;
        }
        item.percentage = percentage;
        self.publish(state);
    }

    /// Terminal handler of one transfer attempt. Moves the item to exactly
    /// one terminal status, frees its loading slot and promotes the next
    /// waiting item. Outcomes of superseded or removed attempts are dropped.
    fn finish(
        self: &Arc<Self>,
        id: &str,
        generation: u64,
        outcome: TransferOutcome,
    ) -> Option<Completion> {
        let (completion, failure, promoted) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match state.handles.get_mut(id) {
                Some(handle) if handle.generation == generation => handle.disarm(),
                _ => {
                    debug!(upload_id = id, generation, "dropping outcome of a superseded transfer");
                    return None;
                }
            }
            let item = state.items.get_mut(id)?;
            if item.status != UploadStatus::Loading {
                return None;
            }

            let mut completion = None;
            let mut failure = None;
            match interpret(id, &outcome) {
                Ok(response) => {
                    info!(upload_id = id, node_id = %response.node_id, "upload completed");
                    item.status = UploadStatus::Completed;
                    item.percentage = 100;
                    item.node_id = Some(response.node_id.clone());
                    completion = Some(Completion {
                        node_id: response.node_id,
                        version_upload: item.parent_id.is_none(),
                    });
                }
                Err(reason) => {
                    item.status = UploadStatus::Failed;
                    failure = Some((reason, item.file.name.clone()));
                }
            }

            let promoted = if state.release(id) {
                state.promote(self.limit)
            } else {
                Vec::new()
            };
            self.publish(state);
            (completion, failure, promoted)
        };

        if let Some((reason, name)) = failure {
            log_failure(id, &name, reason, outcome.status);
            if let Some(notification) = failure_notification(reason, &name) {
                self.notifier.notify(notification);
            }
        }
        for next in promoted {
            self.start(next);
        }
        completion
    }

    async fn after_completion(&self, completion: Completion) {
        let Completion {
            node_id,
            version_upload,
        } = completion;

        if version_upload {
            match self.remote.versions(&node_id).await {
                Ok(versions) => {
                    let mut cache = lock_cache(&self.cache);
                    cache.write_versions(&node_id, versions);
                }
                Err(err) => warn!(
                    node_id = %node_id,
                    error = %err,
                    "failed to refresh versions after upload"
                ),
            }
        }

        match self.remote.node(&node_id).await {
            Ok(node) => {
                let mut cache = lock_cache(&self.cache);
                let spliced = on_create(&mut cache, &node);
                debug!(node_id = %node_id, spliced, "cached uploaded node");
            }
            Err(err) => warn!(node_id = %node_id, error = %err, "failed to look up uploaded node"),
        }
    }
}

fn interpret(id: &str, outcome: &TransferOutcome) -> Result<UploadResponse, UploadFailure> {
    if !is_success(outcome.status) {
        return Err(UploadFailure::from_status(outcome.status));
    }
    serde_json::from_str(&outcome.body).map_err(|err| {
        error!(upload_id = id, error = %err, "upload succeeded with an unreadable response");
        UploadFailure::Unexpected(outcome.status)
    })
}

fn log_failure(id: &str, name: &str, reason: UploadFailure, status: u16) {
    match reason {
        UploadFailure::Aborted => debug!(upload_id = id, name, "upload aborted"),
        UploadFailure::Unexpected(_) => {
            error!(upload_id = id, name, status, "upload failed with unexpected status")
        }
        reason => warn!(upload_id = id, name, status, ?reason, "upload rejected"),
    }
}

fn failure_notification(reason: UploadFailure, name: &str) -> Option<Notification> {
    let notification = match reason {
        UploadFailure::Aborted => return None,
        UploadFailure::VersionLimitExceeded => Notification::warning(format!(
            "{name} was not uploaded: the maximum number of versions has been reached"
        )),
        UploadFailure::TooLarge => {
            Notification::warning(format!("{name} was not uploaded: the file is too large"))
        }
        UploadFailure::NameCollision => Notification::warning(format!(
            "{name} was not uploaded: an item with the same name already exists"
        )),
        UploadFailure::Unexpected(_) => Notification::error(format!("Upload of {name} failed")),
    };
    Some(notification)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
