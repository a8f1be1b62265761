//! Queue state of the upload manager: the item store, the per-item transfer
//! handles and the loading/waiting queues. Every method keeps the queue
//! invariants on its own so callers can interleave them freely.

use std::collections::{HashMap, VecDeque};

use files_core::UploadTarget;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use super::{UploadItem, UploadStatus};

/// Cancel/retry companion of an item. `generation` increases with every
/// (re)start so that a late terminal event of a superseded transfer is ignored.
#[derive(Debug)]
pub(super) struct TransferHandle {
    pub target: UploadTarget,
    cancel: Option<CancellationToken>,
    pub generation: u64,
}

impl TransferHandle {
    pub fn new(target: UploadTarget) -> Self {
        Self {
            target,
            cancel: None,
            generation: 0,
        }
    }

    /// Fresh token for a new transfer attempt.
    pub fn arm(&mut self) -> (CancellationToken, u64) {
        self.abort();
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.generation += 1;
        (token, self.generation)
    }

    pub fn abort(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    pub fn disarm(&mut self) {
        self.cancel = None;
    }
}

#[derive(Debug, Default)]
pub(super) struct QueueState {
    pub items: IndexMap<String, UploadItem>,
    pub handles: HashMap<String, TransferHandle>,
    pub loading: Vec<String>,
    pub waiting: VecDeque<String>,
}

impl QueueState {
    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.items.values().cloned().collect()
    }

    /// Registers a transferable item, starting it when the bound allows.
    /// Returns true when the caller must start the transfer now.
    pub fn admit(&mut self, mut item: UploadItem, target: UploadTarget, limit: usize) -> bool {
        let id = item.id.clone();
        let start = self.loading.len() < limit;
        item.percentage = 0;
        if start {
            item.status = UploadStatus::Loading;
            self.loading.push(id.clone());
        } else {
            item.status = UploadStatus::Queued;
            self.waiting.push_back(id.clone());
        }
        self.items.insert(id.clone(), item);
        self.handles.insert(id, TransferHandle::new(target));
        start
    }

    /// Registers an item that bypasses the queues (version uploads).
    pub fn admit_unbounded(&mut self, mut item: UploadItem, target: UploadTarget) {
        let id = item.id.clone();
        item.status = UploadStatus::Loading;
        item.percentage = 0;
        self.items.insert(id.clone(), item);
        self.handles.insert(id, TransferHandle::new(target));
    }

    /// Records an item that will never be transferred.
    pub fn reject(&mut self, mut item: UploadItem) {
        item.status = UploadStatus::Failed;
        item.percentage = 0;
        self.items.insert(item.id.clone(), item);
    }

    /// Drops `id` from the loading queue. Returns true when it was there.
    pub fn release(&mut self, id: &str) -> bool {
        match self.loading.iter().position(|loading| loading == id) {
            Some(index) => {
                self.loading.remove(index);
                true
            }
            None => false,
        }
    }

    /// Moves waiting heads into free loading slots, in arrival order.
    /// Returns the ids whose transfers must be started.
    pub fn promote(&mut self, limit: usize) -> Vec<String> {
        let mut started = Vec::new();
        while self.loading.len() < limit {
            let Some(id) = self.waiting.pop_front() else {
                break;
            };
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            if item.status != UploadStatus::Queued {
                continue;
            }
            item.status = UploadStatus::Loading;
            item.percentage = 0;
            self.loading.push(id.clone());
            started.push(id);
        }
        started
    }

    /// Cancels and forgets `id`. Returns true when a loading slot was freed.
    pub fn remove(&mut self, id: &str) -> bool {
        if let Some(mut handle) = self.handles.remove(id) {
            handle.abort();
        }
        self.items.shift_remove(id);
        self.waiting.retain(|waiting| waiting != id);
        self.release(id)
    }

    pub fn ids_where(&self, predicate: impl Fn(&UploadItem) -> bool) -> Vec<String> {
        self.items
            .values()
            .filter(|item| predicate(item))
            .map(|item| item.id.clone())
            .collect()
    }
}
