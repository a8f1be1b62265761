use super::*;
use crate::cache::store::shared;
use crate::cache::test_support::{child_of, file, folder};
use crate::cache::{FieldKey, NormalizedCache};
use crate::notify::{MemoryNotifier, Severity};
use crate::upload::FolderUploadReport;
use files_core::{FilesError, Node, NodePage, NodeSort, Version};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct TransportState {
    pending: Mutex<HashMap<String, oneshot::Sender<TransferOutcome>>>,
    started: Mutex<Vec<String>>,
    progress: Mutex<Vec<(u64, u64)>>,
    arrived: Notify,
}

/// Transport whose transfers stay open until the test resolves them by file
/// name.
#[derive(Clone, Default)]
struct FakeTransport(Arc<TransportState>);

impl FakeTransport {
    fn started(&self) -> Vec<String> {
        self.0.started.lock().unwrap().clone()
    }

    fn script_progress(&self, steps: Vec<(u64, u64)>) {
        *self.0.progress.lock().unwrap() = steps;
    }

    async fn resolve(&self, name: &str, status: u16, body: &str) {
        let sender = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let arrived = self.0.arrived.notified();
                if let Some(sender) = self.0.pending.lock().unwrap().remove(name) {
                    return sender;
                }
                arrived.await;
            }
        })
        .await
        .expect("transfer never started");
        let _ = sender.send(TransferOutcome {
            status,
            body: body.to_string(),
        });
    }
}

impl UploadTransport for FakeTransport {
    async fn send(
        &self,
        request: TransferRequest,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> TransferOutcome {
        let (sender, receiver) = oneshot::channel();
        let steps = {
            let name = request.file.name.clone();
            self.0.pending.lock().unwrap().insert(name.clone(), sender);
            self.0.started.lock().unwrap().push(name);
            self.0.progress.lock().unwrap().clone()
        };
        self.0.arrived.notify_waiters();
        for (sent, total) in steps {
            progress(sent, total);
        }
        tokio::select! {
            _ = cancel.cancelled() => TransferOutcome::aborted(),
            outcome = receiver => outcome.unwrap_or_else(|_| TransferOutcome::aborted()),
        }
    }
}

#[derive(Default)]
struct RemoteState {
    nodes: Mutex<HashMap<String, Node>>,
    versions_fetched: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, String)>>,
    refuse_folder: Mutex<Option<String>>,
}

#[derive(Clone, Default)]
struct FakeRemote(Arc<RemoteState>);

impl FakeRemote {
    fn put(&self, node: Node) {
        self.0.nodes.lock().unwrap().insert(node.id.clone(), node);
    }
}

impl RemoteNodes for FakeRemote {
    async fn node(&self, node_id: &str) -> Result<Node, FilesError> {
        self.0
            .nodes
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .ok_or(FilesError::MissingData("getNode"))
    }

    async fn versions(&self, node_id: &str) -> Result<Vec<Version>, FilesError> {
        self.0.versions_fetched.lock().unwrap().push(node_id.to_string());
        Ok(vec![Version {
            version: 2,
            size: 3,
            updated_at: 10,
            keep_forever: false,
        }])
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<Node, FilesError> {
        if self.0.refuse_folder.lock().unwrap().as_deref() == Some(name) {
            return Err(FilesError::MissingData("createFolder"));
        }
        self.0
            .created
            .lock()
            .unwrap()
            .push((parent_id.to_string(), name.to_string()));
        let node = child_of(folder(&format!("f-{name}"), name), parent_id);
        self.put(node.clone());
        Ok(node)
    }
}

struct Harness {
    manager: UploadManager<FakeTransport, FakeRemote>,
    transport: FakeTransport,
    remote: FakeRemote,
    cache: SharedCache,
    notifier: Arc<MemoryNotifier>,
}

fn harness(concurrency: usize) -> Harness {
    let transport = FakeTransport::default();
    let remote = FakeRemote::default();
    let cache = shared(NormalizedCache::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let manager = UploadManager::new(
        transport.clone(),
        remote.clone(),
        Arc::clone(&cache),
        notifier.clone() as Arc<dyn Notifier>,
        UploadConfig { concurrency },
    );
    Harness {
        manager,
        transport,
        remote,
        cache,
        notifier,
    }
}

fn payload(name: &str) -> UploadFile {
    UploadFile::from_bytes(name, "text/plain", name.as_bytes().to_vec())
}

fn payloads(names: &[&str]) -> Vec<UploadFile> {
    names.iter().map(|name| payload(name)).collect()
}

fn ok_body(node_id: &str) -> String {
    format!(r#"{{"nodeId":"{node_id}"}}"#)
}

fn named<'a>(items: &'a [UploadItem], name: &str) -> &'a UploadItem {
    items
        .iter()
        .find(|item| item.file.name == name)
        .expect("item with that name")
}

async fn settle(
    manager: &UploadManager<FakeTransport, FakeRemote>,
    done: impl Fn(&[UploadItem]) -> bool,
) -> Vec<UploadItem> {
    let mut updates = manager.subscribe();
    let items = tokio::time::timeout(Duration::from_secs(5), updates.wait_for(|items| done(items)))
        .await
        .expect("timed out waiting for upload state")
        .expect("manager dropped");
    items.clone()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

fn status(items: &[UploadItem], name: &str) -> Option<UploadStatus> {
    items
        .iter()
        .find(|item| item.file.name == name)
        .map(|item| item.status)
}

#[tokio::test]
async fn loading_queue_never_exceeds_limit() {
    let h = harness(2);
    let names = ["f0", "f1", "f2", "f3", "f4"];
    let report = h.manager.add(payloads(&names), "p", true);
    assert_eq!(report.accepted.len(), 5);
    assert_eq!(h.manager.loading_ids().len(), 2);
    assert_eq!(h.manager.waiting_ids().len(), 3);

    for (index, name) in names.iter().enumerate() {
        h.transport.resolve(name, 200, &ok_body(&format!("n{index}"))).await;
        settle(&h.manager, |items| {
            status(items, name) == Some(UploadStatus::Completed)
        })
        .await;
        assert!(h.manager.loading_ids().len() <= 2);
    }

    assert!(h.manager.loading_ids().is_empty());
    assert!(h.manager.waiting_ids().is_empty());
    assert_eq!(h.transport.started(), names);
}

#[tokio::test]
async fn completion_promotes_waiting_head() {
    let h = harness(1);
    let report = h.manager.add(payloads(&["a", "b", "c"]), "p", true);
    let (b, c) = (report.accepted[1].clone(), report.accepted[2].clone());
    assert_eq!(h.manager.waiting_ids(), vec![b.clone(), c.clone()]);

    h.transport.resolve("a", 200, &ok_body("n-a")).await;
    let items = settle(&h.manager, |items| {
        status(items, "a") == Some(UploadStatus::Completed)
    })
    .await;

    let promoted = named(&items, "b");
    assert_eq!(promoted.status, UploadStatus::Loading);
    assert_eq!(promoted.percentage, 0);
    assert_eq!(named(&items, "c").status, UploadStatus::Queued);
    assert_eq!(h.manager.loading_ids(), vec![b]);
    assert_eq!(h.manager.waiting_ids(), vec![c]);
}

#[tokio::test]
async fn failure_also_promotes_waiting_head() {
    let h = harness(1);
    h.manager.add(payloads(&["a", "b"]), "p", true);

    h.transport.resolve("a", 413, "").await;
    let items = settle(&h.manager, |items| {
        status(items, "a") == Some(UploadStatus::Failed)
    })
    .await;
    assert_eq!(named(&items, "b").status, UploadStatus::Loading);
}

#[tokio::test]
async fn removing_twice_equals_removing_once() {
    let h = harness(1);
    let report = h.manager.add(payloads(&["a", "b"]), "p", true);
    let a = report.accepted[0].clone();
    let b = report.accepted[1].clone();

    h.manager.remove_by_id(std::slice::from_ref(&a));
    let after_first = h.manager.snapshot();
    h.manager.remove_by_id(std::slice::from_ref(&a));

    assert_eq!(h.manager.snapshot(), after_first);
    assert!(h.manager.item(&a).is_none());
    assert_eq!(h.manager.loading_ids(), vec![b.clone()]);

    h.transport.resolve("b", 200, &ok_body("n-b")).await;
    settle(&h.manager, |items| {
        status(items, "b") == Some(UploadStatus::Completed)
    })
    .await;
    assert!(h.manager.item(&a).is_none());
}

#[tokio::test]
async fn retry_is_rejected_for_loading_and_completed_items() {
    let h = harness(2);
    let report = h.manager.add(payloads(&["a"]), "p", true);
    let a = report.accepted[0].clone();

    let before = h.manager.item(&a).unwrap();
    let err = h.manager.retry_by_id(std::slice::from_ref(&a)).unwrap_err();
    assert!(matches!(err, UploadError::NotRetryable { status: UploadStatus::Loading, .. }));
    assert_eq!(h.manager.item(&a).unwrap(), before);

    h.transport.resolve("a", 200, &ok_body("n-a")).await;
    settle(&h.manager, |items| {
        status(items, "a") == Some(UploadStatus::Completed)
    })
    .await;
    let completed = h.manager.item(&a).unwrap();
    let err = h.manager.retry_by_id(std::slice::from_ref(&a)).unwrap_err();
    assert!(matches!(err, UploadError::NotRetryable { status: UploadStatus::Completed, .. }));
    assert_eq!(h.manager.item(&a).unwrap(), completed);

    let err = h.manager.retry_by_id(&["missing".to_string()]).unwrap_err();
    assert!(matches!(err, UploadError::UnknownUpload(_)));
}

#[tokio::test]
async fn failed_retry_batch_leaves_valid_items_untouched() {
    let h = harness(1);
    let report = h.manager.add(payloads(&["a", "b"]), "p", true);
    let (a, b) = (report.accepted[0].clone(), report.accepted[1].clone());

    let err = h.manager.retry_by_id(&[b.clone(), a.clone()]).unwrap_err();
    assert!(matches!(err, UploadError::NotRetryable { .. }));
    assert_eq!(h.manager.item(&b).unwrap().status, UploadStatus::Queued);
    assert_eq!(h.manager.waiting_ids(), vec![b]);
}

#[tokio::test]
async fn failed_upload_can_be_retried() {
    let h = harness(2);
    let report = h.manager.add(payloads(&["a"]), "p", true);
    let a = report.accepted[0].clone();

    h.transport.resolve("a", 413, "").await;
    settle(&h.manager, |items| {
        status(items, "a") == Some(UploadStatus::Failed)
    })
    .await;
    let notes = h.notifier.take();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].severity, Severity::Warning);

    h.manager.retry_by_id(std::slice::from_ref(&a)).unwrap();
    let retried = h.manager.item(&a).unwrap();
    assert_eq!(retried.status, UploadStatus::Loading);
    assert_eq!(retried.percentage, 0);

    h.transport.resolve("a", 200, &ok_body("n-a")).await;
    let items = settle(&h.manager, |items| {
        status(items, "a") == Some(UploadStatus::Completed)
    })
    .await;
    assert_eq!(named(&items, "a").node_id.as_deref(), Some("n-a"));
    assert_eq!(h.transport.started(), vec!["a", "a"]);
}

#[tokio::test]
async fn retrying_a_queued_item_starts_it_outside_the_bound() {
    let h = harness(1);
    let report = h.manager.add(payloads(&["a", "b"]), "p", true);
    let b = report.accepted[1].clone();

    h.manager.retry_by_id(std::slice::from_ref(&b)).unwrap();
    assert!(h.manager.waiting_ids().is_empty());
    assert_eq!(h.manager.loading_ids().len(), 1);
    assert_eq!(h.manager.item(&b).unwrap().status, UploadStatus::Loading);

    h.transport.resolve("b", 200, &ok_body("n-b")).await;
    settle(&h.manager, |items| {
        status(items, "b") == Some(UploadStatus::Completed)
    })
    .await;
    assert_eq!(h.manager.loading_ids().len(), 1);
}

#[tokio::test]
async fn every_terminal_outcome_settles_in_exactly_one_state() {
    let h = harness(10);
    let cases: [(&str, u16, &str, UploadStatus); 7] = [
        ("ok", 200, r#"{"nodeId":"n-ok"}"#, UploadStatus::Completed),
        ("garbled", 200, "not json", UploadStatus::Failed),
        ("aborted", 0, "", UploadStatus::Failed),
        ("versions", 406, "", UploadStatus::Failed),
        ("large", 413, "", UploadStatus::Failed),
        ("duplicate", 500, "", UploadStatus::Failed),
        ("odd", 502, "", UploadStatus::Failed),
    ];
    let names: Vec<&str> = cases.iter().map(|case| case.0).collect();
    h.manager.add(payloads(&names), "p", true);

    for (name, status, body, _) in &cases {
        h.transport.resolve(name, *status, body).await;
    }
    let items = settle(&h.manager, |items| {
        items.iter().all(|item| item.status.is_terminal())
    })
    .await;

    for (name, _, _, expected) in &cases {
        assert_eq!(named(&items, name).status, *expected, "{name}");
    }
    assert_eq!(named(&items, "ok").percentage, 100);

    // Aborts are silent; every other failure is reported once.
    let notifier = Arc::clone(&h.notifier);
    let mut seen = Vec::new();
    eventually(|| {
        seen.extend(notifier.take());
        seen.len() >= 5
    })
    .await;
    assert_eq!(seen.len(), 5);
    assert_eq!(
        seen.iter().filter(|n| n.severity == Severity::Error).count(),
        2
    );
}

#[tokio::test]
async fn repeated_terminal_events_are_ignored() {
    let h = harness(1);
    let report = h.manager.add(payloads(&["a"]), "p", true);
    let a = report.accepted[0].clone();
    h.transport.resolve("a", 200, &ok_body("n-a")).await;
    settle(&h.manager, |items| {
        status(items, "a") == Some(UploadStatus::Completed)
    })
    .await;

    let late = TransferOutcome {
        status: 500,
        body: String::new(),
    };
    assert!(h.manager.inner.finish(&a, 1, late.clone()).is_none());
    assert!(h.manager.inner.finish(&a, 0, late).is_none());
    assert_eq!(h.manager.item(&a).unwrap().status, UploadStatus::Completed);
}

#[tokio::test]
async fn probable_directories_are_rejected_with_a_warning() {
    let h = harness(2);
    let directory = UploadFile::from_bytes("photos", "", vec![0u8; 4096]);
    let report = h
        .manager
        .add(vec![directory, payload("a.txt")], "p", true);

    assert_eq!(report.rejection, Rejection::Some);
    assert_eq!(report.accepted.len(), 1);
    let rejected = h.manager.item(&report.rejected[0]).unwrap();
    assert_eq!(rejected.status, UploadStatus::Failed);
    assert!(!h.manager.loading_ids().contains(&rejected.id));

    let notes = h.notifier.take();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].more_info);

    let err = h
        .manager
        .retry_by_id(std::slice::from_ref(&rejected.id))
        .unwrap_err();
    assert!(matches!(err, UploadError::NoTransfer(_)));

    let report = h.manager.add(
        vec![UploadFile::from_bytes("music", "", Vec::new())],
        "p",
        true,
    );
    assert_eq!(report.rejection, Rejection::All);
}

#[tokio::test]
async fn detection_can_be_disabled() {
    let h = harness(2);
    let report = h
        .manager
        .add(vec![UploadFile::from_bytes("empty", "", Vec::new())], "p", false);
    assert_eq!(report.rejection, Rejection::None);
    assert_eq!(report.accepted.len(), 1);
    assert!(h.notifier.take().is_empty());
}

#[tokio::test]
async fn completed_upload_is_spliced_into_cached_parent() {
    let h = harness(2);
    {
        let mut cache = lock_cache(&h.cache);
        cache.write_node(folder("p", "p"));
        cache.write_children(
            "p",
            NodeSort::NameAsc,
            NodePage {
                nodes: vec![
                    child_of(file("a", "a.txt", 1), "p"),
                    child_of(file("c", "c.txt", 1), "p"),
                ],
                page_token: None,
            },
        );
    }
    h.remote.put(child_of(file("n-b", "b.txt", 1), "p"));

    h.manager.add(payloads(&["b.txt"]), "p", true);
    h.transport.resolve("b.txt", 200, &ok_body("n-b")).await;

    let cache = Arc::clone(&h.cache);
    let key = FieldKey::children("p", NodeSort::NameAsc);
    eventually(|| {
        lock_cache(&cache)
            .list(&key)
            .is_some_and(|list| list.ordered == ["a", "n-b", "c"])
    })
    .await;
}

#[tokio::test]
async fn version_upload_bypasses_queue_and_refreshes_versions() {
    let h = harness(1);
    h.manager.add(payloads(&["a"]), "p", true);
    h.remote.put(file("n1", "doc.txt", 3));

    let id = h.manager.update("n1", payload("doc.txt"), true);
    assert_eq!(h.manager.loading_ids().len(), 1);
    assert!(!h.manager.loading_ids().contains(&id));
    assert_eq!(h.manager.item(&id).unwrap().status, UploadStatus::Loading);
    assert_eq!(h.manager.item(&id).unwrap().node_id.as_deref(), Some("n1"));

    h.transport.resolve("doc.txt", 200, r#"{"nodeId":"n1","version":2}"#).await;
    let cache = Arc::clone(&h.cache);
    eventually(|| lock_cache(&cache).versions("n1").is_some()).await;
    assert_eq!(*h.remote.0.versions_fetched.lock().unwrap(), vec!["n1"]);
    assert_eq!(h.manager.waiting_ids().len(), 0);
}

#[tokio::test]
async fn progress_only_moves_forward() {
    let h = harness(1);
    h.transport.script_progress(vec![(1, 4), (3, 4), (2, 4)]);
    let report = h.manager.add(payloads(&["a"]), "p", true);
    let a = report.accepted[0].clone();

    let items = settle(&h.manager, |items| items[0].percentage == 75).await;
    assert_eq!(items[0].status, UploadStatus::Loading);
    tokio::task::yield_now().await;
    assert_eq!(h.manager.item(&a).unwrap().percentage, 75);
}

#[tokio::test]
async fn ids_are_unique_within_a_burst() {
    let h = harness(1);
    let names: Vec<String> = (0..100).map(|n| format!("f{n}")).collect();
    let files = names.iter().map(|name| payload(name)).collect();
    let report = h.manager.add(files, "p", true);
    let unique: HashSet<&String> = report.accepted.iter().collect();
    assert_eq!(unique.len(), 100);
}

#[tokio::test]
async fn removal_by_node_id_and_completed_sweep() {
    let h = harness(3);
    let report = h.manager.add(payloads(&["a", "b", "c"]), "p", true);
    h.transport.resolve("a", 200, &ok_body("n-a")).await;
    h.transport.resolve("b", 200, &ok_body("n-b")).await;
    settle(&h.manager, |items| {
        items
            .iter()
            .filter(|item| item.status == UploadStatus::Completed)
            .count()
            == 2
    })
    .await;

    h.manager.remove_by_node_id(&["n-a".to_string()]);
    assert!(h.manager.item(&report.accepted[0]).is_none());
    assert!(h.manager.item(&report.accepted[1]).is_some());

    h.manager.remove_all_completed();
    let remaining = h.manager.snapshot();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].file.name, "c");
}

#[tokio::test]
async fn folder_upload_creates_parents_first() {
    let h = harness(4);
    let dir = tempdir().unwrap();
    let root = dir.path().join("photos");
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("a.txt"), b"a").unwrap();
    std::fs::write(root.join("sub").join("b.txt"), b"b").unwrap();

    let report = h.manager.add_folders(&[root], "p").await.unwrap();

    assert_eq!(
        *h.remote.0.created.lock().unwrap(),
        vec![
            ("p".to_string(), "photos".to_string()),
            ("f-photos".to_string(), "sub".to_string()),
        ]
    );
    assert_eq!(report.folders, vec!["f-photos", "f-sub"]);
    assert_eq!(report.uploads.len(), 2);

    let items = h.manager.snapshot();
    assert_eq!(named(&items, "a.txt").parent_id.as_deref(), Some("f-photos"));
    assert_eq!(named(&items, "b.txt").parent_id.as_deref(), Some("f-sub"));
}

#[tokio::test]
async fn folder_creation_failure_skips_its_subtree() {
    let h = harness(4);
    *h.remote.0.refuse_folder.lock().unwrap() = Some("sub".into());
    let dir = tempdir().unwrap();
    let root = dir.path().join("photos");
    std::fs::create_dir_all(root.join("sub").join("deeper")).unwrap();
    std::fs::write(root.join("a.txt"), b"a").unwrap();
    std::fs::write(root.join("sub").join("b.txt"), b"b").unwrap();

    let report = h.manager.add_folders(&[root], "p").await.unwrap();

    assert_eq!(
        report,
        FolderUploadReport {
            folders: vec!["f-photos".into()],
            uploads: report.uploads.clone(),
            failed_folders: vec![
                std::path::PathBuf::from("photos/sub"),
                std::path::PathBuf::from("photos/sub/deeper"),
            ],
            skipped_files: vec![],
        }
    );
    assert_eq!(report.uploads.len(), 1);
    assert_eq!(h.notifier.take().len(), 1);
}
