//! Folder uploads: recreate a local directory tree remotely, then upload its
//! files into the matching remote folders.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::file::UploadFile;
use super::manager::UploadManager;
use super::remote::RemoteNodes;
use super::transfer::UploadTransport;
use super::UploadError;
use crate::cache::mutations::on_create;
use crate::cache::store::lock as lock_cache;
use crate::notify::Notification;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FolderUploadReport {
    /// Ids of the remote folders created, parents first.
    pub folders: Vec<String>,
    /// Upload ids of the queued files.
    pub uploads: Vec<String>,
    /// Local folders (relative to their root's parent) that could not be
    /// created; their contents were skipped.
    pub failed_folders: Vec<PathBuf>,
    /// Files that could not be read; the rest of the tree still uploads.
    pub skipped_files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct LocalTree {
    /// Relative folder paths, every parent before its children.
    folders: Vec<PathBuf>,
    /// (relative parent folder, absolute file path)
    files: Vec<(PathBuf, PathBuf)>,
}

/// Reads the files of every created folder, grouped by remote folder id.
/// Unreadable files go to `skipped`.
async fn load_batches(
    files: &[(PathBuf, PathBuf)],
    remote_ids: &HashMap<PathBuf, String>,
    skipped: &mut Vec<PathBuf>,
) -> BTreeMap<String, Vec<UploadFile>> {
    let mut batches: BTreeMap<String, Vec<UploadFile>> = BTreeMap::new();
    for (folder, path) in files {
        let Some(remote_id) = remote_ids.get(folder) else {
            continue;
        };
        match UploadFile::from_path(path).await {
            Ok(file) => batches.entry(remote_id.clone()).or_default().push(file),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping unreadable file");
                skipped.push(path.clone());
            }
        }
    }
    batches
}

async fn walk(root: &Path) -> io::Result<LocalTree> {
    if root.file_name().is_none() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "folder path has no name"));
    }
    let base = root.parent().unwrap_or_else(|| Path::new(""));
    let mut tree = LocalTree::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let relative = dir.strip_prefix(base).unwrap_or(&dir).to_path_buf();
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            entries.push((entry.path(), entry.file_type().await?));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut subfolders = Vec::new();
        for (path, file_type) in entries {
            if file_type.is_dir() {
                subfolders.push(path);
            } else if file_type.is_file() {
                tree.files.push((relative.clone(), path));
            } else {
                debug!(path = %path.display(), "skipping special file");
            }
        }
        pending.extend(subfolders.into_iter().rev());
        tree.folders.push(relative);
    }
    Ok(tree)
}

impl<T: UploadTransport, N: RemoteNodes> UploadManager<T, N> {
    /// Uploads each directory in `roots` into `parent_id`, keeping its
    /// structure. Folders are created one at a time so that a parent exists
    /// before its children; files are then queued per folder.
    pub async fn add_folders(
        &self,
        roots: &[PathBuf],
        parent_id: &str,
    ) -> Result<FolderUploadReport, UploadError> {
        let mut report = FolderUploadReport::default();
        for root in roots {
            let tree = walk(root).await?;
            let mut remote_ids: HashMap<PathBuf, String> = HashMap::new();

            for folder in &tree.folders {
                let parent_remote = match folder.parent().filter(|p| !p.as_os_str().is_empty()) {
                    None => Some(parent_id.to_string()),
                    Some(parent) => remote_ids.get(parent).cloned(),
                };
                let Some(parent_remote) = parent_remote else {
                    report.failed_folders.push(folder.clone());
                    continue;
                };
                let name = folder
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();

                match self.inner.remote.create_folder(&parent_remote, &name).await {
                    Ok(node) => {
                        {
                            let mut cache = lock_cache(&self.inner.cache);
                            on_create(&mut cache, &node);
                        }
                        remote_ids.insert(folder.clone(), node.id.clone());
                        report.folders.push(node.id);
                    }
                    Err(err) => {
                        warn!(
                            folder = %folder.display(),
                            error = %err,
                            "failed to create remote folder"
                        );
                        self.inner
                            .notifier
                            .notify(Notification::error(format!("Could not create folder {name}")));
                        report.failed_folders.push(folder.clone());
                    }
                }
            }

            let skipped_before = report.skipped_files.len();
            let batches = load_batches(&tree.files, &remote_ids, &mut report.skipped_files).await;
            let skipped = report.skipped_files.len() - skipped_before;
            if skipped > 0 {
                self.inner.notifier.notify(
                    Notification::warning(format!(
                        "{skipped} files could not be read and were skipped"
                    ))
                    .with_more_info(),
                );
            }
            for (remote_id, files) in batches {
                let added = self.add(files, &remote_id, false);
                report.uploads.extend(added.accepted);
            }
            info!(
                root = %root.display(),
                folders = report.folders.len(),
                uploads = report.uploads.len(),
                "queued folder upload"
            );
        }
        Ok(report)
    }
}
