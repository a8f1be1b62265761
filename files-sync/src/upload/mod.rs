//! Upload queue: bounded concurrent transfers with per-item progress, retry
//! and cancellation.

mod classify;
mod file;
mod folders;
mod manager;
mod remote;
mod store;
mod transfer;

use thiserror::Error;

pub use classify::{DIRECTORY_BLOCK_SIZE, Rejection, is_probably_directory};
pub use file::{FileSource, UploadFile};
pub use folders::FolderUploadReport;
pub use manager::{AddReport, UploadConfig, UploadManager, UploadRetraction};
pub use remote::RemoteNodes;
pub use transfer::{
    HttpUploadTransport, ProgressFn, TransferError, TransferOutcome, TransferRequest,
    UploadTransport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    Queued,
    Loading,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub id: String,
    pub file: UploadFile,
    /// Destination folder; `None` for version uploads.
    pub parent_id: Option<String>,
    /// Set on completion, or up front for version uploads.
    pub node_id: Option<String>,
    pub percentage: u8,
    pub status: UploadStatus,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unknown upload {0}")]
    UnknownUpload(String),
    #[error("upload {id} cannot be retried while {status:?}")]
    NotRetryable { id: String, status: UploadStatus },
    #[error("upload {0} has no transfer to retry")]
    NoTransfer(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
