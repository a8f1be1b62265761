//! Directory detection for picked payloads.
//!
//! File pickers cannot reliably tell files from directories. A payload with
//! no MIME type whose size is a multiple of the filesystem block size is
//! assumed to be a directory. This misclassifies block-aligned (including
//! empty) files without a known type; the rejection notice shown to the user
//! depends on this behavior, so it is kept as is.

use super::file::UploadFile;

pub const DIRECTORY_BLOCK_SIZE: u64 = 4096;

pub fn is_probably_directory(file: &UploadFile) -> bool {
    file.mime_type.is_empty() && file.size % DIRECTORY_BLOCK_SIZE == 0
}

/// How many of the payloads passed to one `add` call were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    None,
    Some,
    All,
}

impl Rejection {
    pub fn from_counts(rejected: usize, total: usize) -> Self {
        match rejected {
            0 => Rejection::None,
            n if n == total => Rejection::All,
            _ => Rejection::Some,
        }
    }

    pub fn message(&self) -> Option<&'static str> {
        match self {
            Rejection::None => None,
            Rejection::Some => Some(
                "Some of the selected items are folders and were not uploaded. Use folder upload instead.",
            ),
            Rejection::All => {
                Some("Folders cannot be uploaded this way. Use folder upload instead.")
            }
        }
    }
}
