use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// A file-like payload handed to the upload manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    /// Empty when the picker could not tell.
    pub mime_type: String,
    pub size: u64,
    pub source: FileSource,
}

impl UploadFile {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let data: Arc<[u8]> = data.into().into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// Describes a local path the way a browser file picker would: directories
    /// come back with no MIME type and their on-disk block size.
    pub async fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let mime_type = if metadata.is_dir() {
            String::new()
        } else {
            guess_mime(path)
        };
        Ok(Self {
            name,
            mime_type,
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
