mod client;
pub mod links;
mod model;
pub mod queries;
pub mod upload;

pub use client::{FilesClient, FilesError, AUTH_COOKIE, GRAPHQL_PATH};
pub use model::{
    LOCAL_ROOT, Node, NodeFilter, NodeKind, NodePage, NodeSort, PreviewFormat, PreviewQuality,
    Share, SharePermission, TRASH_ROOT, User, Version,
};
pub use upload::{UploadFailure, UploadResponse, UploadTarget};
