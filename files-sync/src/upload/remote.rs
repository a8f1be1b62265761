use std::future::Future;

use files_core::{FilesClient, FilesError, Node, Version};

/// The node lookups the upload manager needs once a transfer completes, and
/// folder creation for folder uploads.
pub trait RemoteNodes: Send + Sync + 'static {
    fn node(&self, node_id: &str) -> impl Future<Output = Result<Node, FilesError>> + Send;

    fn versions(
        &self,
        node_id: &str,
    ) -> impl Future<Output = Result<Vec<Version>, FilesError>> + Send;

    fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Node, FilesError>> + Send;
}

impl RemoteNodes for FilesClient {
    async fn node(&self, node_id: &str) -> Result<Node, FilesError> {
        self.get_node(node_id).await
    }

    async fn versions(&self, node_id: &str) -> Result<Vec<Version>, FilesError> {
        self.get_versions(node_id).await
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<Node, FilesError> {
        FilesClient::create_folder(self, parent_id, name).await
    }
}
