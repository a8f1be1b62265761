use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::model::{Node, NodeFilter, NodePage, NodeSort, Share, SharePermission, Version};
use crate::queries;

pub const GRAPHQL_PATH: &str = "/services/files/graphql";
pub const AUTH_COOKIE: &str = "ZM_AUTH_TOKEN";

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("graphql errors: {}", messages.join("; "))]
    Graphql { messages: Vec<String> },
    #[error("response is missing field `{0}`")]
    MissingData(&'static str),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct FilesClient {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlRequest<'a> {
    operation_name: &'a str,
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

impl FilesClient {
    pub fn new(base_url: &str) -> Result<Self, FilesError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn auth_cookie(&self) -> Option<String> {
        self.auth_token
            .as_ref()
            .map(|token| format!("{AUTH_COOKIE}={token}"))
    }

    pub async fn get_node(&self, node_id: &str) -> Result<Node, FilesError> {
        self.execute(
            "getNode",
            queries::GET_NODE,
            json!({ "node_id": node_id }),
            "getNode",
        )
        .await
    }

    pub async fn get_children(
        &self,
        folder_id: &str,
        sort: NodeSort,
        limit: u32,
        page_token: Option<&str>,
    ) -> Result<NodePage, FilesError> {
        #[derive(Deserialize)]
        struct Children {
            children: NodePage,
        }
        let folder: Children = self
            .execute(
                "getChildren",
                queries::GET_CHILDREN,
                json!({
                    "node_id": folder_id,
                    "children_limit": limit,
                    "sort": sort,
                    "page_token": page_token,
                }),
                "getNode",
            )
            .await?;
        Ok(folder.children)
    }

    pub async fn find_nodes(
        &self,
        filter: &NodeFilter,
        sort: NodeSort,
        limit: u32,
        page_token: Option<&str>,
    ) -> Result<NodePage, FilesError> {
        let mut variables = serde_json::to_value(filter)?;
        if let Value::Object(map) = &mut variables {
            map.insert("sort".into(), serde_json::to_value(sort)?);
            map.insert("limit".into(), json!(limit));
            map.insert("page_token".into(), json!(page_token));
        }
        self.execute("findNodes", queries::FIND_NODES, variables, "findNodes")
            .await
    }

    pub async fn get_path(&self, node_id: &str) -> Result<Vec<Node>, FilesError> {
        self.execute(
            "getPath",
            queries::GET_PATH,
            json!({ "node_id": node_id }),
            "getPath",
        )
        .await
    }

    pub async fn get_versions(&self, node_id: &str) -> Result<Vec<Version>, FilesError> {
        self.execute(
            "getVersions",
            queries::GET_VERSIONS,
            json!({ "node_id": node_id }),
            "getVersions",
        )
        .await
    }

    pub async fn create_folder(&self, parent_id: &str, name: &str) -> Result<Node, FilesError> {
        self.execute(
            "createFolder",
            queries::CREATE_FOLDER,
            json!({ "destination_id": parent_id, "name": name }),
            "createFolder",
        )
        .await
    }

    pub async fn move_nodes(
        &self,
        node_ids: &[String],
        destination_id: &str,
    ) -> Result<Vec<Node>, FilesError> {
        self.execute(
            "moveNodes",
            queries::MOVE_NODES,
            json!({ "node_ids": node_ids, "destination_id": destination_id }),
            "moveNodes",
        )
        .await
    }

    pub async fn copy_nodes(
        &self,
        node_ids: &[String],
        destination_id: &str,
    ) -> Result<Vec<Node>, FilesError> {
        self.execute(
            "copyNodes",
            queries::COPY_NODES,
            json!({ "node_ids": node_ids, "destination_id": destination_id }),
            "copyNodes",
        )
        .await
    }

    pub async fn delete_nodes(&self, node_ids: &[String]) -> Result<Vec<String>, FilesError> {
        self.execute(
            "deleteNodes",
            queries::DELETE_NODES,
            json!({ "node_ids": node_ids }),
            "deleteNodes",
        )
        .await
    }

    pub async fn trash_nodes(&self, node_ids: &[String]) -> Result<Vec<String>, FilesError> {
        self.execute(
            "trashNodes",
            queries::TRASH_NODES,
            json!({ "node_ids": node_ids }),
            "trashNodes",
        )
        .await
    }

    pub async fn restore_nodes(&self, node_ids: &[String]) -> Result<Vec<Node>, FilesError> {
        self.execute(
            "restoreNodes",
            queries::RESTORE_NODES,
            json!({ "node_ids": node_ids }),
            "restoreNodes",
        )
        .await
    }

    pub async fn flag_nodes(
        &self,
        node_ids: &[String],
        flag: bool,
    ) -> Result<Vec<String>, FilesError> {
        self.execute(
            "flagNodes",
            queries::FLAG_NODES,
            json!({ "node_ids": node_ids, "flag": flag }),
            "flagNodes",
        )
        .await
    }

    pub async fn update_node(&self, node_id: &str, name: &str) -> Result<Node, FilesError> {
        self.execute(
            "updateNode",
            queries::UPDATE_NODE,
            json!({ "node_id": node_id, "name": name }),
            "updateNode",
        )
        .await
    }

    pub async fn create_share(
        &self,
        node_id: &str,
        share_target_id: &str,
        permission: SharePermission,
    ) -> Result<Share, FilesError> {
        self.execute(
            "createShare",
            queries::CREATE_SHARE,
            json!({
                "node_id": node_id,
                "share_target_id": share_target_id,
                "permission": permission,
            }),
            "createShare",
        )
        .await
    }

    pub async fn update_share(
        &self,
        node_id: &str,
        share_target_id: &str,
        permission: SharePermission,
    ) -> Result<Share, FilesError> {
        self.execute(
            "updateShare",
            queries::UPDATE_SHARE,
            json!({
                "node_id": node_id,
                "share_target_id": share_target_id,
                "permission": permission,
            }),
            "updateShare",
        )
        .await
    }

    pub async fn delete_share(
        &self,
        node_id: &str,
        share_target_id: &str,
    ) -> Result<bool, FilesError> {
        self.execute(
            "deleteShare",
            queries::DELETE_SHARE,
            json!({ "node_id": node_id, "share_target_id": share_target_id }),
            "deleteShare",
        )
        .await
    }

    pub async fn delete_versions(
        &self,
        node_id: &str,
        versions: &[u32],
    ) -> Result<Vec<u32>, FilesError> {
        self.execute(
            "deleteVersions",
            queries::DELETE_VERSIONS,
            json!({ "node_id": node_id, "versions": versions }),
            "deleteVersions",
        )
        .await
    }

    pub async fn keep_versions(
        &self,
        node_id: &str,
        versions: &[u32],
        keep_forever: bool,
    ) -> Result<Vec<u32>, FilesError> {
        self.execute(
            "keepVersions",
            queries::KEEP_VERSIONS,
            json!({ "node_id": node_id, "versions": versions, "keep_forever": keep_forever }),
            "keepVersions",
        )
        .await
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, FilesError> {
        Ok(self.base_url.join(path)?)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        query: &str,
        variables: Value,
        field: &'static str,
    ) -> Result<T, FilesError> {
        let url = self.endpoint(GRAPHQL_PATH)?;
        let mut request = self.http.post(url).json(&GraphqlRequest {
            operation_name,
            query,
            variables,
        });
        if let Some(cookie) = self.auth_cookie() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request.send().await?;
        let payload: GraphqlResponse = Self::handle_response(response).await?;
        if !payload.errors.is_empty() {
            return Err(FilesError::Graphql {
                messages: payload.errors.into_iter().map(|e| e.message).collect(),
            });
        }
        let value = payload
            .data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .filter(|value| !value.is_null())
            .ok_or(FilesError::MissingData(field))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FilesError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FilesError::Api { status, body })
        }
    }
}
