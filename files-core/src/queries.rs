//! GraphQL documents sent by [`crate::FilesClient`].

// Every document that returns nodes carries the shared `NodeFields` fragment.
macro_rules! document {
    ($body:literal) => {
        concat!(
            $body,
            " fragment NodeFields on Node { __typename id name updatedAt flagged rootId mimeType version parentId owner { id fullName email } lastEditor { id fullName email } shares { shareTarget { id fullName email } permission createdAt } ... on File { size } }"
        )
    };
}

pub const GET_NODE: &str = document!(
    "query getNode($node_id: ID!) { getNode(node_id: $node_id) { ...NodeFields } }"
);

pub const GET_CHILDREN: &str = document!(
    "query getChildren($node_id: ID!, $children_limit: Int!, $sort: NodeSort!, $page_token: String) { getNode(node_id: $node_id) { ... on Folder { children(limit: $children_limit, sort: $sort, page_token: $page_token) { nodes { ...NodeFields } page_token } } } }"
);

pub const FIND_NODES: &str = document!(
    "query findNodes($flagged: Boolean, $shared_by_me: Boolean, $shared_with_me: Boolean, $folder_id: String, $cascade: Boolean, $keywords: [String!], $sort: NodeSort!, $limit: Int!, $page_token: String) { findNodes(flagged: $flagged, shared_by_me: $shared_by_me, shared_with_me: $shared_with_me, folder_id: $folder_id, cascade: $cascade, keywords: $keywords, sort: $sort, limit: $limit, page_token: $page_token) { nodes { ...NodeFields } page_token } }"
);

pub const GET_PATH: &str = document!(
    "query getPath($node_id: ID!) { getPath(node_id: $node_id) { ...NodeFields } }"
);

pub const GET_VERSIONS: &str = "query getVersions($node_id: ID!) { getVersions(node_id: $node_id) { version size updatedAt keepForever } }";

pub const CREATE_FOLDER: &str = document!(
    "mutation createFolder($destination_id: String!, $name: String!) { createFolder(destination_id: $destination_id, name: $name) { ...NodeFields } }"
);

pub const MOVE_NODES: &str = document!(
    "mutation moveNodes($node_ids: [ID!], $destination_id: ID!) { moveNodes(node_ids: $node_ids, destination_id: $destination_id) { ...NodeFields } }"
);

pub const COPY_NODES: &str = document!(
    "mutation copyNodes($node_ids: [ID!], $destination_id: ID!) { copyNodes(node_ids: $node_ids, destination_id: $destination_id) { ...NodeFields } }"
);

pub const DELETE_NODES: &str =
    "mutation deleteNodes($node_ids: [ID!]) { deleteNodes(node_ids: $node_ids) }";

pub const TRASH_NODES: &str =
    "mutation trashNodes($node_ids: [ID!]) { trashNodes(node_ids: $node_ids) }";

pub const RESTORE_NODES: &str = document!(
    "mutation restoreNodes($node_ids: [ID!]) { restoreNodes(node_ids: $node_ids) { ...NodeFields } }"
);

pub const FLAG_NODES: &str =
    "mutation flagNodes($node_ids: [ID!], $flag: Boolean!) { flagNodes(node_ids: $node_ids, flag: $flag) }";

pub const UPDATE_NODE: &str = document!(
    "mutation updateNode($node_id: String!, $name: String) { updateNode(node_id: $node_id, name: $name) { ...NodeFields } }"
);

pub const CREATE_SHARE: &str = "mutation createShare($node_id: ID!, $share_target_id: ID!, $permission: SharePermission!) { createShare(node_id: $node_id, share_target_id: $share_target_id, permission: $permission) { shareTarget { id fullName email } permission createdAt } }";

pub const UPDATE_SHARE: &str = "mutation updateShare($node_id: ID!, $share_target_id: ID!, $permission: SharePermission!) { updateShare(node_id: $node_id, share_target_id: $share_target_id, permission: $permission) { shareTarget { id fullName email } permission createdAt } }";

pub const DELETE_SHARE: &str = "mutation deleteShare($node_id: ID!, $share_target_id: ID!) { deleteShare(node_id: $node_id, share_target_id: $share_target_id) }";

pub const DELETE_VERSIONS: &str = "mutation deleteVersions($node_id: ID!, $versions: [Int!]) { deleteVersions(node_id: $node_id, versions: $versions) }";

pub const KEEP_VERSIONS: &str = "mutation keepVersions($node_id: ID!, $versions: [Int!]!, $keep_forever: Boolean!) { keepVersions(node_id: $node_id, versions: $versions, keep_forever: $keep_forever) }";
