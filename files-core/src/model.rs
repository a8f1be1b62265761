use serde::{Deserialize, Serialize};

pub const LOCAL_ROOT: &str = "LOCAL_ROOT";
pub const TRASH_ROOT: &str = "TRASH_ROOT";

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Folder,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SharePermission {
    ReadOnly,
    ReadAndWrite,
    ReadAndShare,
    ReadWriteAndShare,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub share_target: User,
    pub permission: SharePermission,
    #[serde(default)]
    pub created_at: i64,
}

/// A file or folder as the backend returns it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "__typename")]
    pub kind: NodeKind,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub root_id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub owner: Option<User>,
    #[serde(default)]
    pub last_editor: Option<User>,
    /// `None` when the backend did not send the field at all.
    #[serde(default)]
    pub shares: Option<Vec<Share>>,
}

impl Node {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn is_trashed(&self) -> bool {
        self.root_id.as_deref() == Some(TRASH_ROOT)
    }

    /// Folders carry no intrinsic size.
    pub fn effective_size(&self) -> u64 {
        match self.kind {
            NodeKind::Folder => 0,
            NodeKind::File => self.size.unwrap_or(0),
        }
    }

    pub fn is_shared_with(&self, user_id: &str) -> bool {
        self.shares
            .as_ref()
            .is_some_and(|shares| shares.iter().any(|s| s.share_target.id == user_id))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version: u32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub keep_forever: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeSort {
    #[default]
    NameAsc,
    NameDesc,
    UpdatedAtAsc,
    UpdatedAtDesc,
    SizeAsc,
    SizeDesc,
    TypeAsc,
    TypeDesc,
    OwnerAsc,
    OwnerDesc,
    LastEditorAsc,
    LastEditorDesc,
}

impl NodeSort {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.to_ascii_uppercase().as_str() {
            "NAME_ASC" => NodeSort::NameAsc,
            "NAME_DESC" => NodeSort::NameDesc,
            "UPDATED_AT_ASC" => NodeSort::UpdatedAtAsc,
            "UPDATED_AT_DESC" => NodeSort::UpdatedAtDesc,
            "SIZE_ASC" => NodeSort::SizeAsc,
            "SIZE_DESC" => NodeSort::SizeDesc,
            "TYPE_ASC" => NodeSort::TypeAsc,
            "TYPE_DESC" => NodeSort::TypeDesc,
            "OWNER_ASC" => NodeSort::OwnerAsc,
            "OWNER_DESC" => NodeSort::OwnerDesc,
            "LAST_EDITOR_ASC" => NodeSort::LastEditorAsc,
            "LAST_EDITOR_DESC" => NodeSort::LastEditorDesc,
            _ => return None,
        })
    }

    pub fn is_size(&self) -> bool {
        matches!(self, NodeSort::SizeAsc | NodeSort::SizeDesc)
    }

    pub fn is_descending(&self) -> bool {
        matches!(
            self,
            NodeSort::NameDesc
                | NodeSort::UpdatedAtDesc
                | NodeSort::SizeDesc
                | NodeSort::TypeDesc
                | NodeSort::OwnerDesc
                | NodeSort::LastEditorDesc
        )
    }
}

/// Filter arguments of a `findNodes` query. Two lists with equal filters
/// share one cached field.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_by_me: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_with_me: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl NodeFilter {
    pub fn flagged() -> Self {
        Self {
            flagged: Some(true),
            folder_id: Some(LOCAL_ROOT.to_string()),
            cascade: Some(true),
            ..Self::default()
        }
    }

    pub fn trash() -> Self {
        Self {
            folder_id: Some(TRASH_ROOT.to_string()),
            cascade: Some(false),
            ..Self::default()
        }
    }

    pub fn shared_by_me() -> Self {
        Self {
            shared_by_me: Some(true),
            cascade: Some(true),
            ..Self::default()
        }
    }

    pub fn shared_with_me() -> Self {
        Self {
            shared_with_me: Some(true),
            cascade: Some(true),
            ..Self::default()
        }
    }

    pub fn is_search(&self) -> bool {
        !self.keywords.is_empty()
    }

    pub fn is_trash(&self) -> bool {
        self.folder_id.as_deref() == Some(TRASH_ROOT)
    }

    /// Whether `node` still belongs in a list fetched with this filter.
    /// `me` is the id of the current user.
    pub fn matches(&self, node: &Node, me: &str) -> bool {
        if self.is_trash() != node.is_trashed() {
            return false;
        }
        if self.flagged.is_some_and(|flagged| node.flagged != flagged) {
            return false;
        }
        if self.shared_by_me == Some(true) {
            let owned = node.owner.as_ref().is_none_or(|owner| owner.id == me);
            let shared = node.shares.as_ref().is_some_and(|s| !s.is_empty());
            if !owned || !shared {
                return false;
            }
        }
        if self.shared_with_me == Some(true) {
            let foreign = node.owner.as_ref().is_some_and(|owner| owner.id != me);
            let still_shared = node.shares.is_none() || node.is_shared_with(me);
            if !foreign || !still_shared {
                return false;
            }
        }
        let direct_children_only = !self.is_trash() && self.cascade != Some(true);
        if let Some(folder_id) = self.folder_id.as_deref().filter(|_| direct_children_only) {
            if node.parent_id.as_deref() != Some(folder_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodePage {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreviewQuality {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFormat {
    Jpeg,
    Png,
    Gif,
}
