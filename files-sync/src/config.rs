use files_core::NodeSort;
use thiserror::Error;
use url::Url;

use crate::upload::UploadConfig;

const DEFAULT_UPLOAD_CONCURRENCY: u64 = 3;
const DEFAULT_PAGE_SIZE: u64 = 25;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unknown sort order {0}")]
    Sort(String),
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub base_url: Url,
    pub auth_token: Option<String>,
    /// Id of the signed-in user, used for share membership checks.
    pub user_id: String,
    pub upload: UploadConfig,
    pub page_size: u32,
    pub default_sort: NodeSort,
    pub detect_folders: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("FILES_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("FILES_BASE_URL"))?;
        let base_url = Url::parse(base_url.trim())?;
        let auth_token = lookup("FILES_AUTH_TOKEN").filter(|value| !value.is_empty());
        let user_id = lookup("FILES_USER_ID").unwrap_or_default();
        let default_sort = match lookup("FILES_DEFAULT_SORT") {
            Some(value) => NodeSort::parse(value.trim()).ok_or(ConfigError::Sort(value))?,
            None => NodeSort::default(),
        };
        let concurrency =
            read_u64_env(&lookup, "FILES_UPLOAD_CONCURRENCY", DEFAULT_UPLOAD_CONCURRENCY);
        let page_size = read_u64_env(&lookup, "FILES_PAGE_SIZE", DEFAULT_PAGE_SIZE);

        Ok(Self {
            base_url,
            auth_token,
            user_id,
            upload: UploadConfig {
                concurrency: usize::try_from(concurrency).unwrap_or(usize::MAX),
            },
            page_size: u32::try_from(page_size).unwrap_or(u32::MAX),
            default_sort,
            detect_folders: read_bool_env(&lookup, "FILES_DETECT_FOLDERS", true),
        })
    }
}

fn read_u64_env(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool_env(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
