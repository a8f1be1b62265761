use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};

pub const UPLOAD_PATH: &str = "/services/files/upload";
pub const UPLOAD_VERSION_PATH: &str = "/services/files/upload-version";

pub const HEADER_FILENAME: &str = "filename";
pub const HEADER_PARENT_ID: &str = "parentid";
pub const HEADER_NODE_ID: &str = "nodeid";
pub const HEADER_OVERWRITE_VERSION: &str = "overwriteversion";

/// Status reported for a transfer that was aborted before the server answered.
pub const ABORTED_STATUS: u16 = 0;

/// Destination of an upload: a new file inside a folder, or a new version of
/// an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    NewFile {
        parent_id: String,
    },
    Version {
        node_id: String,
        overwrite: bool,
    },
}

impl UploadTarget {
    pub fn path(&self) -> &'static str {
        match self {
            UploadTarget::NewFile { .. } => UPLOAD_PATH,
            UploadTarget::Version { .. } => UPLOAD_VERSION_PATH,
        }
    }

    pub fn headers(&self, filename: &str) -> Result<HeaderMap, InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(HEADER_FILENAME),
            HeaderValue::from_str(&encode_filename(filename))?,
        );
        match self {
            UploadTarget::NewFile { parent_id } => {
                headers.insert(
                    HeaderName::from_static(HEADER_PARENT_ID),
                    HeaderValue::from_str(parent_id)?,
                );
            }
            UploadTarget::Version { node_id, overwrite } => {
                headers.insert(
                    HeaderName::from_static(HEADER_NODE_ID),
                    HeaderValue::from_str(node_id)?,
                );
                headers.insert(
                    HeaderName::from_static(HEADER_OVERWRITE_VERSION),
                    HeaderValue::from_static(if *overwrite { "true" } else { "false" }),
                );
            }
        }
        Ok(headers)
    }
}

pub fn encode_filename(filename: &str) -> String {
    STANDARD.encode(filename.as_bytes())
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub node_id: String,
    #[serde(default)]
    pub version: Option<u32>,
}

/// Terminal statuses the upload endpoint uses for business-rule rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    Aborted,
    VersionLimitExceeded,
    TooLarge,
    NameCollision,
    Unexpected(u16),
}

impl UploadFailure {
    pub fn from_status(status: u16) -> Self {
        match status {
            ABORTED_STATUS => UploadFailure::Aborted,
            405 | 406 => UploadFailure::VersionLimitExceeded,
            413 => UploadFailure::TooLarge,
            500 => UploadFailure::NameCollision,
            other => UploadFailure::Unexpected(other),
        }
    }

    pub fn is_expected(&self) -> bool {
        !matches!(self, UploadFailure::Unexpected(_))
    }
}

pub fn is_success(status: u16) -> bool {
    status == StatusCode::OK.as_u16()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_header_is_base64() {
        let target = UploadTarget::NewFile {
            parent_id: "LOCAL_ROOT".into(),
        };
        let headers = target.headers("résumé.pdf").unwrap();
        assert_eq!(headers[HEADER_FILENAME], "csOpc3Vtw6kucGRm");
        assert_eq!(headers[HEADER_PARENT_ID], "LOCAL_ROOT");
        assert!(!headers.contains_key(HEADER_NODE_ID));
    }

    #[test]
    fn version_target_sends_overwrite_flag() {
        let target = UploadTarget::Version {
            node_id: "n1".into(),
            overwrite: true,
        };
        assert_eq!(target.path(), UPLOAD_VERSION_PATH);
        let headers = target.headers("a.txt").unwrap();
        assert_eq!(headers[HEADER_NODE_ID], "n1");
        assert_eq!(headers[HEADER_OVERWRITE_VERSION], "true");
    }

    #[test]
    fn failure_statuses_are_classified() {
        assert_eq!(UploadFailure::from_status(0), UploadFailure::Aborted);
        assert_eq!(UploadFailure::from_status(405), UploadFailure::VersionLimitExceeded);
        assert_eq!(UploadFailure::from_status(406), UploadFailure::VersionLimitExceeded);
        assert_eq!(UploadFailure::from_status(413), UploadFailure::TooLarge);
        assert_eq!(UploadFailure::from_status(500), UploadFailure::NameCollision);
        assert_eq!(
            UploadFailure::from_status(418),
            UploadFailure::Unexpected(418)
        );
        assert!(!UploadFailure::from_status(418).is_expected());
        assert!(UploadFailure::from_status(500).is_expected());
    }
}
