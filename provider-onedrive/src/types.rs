//! Microsoft Graph response payloads

use serde::{Deserialize, Serialize};

/// `driveItem` resource, reduced to the selected fields
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub file: Option<FileFacet>,
}

impl DriveItem {
    pub fn quick_xor_hash(&self) -> Option<&str> {
        self.file
            .as_ref()
            .and_then(|f| f.hashes.as_ref())
            .and_then(|h| h.quick_xor_hash.as_deref())
            .filter(|h| !h.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    pub mime_type: Option<String>,
    pub hashes: Option<Hashes>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hashes {
    pub quick_xor_hash: Option<String>,
    pub sha1_hash: Option<String>,
}

/// `createUploadSession` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    pub upload_url: String,
    pub expiration_date_time: Option<String>,
}

/// `createLink` request body
#[derive(Debug, Clone, Serialize)]
pub struct CreateLinkRequest<'a> {
    #[serde(rename = "type")]
    pub link_type: &'a str,
    pub scope: &'a str,
}

/// `createLink` response
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLinkResponse {
    pub link: SharingLink,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingLink {
    pub web_url: String,
}

/// Graph error envelope: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: GraphError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}
