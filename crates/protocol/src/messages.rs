use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Identifier, MetaDataSet, Record, StagedFile, ViewRow};

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Announces a file before its content is uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnnounceRequest {
    pub name: String,
    /// Lowercase hex MD5 of the file content.
    pub checksum: String,
}

/// Where and how to upload the content of an announced file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnnounceResponse {
    pub id: Identifier,
    #[serde(default)]
    pub name: Option<String>,
    pub url_to_upload: String,
    /// Headers that must accompany the content transfer.
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Marks the content of a file as completely uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadRequest {
    pub content_uploaded: bool,
}

impl ConfirmUploadRequest {
    pub fn uploaded() -> Self {
        Self {
            content_uploaded: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata and submissions
// ---------------------------------------------------------------------------

/// Creates a metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDataSetRequest {
    pub record: Record,
}

/// Body shared by `presubvalidation` and `submissions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub metadataset_ids: Vec<String>,
    pub file_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SubmissionRequest {
    /// Returns `true` if neither files nor metadatasets are selected.
    pub fn is_empty(&self) -> bool {
        self.metadataset_ids.is_empty() && self.file_ids.is_empty()
    }
}

/// A committed submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub id: Identifier,
    #[serde(default)]
    pub metadataset_ids: Vec<Identifier>,
    #[serde(default)]
    pub file_ids: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Everything the user has staged but not yet submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResponse {
    #[serde(default)]
    pub files: Vec<StagedFile>,
    #[serde(default)]
    pub metadatasets: Vec<MetaDataSet>,
    /// All metadatum names, in display order.
    #[serde(default)]
    pub metadata_keys: Vec<String>,
    /// The subset of `metadata_keys` whose values reference files.
    #[serde(default)]
    pub metadata_keys_files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Requests a new API key with user credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    pub email: String,
    pub password: String,
    pub label: String,
}

/// A freshly issued API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    /// Identifier of the key itself, needed to revoke it later.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Identifier>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// An API key as listed for its owner. The token itself is never listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyInfo {
    pub id: Identifier,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "expiresAt")]
    pub expires: Option<String>,
}

/// Changes the password of a user.
///
/// For a logged-in user the credential is the current password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub password_change_credential: String,
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Review table
// ---------------------------------------------------------------------------

/// One page request against the server-side review table.
///
/// Serialized as form fields following the DataTables server-side
/// protocol, see [`ViewRequest::to_form`].
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRequest {
    /// Echoed back by the server to pair responses with requests.
    pub draw: u32,
    /// Index of the first row, 0-based.
    pub start: u64,
    /// Number of rows to return.
    pub length: u64,
    /// Whitespace separated search terms; at most three are accepted.
    pub search: String,
    /// 0 label, 1 submission time, 2 user, 3 group, 4 site ID,
    /// 5.. metadatum by display order.
    pub order_column: u32,
    pub ascending: bool,
}

impl Default for ViewRequest {
    fn default() -> Self {
        Self {
            draw: 1,
            start: 0,
            length: 25,
            search: String::new(),
            order_column: 1,
            ascending: false,
        }
    }
}

impl ViewRequest {
    /// Form fields for the `application/x-www-form-urlencoded` body.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("draw", self.draw.to_string()),
            ("start", self.start.to_string()),
            ("length", self.length.to_string()),
            ("search[value]", self.search.clone()),
            ("order[0][column]", self.order_column.to_string()),
            (
                "order[0][dir]",
                if self.ascending { "asc" } else { "desc" }.to_string(),
            ),
        ]
    }
}

/// One page of the review table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub draw: u32,
    #[serde(default)]
    pub records_total: u64,
    #[serde(default)]
    pub records_filtered: u64,
    #[serde(default)]
    pub data: Vec<ViewRow>,
    /// Set instead of `data` when the request was rejected, e.g. too
    /// many search terms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
