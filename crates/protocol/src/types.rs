use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A metadata record: metadatum name to (optional) value.
pub type Record = BTreeMap<String, Option<String>>;

/// Identifier of a backend entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

impl Identifier {
    /// Creates an identifier that only carries a UUID.
    pub fn from_uuid(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            site: None,
        }
    }

    /// The site ID if known, the UUID otherwise.
    pub fn display_id(&self) -> &str {
        self.site.as_deref().unwrap_or(&self.uuid)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_id())
    }
}

/// A file staged on the server but not yet part of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFile {
    pub id: Identifier,
    pub name: String,
    #[serde(default)]
    pub checksum: Option<String>,
    /// Size in bytes; negative or missing when unknown.
    #[serde(default)]
    pub filesize: Option<i64>,
    #[serde(default)]
    pub content_uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

/// A metadata record stored on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDataSet {
    pub id: Identifier,
    pub record: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Identifier>,
}

/// One entry of a 400 response body.
///
/// `field` and `entity` attribute the message to a column and a row of
/// the submission tables when the server can tell which ones are wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl ApiErrorEntry {
    /// Creates an unattributed error entry.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            entity: None,
            exception: None,
        }
    }
}

impl fmt::Display for ApiErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A row of the submitted-data review table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRow {
    pub id: Identifier,
    #[serde(default)]
    pub record: Record,
    /// File identifiers for file-type metadata, keyed by metadatum name.
    #[serde(default)]
    pub file_ids: BTreeMap<String, Option<Identifier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_label: Option<String>,
    /// ISO 8601 timestamp of the submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_datetime: Option<String>,
}
