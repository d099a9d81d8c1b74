//! Wire types for the DataMeta REST API.
//!
//! Request and response bodies are camelCase JSON. Every entity is
//! addressed by an [`Identifier`] carrying both the internal UUID and the
//! human-readable site ID.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_API_PREFIX, UI_CONVERT_PATH, UI_PENDING_PATH, UI_VIEW_PATH};
pub use messages::{
    ApiKeyInfo, ApiKeyRequest, ConfirmUploadRequest, FileAnnounceRequest, FileAnnounceResponse,
    MetaDataSetRequest, PasswordChangeRequest, PendingResponse, SubmissionRequest,
    SubmissionResponse, UserSession, ViewRequest, ViewResponse,
};
pub use types::{ApiErrorEntry, Identifier, MetaDataSet, Record, StagedFile, ViewRow};
