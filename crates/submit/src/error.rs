//! Submission error types and user-facing failure messages.

use std::fmt;

use datameta_api::ApiError;
use datameta_protocol::ApiErrorEntry;
use datameta_transfer::TransferError;

use crate::queue::QueueError;

/// Errors produced by the submission pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("nothing selected")]
    NothingSelected,
}

/// Coarse classification of a failure, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Local file I/O failure.
    Read,
    /// Transport failure, no response.
    Network,
    /// 400 with per-field and per-entity messages.
    Validation,
    ChecksumMismatch,
    Unauthenticated,
    AccessDenied,
    NotFound,
    /// Any other status or an unparseable body.
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read error",
            Self::Network => "network error",
            Self::Validation => "validation error",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::Unauthenticated => "unauthenticated",
            Self::AccessDenied => "access denied",
            Self::NotFound => "not found",
            Self::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

impl SubmitError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Api(err) => match err {
                ApiError::Network(_) => FailureKind::Network,
                ApiError::Read(_) => FailureKind::Read,
                ApiError::Validation(_) => FailureKind::Validation,
                ApiError::ChecksumMismatch => FailureKind::ChecksumMismatch,
                ApiError::Unauthenticated => FailureKind::Unauthenticated,
                ApiError::AccessDenied => FailureKind::AccessDenied,
                ApiError::NotFound => FailureKind::NotFound,
                ApiError::Unknown { .. }
                | ApiError::Json(_)
                | ApiError::InvalidUrl(_)
                | ApiError::InvalidHeader(_) => FailureKind::Unknown,
            },
            Self::Transfer(_) | Self::Io(_) => FailureKind::Read,
            Self::Queue(_) | Self::NothingSelected => FailureKind::Unknown,
        }
    }

    /// The 400 error entries, if this is a validation failure.
    pub fn entries(&self) -> Option<&[ApiErrorEntry]> {
        match self {
            Self::Api(err) => err.entries(),
            _ => None,
        }
    }

    /// Short description: the joined validation messages, or the error
    /// itself.
    pub fn describe(&self) -> String {
        match self.entries() {
            Some(entries) => entries
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
            None => self.to_string(),
        }
    }
}

/// What a deletion targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    File,
    Record,
}

impl EntityKind {
    fn noun(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Record => "record",
        }
    }
}

/// Alert for a file whose pipeline failed.
///
/// A checksum mismatch gets its own wording since retrying the same
/// bytes will not help unless the local file changed.
pub fn upload_failure_message(name: &str, err: &SubmitError) -> String {
    match err.kind() {
        FailureKind::ChecksumMismatch => format!(
            "File '{name}': The uploaded content does not match its checksum. Please upload the file again."
        ),
        _ => format!(
            "File '{name}': The data submission failed: {}. Please try again.",
            err.describe()
        ),
    }
}

/// Alert for a failed deletion.
pub fn deletion_failure_message(entity: EntityKind, err: &SubmitError) -> String {
    let reason = match err.kind() {
        FailureKind::Unauthenticated => "Unauthenticated.".to_string(),
        FailureKind::AccessDenied => "Access denied.".to_string(),
        FailureKind::NotFound => match entity {
            EntityKind::File => "File not found.".to_string(),
            EntityKind::Record => "Record not found.".to_string(),
        },
        FailureKind::Validation => err
            .entries()
            .and_then(|entries| entries.first())
            .map(|entry| entry.message.clone())
            .unwrap_or_else(|| "Unknown error.".to_string()),
        _ => "Unknown error.".to_string(),
    };
    format!("Deleting the {} failed: {reason}", entity.noun())
}

/// Alert for a rejected commit.
pub const COMMIT_FAILURE_MESSAGE: &str =
    "Creating a new submission failed. Please verify that your submission is valid.";
