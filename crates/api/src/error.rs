use datameta_protocol::ApiErrorEntry;
use datameta_transfer::TransferError;

/// Errors returned by the DataMeta client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Read(#[from] TransferError),

    /// 400 with a parseable error array.
    #[error("validation failed: {}", join_entries(.0))]
    Validation(Vec<ApiErrorEntry>),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("access denied")]
    AccessDenied,

    #[error("not found")]
    NotFound,

    #[error("unexpected response {status}: {body}")]
    Unknown { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl ApiError {
    /// Classifies a non-success response.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 => match serde_json::from_str::<Vec<ApiErrorEntry>>(body) {
                Ok(entries) if !entries.is_empty() => Self::Validation(entries),
                _ => Self::Unknown {
                    status,
                    body: body.to_string(),
                },
            },
            401 => Self::Unauthenticated,
            403 => Self::AccessDenied,
            404 => Self::NotFound,
            _ => Self::Unknown {
                status,
                body: body.to_string(),
            },
        }
    }

    /// The 400 error entries, if this is a validation failure.
    pub fn entries(&self) -> Option<&[ApiErrorEntry]> {
        match self {
            Self::Validation(entries) => Some(entries),
            _ => None,
        }
    }
}

fn join_entries(entries: &[ApiErrorEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) async fn from_response(resp: reqwest::Response) -> ApiError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ApiError::from_status(status, &body)
}
