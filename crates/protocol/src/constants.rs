use std::time::Duration;

/// Default versioned prefix of the REST API.
///
/// The resource endpoints (`files`, `metadatasets`, `submissions`, ...)
/// live below this prefix. Servers running another API revision can be
/// targeted by configuring a different prefix.
pub const DEFAULT_API_PREFIX: &str = "/api/v0";

/// Pending files and metadatasets of the authenticated user.
pub const UI_PENDING_PATH: &str = "/api/ui/pending";

/// Sample sheet to metadata record conversion.
pub const UI_CONVERT_PATH: &str = "/api/ui/convert";

/// Server-side paginated table of submitted metadatasets.
pub const UI_VIEW_PATH: &str = "/api/ui/view";

/// Resource names below the API prefix.
pub mod resource {
    pub const FILES: &str = "files";
    pub const METADATASETS: &str = "metadatasets";
    pub const SUBMISSIONS: &str = "submissions";
    pub const PRESUBVALIDATION: &str = "presubvalidation";
    pub const KEYS: &str = "keys";
    pub const USERS: &str = "users";
    /// Below `users/{id}`.
    pub const PASSWORD: &str = "password";
}

/// Timeout for JSON request/response calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for all calls, including content transfers.
///
/// Content transfers carry no overall timeout: a multi-gigabyte file
/// legitimately takes longer than any fixed bound.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
