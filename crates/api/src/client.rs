//! DataMeta REST API client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.

use std::path::Path;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use datameta_protocol::constants::{CONNECT_TIMEOUT, REQUEST_TIMEOUT, resource};
use datameta_protocol::{
    ApiKeyInfo, ApiKeyRequest, ConfirmUploadRequest, DEFAULT_API_PREFIX, FileAnnounceRequest,
    FileAnnounceResponse, MetaDataSet, MetaDataSetRequest, PasswordChangeRequest,
    PendingResponse, Record, SubmissionRequest, SubmissionResponse, UI_CONVERT_PATH,
    UI_PENDING_PATH, UI_VIEW_PATH, UserSession, ViewRequest, ViewResponse,
};

use crate::error::{self, ApiError};

/// Characters escaped in a path segment. UUIDs pass through unchanged.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// DataMeta API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    api_prefix: String,
    token: Option<String>,
}

impl Client {
    /// Creates a client for the server at `base_url`, e.g.
    /// `https://datameta.example.org`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            token,
        })
    }

    /// Overrides the versioned API prefix (default `/api/v0`).
    pub fn with_api_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_end_matches('/');
        self.api_prefix = if trimmed.starts_with('/') || trimmed.is_empty() {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    /// Joins `path` (absolute, without origin) onto the server URL.
    fn url(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let full = format!("{base}{path}");
        Url::parse(&full).map_err(|e| ApiError::InvalidUrl(format!("{full}: {e}")))
    }

    /// URL of a versioned API resource, optionally followed by an id.
    fn api_url(&self, resource: &str, id: Option<&str>) -> Result<Url, ApiError> {
        match id {
            Some(id) => {
                let id = utf8_percent_encode(id, SEGMENT);
                self.url(&format!("{}/{resource}/{id}", self.api_prefix))
            }
            None => self.url(&format!("{}/{resource}", self.api_prefix)),
        }
    }

    /// URL of `users/{id}/{sub}` below the API prefix.
    fn user_url(&self, user_id: &str, sub: &str) -> Result<Url, ApiError> {
        let id = utf8_percent_encode(user_id, SEGMENT);
        self.url(&format!(
            "{}/{}/{id}/{sub}",
            self.api_prefix,
            resource::USERS
        ))
    }

    /// Resolves an upload target, which may be absolute or server relative.
    pub(crate) fn resolve(&self, target: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(target)
            .map_err(|e| ApiError::InvalidUrl(format!("{target}: {e}")))
    }

    /// Returns `true` if `url` shares scheme, host and port with the API.
    pub(crate) fn same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin()
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        match &self.token {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ApiError::InvalidHeader(AUTHORIZATION.to_string()))?;
                Ok(req.header(AUTHORIZATION, value))
            }
            None => Ok(req),
        }
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, ApiError> {
        self.authorize(self.http.request(method, url).timeout(REQUEST_TIMEOUT))
    }

    /// Sends a request and returns the body of a successful response.
    async fn send(&self, req: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        debug!(url = %resp.url(), status = status.as_u16(), "response");

        if !status.is_success() {
            return Err(error::from_response(resp).await);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.request(Method::POST, url)?.json(body);
        self.send_json(req).await
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    /// Exchanges credentials for an API key. Does not store the token.
    pub async fn create_api_key(
        &self,
        email: &str,
        password: &str,
        label: &str,
    ) -> Result<UserSession, ApiError> {
        let body = ApiKeyRequest {
            email: email.to_string(),
            password: password.to_string(),
            label: label.to_string(),
        };
        let url = self.api_url(resource::KEYS, None)?;
        let req = self
            .http
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(&body);
        self.send_json(req).await
    }

    /// Lists the API keys of user `user_id` (UUID or site ID).
    pub async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKeyInfo>, ApiError> {
        let url = self.user_url(user_id, resource::KEYS)?;
        self.send_json(self.request(Method::GET, url)?).await
    }

    /// Revokes API key `key_id`. Revoking the key used for the request is
    /// allowed; the client is unauthenticated afterwards.
    pub async fn delete_api_key(&self, key_id: &str) -> Result<(), ApiError> {
        let url = self.api_url(resource::KEYS, Some(key_id))?;
        self.send(self.request(Method::DELETE, url)?).await?;
        debug!(key = %key_id, "API key revoked");
        Ok(())
    }

    /// Replaces the password of user `user_id`, authorized by the current
    /// password.
    ///
    /// The server answers 403 for a wrong current password and a
    /// validation error for a new password it considers too weak.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = PasswordChangeRequest {
            password_change_credential: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        let url = self.user_url(user_id, resource::PASSWORD)?;
        let req = self.request(Method::PUT, url)?.json(&body);
        self.send(req).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Announces a file by name and checksum.
    pub async fn announce_file(
        &self,
        name: &str,
        checksum: &str,
    ) -> Result<FileAnnounceResponse, ApiError> {
        let body = FileAnnounceRequest {
            name: name.to_string(),
            checksum: checksum.to_string(),
        };
        self.post_json(self.api_url(resource::FILES, None)?, &body)
            .await
    }

    /// Marks the content of file `id` as uploaded.
    ///
    /// The server verifies the checksum at this point; a mismatch is
    /// reported as [`ApiError::ChecksumMismatch`].
    pub async fn confirm_upload(&self, id: &str) -> Result<(), ApiError> {
        let url = self.api_url(resource::FILES, Some(id))?;
        let req = self
            .request(Method::PUT, url)?
            .json(&ConfirmUploadRequest::uploaded());
        match self.send(req).await {
            Ok(_) => Ok(()),
            Err(ApiError::Unknown {
                status: 402 | 409, ..
            }) => Err(ApiError::ChecksumMismatch),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_file(&self, id: &str) -> Result<(), ApiError> {
        let url = self.api_url(resource::FILES, Some(id))?;
        self.send(self.request(Method::DELETE, url)?).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    pub async fn create_metadataset(&self, record: &Record) -> Result<MetaDataSet, ApiError> {
        let body = MetaDataSetRequest {
            record: record.clone(),
        };
        self.post_json(self.api_url(resource::METADATASETS, None)?, &body)
            .await
    }

    pub async fn delete_metadataset(&self, id: &str) -> Result<(), ApiError> {
        let url = self.api_url(resource::METADATASETS, Some(id))?;
        self.send(self.request(Method::DELETE, url)?).await?;
        Ok(())
    }

    /// Converts a sample sheet into records without storing them.
    pub async fn convert_samplesheet(
        &self,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<Vec<Record>, ApiError> {
        let part = Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);
        let req = self
            .request(Method::POST, self.url(UI_CONVERT_PATH)?)?
            .multipart(form);
        self.send_json(req).await
    }

    /// Reads a sample sheet from disk and converts it.
    pub async fn convert_samplesheet_file(&self, path: &Path) -> Result<Vec<Record>, ApiError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(datameta_transfer::TransferError::Read)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.convert_samplesheet(&name, content).await
    }

    // -----------------------------------------------------------------------
    // Submissions
    // -----------------------------------------------------------------------

    /// Validates a prospective submission. `Ok` means it would be accepted.
    pub async fn presubvalidation(&self, request: &SubmissionRequest) -> Result<(), ApiError> {
        let url = self.api_url(resource::PRESUBVALIDATION, None)?;
        self.send(self.request(Method::POST, url)?.json(request))
            .await?;
        Ok(())
    }

    pub async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse, ApiError> {
        self.post_json(self.api_url(resource::SUBMISSIONS, None)?, request)
            .await
    }

    /// Everything staged but not yet submitted.
    pub async fn pending(&self) -> Result<PendingResponse, ApiError> {
        let req = self.request(Method::GET, self.url(UI_PENDING_PATH)?)?;
        self.send_json(req).await
    }

    /// One page of the submitted-data review table.
    pub async fn view_page(&self, request: &ViewRequest) -> Result<ViewResponse, ApiError> {
        let req = self
            .request(Method::POST, self.url(UI_VIEW_PATH)?)?
            .form(&request.to_form());
        self.send_json(req).await
    }
}
