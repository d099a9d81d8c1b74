//! Content transfer to the URL returned by the file announcement.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures_util::{Stream, stream};
use reqwest::Body;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use tokio::fs::File;
use tracing::{debug, warn};

use datameta_protocol::FileAnnounceResponse;
use datameta_transfer::{ChunkReader, TransferError};

use crate::client::Client;
use crate::error::{self, ApiError};

/// Read failure captured while the body was being streamed.
type FailureSlot = Arc<Mutex<Option<TransferError>>>;

impl Client {
    /// Streams the file at `path` to the upload target of an announced
    /// file as multipart field `file`.
    ///
    /// The file is read in `chunk_size` blocks (0 selects the default) and
    /// never held in memory as a whole. `on_progress` receives the number
    /// of bytes handed to the transport and the file size. The bearer
    /// token is only sent when the target shares the API origin.
    pub async fn upload_content<F>(
        &self,
        target: &FileAnnounceResponse,
        path: &Path,
        file_name: &str,
        chunk_size: usize,
        on_progress: F,
    ) -> Result<(), ApiError>
    where
        F: FnMut(u64, u64) + Send + 'static,
    {
        let url = self.resolve(&target.url_to_upload)?;
        let headers = header_map(&target.request_headers)?;

        let reader = ChunkReader::open(path, chunk_size).await?;
        let total = reader.total();
        let failure: FailureSlot = Arc::default();
        let body = Body::wrap_stream(content_stream(reader, on_progress, Arc::clone(&failure)));

        let part = Part::stream_with_length(body, total)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let mut req = self.http().post(url.clone()).headers(headers).multipart(form);
        if self.same_origin(&url) {
            req = self.authorize(req)?;
        }

        debug!(%url, size = total, "transferring content");
        let result = req.send().await;

        // A read error surfaces as a transport error; report the cause.
        if let Some(err) = take_failure(&failure) {
            warn!(%url, error = %err, "content read failed during transfer");
            return Err(ApiError::Read(err));
        }

        let resp = result?;
        if !resp.status().is_success() {
            return Err(error::from_response(resp).await);
        }
        Ok(())
    }
}

/// Body stream over a chunk reader.
///
/// On a read error the cause is parked in `failure` and the stream ends
/// with an I/O error, which aborts the request.
fn content_stream<F>(
    reader: ChunkReader<File>,
    on_progress: F,
    failure: FailureSlot,
) -> impl Stream<Item = Result<Vec<u8>, io::Error>> + Send + 'static
where
    F: FnMut(u64, u64) + Send + 'static,
{
    stream::unfold(
        (reader, on_progress, failure),
        |(mut reader, mut on_progress, failure)| async move {
            match reader.next_chunk().await {
                Ok(Some(chunk)) => {
                    on_progress(chunk.end(), chunk.total);
                    Some((Ok(chunk.data), (reader, on_progress, failure)))
                }
                Ok(None) => None,
                Err(err) => {
                    let io_err = io::Error::other(err.to_string());
                    if let Ok(mut slot) = failure.lock() {
                        *slot = Some(err);
                    }
                    Some((Err(io_err), (reader, on_progress, failure)))
                }
            }
        },
    )
}

fn take_failure(failure: &FailureSlot) -> Option<TransferError> {
    failure.lock().ok().and_then(|mut slot| slot.take())
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ApiError::InvalidHeader(name.clone()))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::MockServer;
    use datameta_protocol::Identifier;
    use futures_util::StreamExt;

    fn target(url: &str, headers: &[(&str, &str)]) -> FileAnnounceResponse {
        FileAnnounceResponse {
            id: Identifier::from_uuid("f1"),
            name: Some("data.bin".into()),
            url_to_upload: url.to_string(),
            request_headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            expires_at: None,
        }
    }

    fn sample_file(dir: &tempfile::TempDir, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("data.bin");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn uploads_file_with_headers_and_token() {
        let server = MockServer::start(vec![(200, "")]).await;
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..100u8).collect();
        let path = sample_file(&dir, &content);

        let client = Client::new(&server.url, Some("tok".into())).unwrap();
        let progress = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&progress);
        client
            .upload_content(
                &target("/api/v0/upload/f1", &[("X-Upload-Token", "abc")]),
                &path,
                "data.bin",
                32,
                move |done, total| seen.lock().unwrap().push((done, total)),
            )
            .await
            .unwrap();

        let req = &server.requests()[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/v0/upload/f1");
        assert_eq!(req.header("x-upload-token"), Some("abc"));
        assert_eq!(req.header("authorization"), Some("Bearer tok"));
        assert!(req.body_text().contains(r#"name="file"; filename="data.bin""#));
        assert!(
            req.body
                .windows(content.len())
                .any(|window| window == content.as_slice())
        );

        let progress = progress.lock().unwrap();
        assert_eq!(*progress, vec![(32, 100), (64, 100), (96, 100), (100, 100)]);
    }

    #[tokio::test]
    async fn foreign_target_gets_no_token() {
        let api = MockServer::start(vec![]).await;
        let storage = MockServer::start(vec![(201, "")]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir, b"payload");

        let client = Client::new(&api.url, Some("tok".into())).unwrap();
        client
            .upload_content(
                &target(&format!("{}/bucket/f1", storage.url), &[]),
                &path,
                "data.bin",
                0,
                |_, _| {},
            )
            .await
            .unwrap();

        let req = &storage.requests()[0];
        assert_eq!(req.path, "/bucket/f1");
        assert!(req.header("authorization").is_none());
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn rejected_transfer_maps_status() {
        let server = MockServer::start(vec![(403, "")]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir, b"payload");

        let client = Client::new(&server.url, None).unwrap();
        let err = client
            .upload_content(&target("/upload/f1", &[]), &path, "data.bin", 0, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied));
    }

    #[tokio::test]
    async fn missing_file_is_read_error() {
        let client = Client::new("http://127.0.0.1:9", None).unwrap();
        let err = client
            .upload_content(
                &target("/upload/f1", &[]),
                Path::new("/nonexistent/data.bin"),
                "data.bin",
                0,
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Read(_)));
    }

    #[tokio::test]
    async fn invalid_request_header() {
        let client = Client::new("http://127.0.0.1:9", None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir, b"payload");
        let err = client
            .upload_content(
                &target("/upload/f1", &[("bad header", "x")]),
                &path,
                "data.bin",
                0,
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidHeader(name) if name == "bad header"));
    }

    #[tokio::test]
    async fn stream_parks_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir, b"0123456789");
        let file = File::open(&path).await.unwrap();
        // Declares more bytes than the file holds.
        let reader = ChunkReader::new(file, 20, 4);
        let failure: FailureSlot = Arc::default();

        let items: Vec<_> = content_stream(reader, |_, _| {}, Arc::clone(&failure))
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(items[2].is_err());
        assert!(matches!(
            take_failure(&failure),
            Some(TransferError::Truncated { .. })
        ));
    }
}
