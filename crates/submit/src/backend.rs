//! Backend trait.
//!
//! `Backend` is implemented by the front end to bridge the pipeline to
//! the REST client. Using a trait keeps the pipeline decoupled from
//! transport and testable with mocks.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use datameta_protocol::{
    FileAnnounceResponse, MetaDataSet, PendingResponse, Record, SubmissionRequest,
    SubmissionResponse,
};

use crate::error::SubmitError;

/// Boxed future returned by [`Backend`] methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SubmitError>> + Send + 'a>>;

/// Transfer progress callback: bytes sent so far and total bytes.
pub type ProgressFn = Box<dyn FnMut(u64, u64) + Send>;

/// Abstract access to a DataMeta server.
pub trait Backend: Send + Sync {
    /// Registers a file by name and checksum.
    fn announce_file<'a>(
        &'a self,
        name: &'a str,
        checksum: &'a str,
    ) -> BackendFuture<'a, FileAnnounceResponse>;

    /// Sends the content of `path` to the target returned by
    /// [`announce_file`](Backend::announce_file).
    fn upload_content<'a>(
        &'a self,
        target: &'a FileAnnounceResponse,
        path: &'a Path,
        name: &'a str,
        on_progress: ProgressFn,
    ) -> BackendFuture<'a, ()>;

    /// Marks the content of file `id` as uploaded.
    fn confirm_upload<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()>;

    /// Everything staged but not yet submitted.
    fn pending(&self) -> BackendFuture<'_, PendingResponse>;

    /// Converts a sample sheet into records.
    fn convert_samplesheet<'a>(&'a self, path: &'a Path) -> BackendFuture<'a, Vec<Record>>;

    fn create_metadataset<'a>(&'a self, record: &'a Record) -> BackendFuture<'a, MetaDataSet>;

    /// `Ok` if the submission would be accepted.
    fn presubvalidation<'a>(&'a self, request: &'a SubmissionRequest) -> BackendFuture<'a, ()>;

    fn submit<'a>(&'a self, request: &'a SubmissionRequest)
    -> BackendFuture<'a, SubmissionResponse>;

    fn delete_file<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()>;

    fn delete_metadataset<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()>;
}
