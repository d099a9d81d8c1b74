//! Bridges the REST client to the submission pipeline.

use std::path::Path;

use datameta_api::Client;
use datameta_protocol::{
    FileAnnounceResponse, MetaDataSet, PendingResponse, Record, SubmissionRequest,
    SubmissionResponse,
};
use datameta_submit::{Backend, BackendFuture, ProgressFn};

/// Implements [`Backend`] by delegating to a [`Client`].
pub struct ApiBackend {
    client: Client,
    chunk_size: usize,
}

impl ApiBackend {
    pub fn new(client: Client, chunk_size: usize) -> Self {
        Self { client, chunk_size }
    }
}

impl Backend for ApiBackend {
    fn announce_file<'a>(
        &'a self,
        name: &'a str,
        checksum: &'a str,
    ) -> BackendFuture<'a, FileAnnounceResponse> {
        Box::pin(async move { Ok(self.client.announce_file(name, checksum).await?) })
    }

    fn upload_content<'a>(
        &'a self,
        target: &'a FileAnnounceResponse,
        path: &'a Path,
        name: &'a str,
        on_progress: ProgressFn,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .upload_content(target, path, name, self.chunk_size, on_progress)
                .await?;
            Ok(())
        })
    }

    fn confirm_upload<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move { Ok(self.client.confirm_upload(id).await?) })
    }

    fn pending(&self) -> BackendFuture<'_, PendingResponse> {
        Box::pin(async move { Ok(self.client.pending().await?) })
    }

    fn convert_samplesheet<'a>(&'a self, path: &'a Path) -> BackendFuture<'a, Vec<Record>> {
        Box::pin(async move { Ok(self.client.convert_samplesheet_file(path).await?) })
    }

    fn create_metadataset<'a>(&'a self, record: &'a Record) -> BackendFuture<'a, MetaDataSet> {
        Box::pin(async move { Ok(self.client.create_metadataset(record).await?) })
    }

    fn presubvalidation<'a>(&'a self, request: &'a SubmissionRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move { Ok(self.client.presubvalidation(request).await?) })
    }

    fn submit<'a>(
        &'a self,
        request: &'a SubmissionRequest,
    ) -> BackendFuture<'a, SubmissionResponse> {
        Box::pin(async move { Ok(self.client.submit(request).await?) })
    }

    fn delete_file<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move { Ok(self.client.delete_file(id).await?) })
    }

    fn delete_metadataset<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move { Ok(self.client.delete_metadataset(id).await?) })
    }
}
