//! Recording [`Backend`] with scripted failures.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use datameta_api::ApiError;
use datameta_protocol::{
    FileAnnounceResponse, Identifier, MetaDataSet, PendingResponse, Record, SubmissionRequest,
    SubmissionResponse,
};

use crate::backend::{Backend, BackendFuture, ProgressFn};

#[derive(Default)]
pub(crate) struct MockBackend {
    calls: Mutex<Vec<String>>,
    announced: Mutex<Vec<(String, String)>>,
    announce_errors: Mutex<HashMap<String, ApiError>>,
    upload_errors: Mutex<HashMap<String, ApiError>>,
    confirm_errors: Mutex<HashMap<String, ApiError>>,
    pending: Mutex<PendingResponse>,
    pending_errors: Mutex<VecDeque<ApiError>>,
    sheets: Mutex<HashMap<String, Vec<Record>>>,
    sheet_errors: Mutex<HashMap<String, ApiError>>,
    /// Keyed by the record's `Sample` value.
    record_errors: Mutex<HashMap<String, ApiError>>,
    presub_errors: Mutex<VecDeque<ApiError>>,
    submit_errors: Mutex<VecDeque<ApiError>>,
    delete_errors: Mutex<HashMap<String, ApiError>>,
    requests: Mutex<Vec<SubmissionRequest>>,
}

impl MockBackend {
    pub fn fail_announce(self, name: &str, err: ApiError) -> Self {
        self.announce_errors
            .lock()
            .unwrap()
            .insert(name.into(), err);
        self
    }

    pub fn fail_upload(self, name: &str, err: ApiError) -> Self {
        self.upload_errors.lock().unwrap().insert(name.into(), err);
        self
    }

    pub fn fail_confirm(self, server_id: &str, err: ApiError) -> Self {
        self.confirm_errors
            .lock()
            .unwrap()
            .insert(server_id.into(), err);
        self
    }

    pub fn with_pending(self, pending: PendingResponse) -> Self {
        *self.pending.lock().unwrap() = pending;
        self
    }

    /// Fails the next call to `pending`.
    pub fn fail_pending(self, err: ApiError) -> Self {
        self.pending_errors.lock().unwrap().push_back(err);
        self
    }

    pub fn with_sheet(self, file_name: &str, records: Vec<Record>) -> Self {
        self.sheets
            .lock()
            .unwrap()
            .insert(file_name.into(), records);
        self
    }

    pub fn fail_sheet(self, file_name: &str, err: ApiError) -> Self {
        self.sheet_errors
            .lock()
            .unwrap()
            .insert(file_name.into(), err);
        self
    }

    pub fn fail_record(self, sample: &str, err: ApiError) -> Self {
        self.record_errors
            .lock()
            .unwrap()
            .insert(sample.into(), err);
        self
    }

    /// Fails the next call to `presubvalidation`.
    pub fn fail_presub(self, err: ApiError) -> Self {
        self.presub_errors.lock().unwrap().push_back(err);
        self
    }

    /// Fails the next call to `submit`.
    pub fn fail_submit(self, err: ApiError) -> Self {
        self.submit_errors.lock().unwrap().push_back(err);
        self
    }

    pub fn fail_delete(self, id: &str, err: ApiError) -> Self {
        self.delete_errors.lock().unwrap().insert(id.into(), err);
        self
    }

    pub fn set_pending(&self, pending: PendingResponse) {
        *self.pending.lock().unwrap() = pending;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// `(name, checksum)` of every announcement.
    pub fn announced(&self) -> Vec<(String, String)> {
        self.announced.lock().unwrap().clone()
    }

    /// Bodies sent to `presubvalidation` and `submit`.
    pub fn requests(&self) -> Vec<SubmissionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn take(map: &Mutex<HashMap<String, ApiError>>, key: &str) -> Option<ApiError> {
    map.lock().unwrap().remove(key)
}

impl Backend for MockBackend {
    fn announce_file<'a>(
        &'a self,
        name: &'a str,
        checksum: &'a str,
    ) -> BackendFuture<'a, FileAnnounceResponse> {
        Box::pin(async move {
            self.record(format!("announce {name}"));
            self.announced
                .lock()
                .unwrap()
                .push((name.to_string(), checksum.to_string()));
            if let Some(err) = take(&self.announce_errors, name) {
                return Err(err.into());
            }
            Ok(FileAnnounceResponse {
                id: Identifier::from_uuid(format!("srv-{name}")),
                name: Some(name.to_string()),
                url_to_upload: format!("/api/v0/upload/srv-{name}"),
                request_headers: HashMap::new(),
                expires_at: None,
            })
        })
    }

    fn upload_content<'a>(
        &'a self,
        _target: &'a FileAnnounceResponse,
        _path: &'a Path,
        name: &'a str,
        mut on_progress: ProgressFn,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("upload {name}"));
            if let Some(err) = take(&self.upload_errors, name) {
                return Err(err.into());
            }
            on_progress(50, 100);
            on_progress(100, 100);
            Ok(())
        })
    }

    fn confirm_upload<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("confirm {id}"));
            match take(&self.confirm_errors, id) {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        })
    }

    fn pending(&self) -> BackendFuture<'_, PendingResponse> {
        Box::pin(async move {
            self.record("pending".into());
            if let Some(err) = self.pending_errors.lock().unwrap().pop_front() {
                return Err(err.into());
            }
            Ok(self.pending.lock().unwrap().clone())
        })
    }

    fn convert_samplesheet<'a>(&'a self, path: &'a Path) -> BackendFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.record(format!("convert {name}"));
            if let Some(err) = take(&self.sheet_errors, &name) {
                return Err(err.into());
            }
            Ok(self
                .sheets
                .lock()
                .unwrap()
                .get(&name)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn create_metadataset<'a>(&'a self, record: &'a Record) -> BackendFuture<'a, MetaDataSet> {
        Box::pin(async move {
            let sample = record
                .get("Sample")
                .cloned()
                .flatten()
                .unwrap_or_default();
            self.record(format!("metadataset {sample}"));
            if let Some(err) = take(&self.record_errors, &sample) {
                return Err(err.into());
            }
            Ok(MetaDataSet {
                id: Identifier::from_uuid(format!("mset-{sample}")),
                record: record.clone(),
                user_id: None,
                group_id: None,
                submission_id: None,
            })
        })
    }

    fn presubvalidation<'a>(&'a self, request: &'a SubmissionRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record("presubvalidation".into());
            self.requests.lock().unwrap().push(request.clone());
            match self.presub_errors.lock().unwrap().pop_front() {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        })
    }

    fn submit<'a>(
        &'a self,
        request: &'a SubmissionRequest,
    ) -> BackendFuture<'a, SubmissionResponse> {
        Box::pin(async move {
            self.record("submit".into());
            self.requests.lock().unwrap().push(request.clone());
            if let Some(err) = self.submit_errors.lock().unwrap().pop_front() {
                return Err(err.into());
            }
            Ok(SubmissionResponse {
                id: Identifier::from_uuid("sub-1"),
                metadataset_ids: request
                    .metadataset_ids
                    .iter()
                    .map(Identifier::from_uuid)
                    .collect(),
                file_ids: request.file_ids.iter().map(Identifier::from_uuid).collect(),
                label: request.label.clone(),
            })
        })
    }

    fn delete_file<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("delete file {id}"));
            match take(&self.delete_errors, id) {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        })
    }

    fn delete_metadataset<'a>(&'a self, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("delete metadataset {id}"));
            match take(&self.delete_errors, id) {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        })
    }
}
