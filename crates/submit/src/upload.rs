//! Sequential upload orchestrator.
//!
//! Runs every queued file through hash, announce, transfer and confirm,
//! one file at a time. A failing file is marked `Errored` and reported;
//! the batch continues with the next file.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use datameta_transfer::{calculate_file_checksum, percent_complete};

use crate::backend::Backend;
use crate::error::{SubmitError, upload_failure_message};
use crate::queue::{UploadQueue, UploadState, UploadStep};
use crate::types::{
    AlertLevel, EventChannel, FailedUpload, PipelineEvent, ProgressPhase, UploadSummary,
    UploadedFile,
};

/// Orchestrates the upload of a queue of files.
pub struct UploadOrchestrator {
    events: EventChannel,
    chunk_size: usize,
    retries: u32,
}

impl Default for UploadOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadOrchestrator {
    pub fn new() -> Self {
        Self {
            events: EventChannel::new(),
            chunk_size: 0,
            retries: 0,
        }
    }

    /// Sets the block size used for hashing (0 selects the default).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets how many extra rounds failed files get within one run.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.events.take()
    }

    /// Uploads every queued file in order.
    ///
    /// Confirmed files are removed from the queue, failed ones stay
    /// `Errored`. With retries configured, failed files are queued again
    /// once the queue is exhausted, up to that many rounds; `failed` then
    /// lists only the files that failed in the last round. A batch that
    /// processed at least one file ends with a single refresh of the
    /// pending overview; an empty queue makes no calls and emits nothing.
    pub async fn run(&self, queue: &mut UploadQueue, backend: &dyn Backend) -> UploadSummary {
        let mut summary = UploadSummary::default();
        if !queue.has_queued() {
            return summary;
        }

        let mut retries_left = self.retries;
        loop {
            let id = match queue.start_next() {
                Ok(Some(id)) => id,
                Ok(None) => {
                    if retries_left == 0 || summary.failed.is_empty() {
                        break;
                    }
                    retries_left -= 1;
                    let requeued = queue.requeue_failed();
                    if requeued == 0 {
                        break;
                    }
                    info!(files = requeued, retries_left, "retrying failed uploads");
                    summary.failed.clear();
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "upload queue stalled");
                    break;
                }
            };
            let name = queue.get(id).map(|f| f.name.clone()).unwrap_or_default();
            self.state_changed(id, &name, UploadState::Hashing).await;

            match self.process(queue, id, &name, backend).await {
                Ok(server_id) => {
                    info!(file = %name, server_id = %server_id, "upload confirmed");
                    if let Err(e) = queue.remove(id) {
                        warn!(file = %name, error = %e, "could not remove confirmed file");
                    }
                    summary.uploaded.push(UploadedFile { name: name.clone(), server_id });
                }
                Err(e) => {
                    let kind = e.kind();
                    let message = upload_failure_message(&name, &e);
                    error!(file = %name, kind = %kind, error = %e, "upload failed");

                    match queue.advance(id, UploadStep::Fail(kind)) {
                        Ok(state) => self.state_changed(id, &name, state).await,
                        Err(e) => warn!(file = %name, error = %e, "could not mark file errored"),
                    }
                    self.events.alert(AlertLevel::Danger, message.clone()).await;
                    summary.failed.push(FailedUpload {
                        name: name.clone(),
                        kind,
                        message,
                    });
                }
            }
            self.events
                .emit(PipelineEvent::ProgressCleared { name })
                .await;
        }

        summary.refreshed = self.refresh(backend).await;
        summary
    }

    /// Runs one file from `Hashing` to `Done` and returns its server id.
    async fn process(
        &self,
        queue: &mut UploadQueue,
        id: u64,
        name: &str,
        backend: &dyn Backend,
    ) -> Result<String, SubmitError> {
        let path = queue
            .get(id)
            .map(|f| f.path.clone())
            .ok_or(crate::queue::QueueError::UnknownEntry(id))?;

        // Hashing
        let mut last = None;
        let checksum = calculate_file_checksum(&path, self.chunk_size, |done, total| {
            let percent = percent_complete(done, total);
            if last != Some(percent) {
                last = Some(percent);
                self.events.emit_progress(PipelineEvent::Progress {
                    name: name.to_string(),
                    phase: ProgressPhase::Hashing,
                    percent,
                    bytes: done,
                    total,
                    server_id: None,
                });
            }
        })
        .await?;
        debug!(file = %name, checksum = %checksum, "hashed");
        if let Some(file) = queue.get_mut(id) {
            file.checksum = Some(checksum.clone());
        }

        // Announce
        let target = backend.announce_file(name, &checksum).await?;
        let server_id = target.id.uuid.clone();
        if let Some(file) = queue.get_mut(id) {
            file.server_id = Some(server_id.clone());
        }
        self.step(queue, id, name, UploadStep::Announced).await?;

        // Transfer
        self.step(queue, id, name, UploadStep::StartTransfer).await?;
        let progress = self.transfer_progress(name, &server_id);
        backend
            .upload_content(&target, &path, name, progress)
            .await?;

        // Confirm
        self.step(queue, id, name, UploadStep::StartConfirm).await?;
        backend.confirm_upload(&server_id).await?;
        self.step(queue, id, name, UploadStep::Confirmed).await?;

        Ok(server_id)
    }

    async fn step(
        &self,
        queue: &mut UploadQueue,
        id: u64,
        name: &str,
        step: UploadStep,
    ) -> Result<(), SubmitError> {
        let state = queue.advance(id, step)?;
        self.state_changed(id, name, state).await;
        Ok(())
    }

    async fn state_changed(&self, id: u64, name: &str, state: UploadState) {
        debug!(file = %name, state = %state, "state changed");
        self.events
            .emit(PipelineEvent::StateChanged {
                id,
                name: name.to_string(),
                state,
            })
            .await;
    }

    fn transfer_progress(&self, name: &str, server_id: &str) -> crate::backend::ProgressFn {
        let tx = self.events.sender();
        let name = name.to_string();
        let server_id = server_id.to_string();
        let mut last = None;
        Box::new(move |done, total| {
            let percent = percent_complete(done, total);
            if last != Some(percent) {
                last = Some(percent);
                let _ = tx.try_send(PipelineEvent::Progress {
                    name: name.clone(),
                    phase: ProgressPhase::Transferring,
                    percent,
                    bytes: done,
                    total,
                    server_id: Some(server_id.clone()),
                });
            }
        })
    }

    async fn refresh(&self, backend: &dyn Backend) -> bool {
        match backend.pending().await {
            Ok(pending) => {
                self.events.emit(PipelineEvent::Refreshed(pending)).await;
                true
            }
            Err(e) => {
                warn!(error = %e, "refresh after upload failed");
                self.events
                    .alert(
                        AlertLevel::Warning,
                        format!("Could not refresh the pending data: {e}"),
                    )
                    .await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::mock::MockBackend;
    use crate::queue::PendingFile;
    use datameta_api::ApiError;
    use datameta_protocol::ApiErrorEntry;
    use tempfile::TempDir;

    fn files(dir: &TempDir, names: &[&str]) -> UploadQueue {
        let mut queue = UploadQueue::new();
        for name in names {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("content of {name}")).unwrap();
            queue.push(PendingFile::from_path(&path).unwrap());
        }
        queue
    }

    fn drain(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn alerts(events: &[PipelineEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Alert { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn uploads_all_files_in_order() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq", "b.fq"]);
        let backend = MockBackend::default();
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.done_count(), 2);
        assert!(summary.failed.is_empty());
        assert!(summary.refreshed);
        assert!(queue.is_empty());
        assert_eq!(
            backend.calls(),
            vec![
                "announce a.fq",
                "upload a.fq",
                "confirm srv-a.fq",
                "announce b.fq",
                "upload b.fq",
                "confirm srv-b.fq",
                "pending",
            ]
        );

        let events = drain(&mut rx);
        let states: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StateChanged { name, state, .. } if name == "a.fq" => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                UploadState::Hashing,
                UploadState::Announced,
                UploadState::Transferring,
                UploadState::Confirming,
                UploadState::Done,
            ]
        );
        assert!(matches!(events.last(), Some(PipelineEvent::Refreshed(_))));
    }

    #[tokio::test]
    async fn announces_the_content_checksum() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq"]);
        let backend = MockBackend::default();
        let orch = UploadOrchestrator::new().with_chunk_size(3);

        orch.run(&mut queue, &backend).await;

        let expected = datameta_transfer::checksum_bytes(b"content of a.fq");
        assert_eq!(backend.announced(), vec![("a.fq".to_string(), expected)]);
    }

    #[tokio::test]
    async fn failed_announce_does_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["F1", "F2", "F3"]);
        let backend = MockBackend::default().fail_announce(
            "F2",
            ApiError::Validation(vec![ApiErrorEntry::new("Invalid file name")]),
        );
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.done_count(), 2);
        let done: Vec<_> = summary.uploaded.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(done, vec!["F1", "F3"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "F2");
        assert_eq!(summary.failed[0].kind, FailureKind::Validation);

        // The failed file stays in the queue, marked errored.
        assert_eq!(queue.len(), 1);
        let f2 = queue.iter().next().unwrap();
        assert_eq!(f2.state, UploadState::Errored(FailureKind::Validation));

        let events = drain(&mut rx);
        let alerts = alerts(&events);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("F2"));
        assert!(alerts[0].contains("Invalid file name"));

        // One refresh for the whole batch.
        assert_eq!(
            backend.calls().iter().filter(|c| *c == "pending").count(),
            1
        );
    }

    #[tokio::test]
    async fn checksum_mismatch_on_confirm() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq"]);
        let backend = MockBackend::default().fail_confirm("srv-a.fq", ApiError::ChecksumMismatch);
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.done_count(), 0);
        assert_eq!(summary.failed[0].kind, FailureKind::ChecksumMismatch);
        assert_eq!(
            queue.iter().next().unwrap().state,
            UploadState::Errored(FailureKind::ChecksumMismatch)
        );

        let alerts = alerts(&drain(&mut rx));
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("does not match its checksum"));
        assert!(!alerts[0].contains("The data submission failed"));
    }

    #[tokio::test]
    async fn transfer_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq", "b.fq"]);
        let backend = MockBackend::default().fail_upload(
            "a.fq",
            ApiError::Unknown {
                status: 500,
                body: String::new(),
            },
        );
        let orch = UploadOrchestrator::new();

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.failed[0].name, "a.fq");
        assert_eq!(summary.failed[0].kind, FailureKind::Unknown);
        assert_eq!(summary.uploaded[0].name, "b.fq");
        // No confirmation for the failed transfer.
        assert!(!backend.calls().contains(&"confirm srv-a.fq".to_string()));
    }

    #[tokio::test]
    async fn unreadable_file_fails_before_any_call() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["gone.fq", "b.fq"]);
        std::fs::remove_file(dir.path().join("gone.fq")).unwrap();
        let backend = MockBackend::default();
        let orch = UploadOrchestrator::new();

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.failed[0].kind, FailureKind::Read);
        assert_eq!(
            backend.calls(),
            vec!["announce b.fq", "upload b.fq", "confirm srv-b.fq", "pending"]
        );
    }

    #[tokio::test]
    async fn progress_is_always_cleared() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["ok.fq", "bad.fq"]);
        let backend = MockBackend::default().fail_announce("bad.fq", ApiError::AccessDenied);
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        orch.run(&mut queue, &backend).await;

        let cleared: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::ProgressCleared { name } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(cleared, vec!["ok.fq", "bad.fq"]);
    }

    #[tokio::test]
    async fn transfer_progress_is_keyed_by_server_id() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq"]);
        let backend = MockBackend::default();
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        orch.run(&mut queue, &backend).await;

        let transfer: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress {
                    phase: ProgressPhase::Transferring,
                    percent,
                    server_id,
                    ..
                } => Some((percent, server_id)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transfer,
            vec![
                (50, Some("srv-a.fq".to_string())),
                (100, Some("srv-a.fq".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn empty_queue_makes_no_calls() {
        let mut queue = UploadQueue::new();
        let backend = MockBackend::default();
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary, UploadSummary::default());
        assert!(backend.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq"]);
        let backend = MockBackend::default().fail_pending(ApiError::Unauthenticated);
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.done_count(), 1);
        assert!(!summary.refreshed);
        let alerts = alerts(&drain(&mut rx));
        assert!(alerts[0].starts_with("Could not refresh"));
    }

    fn many_files(dir: &TempDir, count: usize) -> UploadQueue {
        let mut queue = UploadQueue::new();
        for i in 0..count {
            let path = dir.path().join(format!("f{i:03}.fq"));
            std::fs::write(&path, b"x").unwrap();
            queue.push(PendingFile::from_path(&path).unwrap());
        }
        queue
    }

    #[tokio::test]
    async fn large_batch_without_consumer_completes() {
        let dir = TempDir::new().unwrap();
        let mut queue = many_files(&dir, 60);
        let backend = MockBackend::default();
        let orch = UploadOrchestrator::new();

        let summary = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            orch.run(&mut queue, &backend),
        )
        .await
        .expect("run stalled without an event consumer");

        assert_eq!(summary.done_count(), 60);
        assert_eq!(backend.calls().len(), 60 * 3 + 1);
    }

    #[tokio::test]
    async fn consumer_draining_after_run_does_not_stall() {
        let dir = TempDir::new().unwrap();
        let mut queue = many_files(&dir, 60);
        let backend = MockBackend::default();
        let mut orch = UploadOrchestrator::new();
        let mut rx = orch.take_events().unwrap();

        let summary = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            orch.run(&mut queue, &backend),
        )
        .await
        .expect("run stalled on a full event channel");

        assert_eq!(summary.done_count(), 60);
        let events = drain(&mut rx);
        assert_eq!(events.len(), crate::types::EVENT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn failed_file_is_retried_within_the_run() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq", "b.fq"]);
        let backend = MockBackend::default().fail_upload(
            "a.fq",
            ApiError::Unknown {
                status: 503,
                body: String::new(),
            },
        );
        let orch = UploadOrchestrator::new().with_retries(1);

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.done_count(), 2);
        assert!(summary.failed.is_empty());
        assert!(queue.is_empty());
        assert_eq!(
            backend.calls(),
            vec![
                "announce a.fq",
                "upload a.fq",
                "announce b.fq",
                "upload b.fq",
                "confirm srv-b.fq",
                "announce a.fq",
                "upload a.fq",
                "confirm srv-a.fq",
                "pending",
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_retries_report_the_last_round() {
        let dir = TempDir::new().unwrap();
        let mut queue = files(&dir, &["a.fq"]);
        let backend = MockBackend::default()
            .fail_announce("a.fq", ApiError::AccessDenied)
            .fail_upload("a.fq", ApiError::NotFound);
        let orch = UploadOrchestrator::new().with_retries(1);

        let summary = orch.run(&mut queue, &backend).await;

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].kind, FailureKind::NotFound);
        assert_eq!(
            backend.calls().iter().filter(|c| *c == "pending").count(),
            1
        );
        assert_eq!(
            queue.iter().next().unwrap().state,
            UploadState::Errored(FailureKind::NotFound)
        );
    }
}
