//! Events and results of the submission pipeline.

use tokio::sync::mpsc;
use tracing::warn;

use datameta_protocol::PendingResponse;

use crate::error::FailureKind;
use crate::queue::UploadState;

/// Capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Hashing,
    Transferring,
}

/// Event emitted while the pipeline runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A queue entry changed state.
    StateChanged {
        id: u64,
        name: String,
        state: UploadState,
    },
    /// Progress of the current phase, 0-100. Transfer progress carries the
    /// server-side identifier of the file.
    Progress {
        name: String,
        phase: ProgressPhase,
        percent: u8,
        bytes: u64,
        total: u64,
        server_id: Option<String>,
    },
    /// The pipeline for `name` ended; any progress indicator goes away.
    ProgressCleared { name: String },
    /// A dismissible message for the user.
    Alert { level: AlertLevel, message: String },
    /// The pending overview after a batch.
    Refreshed(PendingResponse),
}

/// A file that reached `Done`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub server_id: String,
}

/// A file whose pipeline ended in `Errored`.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedUpload {
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of an upload batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSummary {
    pub uploaded: Vec<UploadedFile>,
    pub failed: Vec<FailedUpload>,
    /// Whether the closing refresh succeeded.
    pub refreshed: bool,
}

impl UploadSummary {
    pub fn done_count(&self) -> usize {
        self.uploaded.len()
    }
}

/// A record the server refused to store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// 0-based position in the converted sheet.
    pub index: usize,
    pub messages: Vec<String>,
}

/// Outcome of one sample sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetResult {
    pub name: String,
    pub added: usize,
    pub rejected: Vec<RecordFailure>,
    /// Set when the sheet could not be converted at all.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSheetSummary {
    pub sheets: Vec<SheetResult>,
    pub refreshed: bool,
}

impl SampleSheetSummary {
    pub fn added(&self) -> usize {
        self.sheets.iter().map(|s| s.added).sum()
    }
}

/// Sender half plus the receiver until a consumer takes it.
pub(crate) struct EventChannel {
    tx: mpsc::Sender<PipelineEvent>,
    rx: Option<mpsc::Receiver<PipelineEvent>>,
}

impl EventChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx, rx: Some(rx) }
    }

    pub(crate) fn take(&mut self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.rx.take()
    }

    /// Sends an event without waiting. When the channel is full the
    /// event is dropped, so a consumer that never drains cannot stall the
    /// pipeline.
    pub(crate) async fn emit(&self, event: PipelineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event = ?event, "event channel full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Sends a progress event; skipped silently when the channel is full.
    pub(crate) fn emit_progress(&self, event: PipelineEvent) {
        let _ = self.tx.try_send(event);
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<PipelineEvent> {
        self.tx.clone()
    }

    pub(crate) async fn alert(&self, level: AlertLevel, message: String) {
        self.emit(PipelineEvent::Alert { level, message }).await;
    }
}
