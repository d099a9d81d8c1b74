//! Upload queue and per-file state machine.

use std::fmt;
use std::path::{Path, PathBuf};

/// Pipeline state of one file.
///
/// ```text
/// Queued -> Hashing -> Announced -> Transferring -> Confirming -> Done
///    \_________\___________\____________\_____________\-------> Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Queued,
    Hashing,
    Announced,
    Transferring,
    Confirming,
    Done,
    Errored(crate::error::FailureKind),
}

/// Input to [`UploadState::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    /// The file was picked from the queue and hashing began.
    StartHashing,
    /// The server accepted name and checksum.
    Announced,
    StartTransfer,
    /// The content was sent; confirmation is under way.
    StartConfirm,
    /// The server confirmed the content.
    Confirmed,
    Fail(crate::error::FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition: {step:?} in state {from}")]
pub struct InvalidTransition {
    pub from: UploadState,
    pub step: UploadStep,
}

impl UploadState {
    /// Returns the state reached by taking `step` from `self`.
    pub fn apply(self, step: UploadStep) -> Result<UploadState, InvalidTransition> {
        use UploadState as S;
        use UploadStep as T;

        match (self, step) {
            (S::Queued, T::StartHashing) => Ok(S::Hashing),
            (S::Hashing, T::Announced) => Ok(S::Announced),
            (S::Announced, T::StartTransfer) => Ok(S::Transferring),
            (S::Transferring, T::StartConfirm) => Ok(S::Confirming),
            (S::Confirming, T::Confirmed) => Ok(S::Done),
            (from, T::Fail(kind)) if !from.is_terminal() => Ok(S::Errored(kind)),
            (from, step) => Err(InvalidTransition { from, step }),
        }
    }

    /// `true` while the file occupies the pipeline.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Hashing | Self::Announced | Self::Transferring | Self::Confirming
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored(_))
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Hashing => f.write_str("hashing"),
            Self::Announced => f.write_str("announced"),
            Self::Transferring => f.write_str("transferring"),
            Self::Confirming => f.write_str("confirming"),
            Self::Done => f.write_str("done"),
            Self::Errored(kind) => write!(f, "errored ({kind})"),
        }
    }
}

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
    /// Queue-assigned key, 0 until pushed.
    pub id: u64,
    pub path: PathBuf,
    /// Name announced to the server.
    pub name: String,
    pub size: u64,
    pub checksum: Option<String>,
    pub server_id: Option<String>,
    pub state: UploadState,
}

impl PendingFile {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: 0,
            path: path.into(),
            name: name.into(),
            size,
            checksum: None,
            server_id: None,
            state: UploadState::Queued,
        }
    }

    /// Creates an entry for a regular file, named after its last path
    /// component.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(path, name, metadata.len()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("'{0}' is still in flight")]
    Busy(String),

    #[error("no queue entry with id {0}")]
    UnknownEntry(u64),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Ordered files processed one at a time.
///
/// At most one entry is in flight; [`UploadQueue::start_next`] refuses to
/// hand out another while it is.
#[derive(Debug, Default)]
pub struct UploadQueue {
    entries: Vec<PendingFile>,
    next_id: u64,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file and returns its key.
    pub fn push(&mut self, mut file: PendingFile) -> u64 {
        self.next_id += 1;
        file.id = self.next_id;
        file.state = UploadState::Queued;
        self.entries.push(file);
        self.next_id
    }

    pub fn extend(&mut self, files: impl IntoIterator<Item = PendingFile>) {
        for file in files {
            self.push(file);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingFile> {
        self.entries.iter()
    }

    pub fn get(&self, id: u64) -> Option<&PendingFile> {
        self.entries.iter().find(|f| f.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut PendingFile> {
        self.entries.iter_mut().find(|f| f.id == id)
    }

    /// The entry currently in the pipeline, if any.
    pub fn in_flight(&self) -> Option<&PendingFile> {
        self.entries.iter().find(|f| f.state.is_in_flight())
    }

    pub fn has_queued(&self) -> bool {
        self.entries.iter().any(|f| f.state == UploadState::Queued)
    }

    /// Moves the first queued entry to `Hashing` and returns its key.
    ///
    /// Returns `Ok(None)` when nothing is queued.
    pub fn start_next(&mut self) -> Result<Option<u64>, QueueError> {
        if let Some(busy) = self.in_flight() {
            return Err(QueueError::Busy(busy.name.clone()));
        }
        let Some(file) = self
            .entries
            .iter_mut()
            .find(|f| f.state == UploadState::Queued)
        else {
            return Ok(None);
        };
        file.state = file.state.apply(UploadStep::StartHashing)?;
        Ok(Some(file.id))
    }

    /// Applies `step` to entry `id` and returns the new state.
    pub fn advance(&mut self, id: u64, step: UploadStep) -> Result<UploadState, QueueError> {
        let file = self.get_mut(id).ok_or(QueueError::UnknownEntry(id))?;
        file.state = file.state.apply(step)?;
        Ok(file.state)
    }

    /// Removes entry `id`. In-flight entries cannot be removed.
    pub fn remove(&mut self, id: u64) -> Result<PendingFile, QueueError> {
        let pos = self
            .entries
            .iter()
            .position(|f| f.id == id)
            .ok_or(QueueError::UnknownEntry(id))?;
        if self.entries[pos].state.is_in_flight() {
            return Err(QueueError::Busy(self.entries[pos].name.clone()));
        }
        Ok(self.entries.remove(pos))
    }

    /// Puts errored entries back into the queue.
    pub fn requeue_failed(&mut self) -> usize {
        let mut n = 0;
        for file in &mut self.entries {
            if matches!(file.state, UploadState::Errored(_)) {
                file.state = UploadState::Queued;
                file.server_id = None;
                n += 1;
            }
        }
        n
    }
}
