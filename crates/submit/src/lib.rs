//! DataMeta submission pipeline.
//!
//! This crate implements the **business logic** of staging data for a
//! submission. It has no UI dependencies; a front end provides a
//! [`Backend`] implementation that bridges to the REST client and
//! consumes the [`PipelineEvent`] stream.
//!
//! # Pipeline
//!
//! 1. **Hash**: read each file in chunks and fold them into an MD5 digest
//! 2. **Announce**: register name and checksum, receive an upload target
//! 3. **Transfer**: stream the content to the target
//! 4. **Confirm**: mark the content uploaded so the server verifies it
//!
//! Sample sheets are converted server side and stored record by record.
//! A [`SubmissionSession`] validates the staged entities and commits them.

pub mod backend;
pub mod error;
pub mod queue;
pub mod samplesheet;
pub mod scanner;
pub mod session;
pub mod types;
pub mod upload;
pub mod validation;

#[cfg(test)]
mod mock;

// Re-export primary types for convenience.
pub use backend::{Backend, BackendFuture, ProgressFn};
pub use error::{EntityKind, FailureKind, SubmitError};
pub use queue::{InvalidTransition, PendingFile, QueueError, UploadQueue, UploadState, UploadStep};
pub use samplesheet::SampleSheetOrchestrator;
pub use scanner::scan_paths;
pub use session::SubmissionSession;
pub use types::{
    AlertLevel, FailedUpload, PipelineEvent, ProgressPhase, RecordFailure, SampleSheetSummary,
    SheetResult, UploadSummary, UploadedFile,
};
pub use upload::UploadOrchestrator;
pub use validation::{EntityStatus, Status, SubmissionView, ValidationReport};
