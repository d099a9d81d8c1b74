//! Submission session: refresh, select, validate, commit, delete.

use tracing::{debug, info, warn};

use datameta_protocol::SubmissionResponse;

use crate::backend::Backend;
use crate::error::SubmitError;
use crate::validation::{SubmissionView, ValidationReport};

/// Holds the staged entities of one user and validates the selection
/// after every change.
pub struct SubmissionSession<'a> {
    backend: &'a dyn Backend,
    view: SubmissionView,
    report: ValidationReport,
}

impl<'a> SubmissionSession<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            view: SubmissionView::default(),
            report: ValidationReport::default(),
        }
    }

    pub fn view(&self) -> &SubmissionView {
        &self.view
    }

    /// The most recent validation result.
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Reloads the pending entities and validates the selection.
    pub async fn refresh(&mut self) -> Result<&ValidationReport, SubmitError> {
        let pending = self.backend.pending().await?;
        debug!(
            files = pending.files.len(),
            metadatasets = pending.metadatasets.len(),
            "pending refreshed"
        );
        self.view.update(pending);
        self.validate().await
    }

    /// Selects or deselects an entity and validates again.
    pub async fn set_selected(
        &mut self,
        uuid: &str,
        selected: bool,
    ) -> Result<&ValidationReport, SubmitError> {
        self.view.set_selected(uuid, selected);
        self.validate().await
    }

    /// Validates the current selection.
    ///
    /// An empty selection is reported without asking the server. A 400
    /// becomes part of the report; other failures are returned.
    pub async fn validate(&mut self) -> Result<&ValidationReport, SubmitError> {
        if !self.view.has_selection() {
            self.report = ValidationReport::build(&self.view, &[]);
            return Ok(&self.report);
        }

        let request = self.view.selection(None);
        match self.backend.presubvalidation(&request).await {
            Ok(()) => {
                self.report = ValidationReport::build(&self.view, &[]);
            }
            Err(e) if e.entries().is_some() => {
                let entries = e.entries().unwrap_or_default();
                debug!(errors = entries.len(), "selection rejected");
                self.report = ValidationReport::build(&self.view, entries);
            }
            Err(e) => {
                self.report = ValidationReport::unchecked(&self.view);
                return Err(e);
            }
        }
        Ok(&self.report)
    }

    /// Commits the selection as a new submission.
    ///
    /// Success and a rejected submission are both followed by a refresh.
    pub async fn commit(
        &mut self,
        label: Option<String>,
    ) -> Result<SubmissionResponse, SubmitError> {
        if !self.view.has_selection() {
            return Err(SubmitError::NothingSelected);
        }
        let request = self.view.selection(label);

        match self.backend.submit(&request).await {
            Ok(submission) => {
                info!(
                    submission = %submission.id,
                    files = request.file_ids.len(),
                    metadatasets = request.metadataset_ids.len(),
                    "submission created"
                );
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "refresh after commit failed");
                }
                Ok(submission)
            }
            Err(e) if e.entries().is_some() => {
                warn!(error = %e, "submission rejected");
                if let Err(refresh_err) = self.refresh().await {
                    warn!(error = %refresh_err, "refresh after rejected commit failed");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes a staged file. The view is refreshed either way; a failed
    /// refresh is logged and does not change the result.
    pub async fn delete_file(&mut self, uuid: &str) -> Result<(), SubmitError> {
        let result = self.backend.delete_file(uuid).await;
        self.after_delete(uuid, result).await
    }

    /// Deletes a staged metadata record. The view is refreshed either way.
    pub async fn delete_metadataset(&mut self, uuid: &str) -> Result<(), SubmitError> {
        let result = self.backend.delete_metadataset(uuid).await;
        self.after_delete(uuid, result).await
    }

    async fn after_delete(
        &mut self,
        uuid: &str,
        result: Result<(), SubmitError>,
    ) -> Result<(), SubmitError> {
        match &result {
            Ok(()) => info!(entity = %uuid, "deleted"),
            Err(e) => warn!(entity = %uuid, error = %e, "delete failed"),
        }
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "refresh after delete failed");
        }
        result
    }
}
