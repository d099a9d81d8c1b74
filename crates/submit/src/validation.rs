//! Staged entities, their selection, and the pre-submission report.

use std::collections::{BTreeMap, HashSet};

use datameta_protocol::{
    ApiErrorEntry, MetaDataSet, PendingResponse, StagedFile, SubmissionRequest,
};

/// Pending files and metadatasets plus the user's selection.
///
/// Everything is selected unless explicitly deselected, and a
/// deselection survives refreshes.
#[derive(Debug, Clone, Default)]
pub struct SubmissionView {
    pending: PendingResponse,
    deselected: HashSet<String>,
}

impl SubmissionView {
    pub fn new(pending: PendingResponse) -> Self {
        Self {
            pending,
            deselected: HashSet::new(),
        }
    }

    /// Replaces the pending entities, keeping the selection.
    pub fn update(&mut self, pending: PendingResponse) {
        self.pending = pending;
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.pending.files
    }

    pub fn metadatasets(&self) -> &[MetaDataSet] {
        &self.pending.metadatasets
    }

    /// Metadatum names in display order.
    pub fn metadata_keys(&self) -> &[String] {
        &self.pending.metadata_keys
    }

    /// Metadatum names whose values reference files.
    pub fn file_keys(&self) -> &[String] {
        &self.pending.metadata_keys_files
    }

    pub fn pending(&self) -> &PendingResponse {
        &self.pending
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.pending.files.iter().any(|f| f.id.uuid == uuid)
            || self.pending.metadatasets.iter().any(|m| m.id.uuid == uuid)
    }

    pub fn is_selected(&self, uuid: &str) -> bool {
        self.contains(uuid) && !self.deselected.contains(uuid)
    }

    pub fn set_selected(&mut self, uuid: &str, selected: bool) {
        if selected {
            self.deselected.remove(uuid);
        } else {
            self.deselected.insert(uuid.to_string());
        }
    }

    /// Selects every entity again.
    pub fn select_all(&mut self) {
        self.deselected.clear();
    }

    pub fn has_selection(&self) -> bool {
        self.pending
            .files
            .iter()
            .any(|f| !self.deselected.contains(&f.id.uuid))
            || self
                .pending
                .metadatasets
                .iter()
                .any(|m| !self.deselected.contains(&m.id.uuid))
    }

    /// Request body for the selected entities.
    pub fn selection(&self, label: Option<String>) -> SubmissionRequest {
        SubmissionRequest {
            metadataset_ids: self
                .pending
                .metadatasets
                .iter()
                .filter(|m| !self.deselected.contains(&m.id.uuid))
                .map(|m| m.id.uuid.clone())
                .collect(),
            file_ids: self
                .pending
                .files
                .iter()
                .filter(|f| !self.deselected.contains(&f.id.uuid))
                .map(|f| f.id.uuid.clone())
                .collect(),
            label,
        }
    }
}

/// Indicator state of an entity or a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Unchecked,
    Ok,
    Error,
}

/// Status of one entity with the messages explaining an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStatus {
    pub status: Status,
    pub messages: Vec<String>,
}

/// Result of validating the selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    entities: BTreeMap<String, EntityStatus>,
    fields: BTreeMap<(String, String), Status>,
    unattributed: Vec<String>,
    commit_enabled: bool,
}

impl ValidationReport {
    /// Every indicator unchecked, commit disabled.
    pub fn unchecked(view: &SubmissionView) -> Self {
        let mut report = Self::default();
        for file in view.files() {
            report
                .entities
                .insert(file.id.uuid.clone(), EntityStatus::default());
        }
        for mset in view.metadatasets() {
            report
                .entities
                .insert(mset.id.uuid.clone(), EntityStatus::default());
            for key in view.metadata_keys() {
                report
                    .fields
                    .insert((mset.id.uuid.clone(), key.clone()), Status::Unchecked);
            }
        }
        report
    }

    /// Builds the report for `view` from the server's error list.
    ///
    /// Selected entities and their fields start out `Ok`. Each error marks
    /// its entity `Error` and appends its message; an error naming a field
    /// also marks that field. Commit is enabled only without errors and
    /// with a non-empty selection.
    pub fn build(view: &SubmissionView, errors: &[ApiErrorEntry]) -> Self {
        let mut report = Self::unchecked(view);

        for (uuid, entity) in report.entities.iter_mut() {
            if view.is_selected(uuid) {
                entity.status = Status::Ok;
            }
        }
        for ((uuid, _), status) in report.fields.iter_mut() {
            if view.is_selected(uuid) {
                *status = Status::Ok;
            }
        }

        report.commit_enabled = errors.is_empty() && view.has_selection();

        for error in errors {
            let Some(entity) = error
                .entity
                .as_ref()
                .and_then(|id| report.entities.get_mut(&id.uuid))
            else {
                report.unattributed.push(error.to_string());
                continue;
            };
            entity.status = Status::Error;
            entity.messages.push(error.to_string());

            if let (Some(field), Some(id)) = (&error.field, &error.entity) {
                if let Some(status) = report.fields.get_mut(&(id.uuid.clone(), field.clone())) {
                    *status = Status::Error;
                }
            }
        }

        report
    }

    pub fn entity(&self, uuid: &str) -> Option<&EntityStatus> {
        self.entities.get(uuid)
    }

    pub fn entity_status(&self, uuid: &str) -> Status {
        self.entities
            .get(uuid)
            .map(|e| e.status)
            .unwrap_or_default()
    }

    pub fn field_status(&self, uuid: &str, field: &str) -> Status {
        self.fields
            .get(&(uuid.to_string(), field.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Messages that could not be attributed to a staged entity.
    pub fn unattributed(&self) -> &[String] {
        &self.unattributed
    }

    pub fn commit_enabled(&self) -> bool {
        self.commit_enabled
    }

    /// Entities in `Error`, with their messages.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &EntityStatus)> {
        self.entities
            .iter()
            .filter(|(_, e)| e.status == Status::Error)
            .map(|(uuid, e)| (uuid.as_str(), e))
    }

    pub fn error_count(&self) -> usize {
        self.errors().count() + self.unattributed.len()
    }
}
