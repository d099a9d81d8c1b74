//! Sample sheet import.
//!
//! Each sheet is converted server side into records, which are then
//! stored one by one. Rejected records are collected without aborting
//! the sheet, and a failing sheet does not abort the others.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::types::{
    AlertLevel, EventChannel, PipelineEvent, RecordFailure, SampleSheetSummary, SheetResult,
};

/// Imports sample sheets and reports the outcome per sheet.
pub struct SampleSheetOrchestrator {
    events: EventChannel,
}

impl Default for SampleSheetOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSheetOrchestrator {
    pub fn new() -> Self {
        Self {
            events: EventChannel::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.events.take()
    }

    /// Imports `sheets` in order and refreshes the pending overview once
    /// at the end. No sheets means no calls.
    pub async fn run(&self, sheets: &[PathBuf], backend: &dyn Backend) -> SampleSheetSummary {
        let mut summary = SampleSheetSummary::default();
        if sheets.is_empty() {
            return summary;
        }

        for path in sheets {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let mut result = SheetResult {
                name: name.clone(),
                ..Default::default()
            };

            let records = match backend.convert_samplesheet(path).await {
                Ok(records) => records,
                Err(e) => {
                    let message = format!("Sample sheet '{name}': {}", e.describe());
                    warn!(sheet = %name, error = %e, "sample sheet conversion failed");
                    self.events.alert(AlertLevel::Danger, message).await;
                    result.error = Some(e.describe());
                    summary.sheets.push(result);
                    continue;
                }
            };

            for (index, record) in records.iter().enumerate() {
                match backend.create_metadataset(record).await {
                    Ok(_) => result.added += 1,
                    Err(e) => {
                        let messages = match e.entries() {
                            Some(entries) => entries.iter().map(ToString::to_string).collect(),
                            None => vec![e.to_string()],
                        };
                        warn!(sheet = %name, record = index, error = %e, "record rejected");
                        result.rejected.push(RecordFailure { index, messages });
                    }
                }
            }

            info!(
                sheet = %name,
                added = result.added,
                rejected = result.rejected.len(),
                "sample sheet imported"
            );
            self.events
                .alert(
                    AlertLevel::Success,
                    format!("Sample sheet '{name}': {} new records added.", result.added),
                )
                .await;
            for failure in &result.rejected {
                self.events
                    .alert(
                        AlertLevel::Danger,
                        format!(
                            "Sample sheet '{name}', record {}: {}",
                            failure.index + 1,
                            failure.messages.join("; ")
                        ),
                    )
                    .await;
            }
            summary.sheets.push(result);
        }

        summary.refreshed = match backend.pending().await {
            Ok(pending) => {
                self.events.emit(PipelineEvent::Refreshed(pending)).await;
                true
            }
            Err(e) => {
                warn!(error = %e, "refresh after sample sheet import failed");
                self.events
                    .alert(
                        AlertLevel::Warning,
                        format!("Could not refresh the pending data: {e}"),
                    )
                    .await;
                false
            }
        };
        summary
    }
}
