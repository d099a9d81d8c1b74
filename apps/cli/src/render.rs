//! Terminal output: pipeline events, the staging overview and the review
//! table.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::time::Duration;

use tokio::sync::mpsc;

use datameta_protocol::{ApiKeyInfo, Record, ViewResponse};
use datameta_submit::{
    AlertLevel, PipelineEvent, ProgressPhase, Status, SubmissionView, UploadState,
    ValidationReport,
};
use datameta_transfer::SpeedCalculator;

/// One line of output. Transient lines are overwritten by the next one.
#[derive(Debug, PartialEq)]
pub struct Line {
    pub text: String,
    pub transient: bool,
}

impl Line {
    fn fixed(text: String) -> Self {
        Self {
            text,
            transient: false,
        }
    }
}

/// Turns pipeline events into lines, tracking transfer speed per file.
#[derive(Default)]
pub struct EventRenderer {
    transfers: HashMap<String, Transfer>,
}

struct Transfer {
    last_bytes: u64,
    speed: SpeedCalculator,
}

impl EventRenderer {
    pub fn handle(&mut self, event: PipelineEvent) -> Option<Line> {
        match event {
            PipelineEvent::StateChanged { name, state, .. } => match state {
                UploadState::Errored(kind) => Some(Line::fixed(format!("{name}: failed ({kind})"))),
                UploadState::Done => Some(Line::fixed(format!("{name}: done"))),
                _ => None,
            },
            PipelineEvent::Progress {
                name,
                phase,
                percent,
                bytes,
                total,
                ..
            } => {
                let mut text = format!("{name}: {} {percent:>3}%", phase_label(phase));
                if phase == ProgressPhase::Transferring {
                    let transfer = self.transfers.entry(name).or_insert_with(|| Transfer {
                        last_bytes: 0,
                        speed: SpeedCalculator::default(),
                    });
                    transfer
                        .speed
                        .add_sample(bytes.saturating_sub(transfer.last_bytes));
                    transfer.last_bytes = bytes;

                    let rate = transfer.speed.bytes_per_second();
                    if rate > 0.0 {
                        let _ = write!(text, "  {}/s", format_bytes(rate as u64));
                        if let Some(eta) = transfer.speed.eta(total.saturating_sub(bytes)) {
                            let _ = write!(text, "  eta {}", format_duration(eta));
                        }
                    }
                }
                Some(Line {
                    text,
                    transient: true,
                })
            }
            PipelineEvent::ProgressCleared { name } => {
                self.transfers.remove(&name);
                None
            }
            PipelineEvent::Alert { level, message } => {
                Some(Line::fixed(format!("{} {message}", alert_prefix(level))))
            }
            PipelineEvent::Refreshed(pending) => Some(Line::fixed(format!(
                "{} file(s) and {} record(s) staged",
                pending.files.len(),
                pending.metadatasets.len()
            ))),
        }
    }
}

/// Prints events to stderr until the channel closes.
pub async fn print_events(mut rx: mpsc::Receiver<PipelineEvent>) {
    let mut renderer = EventRenderer::default();
    let mut transient = false;
    let mut stderr = std::io::stderr();

    while let Some(event) = rx.recv().await {
        let Some(line) = renderer.handle(event) else {
            continue;
        };
        if line.transient {
            let _ = write!(stderr, "\r\x1b[2K{}", line.text);
            let _ = stderr.flush();
            transient = true;
        } else {
            if transient {
                let _ = write!(stderr, "\r\x1b[2K");
                transient = false;
            }
            let _ = writeln!(stderr, "{}", line.text);
        }
    }
    if transient {
        let _ = writeln!(stderr);
    }
}

fn phase_label(phase: ProgressPhase) -> &'static str {
    match phase {
        ProgressPhase::Hashing => "hashing",
        ProgressPhase::Transferring => "uploading",
    }
}

fn alert_prefix(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Success => "[ok]",
        AlertLevel::Warning => "[warn]",
        AlertLevel::Danger => "[error]",
    }
}

fn status_mark(status: Status) -> &'static str {
    match status {
        Status::Unchecked => " ",
        Status::Ok => "+",
        Status::Error => "!",
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn value<'a>(record: &'a Record, key: &str) -> &'a str {
    record.get(key).and_then(|v| v.as_deref()).unwrap_or("")
}

/// The staged entities with their validation indicators.
///
/// Each entity line is prefixed with its selection (`[x]`) and status
/// (`+` ok, `!` error); erroneous metadata fields are marked with `!`.
pub fn staging_overview(view: &SubmissionView, report: &ValidationReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Records ({}):", view.metadatasets().len());
    for mset in view.metadatasets() {
        let uuid = &mset.id.uuid;
        let fields = view
            .metadata_keys()
            .iter()
            .map(|key| {
                let mark = match report.field_status(uuid, key) {
                    Status::Error => "!",
                    _ => "",
                };
                format!("{mark}{key}={}", value(&mset.record, key))
            })
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            out,
            "  [{}] {} {}  {fields}",
            if view.is_selected(uuid) { "x" } else { " " },
            status_mark(report.entity_status(uuid)),
            mset.id,
        );
    }

    let _ = writeln!(out, "Files ({}):", view.files().len());
    for file in view.files() {
        let uuid = &file.id.uuid;
        let size = file
            .filesize
            .and_then(|s| u64::try_from(s).ok())
            .map(format_bytes)
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  [{}] {} {}  {}  {size}",
            if view.is_selected(uuid) { "x" } else { " " },
            status_mark(report.entity_status(uuid)),
            file.id,
            file.name,
        );
    }

    out
}

/// Error messages of the validation report, one per line.
pub fn validation_errors(view: &SubmissionView, report: &ValidationReport) -> String {
    let mut out = String::new();
    for (uuid, status) in report.errors() {
        let label = view
            .metadatasets()
            .iter()
            .map(|m| &m.id)
            .chain(view.files().iter().map(|f| &f.id))
            .find(|id| id.uuid == uuid)
            .map(|id| id.display_id().to_string())
            .unwrap_or_else(|| uuid.to_string());
        for message in &status.messages {
            let _ = writeln!(out, "{label}: {message}");
        }
    }
    for message in report.unattributed() {
        let _ = writeln!(out, "{message}");
    }
    out
}

/// One page of submitted records as tab separated columns.
pub fn view_table(page: &ViewResponse) -> String {
    let mut keys: Vec<&String> = page.data.iter().flat_map(|row| row.record.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut out = String::new();
    let _ = write!(out, "site_id\tsubmission\tsubmitted\tuser\tgroup");
    for key in &keys {
        let _ = write!(out, "\t{key}");
    }
    out.push('\n');

    for row in &page.data {
        let _ = write!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            row.id,
            row.submission_label.as_deref().unwrap_or(""),
            row.submission_datetime.as_deref().unwrap_or(""),
            row.user_name.as_deref().unwrap_or(""),
            row.group_name.as_deref().unwrap_or(""),
        );
        for key in &keys {
            let _ = write!(out, "\t{}", value(&row.record, key));
        }
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "{} of {} record(s) shown ({} total)",
        page.data.len(),
        page.records_filtered,
        page.records_total
    );
    out
}

/// API keys of the account, marking the one this client uses.
pub fn keys_table(keys: &[ApiKeyInfo], current: Option<&str>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "id\tlabel\texpires");
    for key in keys {
        let mark = if current == Some(key.id.uuid.as_str()) {
            " *"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{}{mark}\t{}\t{}",
            key.id.uuid,
            key.label.as_deref().unwrap_or(""),
            key.expires.as_deref().unwrap_or("never"),
        );
    }
    out
}
