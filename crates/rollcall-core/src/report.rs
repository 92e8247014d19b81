//! CSV attendance report.

use crate::tracker::{AttendanceSnapshot, AttendanceStatus};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const REPORT_FILE_NAME: &str = "attendance_report.csv";
pub const REPORT_MIME_TYPE: &str = "text/csv";
pub const REPORT_HEADER: &str = "Student Name,Status,Timestamp";
/// Timestamp cell for identities never seen.
pub const NOT_SEEN: &str = "N/A";

const TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to encode report: {0}")]
    Encode(#[from] csv::Error),
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render one row per roster identity, in snapshot (roster) order.
///
/// The header is plain; every row field is double-quoted.
pub fn render_csv(snapshot: &AttendanceSnapshot) -> Result<String, ReportError> {
    let mut buf = Vec::with_capacity(64 * (snapshot.entries.len() + 1));
    buf.extend_from_slice(REPORT_HEADER.as_bytes());
    buf.push(b'\n');

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(buf);

    for entry in &snapshot.entries {
        let status = match entry.status {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        };
        let timestamp = entry
            .timestamp
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| NOT_SEEN.to_string());
        wtr.write_record([entry.identity.as_str(), status, timestamp.as_str()])?;
    }

    let buf = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Local date and time, e.g. `1/1/2024, 9:00:00 AM`.
pub fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Write the report as `attendance_report.csv` inside `dir`.
pub fn save_report(dir: &Path, csv: &str) -> Result<PathBuf, ReportError> {
    let path = dir.join(REPORT_FILE_NAME);
    std::fs::create_dir_all(dir)
        .and_then(|()| std::fs::write(&path, csv))
        .map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
    tracing::info!(path = %path.display(), bytes = csv.len(), mime = REPORT_MIME_TYPE, "attendance report saved");
    Ok(path)
}
