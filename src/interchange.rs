//! CSV import and export of records.
//!
//! Files are `;`-separated with Portuguese headers, so spreadsheets exported by earlier versions
//! of the tool import unchanged.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{LabError, LabResult},
    record::{format_instant, new_record_id, QueueKind, QueueRecord},
};

/// Field delimiter.
pub const DELIMITER: u8 = b';';

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Fila")]
    queue: String,
    #[serde(rename = "Tipo", default)]
    kind: Option<String>,
    #[serde(rename = "Carimbo de Data/Hora")]
    timestamp: String,
    #[serde(rename = "Tempo Total")]
    total_time: String,
    #[serde(rename = "Elemento")]
    element: String,
    #[serde(rename = "Chegando")]
    arriving: String,
    #[serde(rename = "Saindo", default)]
    exiting: Option<String>,
}

impl From<&QueueRecord> for CsvRow {
    fn from(record: &QueueRecord) -> Self {
        Self {
            queue: record.queue.clone(),
            kind: Some(
                match record.kind {
                    QueueKind::Arrival => "Chegada",
                    QueueKind::Service => "Atendimento",
                }
                .to_string(),
            ),
            timestamp: format_instant(&record.timestamp),
            total_time: format!("{:.2}s", record.total_time_secs()),
            element: record.element.to_string(),
            arriving: format_instant(&record.arriving),
            exiting: record.exiting.as_ref().map(format_instant),
        }
    }
}

impl CsvRow {
    fn into_record(self, line: u64) -> LabResult<QueueRecord> {
        let invalid = |reason: String| LabError::InvalidRow { line, reason };

        let queue = self.queue.trim().to_string();
        if queue.is_empty() {
            return Err(invalid("empty queue name".to_string()));
        }

        let exiting = self
            .exiting
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_instant(&s))
            .transpose()
            .map_err(invalid)?;

        let kind = match self.kind.filter(|s| !s.trim().is_empty()) {
            Some(kind) => kind.parse().map_err(|e: LabError| invalid(e.to_string()))?,
            None if exiting.is_some() => QueueKind::Service,
            None => QueueKind::Arrival,
        };

        let element = self
            .element
            .trim()
            .parse()
            .map_err(|_| invalid(format!("'{}' is not an element number", self.element)))?;

        Ok(QueueRecord {
            id: new_record_id(),
            queue,
            kind,
            timestamp: parse_instant(&self.timestamp).map_err(invalid)?,
            total_time_ms: parse_total_time(&self.total_time).map_err(invalid)?,
            element,
            arriving: parse_instant(&self.arriving).map_err(invalid)?,
            exiting,
        })
    }
}

/// Write `records` as CSV, header first.
pub fn export_csv<'a, W: Write>(
    records: impl IntoIterator<Item = &'a QueueRecord>,
    writer: W,
) -> LabResult<usize> {
    let mut csv = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_writer(writer);

    let mut written = 0;
    for record in records {
        csv.serialize(CsvRow::from(record))?;
        written += 1;
    }
    csv.flush()?;

    debug!(written, "exported records");
    Ok(written)
}

/// Read records from CSV. Every record gets a fresh id.
///
/// The `Tipo` column is optional: without it, rows with an exit are service records.
pub fn import_csv<R: Read>(reader: R) -> LabResult<Vec<QueueRecord>> {
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv.headers()?.clone();

    let mut records = Vec::new();
    for row in csv.records() {
        let row = row?;
        let line = row.position().map_or(0, |p| p.line());
        let parsed: CsvRow = row
            .deserialize(Some(&headers))
            .map_err(|e| LabError::InvalidRow {
                line,
                reason: e.to_string(),
            })?;
        records.push(parsed.into_record(line)?);
    }

    debug!(read = records.len(), "imported records");
    Ok(records)
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("'{s}' is not a date-time: {e}"))
}

/// `"12.34s"` in seconds, or a bare number of milliseconds.
fn parse_total_time(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let millis = match s.strip_suffix('s') {
        Some(secs) => secs.trim().parse::<f64>().map(|v| v * 1000.0),
        None => s.parse::<f64>(),
    }
    .map_err(|_| format!("'{s}' is not a duration"))?;

    if !millis.is_finite() || millis < 0.0 {
        return Err(format!("'{s}' is not a duration"));
    }
    Ok(millis.round() as u64)
}
