//! Queues and the event records timed on them.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LabError;

/// What a queue measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Clients arriving. Each click is one record, there is no exit.
    Arrival,
    /// Clients being served. An arrival click opens a record, a departure click closes it.
    Service,
}

impl Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueKind::Arrival => "arrival",
            QueueKind::Service => "service",
        })
    }
}

impl FromStr for QueueKind {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrival" | "chegada" => Ok(QueueKind::Arrival),
            "service" | "atendimento" => Ok(QueueKind::Service),
            other => Err(LabError::InvalidParameter(format!(
                "unknown queue kind '{other}'"
            ))),
        }
    }
}

/// A named queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDef {
    /// Unique, trimmed, non-empty.
    pub name: String,
    /// What it measures.
    pub kind: QueueKind,
}

/// One timed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Random id, 16 hex digits.
    pub id: String,
    /// Name of the queue this was timed on.
    pub queue: String,
    /// Kind of that queue at the time of recording.
    pub kind: QueueKind,
    /// When the record was closed.
    pub timestamp: DateTime<Utc>,
    /// Milliseconds between `arriving` and `exiting` for service records, or since the previous
    /// arrival for arrival records.
    pub total_time_ms: u64,
    /// 1-based counter, per queue.
    pub element: u64,
    /// When the client arrived.
    pub arriving: DateTime<Utc>,
    /// When the client left. Arrival records have none.
    pub exiting: Option<DateTime<Utc>>,
}

impl QueueRecord {
    /// `total_time_ms` in seconds.
    pub fn total_time_secs(&self) -> f64 {
        self.total_time_ms as f64 / 1000.0
    }
}

/// A fresh record id.
pub fn new_record_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// RFC 3339, UTC, millisecond precision.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds from `from` to `to`, clamped at zero.
pub(crate) fn millis_between(from: &DateTime<Utc>, to: &DateTime<Utc>) -> u64 {
    (*to - *from).num_milliseconds().max(0) as u64
}

/// Seconds from `from` to `to`, may be negative.
pub(crate) fn secs_between(from: &DateTime<Utc>, to: &DateTime<Utc>) -> f64 {
    (*to - *from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn kind_parses_both_languages() {
        assert_eq!("Chegada".parse::<QueueKind>().unwrap(), QueueKind::Arrival);
        assert_eq!(" service ".parse::<QueueKind>().unwrap(), QueueKind::Service);
        assert!("exit".parse::<QueueKind>().is_err());
    }

    #[test]
    fn kind_serialises_lowercase() {
        let json = serde_json::to_string(&QueueKind::Service).unwrap();
        assert_eq!(json, "\"service\"");
    }

    #[test]
    fn instants_keep_milliseconds() {
        let t = Utc.with_ymd_and_hms(2024, 5, 2, 14, 3, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(format_instant(&t), "2024-05-02T14:03:07.042Z");
    }

    #[test]
    fn record_ids_are_hex() {
        let id = new_record_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
