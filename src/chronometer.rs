//! Manual stopwatch for one queue.
//!
//! Clients are served first-in first-out: a departure always closes the oldest pending arrival.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{LabError, LabResult},
    record::{millis_between, new_record_id, QueueKind, QueueRecord},
};

/// A client that has arrived but not yet left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClient {
    /// Element number allocated on arrival.
    pub element: u64,
    /// When they arrived.
    pub arriving: DateTime<Utc>,
}

/// Timing state of one queue. Persisted so a session can span several invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chronometer {
    queue: String,
    kind: QueueKind,
    started_at: Option<DateTime<Utc>>,
    last_arrival: Option<DateTime<Utc>>,
    pending: VecDeque<PendingClient>,
}

impl Chronometer {
    /// A stopped chronometer.
    pub fn new(queue: impl Into<String>, kind: QueueKind) -> Self {
        Self {
            queue: queue.into(),
            kind,
            started_at: None,
            last_arrival: None,
            pending: VecDeque::new(),
        }
    }

    /// The queue being timed.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Its kind.
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Register an arrival of client number `element`.
    ///
    /// Arrival queues produce a record right away. Service queues keep the client pending until
    /// [`depart`](Self::depart).
    pub fn arrive(&mut self, element: u64, now: DateTime<Utc>) -> Option<QueueRecord> {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }

        match self.kind {
            QueueKind::Arrival => {
                let total_time_ms = self
                    .last_arrival
                    .map(|last| millis_between(&last, &now))
                    .unwrap_or(0);
                self.last_arrival = Some(now);

                debug!(queue = %self.queue, element, "arrival recorded");

                Some(QueueRecord {
                    id: new_record_id(),
                    queue: self.queue.clone(),
                    kind: self.kind,
                    timestamp: now,
                    total_time_ms,
                    element,
                    arriving: now,
                    exiting: None,
                })
            }
            QueueKind::Service => {
                self.last_arrival = Some(now);
                self.pending.push_back(PendingClient {
                    element,
                    arriving: now,
                });

                debug!(queue = %self.queue, element, waiting = self.pending.len(), "client pending");

                None
            }
        }
    }

    /// Close the oldest pending client.
    pub fn depart(&mut self, now: DateTime<Utc>) -> LabResult<QueueRecord> {
        if self.kind == QueueKind::Arrival {
            return Err(LabError::WrongQueueKind {
                queue: self.queue.clone(),
                kind: self.kind,
            });
        }

        let client = self
            .pending
            .pop_front()
            .ok_or_else(|| LabError::NoPendingClient(self.queue.clone()))?;

        let total_time_ms = millis_between(&client.arriving, &now);

        debug!(queue = %self.queue, element = client.element, total_time_ms, "client departed");

        Ok(QueueRecord {
            id: new_record_id(),
            queue: self.queue.clone(),
            kind: self.kind,
            timestamp: now,
            total_time_ms,
            element: client.element,
            arriving: client.arriving,
            exiting: Some(now),
        })
    }

    /// Reset without recording anything. Returns the number of clients dropped.
    pub fn stop(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.started_at = None;
        self.last_arrival = None;
        dropped
    }

    /// Whether the chronometer has been started.
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Clients still waiting.
    pub fn waiting(&self) -> usize {
        self.pending.len()
    }

    /// The pending clients, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PendingClient> {
        self.pending.iter()
    }

    /// Milliseconds since the chronometer started, zero when stopped.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        self.started_at
            .map(|start| millis_between(&start, &now))
            .unwrap_or(0)
    }

    /// How long the oldest pending client has been waiting.
    pub fn current_wait_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.pending
            .front()
            .map(|client| millis_between(&client.arriving, &now))
    }
}

/// `m:ss.cc`, or `h:mm:ss.cc` from one hour up.
pub fn format_elapsed(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let centiseconds = (ms % 1000) / 10;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}.{centiseconds:02}")
    } else {
        format!("{minutes}:{seconds:02}.{centiseconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn service_queue_is_fifo() {
        let mut chrono = Chronometer::new("Caixa", QueueKind::Service);

        assert!(chrono.arrive(1, t0()).is_none());
        assert!(chrono.arrive(2, t0() + Duration::seconds(2)).is_none());
        assert_eq!(chrono.waiting(), 2);

        let first = chrono.depart(t0() + Duration::seconds(5)).unwrap();
        assert_eq!(first.element, 1);
        assert_eq!(first.total_time_ms, 5000);
        assert_eq!(first.exiting, Some(t0() + Duration::seconds(5)));

        let second = chrono.depart(t0() + Duration::seconds(6)).unwrap();
        assert_eq!(second.element, 2);
        assert_eq!(second.total_time_ms, 4000);
    }

    #[test]
    fn depart_without_clients_fails() {
        let mut chrono = Chronometer::new("Caixa", QueueKind::Service);
        assert_matches!(chrono.depart(t0()), Err(LabError::NoPendingClient(q)) if q == "Caixa");
    }

    #[test]
    fn arrival_queue_records_gap_since_previous_arrival() {
        let mut chrono = Chronometer::new("Porta", QueueKind::Arrival);

        let first = chrono.arrive(1, t0()).unwrap();
        assert_eq!(first.total_time_ms, 0);
        assert_eq!(first.exiting, None);

        let second = chrono.arrive(2, t0() + Duration::milliseconds(3250)).unwrap();
        assert_eq!(second.total_time_ms, 3250);
        assert_eq!(chrono.waiting(), 0);

        assert_matches!(
            chrono.depart(t0()),
            Err(LabError::WrongQueueKind { kind: QueueKind::Arrival, .. })
        );
    }

    #[test]
    fn stop_drops_pending_clients() {
        let mut chrono = Chronometer::new("Caixa", QueueKind::Service);
        chrono.arrive(1, t0());
        chrono.arrive(2, t0());

        assert_eq!(chrono.stop(), 2);
        assert!(!chrono.is_running());
        assert_eq!(chrono.elapsed_ms(t0() + Duration::seconds(10)), 0);
    }

    #[test]
    fn current_wait_tracks_oldest_client() {
        let mut chrono = Chronometer::new("Caixa", QueueKind::Service);
        chrono.arrive(1, t0());
        chrono.arrive(2, t0() + Duration::seconds(3));

        assert_eq!(chrono.current_wait_ms(t0() + Duration::seconds(4)), Some(4000));
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(0), "0:00.00");
        assert_eq!(format_elapsed(61_234), "1:01.23");
        assert_eq!(format_elapsed(3_600_000 + 5_010), "1:00:05.01");
    }
}
