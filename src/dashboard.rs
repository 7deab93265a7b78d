//! Per-queue overview of everything recorded so far.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    measure::mean,
    record::{secs_between, QueueRecord},
};

/// Mean inter-arrival time assumed when a queue has fewer than two records.
pub const FALLBACK_INTER_ARRIVAL_SECS: f64 = 10.0;

/// Lower edges of the wait histogram bins, in seconds. The last bin is open-ended.
pub const WAIT_BINS: [f64; 6] = [0.0, 2.0, 4.0, 6.0, 8.0, 10.0];

/// Headline figures for one queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSummary {
    /// Queue name.
    pub queue: String,
    /// Mean total time, seconds.
    pub w: f64,
    /// `max(0, W − Ts)`.
    pub wq: f64,
    /// The assumed service time `Ts`.
    pub ts: f64,
    /// Arrival rate from the mean inter-arrival time.
    pub lambda: f64,
    /// `λ·Ts`.
    pub rho: f64,
    /// Number of records.
    pub records: usize,
}

/// One histogram bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    /// e.g. `"2-4s"` or `"10-+s"`.
    pub label: String,
    /// Records that fall in the bin.
    pub count: usize,
}

/// A point of the all-queues cumulative chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeCount {
    /// Arrival instant of the record.
    pub time: DateTime<Utc>,
    /// Records that have arrived by now.
    pub arriving: usize,
    /// Records, among those, that have already left.
    pub exiting: usize,
}

/// Summaries, histogram and cumulative chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// One per queue, by name.
    pub queues: Vec<QueueSummary>,
    /// The queue with the highest `Wq`, the last one by name on a tie.
    pub worst_queue: Option<String>,
    /// Wait distribution of the worst queue.
    pub histogram: Vec<HistogramBin>,
    /// Cumulative arrivals and exits across all queues.
    pub cumulative: Vec<CumulativeCount>,
}

impl Dashboard {
    /// Build the dashboard, assuming each client takes `assumed_service_secs` to be served.
    pub fn build(records: &[QueueRecord], assumed_service_secs: f64) -> Self {
        let mut by_queue: BTreeMap<&str, Vec<&QueueRecord>> = BTreeMap::new();
        for record in records {
            by_queue.entry(&record.queue).or_default().push(record);
        }

        let queues: Vec<QueueSummary> = by_queue
            .iter()
            .map(|(queue, records)| summarise(queue, records, assumed_service_secs))
            .collect();

        let worst = queues
            .iter()
            .fold(None::<&QueueSummary>, |worst, q| match worst {
                Some(w) if w.wq > q.wq => Some(w),
                _ => Some(q),
            });

        let histogram = worst
            .map(|w| {
                let waits: Vec<f64> = by_queue[w.queue.as_str()]
                    .iter()
                    .map(|r| (r.total_time_secs() - assumed_service_secs).max(0.0))
                    .collect();
                wait_histogram(&waits)
            })
            .unwrap_or_default();

        Self {
            worst_queue: worst.map(|w| w.queue.clone()),
            queues,
            histogram,
            cumulative: cumulative_counts(records),
        }
    }

    /// Whether there is anything to show.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

fn summarise(queue: &str, records: &[&QueueRecord], ts: f64) -> QueueSummary {
    let totals: Vec<f64> = records.iter().map(|r| r.total_time_secs()).collect();
    let w = mean(&totals);
    let wq = (w - ts).max(0.0);

    let mut arrivals: Vec<_> = records.iter().map(|r| r.arriving).collect();
    arrivals.sort();
    let inter_arrivals: Vec<f64> = arrivals
        .windows(2)
        .map(|pair| secs_between(&pair[0], &pair[1]))
        .collect();
    let mean_inter_arrival = if inter_arrivals.is_empty() {
        FALLBACK_INTER_ARRIVAL_SECS
    } else {
        mean(&inter_arrivals)
    };

    let lambda = 1.0 / mean_inter_arrival;
    let mu = 1.0 / ts;

    QueueSummary {
        queue: queue.to_string(),
        w,
        wq,
        ts,
        lambda,
        rho: lambda / mu,
        records: records.len(),
    }
}

/// Count `waits` into [`WAIT_BINS`].
pub fn wait_histogram(waits: &[f64]) -> Vec<HistogramBin> {
    WAIT_BINS
        .iter()
        .enumerate()
        .map(|(i, &low)| {
            let high = WAIT_BINS.get(i + 1).copied().unwrap_or(f64::INFINITY);
            let count = waits.iter().filter(|&&v| v >= low && v < high).count();
            let label = if high.is_infinite() {
                format!("{low}-+s")
            } else {
                format!("{low}-{high}s")
            };
            HistogramBin { label, count }
        })
        .collect()
}

fn cumulative_counts(records: &[QueueRecord]) -> Vec<CumulativeCount> {
    let mut sorted: Vec<&QueueRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.arriving);

    sorted
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let exiting = sorted[..=i]
                .iter()
                .filter(|s| s.exiting.is_some_and(|e| e <= r.arriving))
                .count();
            CumulativeCount {
                time: r.arriving,
                arriving: i + 1,
                exiting,
            }
        })
        .collect()
}
