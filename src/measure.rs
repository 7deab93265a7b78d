//! Queue metrics estimated from timed records.
//!
//! An arrival queue gives the arrival instants, a service queue gives the service durations. The
//! rates estimated from them are fed to the M/M/c formulas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{LabError, LabResult},
    model::{MmcModel, Observations, QueueMetrics},
    record::{secs_between, QueueRecord},
};

/// A point of the cumulative arrivals/departures chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativePoint {
    /// Seconds since the first event.
    pub time: f64,
    /// Arrivals so far.
    pub arrivals: usize,
    /// Departures so far.
    pub departures: usize,
}

/// Estimate the metrics of a `servers`-server system fed by `arrival_queue` and served by
/// `service_queue`.
pub fn measure(
    records: &[QueueRecord],
    arrival_queue: &str,
    service_queue: &str,
    servers: u32,
    max_n: usize,
) -> LabResult<QueueMetrics> {
    let arrivals = arrival_instants(records, arrival_queue);
    if arrivals.len() < 2 {
        return Err(LabError::InsufficientData(format!(
            "need at least 2 arrivals on '{arrival_queue}', found {}",
            arrivals.len()
        )));
    }

    let mut services: Vec<&QueueRecord> = records
        .iter()
        .filter(|r| r.queue == service_queue)
        .collect();
    if services.is_empty() {
        return Err(LabError::InsufficientData(format!(
            "no service records on '{service_queue}'"
        )));
    }
    services.sort_by_key(|r| r.arriving);

    let inter_arrivals: Vec<f64> = arrivals
        .windows(2)
        .map(|pair| secs_between(&pair[0], &pair[1]))
        .collect();
    let mean_inter_arrival = mean(&inter_arrivals);
    if mean_inter_arrival <= 0.0 {
        return Err(LabError::InsufficientData(
            "all arrivals share the same instant".to_string(),
        ));
    }

    let service_times: Vec<f64> = services.iter().map(|r| r.total_time_secs()).collect();
    let avg_service_time = mean(&service_times);
    if avg_service_time <= 0.0 {
        return Err(LabError::InsufficientData(
            "all service times are zero".to_string(),
        ));
    }

    let lambda = 1.0 / mean_inter_arrival;
    let mu = 1.0 / avg_service_time;

    // The i-th client to arrive is the i-th to be served.
    let waiting_times: Vec<f64> = arrivals
        .iter()
        .zip(services.iter())
        .map(|(arrived, service)| secs_between(arrived, &service.arriving).max(0.0))
        .collect();

    let idle_times: Vec<f64> = services
        .windows(2)
        .filter_map(|pair| {
            let previous_end = pair[0].exiting.unwrap_or(pair[0].arriving);
            let gap = secs_between(&previous_end, &pair[1].arriving);
            (gap > 0.0).then_some(gap)
        })
        .collect();
    let idle_time: f64 = idle_times.iter().sum();

    let span_start = services[0].arriving;
    let span_end = services
        .iter()
        .map(|r| r.exiting.unwrap_or(r.arriving))
        .max()
        .unwrap_or(span_start);
    let span = secs_between(&span_start, &span_end);
    let idle_proportion = if span > 0.0 { idle_time / span } else { 0.0 };

    let first = arrivals[0];
    let timestamps = arrivals.iter().map(|t| secs_between(&first, t)).collect();

    let model = MmcModel::builder()
        .lambda(lambda)
        .mu(mu)
        .servers(servers)
        .build()?;
    let mut metrics = model.solve_lenient(max_n)?;
    if !metrics.is_stable() {
        warn!(
            arrival_queue,
            service_queue,
            rho = metrics.rho,
            "measured system is unstable"
        );
    }

    debug!(
        arrival_queue,
        service_queue,
        arrivals = arrivals.len(),
        services = services.len(),
        lambda,
        mu,
        "measured queue"
    );

    metrics.observed = Some(Observations {
        idle_time,
        idle_proportion,
        avg_service_time,
        waiting_times,
        idle_times,
        inter_arrivals,
        service_times,
        timestamps,
    });

    Ok(metrics)
}

/// Cumulative arrivals (from `arrival_queue`) and departures (from `service_queue`) over time.
pub fn cumulative(
    records: &[QueueRecord],
    arrival_queue: &str,
    service_queue: &str,
) -> Vec<CumulativePoint> {
    let mut events: Vec<(DateTime<Utc>, bool)> = arrival_instants(records, arrival_queue)
        .into_iter()
        .map(|t| (t, true))
        .collect();
    events.extend(
        records
            .iter()
            .filter(|r| r.queue == service_queue)
            .filter_map(|r| r.exiting)
            .map(|t| (t, false)),
    );
    // Arrivals first on ties.
    events.sort_by_key(|(t, is_arrival)| (*t, !*is_arrival));

    let Some(&(start, _)) = events.first() else {
        return Vec::new();
    };

    let mut arrivals = 0;
    let mut departures = 0;
    events
        .into_iter()
        .map(|(t, is_arrival)| {
            if is_arrival {
                arrivals += 1;
            } else {
                departures += 1;
            }
            CumulativePoint {
                time: secs_between(&start, &t),
                arrivals,
                departures,
            }
        })
        .collect()
}

fn arrival_instants(records: &[QueueRecord], queue: &str) -> Vec<DateTime<Utc>> {
    let mut instants: Vec<_> = records
        .iter()
        .filter(|r| r.queue == queue)
        .map(|r| r.arriving)
        .collect();
    instants.sort();
    instants
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::record::QueueKind;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn arrival(queue: &str, element: u64, at: i64) -> QueueRecord {
        QueueRecord {
            id: format!("a{element}"),
            queue: queue.to_string(),
            kind: QueueKind::Arrival,
            timestamp: t(at),
            total_time_ms: 0,
            element,
            arriving: t(at),
            exiting: None,
        }
    }

    fn service(queue: &str, element: u64, from: i64, to: i64) -> QueueRecord {
        QueueRecord {
            id: format!("s{element}"),
            queue: queue.to_string(),
            kind: QueueKind::Service,
            timestamp: t(to),
            total_time_ms: ((to - from) * 1000) as u64,
            element,
            arriving: t(from),
            exiting: Some(t(to)),
        }
    }

    fn sample() -> Vec<QueueRecord> {
        vec![
            arrival("Porta", 1, 0),
            arrival("Porta", 2, 4),
            arrival("Porta", 3, 8),
            service("Caixa", 1, 1, 3),
            service("Caixa", 2, 5, 7),
            service("Caixa", 3, 10, 12),
        ]
    }

    #[test]
    fn estimates_rates_from_records() {
        let metrics = measure(&sample(), "Porta", "Caixa", 1, 5).unwrap();

        assert!((metrics.lambda - 0.25).abs() < 1e-9);
        assert!((metrics.mu - 0.5).abs() < 1e-9);
        assert!((metrics.rho - 0.5).abs() < 1e-9);
        assert!((metrics.l - 1.0).abs() < 1e-9);

        let observed = metrics.observed.unwrap();
        assert_eq!(observed.inter_arrivals, vec![4.0, 4.0]);
        assert_eq!(observed.service_times, vec![2.0, 2.0, 2.0]);
        assert_eq!(observed.waiting_times, vec![1.0, 1.0, 2.0]);
        assert_eq!(observed.idle_times, vec![2.0, 3.0]);
        assert!((observed.idle_time - 5.0).abs() < 1e-9);
        assert!((observed.idle_proportion - 5.0 / 11.0).abs() < 1e-9);
        assert_eq!(observed.timestamps, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn needs_two_arrivals() {
        let records = vec![arrival("Porta", 1, 0), service("Caixa", 1, 1, 3)];
        assert_matches!(
            measure(&records, "Porta", "Caixa", 1, 5),
            Err(LabError::InsufficientData(_))
        );
    }

    #[test]
    fn unstable_measurement_is_still_reported() {
        let records = vec![
            arrival("Porta", 1, 0),
            arrival("Porta", 2, 1),
            service("Caixa", 1, 0, 5),
        ];
        let metrics = measure(&records, "Porta", "Caixa", 1, 3).unwrap();

        assert!((metrics.rho - 5.0).abs() < 1e-9);
        assert!(!metrics.is_stable());
        assert!(metrics.observed.is_some());
    }

    #[test]
    fn unstable_measurement_logs_a_warning() {
        use tracing::Level;
        use tracing_capture::{CaptureLayer, SharedStorage};
        use tracing_subscriber::layer::SubscriberExt;

        let storage = SharedStorage::default();
        let subscriber = tracing_subscriber::registry().with(CaptureLayer::new(&storage));

        let records = vec![
            arrival("Porta", 1, 0),
            arrival("Porta", 2, 1),
            service("Caixa", 1, 0, 5),
        ];
        tracing::subscriber::with_default(subscriber, || {
            measure(&records, "Porta", "Caixa", 1, 3).unwrap();
        });

        let storage = storage.lock();
        let warnings: Vec<_> = storage
            .all_events()
            .filter(|event| *event.metadata().level() == Level::WARN)
            .collect();
        assert_eq!(warnings.len(), 1, "should warn once about the unstable system");
        assert_eq!(warnings[0].message(), Some("measured system is unstable"));
    }

    #[test]
    fn cumulative_counts_events_in_order() {
        let points = cumulative(&sample(), "Porta", "Caixa");

        assert_eq!(points.len(), 6);
        assert_eq!(points[0], CumulativePoint { time: 0.0, arrivals: 1, departures: 0 });
        assert_eq!(points[1], CumulativePoint { time: 3.0, arrivals: 1, departures: 1 });
        let last = points.last().unwrap();
        assert_eq!((last.arrivals, last.departures), (3, 3));
        assert!((last.time - 12.0).abs() < 1e-9);
    }
}
