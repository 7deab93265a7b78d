//! Metrics collection and analysis

use serde::{Deserialize, Serialize};

/// State of the system right after an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Simulated time.
    pub time: f64,
    /// Customers waiting, not counting those in service.
    pub queue_length: usize,
    /// Busy servers over total servers.
    pub utilisation: f64,
}

/// Timeline of a single customer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomerMetrics {
    arrived_at: f64,
    started_at: Option<f64>,
    finished_at: Option<f64>,
}

impl CustomerMetrics {
    fn arrived(at: f64) -> Self {
        Self {
            arrived_at: at,
            started_at: None,
            finished_at: None,
        }
    }

    /// Time spent queueing, once service has started.
    pub fn wait(&self) -> Option<f64> {
        self.started_at.map(|s| s - self.arrived_at)
    }

    /// Time spent in the system, once service has finished.
    pub fn time_in_system(&self) -> Option<f64> {
        self.finished_at.map(|f| f - self.arrived_at)
    }
}

/// Collects metrics during simulation
///
/// Areas under the number-in-system, number-in-queue and busy-server curves are integrated between
/// events, so their time averages come out exactly.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    last_event: f64,
    area_system: f64,
    area_queue: f64,
    area_busy: f64,
    max_queue_length: usize,
    customers: Vec<CustomerMetrics>,
    chart: Vec<ChartPoint>,
}

impl MetricsCollector {
    /// An empty collector at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate the current state up to `now`.
    pub fn advance(&mut self, now: f64, queue_length: usize, busy: usize) {
        let dt = now - self.last_event;
        if dt > 0.0 {
            self.area_system += dt * (queue_length + busy) as f64;
            self.area_queue += dt * queue_length as f64;
            self.area_busy += dt * busy as f64;
        }
        self.last_event = now;
    }

    /// Register a new customer, returning its index.
    pub fn record_arrival(&mut self, at: f64) -> usize {
        self.customers.push(CustomerMetrics::arrived(at));
        self.customers.len() - 1
    }

    /// A server picked `customer` up.
    pub fn record_service_start(&mut self, customer: usize, at: f64) {
        self.customers[customer].started_at = Some(at);
    }

    /// `customer` left.
    pub fn record_departure(&mut self, customer: usize, at: f64) {
        self.customers[customer].finished_at = Some(at);
    }

    /// Snapshot the system after an event.
    pub fn record_point(&mut self, time: f64, queue_length: usize, busy: usize, servers: usize) {
        self.max_queue_length = self.max_queue_length.max(queue_length);
        self.chart.push(ChartPoint {
            time,
            queue_length,
            utilisation: busy as f64 / servers as f64,
        });
    }

    /// Every customer that arrived.
    pub fn customers(&self) -> &[CustomerMetrics] {
        &self.customers
    }

    /// Longest queue seen by [`record_point`](Self::record_point).
    pub fn max_queue_length(&self) -> usize {
        self.max_queue_length
    }

    /// The recorded points.
    pub fn into_chart(self) -> Vec<ChartPoint> {
        self.chart
    }

    /// Time-averaged number in system over `[0, horizon]`.
    pub fn mean_in_system(&self, horizon: f64) -> f64 {
        self.area_system / horizon
    }

    /// Time-averaged number waiting over `[0, horizon]`.
    pub fn mean_in_queue(&self, horizon: f64) -> f64 {
        self.area_queue / horizon
    }

    /// Time-averaged fraction of busy servers over `[0, horizon]`.
    pub fn mean_utilisation(&self, horizon: f64, servers: usize) -> f64 {
        self.area_busy / (horizon * servers as f64)
    }

    /// Mean time in system over customers that finished. NaN if none did.
    pub fn mean_time_in_system(&self) -> f64 {
        mean_or_nan(self.customers.iter().filter_map(|c| c.time_in_system()))
    }

    /// Mean wait over customers that started service. NaN if none did.
    pub fn mean_wait(&self) -> f64 {
        mean_or_nan(self.customers.iter().filter_map(|c| c.wait()))
    }

    /// Sorted times in system of the customers that finished.
    pub fn time_in_system_samples(&self) -> Vec<f64> {
        let mut samples: Vec<f64> = self
            .customers
            .iter()
            .filter_map(|c| c.time_in_system())
            .collect();
        samples.sort_by(f64::total_cmp);
        samples
    }
}

fn mean_or_nan(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Calculate percentile from sorted data, interpolating between ranks. NaN when empty.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return f64::NAN;
    }
    if sorted_data.len() == 1 {
        return sorted_data[0];
    }

    let rank = p * (sorted_data.len() - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;
    let weight = rank - lower_idx as f64;

    sorted_data[lower_idx] * (1.0 - weight) + sorted_data[upper_idx] * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty() {
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_percentile_single() {
        assert_eq!(percentile(&[3.0], 0.99), 3.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&data, 0.5), 2.5);
        assert_eq!(percentile(&data, 1.0), 4.0);
        assert_eq!(percentile(&data, 0.0), 1.0);
    }

    #[test]
    fn test_areas_integrate_between_events() {
        let mut collector = MetricsCollector::new();

        // One customer in service for 2 time units, then one more waiting for 1.
        collector.advance(0.0, 0, 0);
        collector.advance(2.0, 0, 1);
        collector.advance(3.0, 1, 1);

        assert_eq!(collector.mean_in_system(4.0), (2.0 + 2.0) / 4.0);
        assert_eq!(collector.mean_in_queue(4.0), 1.0 / 4.0);
        assert_eq!(collector.mean_utilisation(4.0, 2), 3.0 / 8.0);
    }

    #[test]
    fn test_customer_means() {
        let mut collector = MetricsCollector::new();
        let a = collector.record_arrival(0.0);
        let b = collector.record_arrival(1.0);
        collector.record_service_start(a, 0.0);
        collector.record_departure(a, 2.0);
        collector.record_service_start(b, 2.0);

        assert_eq!(collector.mean_time_in_system(), 2.0);
        assert_eq!(collector.mean_wait(), 0.5);
        assert_eq!(collector.time_in_system_samples(), vec![2.0]);
    }

    #[test]
    fn test_no_customers_is_nan() {
        let collector = MetricsCollector::new();
        assert!(collector.mean_time_in_system().is_nan());
        assert!(collector.mean_wait().is_nan());
    }
}
