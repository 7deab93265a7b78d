//! Discrete-event simulation of an M/M/c queue.
//!
//! Time jumps from event to event: the next arrival or the earliest departure among the busy
//! servers. Clients are served in arrival order.

mod arrival;
mod metrics;
mod service_time;

use std::collections::VecDeque;

use bon::bon;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use arrival::PoissonArrivals;
pub use metrics::{percentile, ChartPoint, CustomerMetrics, MetricsCollector};
pub use service_time::ServiceProfile;

use crate::{
    error::{LabError, LabResult},
    model::{check_servers, QueueMetrics},
};

/// Mixed into the seed of the service-time stream, so arrivals and services are independent.
const SERVICE_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Parameters of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    lambda: f64,
    mu: f64,
    servers: u32,
    horizon: f64,
    phases: u32,
    seed: Option<u64>,
}

#[bon]
impl SimulationConfig {
    /// Validate the parameters. An unstable `ρ` is allowed.
    #[builder]
    pub fn new(
        /// Arrival rate
        #[builder(default = 0.5)]
        lambda: f64,
        /// Service rate per server
        #[builder(default = 1.0)]
        mu: f64,
        /// Number of servers
        #[builder(default = 1)]
        servers: u32,
        /// Simulated time to run for
        #[builder(default = 100.0)]
        horizon: f64,
        /// Erlang phases per service. One gives exponential service.
        #[builder(default = 1)]
        phases: u32,
        /// Seed for reproducibility
        seed: Option<u64>,
    ) -> LabResult<Self> {
        for (name, value) in [("lambda", lambda), ("mu", mu), ("time", horizon)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(LabError::InvalidParameter(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        check_servers(servers)?;
        if phases == 0 {
            return Err(LabError::InvalidParameter(
                "a service needs at least one phase".to_string(),
            ));
        }

        Ok(Self {
            lambda,
            mu,
            servers,
            horizon,
            phases,
            seed,
        })
    }
}

impl SimulationConfig {
    /// Arrival rate.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Service rate per server.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Number of servers.
    pub fn servers(&self) -> u32 {
        self.servers
    }

    /// Simulated time to run for.
    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// Erlang phases per service.
    pub fn phases(&self) -> u32 {
        self.phases
    }

    /// Seed, if fixed.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// `λ/(cμ)`.
    pub fn utilisation(&self) -> f64 {
        self.lambda / (self.servers as f64 * self.mu)
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// What was simulated.
    pub config: SimulationConfig,
    /// `L`, `Lq`, `W`, `Wq` as observed. `P(n)` is not estimated.
    pub metrics: QueueMetrics,
    /// Time-averaged fraction of busy servers.
    pub observed_utilisation: f64,
    /// Longest the queue got.
    pub max_queue_length: usize,
    /// Clients that arrived before the horizon.
    pub arrivals: usize,
    /// Clients that finished service before the horizon.
    pub completed: usize,
    /// Median time in system.
    pub p50_time_in_system: f64,
    /// 99th percentile time in system.
    pub p99_time_in_system: f64,
    /// One point per event.
    pub chart: Vec<ChartPoint>,
}

/// Run the simulation to completion.
pub fn run(config: &SimulationConfig) -> LabResult<SimulationResult> {
    let mut arrivals = PoissonArrivals::new(config.lambda, config.seed)?;
    let mut service = ServiceProfile::builder()
        .rate(config.mu)
        .phases(config.phases)
        .maybe_seed(config.seed.map(|s| s ^ SERVICE_SEED_SALT))
        .build()?;

    let servers = config.servers as usize;
    let horizon = config.horizon;

    // Each busy server holds (finishes_at, customer).
    let mut busy: Vec<Option<(f64, usize)>> = vec![None; servers];
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut collector = MetricsCollector::new();

    let mut next_arrival = arrivals.next_inter_arrival();

    loop {
        let next_departure = busy
            .iter()
            .enumerate()
            .filter_map(|(server, slot)| slot.map(|(at, _)| (server, at)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let departure_at = next_departure.map_or(f64::INFINITY, |(_, at)| at);

        let now = next_arrival.min(departure_at);
        let in_service = busy.iter().filter(|s| s.is_some()).count();
        if now > horizon {
            collector.advance(horizon, queue.len(), in_service);
            break;
        }
        collector.advance(now, queue.len(), in_service);

        match next_departure {
            Some((server, at)) if at < next_arrival => {
                if let Some((_, customer)) = busy[server].take() {
                    collector.record_departure(customer, now);
                }
                if let Some(customer) = queue.pop_front() {
                    collector.record_service_start(customer, now);
                    busy[server] = Some((now + service.sample(), customer));
                }
            }
            _ => {
                let customer = collector.record_arrival(now);
                match busy.iter().position(|s| s.is_none()) {
                    Some(server) => {
                        collector.record_service_start(customer, now);
                        busy[server] = Some((now + service.sample(), customer));
                    }
                    None => queue.push_back(customer),
                }
                next_arrival = now + arrivals.next_inter_arrival();
            }
        }

        let in_service = busy.iter().filter(|s| s.is_some()).count();
        collector.record_point(now, queue.len(), in_service, servers);
    }

    let samples = collector.time_in_system_samples();
    let arrived = collector.customers().len();
    let completed = samples.len();

    let metrics = QueueMetrics {
        lambda: config.lambda,
        mu: config.mu,
        rho: config.utilisation(),
        l: collector.mean_in_system(horizon),
        lq: collector.mean_in_queue(horizon),
        w: collector.mean_time_in_system(),
        wq: collector.mean_wait(),
        p: vec![None],
        servers: config.servers,
        prob_wait: None,
        observed: None,
    };

    info!(
        lambda = config.lambda,
        mu = config.mu,
        servers = config.servers,
        horizon,
        arrivals = arrived,
        completed,
        "simulation finished"
    );
    debug!(l = metrics.l, lq = metrics.lq, w = metrics.w, wq = metrics.wq, "simulated metrics");

    Ok(SimulationResult {
        config: *config,
        observed_utilisation: collector.mean_utilisation(horizon, servers),
        max_queue_length: collector.max_queue_length(),
        arrivals: arrived,
        completed,
        p50_time_in_system: percentile(&samples, 0.5),
        p99_time_in_system: percentile(&samples, 0.99),
        metrics,
        chart: collector.into_chart(),
    })
}
