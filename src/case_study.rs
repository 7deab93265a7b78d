//! Canned M/M/1 examples.

use chrono::{DateTime, Utc};

use crate::{
    error::{LabError, LabResult},
    measure::CumulativePoint,
    model::{MmcModel, QueueMetrics, DEFAULT_MAX_N},
    record::new_record_id,
    service::{Service, ServiceOrigin},
};

/// A ready-made example system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseStudy {
    /// Title.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Arrival rate.
    pub lambda: f64,
    /// Service rate.
    pub mu: f64,
    /// Illustrative `(time, arrivals, departures)` over the first few minutes.
    pub chart: &'static [(f64, usize, usize)],
}

/// Arrival queue named by every case study.
pub const ARRIVAL_QUEUE: &str = "Chegada Exemplo";

/// Service queue named by every case study.
pub const SERVICE_QUEUE: &str = "Atendimento Exemplo";

/// The available studies, in display order.
pub const CASE_STUDIES: [CaseStudy; 3] = [
    CaseStudy {
        name: "Case study 1: Stable M/M/1",
        description: "A single server with λ = 0.5 clients/min and μ = 1 client/min. \
                      Stable, with ρ = 0.5.",
        lambda: 0.5,
        mu: 1.0,
        chart: &[
            (0.0, 0, 0),
            (1.0, 1, 0),
            (2.0, 1, 1),
            (3.0, 2, 1),
            (4.0, 2, 2),
            (5.0, 3, 2),
        ],
    },
    CaseStudy {
        name: "Case study 2: Overloaded M/M/1",
        description: "High utilisation, ρ = 0.8, with λ = 0.8 and μ = 1. Shows the cost of load.",
        lambda: 0.8,
        mu: 1.0,
        chart: &[
            (0.0, 0, 0),
            (1.0, 1, 0),
            (2.0, 2, 0),
            (3.0, 3, 0),
            (4.0, 4, 1),
            (5.0, 5, 1),
        ],
    },
    CaseStudy {
        name: "Case study 3: Efficient system",
        description: "Little waiting, with λ = 0.2 and μ = 2. ρ = 0.1.",
        lambda: 0.2,
        mu: 2.0,
        chart: &[
            (0.0, 0, 0),
            (1.0, 1, 1),
            (2.0, 1, 1),
            (3.0, 2, 2),
            (4.0, 2, 2),
            (5.0, 3, 3),
        ],
    },
];

impl CaseStudy {
    /// Look a study up by its zero-based index.
    pub fn get(index: usize) -> LabResult<&'static CaseStudy> {
        CASE_STUDIES
            .get(index)
            .ok_or(LabError::UnknownCaseStudy(index))
    }

    /// Solve the study's M/M/1 system.
    pub fn solve(&self) -> LabResult<QueueMetrics> {
        MmcModel::builder()
            .lambda(self.lambda)
            .mu(self.mu)
            .build()?
            .solve(DEFAULT_MAX_N)
    }

    /// The illustrative chart as cumulative points.
    pub fn cumulative(&self) -> Vec<CumulativePoint> {
        self.chart
            .iter()
            .map(|&(time, arrivals, departures)| CumulativePoint {
                time,
                arrivals,
                departures,
            })
            .collect()
    }

    /// The study as a service, ready to be saved.
    pub fn to_service(&self, now: DateTime<Utc>) -> LabResult<Service> {
        Ok(Service {
            id: new_record_id(),
            name: self.name.to_string(),
            origin: ServiceOrigin::CaseStudy,
            arrival_queue: ARRIVAL_QUEUE.to_string(),
            service_queue: SERVICE_QUEUE.to_string(),
            metrics: self.solve()?,
            cumulative: self.cumulative(),
            created_at: now,
        })
    }
}
