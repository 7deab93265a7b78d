//! Saved analyses.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    measure::CumulativePoint, model::QueueMetrics, record::new_record_id,
    simulation::SimulationResult,
};

/// Where a service's metrics came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceOrigin {
    /// Estimated from recorded queues.
    Measured,
    /// Solved from user-given rates.
    Model,
    /// Discrete-event simulation.
    Simulation,
    /// One of the canned case studies.
    CaseStudy,
}

impl Display for ServiceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceOrigin::Measured => "measured",
            ServiceOrigin::Model => "model",
            ServiceOrigin::Simulation => "simulation",
            ServiceOrigin::CaseStudy => "case study",
        })
    }
}

/// An analysis binding an arrival queue to a service queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Random 16 hex digit id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Where the metrics came from.
    pub origin: ServiceOrigin,
    /// Queue the arrivals were taken from.
    pub arrival_queue: String,
    /// Queue the services were taken from.
    pub service_queue: String,
    /// The figures.
    pub metrics: QueueMetrics,
    /// Cumulative arrivals and departures, for charting.
    #[serde(default)]
    pub cumulative: Vec<CumulativePoint>,
    /// When it was saved.
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// A service over recorded queues.
    pub fn measured(
        name: impl Into<String>,
        arrival_queue: impl Into<String>,
        service_queue: impl Into<String>,
        metrics: QueueMetrics,
        cumulative: Vec<CumulativePoint>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_record_id(),
            name: name.into(),
            origin: ServiceOrigin::Measured,
            arrival_queue: arrival_queue.into(),
            service_queue: service_queue.into(),
            metrics,
            cumulative,
            created_at: now,
        }
    }

    /// A service from analytic figures. Named `Custom model M/M/c` unless `name` is given.
    pub fn from_model(name: Option<String>, metrics: QueueMetrics, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            name: name.unwrap_or_else(|| format!("Custom model M/M/{}", metrics.servers)),
            origin: ServiceOrigin::Model,
            arrival_queue: "Custom arrivals".to_string(),
            service_queue: "Custom service".to_string(),
            metrics,
            cumulative: Vec::new(),
            created_at: now,
        }
    }

    /// A service from a simulation run.
    pub fn from_simulation(result: &SimulationResult, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            name: format!("Discrete simulation M/M/{}", result.config.servers()),
            origin: ServiceOrigin::Simulation,
            arrival_queue: "Simulated arrivals".to_string(),
            service_queue: "Simulated service".to_string(),
            metrics: result.metrics.clone(),
            cumulative: Vec::new(),
            created_at: now,
        }
    }
}
