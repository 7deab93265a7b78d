//! Settings read from a TOML file.
//!
//! ```toml
//! data_dir = "lab-data"
//! assumed_service_time_secs = 5.0
//! default_max_n = 10
//! default_servers = 1
//! plot_format = "pdf"
//!
//! [time]
//! start = "2024-03-01T09:00:00Z"
//! millis = 250
//! ```

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    clock::{Clock, OffsetClock, SystemClock},
    error::LabResult,
    model::DEFAULT_MAX_N,
    plot::PlotFormat,
};

/// Lab settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabConfig {
    /// Where the collections are kept.
    pub data_dir: PathBuf,
    /// Service time assumed by the dashboard, in seconds.
    pub assumed_service_time_secs: f64,
    /// Number of `P(n)` states computed.
    pub default_max_n: usize,
    /// Servers assumed when not given.
    pub default_servers: u32,
    /// Chart output.
    pub plot_format: PlotFormat,
    /// Custom clock.
    pub time: Option<TimeConfig>,
}

/// Start the lab's clock at a chosen instant instead of the wall clock.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeConfig {
    /// Instant the clock starts from.
    pub start: DateTime<Utc>,
    /// Millisecond part of the start, `0..=999`.
    #[serde(default)]
    pub millis: u32,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("queue-lab-data"),
            assumed_service_time_secs: 5.0,
            default_max_n: DEFAULT_MAX_N,
            default_servers: 1,
            plot_format: PlotFormat::Png,
            time: None,
        }
    }
}

impl LabConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> LabResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &std::path::Path) -> LabResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// The clock the settings ask for.
    pub fn clock(&self) -> LabResult<Arc<dyn Clock>> {
        let clock: Arc<dyn Clock> = match &self.time {
            Some(time) => Arc::new(OffsetClock::new(time.start, time.millis)?),
            None => Arc::new(SystemClock),
        };
        Ok(clock)
    }
}
