//! Service time distribution using Gamma/Erlang distribution

use bon::bon;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};

use crate::error::{LabError, LabResult};

/// Service time profile configured by number of phases and service rate.
///
/// Uses an Erlang distribution to model a service as `phases` sequential, exponentially
/// distributed steps. The mean is always `1 / rate`; one phase is the exponential service of an
/// M/M/c queue.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    phases: u32,
    rate: f64,

    distribution: Gamma<f64>,
    /// RNG for reproducibility
    rng: rand::rngs::StdRng,
}

#[bon]
impl ServiceProfile {
    /// Create a new service profile
    #[builder]
    pub fn new(
        /// Services completed per unit of time, per server
        rate: f64,
        /// Number of exponential phases per service
        #[builder(default = 1)]
        phases: u32,
        /// Optional seed for reproducibility
        seed: Option<u64>,
    ) -> LabResult<Self> {
        if phases == 0 {
            return Err(LabError::InvalidParameter(
                "a service needs at least one phase".to_string(),
            ));
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(LabError::InvalidParameter(format!(
                "service rate must be a positive number, got {rate}"
            )));
        }

        // Erlang(k, kμ) is equivalent to Gamma(k, 1/(kμ)), with mean 1/μ
        let shape = phases as f64;
        let scale = 1.0 / (phases as f64 * rate);
        let distribution = Gamma::new(shape, scale)
            .map_err(|e| LabError::InvalidParameter(format!("service profile: {e}")))?;

        let rng = match seed {
            Some(s) => rand::rngs::StdRng::seed_from_u64(s),
            None => rand::rngs::StdRng::from_os_rng(),
        };

        Ok(Self {
            phases,
            rate,
            distribution,
            rng,
        })
    }
}

impl ServiceProfile {
    /// Sample a service duration
    pub fn sample(&mut self) -> f64 {
        self.distribution.sample(&mut self.rng)
    }

    /// Mean service duration
    pub fn mean(&self) -> f64 {
        1.0 / self.rate
    }

    /// Number of phases
    pub fn phases(&self) -> u32 {
        self.phases
    }
}
