//! Poisson arrivals.

use rand::SeedableRng;
use rand_distr::{Distribution, Exp};

use crate::error::{LabError, LabResult};

/// Gaps between clients arriving at rate λ, in seconds.
pub struct PoissonArrivals {
    rate: f64,
    exp_dist: Exp<f64>,
    rng: rand::rngs::StdRng,
}

impl PoissonArrivals {
    /// Clients arriving `rate` times per second on average. The same `seed` replays the same gaps.
    pub fn new(rate: f64, seed: Option<u64>) -> LabResult<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(LabError::InvalidParameter(format!(
                "arrival rate must be a positive number, got {rate}"
            )));
        }
        let exp_dist = Exp::new(rate)
            .map_err(|e| LabError::InvalidParameter(format!("arrival rate {rate}: {e}")))?;
        let rng = match seed {
            Some(s) => rand::rngs::StdRng::seed_from_u64(s),
            None => rand::rngs::StdRng::from_os_rng(),
        };

        Ok(Self {
            rate,
            exp_dist,
            rng,
        })
    }

    /// λ, in clients per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Seconds until the next client.
    pub fn next_inter_arrival(&mut self) -> f64 {
        self.exp_dist.sample(&mut self.rng)
    }
}
