//! Closed-form M/M/c steady state.
//!
//! With `a = λ/μ` and `ρ = a/c`:
//!
//! - `P0 = [Σ_{n<c} aⁿ/n! + a^c/(c!(1-ρ))]⁻¹`
//! - `P(n) = P0·aⁿ/n!` for `n ≤ c`, `P(c)·ρ^{n-c}` beyond
//! - `Lq = P0·a^c·ρ/(c!(1-ρ)²)`, `L = Lq + a`, `Wq = Lq/λ`, `W = Wq + 1/μ`
//!
//! Terms are carried as logarithms so large `c` or `a` cannot overflow.

use bon::bon;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LabError, LabResult};

/// Default number of states reported in `P(n)`.
pub const DEFAULT_MAX_N: usize = 10;

/// Most `P(n)` states a model reports.
pub const MAX_STATES: usize = 10_000;

/// Most servers a model or simulation accepts.
pub const MAX_SERVERS: u32 = 10_000;

/// Performance figures of a queueing system.
///
/// Figures that could not be computed (e.g. for an unstable measured system) are non-finite and
/// rendered as `N/A`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// Arrival rate.
    #[serde(with = "nullable_f64")]
    pub lambda: f64,
    /// Service rate per server.
    #[serde(with = "nullable_f64")]
    pub mu: f64,
    /// Utilisation, `λ/(cμ)`.
    #[serde(with = "nullable_f64")]
    pub rho: f64,
    /// Expected number in the system.
    #[serde(with = "nullable_f64")]
    pub l: f64,
    /// Expected number waiting.
    #[serde(with = "nullable_f64")]
    pub lq: f64,
    /// Expected time in the system.
    #[serde(with = "nullable_f64")]
    pub w: f64,
    /// Expected time waiting.
    #[serde(with = "nullable_f64")]
    pub wq: f64,
    /// `P(0..=max_n)`. `None` where not computed.
    pub p: Vec<Option<f64>>,
    /// Number of servers.
    pub servers: u32,
    /// Probability that an arrival has to wait (Erlang C).
    #[serde(default)]
    pub prob_wait: Option<f64>,
    /// Raw observations, when the metrics come from measured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<Observations>,
}

/// Samples behind measured metrics. All times in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observations {
    /// Total server idle time.
    pub idle_time: f64,
    /// Idle time over the observed service span.
    pub idle_proportion: f64,
    /// Mean service duration.
    pub avg_service_time: f64,
    /// Per-client wait between arrival and start of service.
    pub waiting_times: Vec<f64>,
    /// Gaps between consecutive services.
    pub idle_times: Vec<f64>,
    /// Gaps between consecutive arrivals.
    pub inter_arrivals: Vec<f64>,
    /// Service durations.
    pub service_times: Vec<f64>,
    /// Arrival instants relative to the first arrival.
    pub timestamps: Vec<f64>,
}

impl QueueMetrics {
    /// `P(0)`, if computed.
    pub fn p0(&self) -> Option<f64> {
        self.p.first().copied().flatten()
    }

    /// Whether the steady-state figures are available.
    pub fn is_stable(&self) -> bool {
        self.rho < 1.0 && self.l.is_finite()
    }
}

/// An M/M/c queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmcModel {
    lambda: f64,
    mu: f64,
    servers: u32,
}

#[bon]
impl MmcModel {
    /// Validate the parameters.
    #[builder]
    pub fn new(
        /// Arrival rate, > 0.
        lambda: f64,
        /// Service rate per server, > 0.
        mu: f64,
        /// Number of servers, ≥ 1.
        #[builder(default = 1)]
        servers: u32,
    ) -> LabResult<Self> {
        check_rate("lambda", lambda)?;
        check_rate("mu", mu)?;
        check_servers(servers)?;
        Ok(Self {
            lambda,
            mu,
            servers,
        })
    }
}

impl MmcModel {
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

    /// Offered load `a = λ/μ`.
    pub fn offered_load(&self) -> f64 {
        self.lambda / self.mu
    }

    /// Utilisation `ρ = λ/(cμ)`.
    pub fn utilisation(&self) -> f64 {
        self.lambda / (self.servers as f64 * self.mu)
    }

    /// Steady-state metrics with `P(0..=max_n)`.
    ///
    /// Fails with [`LabError::Unstable`] when `ρ ≥ 1`.
    pub fn solve(&self, max_n: usize) -> LabResult<QueueMetrics> {
        check_max_n(max_n)?;
        let rho = self.utilisation();
        if rho >= 1.0 {
            return Err(LabError::Unstable { rho });
        }

        let c = self.servers as usize;
        let a = self.offered_load();

        // ln(aⁿ/n!) for n in 0..=c
        let mut log_terms = Vec::with_capacity(c + 1);
        log_terms.push(0.0);
        for n in 1..=c {
            let prev = log_terms[n - 1];
            log_terms.push(prev + a.ln() - (n as f64).ln());
        }
        let log_tail = log_terms[c] - (1.0 - rho).ln();

        let max = log_terms[..c]
            .iter()
            .copied()
            .fold(log_tail, f64::max);
        let scaled_sum: f64 = log_terms[..c]
            .iter()
            .map(|t| (t - max).exp())
            .sum::<f64>()
            + (log_tail - max).exp();
        let log_p0 = -(max + scaled_sum.ln());

        let prob_wait = (log_p0 + log_tail).exp();
        let lq = prob_wait * rho / (1.0 - rho);
        let l = lq + a;
        let wq = lq / self.lambda;
        let w = wq + 1.0 / self.mu;

        let p = (0..=max_n)
            .map(|n| {
                let log_p = if n <= c {
                    log_p0 + log_terms[n]
                } else {
                    log_p0 + log_terms[c] + (n - c) as f64 * rho.ln()
                };
                Some(log_p.exp())
            })
            .collect();

        debug!(
            lambda = self.lambda,
            mu = self.mu,
            servers = self.servers,
            rho,
            l,
            "solved M/M/c model"
        );

        Ok(QueueMetrics {
            lambda: self.lambda,
            mu: self.mu,
            rho,
            l,
            lq,
            w,
            wq,
            p,
            servers: self.servers,
            prob_wait: Some(prob_wait),
            observed: None,
        })
    }

    /// Like [`solve`](Self::solve), but an unstable system still reports its rates and `ρ`, with
    /// the steady-state figures left non-finite.
    pub fn solve_lenient(&self, max_n: usize) -> LabResult<QueueMetrics> {
        match self.solve(max_n) {
            Err(LabError::Unstable { .. }) => Ok(QueueMetrics {
                lambda: self.lambda,
                mu: self.mu,
                rho: self.utilisation(),
                l: f64::INFINITY,
                lq: f64::INFINITY,
                w: f64::INFINITY,
                wq: f64::INFINITY,
                p: vec![None; max_n + 1],
                servers: self.servers,
                prob_wait: None,
                observed: None,
            }),
            other => other,
        }
    }
}

pub(crate) fn check_servers(servers: u32) -> LabResult<()> {
    if (1..=MAX_SERVERS).contains(&servers) {
        Ok(())
    } else {
        Err(LabError::InvalidParameter(format!(
            "number of servers must be between 1 and {MAX_SERVERS}, got {servers}"
        )))
    }
}

fn check_max_n(max_n: usize) -> LabResult<()> {
    if max_n <= MAX_STATES {
        Ok(())
    } else {
        Err(LabError::InvalidParameter(format!(
            "at most {MAX_STATES} states can be reported, got {max_n}"
        )))
    }
}

fn check_rate(name: &str, value: f64) -> LabResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LabError::InvalidParameter(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

/// JSON has no infinities. Non-finite values are written as `null` and read back as NaN.
mod nullable_f64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn mm1_matches_textbook() {
        let m = MmcModel::builder().lambda(0.5).mu(1.0).build().unwrap();
        let metrics = m.solve(DEFAULT_MAX_N).unwrap();

        assert!(close(metrics.rho, 0.5));
        assert!(close(metrics.l, 1.0));
        assert!(close(metrics.lq, 0.5));
        assert!(close(metrics.w, 2.0));
        assert!(close(metrics.wq, 1.0));
        assert_eq!(metrics.p.len(), 11);
        for (n, p) in metrics.p.iter().enumerate() {
            assert!(close(p.unwrap(), 0.5 * 0.5f64.powi(n as i32)));
        }
    }

    #[test]
    fn mm2_known_values() {
        // a = 1, ρ = 0.5: P0 = 1/3, Lq = 1/3.
        let m = MmcModel::builder().lambda(1.0).mu(1.0).servers(2).build().unwrap();
        let metrics = m.solve(5).unwrap();

        assert!(close(metrics.p0().unwrap(), 1.0 / 3.0));
        assert!(close(metrics.lq, 1.0 / 3.0));
        assert!(close(metrics.l, 4.0 / 3.0));
        assert!(close(metrics.wq, 1.0 / 3.0));
        assert!(close(metrics.prob_wait.unwrap(), 1.0 / 3.0));
    }

    #[test]
    fn littles_law_holds() {
        let m = MmcModel::builder().lambda(7.0).mu(2.0).servers(5).build().unwrap();
        let metrics = m.solve(DEFAULT_MAX_N).unwrap();

        assert!(close(metrics.l, metrics.lambda * metrics.w));
        assert!(close(metrics.lq, metrics.lambda * metrics.wq));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let m = MmcModel::builder().lambda(3.0).mu(1.0).servers(4).build().unwrap();
        let metrics = m.solve(400).unwrap();

        let total: f64 = metrics.p.iter().map(|p| p.unwrap()).sum();
        assert!((total - 1.0).abs() < 1e-9, "sum was {total}");
    }

    #[test]
    fn large_systems_do_not_overflow() {
        let m = MmcModel::builder().lambda(900.0).mu(1.0).servers(1000).build().unwrap();
        let metrics = m.solve(DEFAULT_MAX_N).unwrap();

        assert!(metrics.l.is_finite());
        assert!(metrics.p0().unwrap().is_finite());
        assert!((metrics.l - metrics.lambda * metrics.w).abs() < 1e-6);
    }

    #[test]
    fn unstable_is_rejected() {
        let m = MmcModel::builder().lambda(2.0).mu(1.0).build().unwrap();
        assert_matches!(m.solve(10), Err(LabError::Unstable { rho }) if close(rho, 2.0));

        let lenient = m.solve_lenient(3).unwrap();
        assert!(close(lenient.rho, 2.0));
        assert!(!lenient.l.is_finite());
        assert_eq!(lenient.p, vec![None; 4]);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_matches!(
            MmcModel::builder().lambda(0.0).mu(1.0).build(),
            Err(LabError::InvalidParameter(_))
        );
        assert_matches!(
            MmcModel::builder().lambda(1.0).mu(f64::NAN).build(),
            Err(LabError::InvalidParameter(_))
        );
        assert_matches!(
            MmcModel::builder().lambda(1.0).mu(2.0).servers(0).build(),
            Err(LabError::InvalidParameter(_))
        );
        assert_matches!(
            MmcModel::builder().lambda(1.0).mu(2.0).servers(MAX_SERVERS + 1).build(),
            Err(LabError::InvalidParameter(_))
        );
    }

    #[test]
    fn state_count_is_bounded() {
        let stable = MmcModel::builder().lambda(0.5).mu(1.0).build().unwrap();
        let unstable = MmcModel::builder().lambda(2.0).mu(1.0).build().unwrap();

        assert_eq!(stable.solve(MAX_STATES).unwrap().p.len(), MAX_STATES + 1);
        assert_matches!(stable.solve(10_000_000_000), Err(LabError::InvalidParameter(_)));
        assert_matches!(
            unstable.solve_lenient(10_000_000_000),
            Err(LabError::InvalidParameter(_))
        );
    }

    #[test]
    fn non_finite_metrics_survive_json() {
        let m = MmcModel::builder().lambda(2.0).mu(1.0).build().unwrap();
        let json = serde_json::to_string(&m.solve_lenient(2).unwrap()).unwrap();
        let back: QueueMetrics = serde_json::from_str(&json).unwrap();

        assert!(back.l.is_nan());
        assert!(close(back.rho, 2.0));
    }
}
