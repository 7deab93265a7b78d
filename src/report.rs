//! Plain-text rendering for the terminal.
//!
//! Figures are shown with four decimals. Anything non-finite or missing is `N/A`.

use std::fmt::Write;

use crate::{
    case_study::CASE_STUDIES,
    chronometer::format_elapsed,
    dashboard::Dashboard,
    lab::{QueueOverview, QueueStatus},
    model::QueueMetrics,
    record::{format_instant, QueueRecord},
    service::Service,
    simulation::SimulationResult,
};

/// `value` with four decimals, or `N/A`.
pub fn value(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.4}")
    } else {
        "N/A".to_string()
    }
}

/// Like [`value`] for optional figures.
pub fn maybe_value(v: Option<f64>) -> String {
    v.map_or_else(|| "N/A".to_string(), value)
}

/// The steady-state figures, plus the observations behind measured ones.
pub fn metrics(m: &QueueMetrics) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "λ (arrival rate):      {}", value(m.lambda));
    let _ = writeln!(out, "μ (service rate):      {}", value(m.mu));
    let _ = writeln!(out, "c (servers):           {}", m.servers);
    let _ = writeln!(out, "ρ (utilisation):       {}", value(m.rho));
    let _ = writeln!(out, "L (in system):         {}", value(m.l));
    let _ = writeln!(out, "Lq (in queue):         {}", value(m.lq));
    let _ = writeln!(out, "W (time in system):    {}", value(m.w));
    let _ = writeln!(out, "Wq (time in queue):    {}", value(m.wq));
    let _ = writeln!(out, "P(wait):               {}", maybe_value(m.prob_wait));
    if !m.is_stable() {
        let _ = writeln!(out, "Warning: unstable system (ρ ≥ 1), no steady state");
    }

    if let Some(obs) = &m.observed {
        let _ = writeln!(out, "\nObserved:");
        let _ = writeln!(out, "  Arrivals:            {}", obs.timestamps.len());
        let _ = writeln!(out, "  Services:            {}", obs.service_times.len());
        let _ = writeln!(out, "  Mean service time:   {} s", value(obs.avg_service_time));
        let _ = writeln!(out, "  Idle time:           {} s", value(obs.idle_time));
        let _ = writeln!(
            out,
            "  Idle proportion:     {} %",
            value(obs.idle_proportion * 100.0)
        );
        let mean_wait = if obs.waiting_times.is_empty() {
            f64::NAN
        } else {
            obs.waiting_times.iter().sum::<f64>() / obs.waiting_times.len() as f64
        };
        let _ = writeln!(out, "  Mean observed wait:  {} s", value(mean_wait));
    }
    out
}

/// `n | P(n) | P(N ≤ n)` table.
pub fn probabilities(m: &QueueMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>4}  {:>10}  {:>10}", "n", "P(n)", "P(N≤n)");
    let mut cumulative = Some(0.0);
    for (n, p) in m.p.iter().enumerate() {
        cumulative = cumulative.zip(*p).map(|(c, p)| c + p);
        let _ = writeln!(
            out,
            "{:>4}  {:>10}  {:>10}",
            n,
            maybe_value(*p),
            maybe_value(cumulative)
        );
    }
    out
}

/// A saved service, with its figures and `P(n)` table.
pub fn service(s: &Service) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", s.name);
    let _ = writeln!(out, "Id:       {}", s.id);
    let _ = writeln!(out, "Origin:   {}", s.origin);
    let _ = writeln!(out, "Queues:   {} → {}", s.arrival_queue, s.service_queue);
    let _ = writeln!(out, "Saved at: {}\n", format_instant(&s.created_at));
    out.push_str(&metrics(&s.metrics));
    if s.metrics.p.iter().any(Option::is_some) {
        out.push('\n');
        out.push_str(&probabilities(&s.metrics));
    }
    out
}

/// One line per saved service.
pub fn services(services: &[Service]) -> String {
    if services.is_empty() {
        return "No saved services.\n".to_string();
    }
    let mut out = String::new();
    for s in services {
        let _ = writeln!(
            out,
            "{}  {:<40}  {:<10}  ρ = {}  L = {}  W = {}",
            s.id,
            s.name,
            s.origin.to_string(),
            value(s.metrics.rho),
            value(s.metrics.l),
            value(s.metrics.w)
        );
    }
    out
}

/// The canned studies with their inputs.
pub fn case_studies() -> String {
    let mut out = String::new();
    for (index, study) in CASE_STUDIES.iter().enumerate() {
        let _ = writeln!(out, "[{index}] {}", study.name);
        let _ = writeln!(out, "    {}", study.description);
        let _ = writeln!(out, "    λ = {}, μ = {}", study.lambda, study.mu);
    }
    out
}

/// Per-queue summaries, the worst queue and its wait histogram.
pub fn dashboard(d: &Dashboard) -> String {
    if d.is_empty() {
        return "No records yet.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "=== Dashboard ===");
    let _ = writeln!(
        out,
        "{:<20}  {:>7}  {:>10}  {:>10}  {:>10}  {:>10}",
        "Queue", "Records", "W", "Wq", "λ", "ρ"
    );
    for q in &d.queues {
        let _ = writeln!(
            out,
            "{:<20}  {:>7}  {:>10}  {:>10}  {:>10}  {:>10}",
            q.queue,
            q.records,
            value(q.w),
            value(q.wq),
            value(q.lambda),
            value(q.rho)
        );
    }

    if let Some(worst) = &d.worst_queue {
        let _ = writeln!(out, "\nLongest waits: {worst}");
        let widest = d.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
        for bin in &d.histogram {
            let bar = "█".repeat(bin.count * 40 / widest);
            let _ = writeln!(out, "  {:>7}  {:>4}  {bar}", bin.label, bin.count);
        }
    }

    if let Some(last) = d.cumulative.last() {
        let _ = writeln!(
            out,
            "\nCumulative: {} arrived, {} left by {}",
            last.arriving,
            last.exiting,
            format_instant(&last.time)
        );
    }
    out
}

/// Summary of a simulation run.
pub fn simulation(r: &SimulationResult) -> String {
    let mut out = String::new();
    let config = &r.config;
    let _ = writeln!(out, "=== Simulation Configuration ===");
    let _ = writeln!(out, "λ:                     {}", config.lambda());
    let _ = writeln!(out, "μ:                     {}", config.mu());
    let _ = writeln!(out, "Servers:               {}", config.servers());
    let _ = writeln!(out, "Time:                  {}", config.horizon());
    let _ = writeln!(out, "Service phases:        {}", config.phases());
    if let Some(seed) = config.seed() {
        let _ = writeln!(out, "Seed:                  {seed}");
    }

    let _ = writeln!(out, "\n=== Simulation Results ===");
    let _ = writeln!(out, "Arrivals:              {}", r.arrivals);
    let _ = writeln!(out, "Completed:             {}", r.completed);
    let _ = writeln!(out, "Max queue length:      {}", r.max_queue_length);
    let _ = writeln!(out, "Observed utilisation:  {}", value(r.observed_utilisation));
    let _ = writeln!(out, "p50 time in system:    {}", value(r.p50_time_in_system));
    let _ = writeln!(out, "p99 time in system:    {}", value(r.p99_time_in_system));
    out.push('\n');
    out.push_str(&metrics(&r.metrics));
    out
}

/// The records table.
pub fn records<'a>(records: impl IntoIterator<Item = &'a QueueRecord>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16}  {:<16}  {:<8}  {:>7}  {:>10}  {:<24}  {:<24}",
        "Id", "Queue", "Kind", "Element", "Total", "Arriving", "Exiting"
    );
    let mut count = 0;
    for r in records {
        count += 1;
        let _ = writeln!(
            out,
            "{:<16}  {:<16}  {:<8}  {:>7}  {:>9.2}s  {:<24}  {:<24}",
            r.id,
            r.queue,
            r.kind.to_string(),
            r.element,
            r.total_time_secs(),
            format_instant(&r.arriving),
            r.exiting.as_ref().map(format_instant).unwrap_or_default()
        );
    }
    let _ = writeln!(out, "{count} record(s)");
    out
}

/// Queues with their record counts.
pub fn overview(queues: &[QueueOverview]) -> String {
    if queues.is_empty() {
        return "No queues.\n".to_string();
    }
    let mut out = String::new();
    for q in queues {
        let kind = q.kind.map_or_else(|| "removed".to_string(), |k| k.to_string());
        let _ = writeln!(
            out,
            "{:<20}  {:<8}  {} record(s): {} arrival(s), {} service(s)",
            q.name, kind, q.records, q.arrivals, q.services
        );
    }
    out
}

/// Chronometer states.
pub fn status(queues: &[QueueStatus]) -> String {
    let mut out = String::new();
    for q in queues {
        let wait = q
            .current_wait_ms
            .map(|ms| format!(", oldest waiting {}", format_elapsed(ms)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<20}  {:<8}  {}  {} waiting{wait}",
            q.name,
            q.kind.to_string(),
            format_elapsed(q.elapsed_ms),
            q.waiting
        );
    }
    out
}
