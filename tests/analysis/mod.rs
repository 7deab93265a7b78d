use assert_matches::assert_matches;
use queue_lab::{
    simulation::{self, SimulationConfig},
    LabError, MmcModel, QueueKind, Service,
};

use crate::types::{door_and_till, memory_lab, start};

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

/// Given a door with an arrival every 4s and a till taking 2s per client
/// When the pair is analysed
/// Then the rates and the M/M/1 figures follow from them
#[tokio::test]
async fn analysing_recorded_queues() {
    let (mut lab, _) = door_and_till().await;

    let service = lab.analyze("Porta", "Caixa", 1, 5, None).unwrap();
    let m = &service.metrics;

    assert_eq!(service.name, "Porta → Caixa");
    assert!(close(m.lambda, 0.25));
    assert!(close(m.mu, 0.5));
    assert!(close(m.rho, 0.5));
    assert!(close(m.l, 1.0));
    assert!(close(m.w, 4.0));
    assert_eq!(m.p.len(), 6);

    let observed = m.observed.as_ref().unwrap();
    assert_eq!(observed.waiting_times, vec![1.0; 5]);
    assert_eq!(observed.idle_times, vec![2.0; 4]);

    let last = service.cumulative.last().unwrap();
    assert_eq!((last.arrivals, last.departures), (5, 5));

    assert!(lab.services().is_empty());
    let id = lab.save_service(service).await.unwrap().id.clone();
    assert_eq!(lab.service(&id).unwrap().arrival_queue, "Porta");
}

#[tokio::test]
async fn analysing_needs_data() {
    let (mut lab, _) = memory_lab().await;
    lab.add_queue("Porta", QueueKind::Arrival).await.unwrap();
    lab.add_queue("Caixa", QueueKind::Service).await.unwrap();
    lab.arrive("Porta").await.unwrap();

    assert_matches!(
        lab.analyze("Porta", "Caixa", 1, 5, None),
        Err(LabError::InsufficientData(_))
    );
    assert_matches!(
        lab.analyze("Porta", "Nowhere", 1, 5, None),
        Err(LabError::UnknownQueue(_))
    );
}

#[test]
fn two_servers_wait_less_than_one() {
    let one = MmcModel::builder().lambda(0.8).mu(1.0).build().unwrap().solve(10).unwrap();
    let two = MmcModel::builder()
        .lambda(0.8)
        .mu(1.0)
        .servers(2)
        .build()
        .unwrap()
        .solve(10)
        .unwrap();

    assert!(close(one.wq, 4.0));
    assert!(two.wq < one.wq);
    assert!(two.prob_wait.unwrap() < one.prob_wait.unwrap());
}

/// Given a long seeded M/M/1 run
/// When it is compared with the formulas
/// Then the time-averaged figures agree within a few percent
#[test]
fn simulation_agrees_with_the_model() {
    let config = SimulationConfig::builder()
        .lambda(0.5)
        .mu(1.0)
        .horizon(100_000.0)
        .seed(11)
        .build()
        .unwrap();
    let simulated = simulation::run(&config).unwrap();
    let model = MmcModel::builder().lambda(0.5).mu(1.0).build().unwrap().solve(10).unwrap();

    let relative = |a: f64, b: f64| (a - b).abs() / b;
    assert!(relative(simulated.metrics.l, model.l) < 0.1, "L = {}", simulated.metrics.l);
    assert!(relative(simulated.metrics.w, model.w) < 0.1, "W = {}", simulated.metrics.w);
    assert!(relative(simulated.observed_utilisation, 0.5) < 0.05);

    let service = Service::from_simulation(&simulated, start());
    assert_eq!(service.name, "Discrete simulation M/M/1");
}

#[tokio::test]
async fn case_studies_become_services() {
    let (mut lab, _) = memory_lab().await;

    let service = lab.load_case_study(1).await.unwrap();
    assert!(close(service.metrics.rho, 0.8));
    assert!(close(service.metrics.l, 4.0));
    assert!(!service.cumulative.is_empty());

    assert_matches!(lab.load_case_study(9).await, Err(LabError::UnknownCaseStudy(9)));
    assert_eq!(lab.services().len(), 1);
}

#[tokio::test]
async fn dashboard_points_at_the_slowest_queue() {
    let (lab, _) = door_and_till().await;

    // Porta averages 3.2s between arrivals, Caixa 2s per service.
    let dashboard = lab.dashboard(1.0);

    assert_eq!(dashboard.queues.len(), 2);
    assert_eq!(dashboard.worst_queue.as_deref(), Some("Porta"));
    let counted: usize = dashboard.histogram.iter().map(|b| b.count).sum();
    assert_eq!(counted, 5);
}
