use std::sync::Arc;

use assert_matches::assert_matches;
use futures::future::join_all;
use queue_lab::{
    lab::Arrival, FileStore, Lab, LabError, ManualClock, QueueKind, Recorder,
};

use crate::types::{memory_lab, start};

/// Given a service queue with three clients waiting
/// When two of them leave
/// Then the two oldest are recorded, in order, and one is still waiting
#[tokio::test]
async fn service_queue_serves_oldest_first() {
    let (mut lab, clock) = memory_lab().await;
    lab.add_queue("Caixa", QueueKind::Service).await.unwrap();

    for _ in 0..3 {
        lab.arrive("Caixa").await.unwrap();
        clock.advance_ms(500);
    }
    let first = lab.depart("Caixa").await.unwrap();
    clock.advance_ms(500);
    let second = lab.depart("Caixa").await.unwrap();

    assert_eq!((first.element, first.total_time_ms), (1, 1500));
    assert_eq!((second.element, second.total_time_ms), (2, 1500));
    assert_eq!(lab.chronometer("Caixa").unwrap().waiting(), 1);
    assert_eq!(lab.records().len(), 2);
}

/// Given a lab backed by files
/// When it is reopened after clients arrived
/// Then pending clients, counters and records are still there
#[tokio::test]
async fn file_backed_lab_resumes_where_it_left_off() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(start());

    {
        let mut lab = Lab::open(FileStore::open(dir.path()).unwrap(), Arc::new(clock.clone()))
            .await
            .unwrap();
        lab.add_queue("Caixa", QueueKind::Service).await.unwrap();
        lab.arrive("Caixa").await.unwrap();
        lab.arrive("Caixa").await.unwrap();
        clock.advance_ms(3000);
        lab.depart("Caixa").await.unwrap();
    }

    clock.advance_ms(1000);
    let mut lab = Lab::open(FileStore::open(dir.path()).unwrap(), Arc::new(clock.clone()))
        .await
        .unwrap();

    let record = lab.depart("Caixa").await.unwrap();
    assert_eq!(record.element, 2);
    assert_eq!(record.total_time_ms, 4000);

    let arrival = lab.arrive("Caixa").await.unwrap();
    assert_matches!(arrival, Arrival::Pending { element: 3, waiting: 1 });
    assert_eq!(lab.records().len(), 2);
}

/// Given a recorder shared by many tasks
/// When they all register an arrival at once
/// Then every client gets its own element number
#[tokio::test]
async fn concurrent_arrivals_get_distinct_elements() {
    let (mut lab, _) = memory_lab().await;
    lab.add_queue("Porta", QueueKind::Arrival).await.unwrap();
    let recorder = Recorder::spawn(lab);

    let arrivals = (0..50).map(|_| {
        let recorder = recorder.clone();
        tokio_test::task::spawn(async move { recorder.arrive("Porta").await.unwrap() })
    });
    let mut elements: Vec<u64> = join_all(arrivals)
        .await
        .into_iter()
        .map(|arrival| match arrival {
            Arrival::Recorded(record) => record.element,
            other => panic!("unexpected arrival {other:?}"),
        })
        .collect();
    elements.sort();

    assert_eq!(elements, (1..=50).collect::<Vec<_>>());
}

/// Given a recorder
/// When a command fails inside the lab
/// Then the caller gets the lab's error and the recorder keeps working
#[tokio::test]
async fn recorder_reports_lab_errors() {
    let (lab, _) = memory_lab().await;
    let recorder = Recorder::spawn(lab);

    recorder.add_queue("Caixa", QueueKind::Service).await.unwrap();
    assert_matches!(
        recorder.depart("Caixa").await,
        Err(LabError::NoPendingClient(queue)) if queue == "Caixa"
    );
    assert_matches!(recorder.arrive("Nowhere").await, Err(LabError::UnknownQueue(_)));

    recorder.arrive("Caixa").await.unwrap();
    let status = recorder.status().await.unwrap();
    assert_eq!(status[0].waiting, 1);
}

/// Given a recorder that has been shut down
/// When another command is sent
/// Then it is refused
#[tokio::test]
async fn recorder_refuses_commands_after_shutdown() {
    let (mut lab, _) = memory_lab().await;
    lab.add_queue("Caixa", QueueKind::Service).await.unwrap();
    let recorder = Recorder::spawn(lab);
    recorder.arrive("Caixa").await.unwrap();

    let worker = recorder.worker_handle();
    worker.shut_down().await;
    worker.wait_for_shutdown().await;

    assert_matches!(recorder.arrive("Caixa").await, Err(LabError::Tx));
}
