use assert_matches::assert_matches;
use queue_lab::{LabError, QueueKind};

use crate::types::{door_and_till, memory_lab};

/// Given a lab with recorded queues
/// When its records are exported and imported into an empty lab
/// Then the queues and their timings are rebuilt
#[tokio::test]
async fn exported_records_import_into_a_fresh_lab() {
    let (source, _) = door_and_till().await;
    let mut csv = Vec::new();
    assert_eq!(source.export_csv::<&str, _>(&[], &mut csv).unwrap(), 10);

    let (mut target, _) = memory_lab().await;
    assert_eq!(target.import_csv([csv.as_slice()]).await.unwrap(), 10);

    assert_eq!(target.queue("Porta").unwrap().kind, QueueKind::Arrival);
    assert_eq!(target.queue("Caixa").unwrap().kind, QueueKind::Service);

    let exported = source.analyze("Porta", "Caixa", 1, 5, None).unwrap();
    let imported = target.analyze("Porta", "Caixa", 1, 5, None).unwrap();
    assert!((exported.metrics.lambda - imported.metrics.lambda).abs() < 1e-9);
    assert!((exported.metrics.mu - imported.metrics.mu).abs() < 1e-9);

    // Counters continue past imported elements.
    target.arrive("Porta").await.unwrap();
    assert_eq!(target.records_for(&["Porta"]).iter().map(|r| r.element).max(), Some(6));
}

#[tokio::test]
async fn export_can_select_queues() {
    let (lab, _) = door_and_till().await;
    let mut csv = Vec::new();

    assert_eq!(lab.export_csv(&["Caixa"], &mut csv).unwrap(), 5);

    let text = String::from_utf8(csv).unwrap();
    assert!(text.starts_with("Fila;"));
    assert!(text.lines().skip(1).all(|line| line.starts_with("Caixa;")));
}

/// Given two files, the second of which is broken
/// When both are imported
/// Then nothing is imported
#[tokio::test]
async fn import_is_all_or_nothing() {
    let (source, _) = door_and_till().await;
    let mut good = Vec::new();
    source.export_csv(&["Porta"], &mut good).unwrap();
    let bad = "Fila;Carimbo de Data/Hora;Tempo Total;Elemento;Chegando;Saindo\n\
               Caixa;yesterday;2.00s;1;yesterday;\n";

    let (mut target, _) = memory_lab().await;
    let result = target.import_csv([good.as_slice(), bad.as_bytes()]).await;

    assert_matches!(result, Err(LabError::InvalidRow { .. }));
    assert!(target.records().is_empty());
    assert!(target.queues().is_empty());
}
