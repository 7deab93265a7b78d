use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use queue_lab::{Lab, ManualClock, MemoryStore, QueueKind};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub async fn memory_lab() -> (Lab<MemoryStore>, ManualClock) {
    let clock = ManualClock::new(start());
    let lab = Lab::open(MemoryStore::new(), Arc::new(clock.clone()))
        .await
        .unwrap();
    (lab, clock)
}

/// A door where a client arrives every 4s, and a till serving each for 2s.
pub async fn door_and_till() -> (Lab<MemoryStore>, ManualClock) {
    let (mut lab, clock) = memory_lab().await;
    lab.add_queue("Porta", QueueKind::Arrival).await.unwrap();
    lab.add_queue("Caixa", QueueKind::Service).await.unwrap();

    for _ in 0..5 {
        lab.arrive("Porta").await.unwrap();
        clock.advance_ms(1000);
        lab.arrive("Caixa").await.unwrap();
        clock.advance_ms(2000);
        lab.depart("Caixa").await.unwrap();
        clock.advance_ms(1000);
    }

    (lab, clock)
}
