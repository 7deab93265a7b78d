//! The lab: queues, their chronometers, the recorded data and the saved services.

use std::{
    collections::BTreeMap,
    io::{Read, Write},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    case_study::CaseStudy,
    chronometer::Chronometer,
    clock::Clock,
    dashboard::Dashboard,
    error::{LabError, LabResult},
    interchange,
    measure::{self, CumulativePoint},
    record::{QueueDef, QueueKind, QueueRecord},
    service::Service,
    store::{load_json, save_json, Collection, RecordStore},
};

/// What happened when a client arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum Arrival {
    /// An arrival queue recorded the event straight away.
    Recorded(QueueRecord),
    /// A service queue is now timing this client.
    Pending {
        /// Element number of the client.
        element: u64,
        /// Clients now waiting on the queue, this one included.
        waiting: usize,
    },
}

/// Record counts for one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueOverview {
    /// Queue name.
    pub name: String,
    /// Kind, if the queue is still defined.
    pub kind: Option<QueueKind>,
    /// All records.
    pub records: usize,
    /// Records without an exit.
    pub arrivals: usize,
    /// Records with an exit.
    pub services: usize,
}

/// Snapshot of one queue's chronometer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Queue name.
    pub name: String,
    /// Its kind.
    pub kind: QueueKind,
    /// Whether timing has started.
    pub running: bool,
    /// Clients waiting.
    pub waiting: usize,
    /// Milliseconds since the chronometer started.
    pub elapsed_ms: u64,
    /// How long the oldest waiting client has waited.
    pub current_wait_ms: Option<u64>,
}

/// Owns the lab's state and writes every change through to the store.
pub struct Lab<S> {
    store: S,
    clock: Arc<dyn Clock>,
    queues: Vec<QueueDef>,
    records: Vec<QueueRecord>,
    totals: BTreeMap<String, u64>,
    chronometers: BTreeMap<String, Chronometer>,
    services: Vec<Service>,
}

impl<S> std::fmt::Debug for Lab<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lab")
            .field("queues", &self.queues)
            .field("records", &self.records.len())
            .field("services", &self.services.len())
            .finish()
    }
}

impl<S: RecordStore> Lab<S> {
    /// Load everything `store` holds.
    pub async fn open(store: S, clock: Arc<dyn Clock>) -> LabResult<Self> {
        let queues: Vec<QueueDef> = load_json(&store, Collection::Queues).await?;
        let records: Vec<QueueRecord> = load_json(&store, Collection::Records).await?;
        let totals: BTreeMap<String, u64> = load_json(&store, Collection::Totals).await?;
        let mut chronometers: BTreeMap<String, Chronometer> =
            load_json(&store, Collection::Pending).await?;
        let services: Vec<Service> = load_json(&store, Collection::Services).await?;

        chronometers.retain(|name, _| queues.iter().any(|q| &q.name == name));
        for queue in &queues {
            chronometers
                .entry(queue.name.clone())
                .or_insert_with(|| Chronometer::new(&queue.name, queue.kind));
        }

        info!(
            queues = queues.len(),
            records = records.len(),
            services = services.len(),
            "lab opened"
        );

        Ok(Self {
            store,
            clock,
            queues,
            records,
            totals,
            chronometers,
            services,
        })
    }

    /// The current time, as the lab sees it.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // Queues

    /// Define a new queue. The name is trimmed.
    pub async fn add_queue(&mut self, name: &str, kind: QueueKind) -> LabResult<QueueDef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LabError::InvalidParameter(
                "queue name must not be empty".to_string(),
            ));
        }
        if self.queues.iter().any(|q| q.name == name) {
            return Err(LabError::DuplicateQueue(name.to_string()));
        }

        let queue = QueueDef {
            name: name.to_string(),
            kind,
        };
        self.queues.push(queue.clone());
        self.chronometers
            .insert(queue.name.clone(), Chronometer::new(name, kind));
        self.persist(&[Collection::Queues, Collection::Pending]).await?;

        info!(queue = name, %kind, "queue added");
        Ok(queue)
    }

    /// Forget a queue. Its records are kept, its pending clients are dropped.
    pub async fn remove_queue(&mut self, name: &str) -> LabResult<QueueDef> {
        let index = self
            .queues
            .iter()
            .position(|q| q.name == name)
            .ok_or_else(|| LabError::UnknownQueue(name.to_string()))?;

        let queue = self.queues.remove(index);
        if let Some(chrono) = self.chronometers.remove(name) {
            if chrono.waiting() > 0 {
                warn!(queue = name, dropped = chrono.waiting(), "pending clients dropped");
            }
        }
        self.persist(&[Collection::Queues, Collection::Pending]).await?;

        info!(queue = name, "queue removed");
        Ok(queue)
    }

    /// Defined queues, in creation order.
    pub fn queues(&self) -> &[QueueDef] {
        &self.queues
    }

    /// The definition of `name`.
    pub fn queue(&self, name: &str) -> LabResult<&QueueDef> {
        self.queues
            .iter()
            .find(|q| q.name == name)
            .ok_or_else(|| LabError::UnknownQueue(name.to_string()))
    }

    /// The chronometer of `name`.
    pub fn chronometer(&self, name: &str) -> LabResult<&Chronometer> {
        self.chronometers
            .get(name)
            .ok_or_else(|| LabError::UnknownQueue(name.to_string()))
    }

    /// Every chronometer, in queue order.
    pub fn status(&self) -> Vec<QueueStatus> {
        let now = self.clock.now();
        self.queues
            .iter()
            .filter_map(|q| self.chronometers.get(&q.name))
            .map(|chrono| QueueStatus {
                name: chrono.queue().to_string(),
                kind: chrono.kind(),
                running: chrono.is_running(),
                waiting: chrono.waiting(),
                elapsed_ms: chrono.elapsed_ms(now),
                current_wait_ms: chrono.current_wait_ms(now),
            })
            .collect()
    }

    // Timing

    /// A client arrives at `name`.
    ///
    /// Nothing changes if the store cannot be written.
    pub async fn arrive(&mut self, name: &str) -> LabResult<Arrival> {
        let now = self.clock.now();
        let chrono = self
            .chronometers
            .get_mut(name)
            .ok_or_else(|| LabError::UnknownQueue(name.to_string()))?;
        let previous = (chrono.clone(), self.totals.get(name).copied(), self.records.len());

        let total = self.totals.entry(name.to_string()).or_insert(0);
        *total += 1;
        let element = *total;

        let arrival = match chrono.arrive(element, now) {
            Some(record) => {
                self.records.push(record.clone());
                Arrival::Recorded(record)
            }
            None => Arrival::Pending {
                element,
                waiting: chrono.waiting(),
            },
        };

        let persisted = match arrival {
            Arrival::Recorded(_) => {
                self.persist(&[Collection::Totals, Collection::Pending, Collection::Records])
                    .await
            }
            Arrival::Pending { .. } => {
                self.persist(&[Collection::Totals, Collection::Pending]).await
            }
        };
        if let Err(e) = persisted {
            self.roll_back(name, previous);
            return Err(e);
        }

        Ok(arrival)
    }

    /// The oldest client waiting at `name` leaves.
    ///
    /// Nothing changes if the store cannot be written.
    pub async fn depart(&mut self, name: &str) -> LabResult<QueueRecord> {
        let now = self.clock.now();
        let chrono = self
            .chronometers
            .get_mut(name)
            .ok_or_else(|| LabError::UnknownQueue(name.to_string()))?;
        let previous = (chrono.clone(), self.totals.get(name).copied(), self.records.len());

        let record = chrono.depart(now)?;
        self.records.push(record.clone());
        if let Err(e) = self.persist(&[Collection::Pending, Collection::Records]).await {
            self.roll_back(name, previous);
            return Err(e);
        }

        Ok(record)
    }

    fn roll_back(
        &mut self,
        name: &str,
        (chrono, total, records): (Chronometer, Option<u64>, usize),
    ) {
        warn!(queue = name, "store write failed, timing undone");
        self.chronometers.insert(name.to_string(), chrono);
        match total {
            Some(total) => self.totals.insert(name.to_string(), total),
            None => self.totals.remove(name),
        };
        self.records.truncate(records);
    }

    /// Reset the chronometer of `name` without recording. Returns the clients dropped.
    pub async fn stop(&mut self, name: &str) -> LabResult<usize> {
        let chrono = self
            .chronometers
            .get_mut(name)
            .ok_or_else(|| LabError::UnknownQueue(name.to_string()))?;

        let dropped = chrono.stop();
        self.persist(&[Collection::Pending]).await?;

        debug!(queue = name, dropped, "chronometer stopped");
        Ok(dropped)
    }

    // Records

    /// Every record, in recording order.
    pub fn records(&self) -> &[QueueRecord] {
        &self.records
    }

    /// Records on any of `queues`. An empty selection selects everything.
    pub fn records_for<Q: AsRef<str>>(&self, queues: &[Q]) -> Vec<&QueueRecord> {
        self.records
            .iter()
            .filter(|r| queues.is_empty() || queues.iter().any(|q| q.as_ref() == r.queue))
            .collect()
    }

    /// Delete one record.
    pub async fn delete_record(&mut self, id: &str) -> LabResult<QueueRecord> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| LabError::UnknownRecord(id.to_string()))?;

        let record = self.records.remove(index);
        self.persist(&[Collection::Records]).await?;

        debug!(id, queue = %record.queue, "record deleted");
        Ok(record)
    }

    /// Delete every record of a queue. Returns how many went.
    pub async fn delete_queue_records(&mut self, name: &str) -> LabResult<usize> {
        let before = self.records.len();
        self.records.retain(|r| r.queue != name);
        let deleted = before - self.records.len();

        if deleted > 0 {
            self.persist(&[Collection::Records]).await?;
        }

        info!(queue = name, deleted, "queue records deleted");
        Ok(deleted)
    }

    /// Drop all records, element counters and pending clients. Queues and services stay.
    pub async fn clear_all(&mut self) -> LabResult<usize> {
        let deleted = self.records.len();
        self.records.clear();
        self.totals.clear();
        for chrono in self.chronometers.values_mut() {
            chrono.stop();
        }

        for collection in [Collection::Records, Collection::Totals] {
            self.store.clear(collection).await?;
        }
        self.persist(&[Collection::Pending]).await?;

        info!(deleted, "all records cleared");
        Ok(deleted)
    }

    /// Record counts per queue, defined queues first, then queues only seen in records.
    pub fn queue_overview(&self) -> Vec<QueueOverview> {
        let mut overview: Vec<QueueOverview> = self
            .queues
            .iter()
            .map(|q| QueueOverview {
                name: q.name.clone(),
                kind: Some(q.kind),
                records: 0,
                arrivals: 0,
                services: 0,
            })
            .collect();

        for record in &self.records {
            let index = match overview.iter().position(|o| o.name == record.queue) {
                Some(index) => index,
                None => {
                    overview.push(QueueOverview {
                        name: record.queue.clone(),
                        kind: None,
                        records: 0,
                        arrivals: 0,
                        services: 0,
                    });
                    overview.len() - 1
                }
            };
            let entry = &mut overview[index];
            entry.records += 1;
            if record.exiting.is_some() {
                entry.services += 1;
            } else {
                entry.arrivals += 1;
            }
        }

        overview
    }

    /// The dashboard over all records.
    pub fn dashboard(&self, assumed_service_secs: f64) -> Dashboard {
        Dashboard::build(&self.records, assumed_service_secs)
    }

    // Services

    /// Measure the system fed by `arrival_queue` and served by `service_queue`.
    ///
    /// The result is not saved; see [`save_service`](Self::save_service).
    pub fn analyze(
        &self,
        arrival_queue: &str,
        service_queue: &str,
        servers: u32,
        max_n: usize,
        name: Option<String>,
    ) -> LabResult<Service> {
        for queue in [arrival_queue, service_queue] {
            if !self.records.iter().any(|r| r.queue == queue) {
                self.queue(queue)?;
            }
        }

        let metrics = measure::measure(&self.records, arrival_queue, service_queue, servers, max_n)?;
        let cumulative = self.cumulative(arrival_queue, service_queue);

        Ok(Service::measured(
            name.unwrap_or_else(|| format!("{arrival_queue} → {service_queue}")),
            arrival_queue,
            service_queue,
            metrics,
            cumulative,
            self.clock.now(),
        ))
    }

    /// Cumulative arrivals and departures of a pair of queues.
    pub fn cumulative(&self, arrival_queue: &str, service_queue: &str) -> Vec<CumulativePoint> {
        measure::cumulative(&self.records, arrival_queue, service_queue)
    }

    /// Keep a service.
    pub async fn save_service(&mut self, service: Service) -> LabResult<&Service> {
        info!(id = %service.id, name = %service.name, origin = %service.origin, "service saved");
        self.services.push(service);
        self.persist(&[Collection::Services]).await?;
        Ok(&self.services[self.services.len() - 1])
    }

    /// Delete a saved service.
    pub async fn delete_service(&mut self, id: &str) -> LabResult<Service> {
        let index = self
            .services
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| LabError::UnknownService(id.to_string()))?;

        let service = self.services.remove(index);
        self.persist(&[Collection::Services]).await?;
        Ok(service)
    }

    /// Saved services, oldest first.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// A saved service by id.
    pub fn service(&self, id: &str) -> LabResult<&Service> {
        self.services
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| LabError::UnknownService(id.to_string()))
    }

    /// Solve case study `index` and save it as a service.
    pub async fn load_case_study(&mut self, index: usize) -> LabResult<&Service> {
        let service = CaseStudy::get(index)?.to_service(self.clock.now())?;
        self.save_service(service).await
    }

    // Import/export

    /// Append the records of every CSV in `readers`.
    ///
    /// Nothing is imported unless every file parses. Missing queues are created with the kind of
    /// their first record, and element counters are raised past imported elements.
    pub async fn import_csv<R: Read>(
        &mut self,
        readers: impl IntoIterator<Item = R>,
    ) -> LabResult<usize> {
        let mut imported = Vec::new();
        for reader in readers {
            imported.extend(interchange::import_csv(reader)?);
        }

        for record in &imported {
            if !self.queues.iter().any(|q| q.name == record.queue) {
                self.queues.push(QueueDef {
                    name: record.queue.clone(),
                    kind: record.kind,
                });
                self.chronometers.insert(
                    record.queue.clone(),
                    Chronometer::new(&record.queue, record.kind),
                );
                debug!(queue = %record.queue, kind = %record.kind, "queue created by import");
            }
            let total = self.totals.entry(record.queue.clone()).or_insert(0);
            *total = (*total).max(record.element);
        }

        let count = imported.len();
        self.records.extend(imported);
        self.persist(&[
            Collection::Records,
            Collection::Queues,
            Collection::Totals,
            Collection::Pending,
        ])
        .await?;

        info!(imported = count, "records imported");
        Ok(count)
    }

    /// Write the records of `queues` (all records when empty) as CSV.
    pub fn export_csv<Q: AsRef<str>, W: Write>(&self, queues: &[Q], writer: W) -> LabResult<usize> {
        interchange::export_csv(self.records_for(queues), writer)
    }

    async fn persist(&self, collections: &[Collection]) -> LabResult<()> {
        for &collection in collections {
            match collection {
                Collection::Records => save_json(&self.store, collection, &self.records).await?,
                Collection::Queues => save_json(&self.store, collection, &self.queues).await?,
                Collection::Totals => save_json(&self.store, collection, &self.totals).await?,
                Collection::Pending => {
                    save_json(&self.store, collection, &self.chronometers).await?
                }
                Collection::Services => save_json(&self.store, collection, &self.services).await?,
            }
        }
        Ok(())
    }
}
