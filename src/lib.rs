//! Time queues by hand, then measure, model and simulate them.
//!
//! A [`Lab`] holds named queues. Each queue has a chronometer: clicking _arrive_ and _depart_
//! produces timed records, which are persisted through a [`RecordStore`]. From those records the
//! lab estimates arrival and service rates and reports the M/M/c steady state of the system
//! ([`measure`]). The same figures can be computed from given rates ([`MmcModel`]) or estimated by a
//! discrete-event [`simulation`].
//!
//! Many tasks can time queues at once through a [`Recorder`], which owns the lab in a background
//! task and applies commands one at a time.

#![deny(missing_docs)]

pub mod case_study;
pub mod chronometer;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod interchange;
pub mod lab;
pub mod measure;
pub mod model;
pub mod plot;
pub mod record;
pub mod recorder;
pub mod report;
pub mod service;
pub mod simulation;
pub mod store;

pub use clock::{Clock, ManualClock, OffsetClock, SystemClock};
pub use config::LabConfig;
pub use error::{LabError, LabResult};
pub use lab::{Arrival, Lab};
pub use model::{MmcModel, QueueMetrics};
pub use record::{QueueDef, QueueKind, QueueRecord};
pub use recorder::{Recorder, WorkerHandle};
pub use service::Service;
pub use store::{FileStore, MemoryStore, RecordStore};
