//! Errors.

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::record::QueueKind;

/// An error raised by the lab, its store or one of the analyses.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LabError {
    /// Reading or writing the data directory (or an export file) failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A persisted collection could not be (de)serialised.
    #[error("Collection '{collection}' is not valid JSON")]
    Json {
        /// The store key of the collection.
        collection: &'static str,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The CSV reader or writer failed.
    #[error("CSV error")]
    Csv(#[from] csv::Error),

    /// An imported CSV row could not be turned into a record.
    #[error("Invalid row at line {line}: {reason}")]
    InvalidRow {
        /// 1-based line number, header included.
        line: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// The configuration file could not be parsed.
    #[error("Invalid configuration")]
    Config(#[from] toml::de::Error),

    /// A model or simulation parameter was out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The system has no steady state.
    ///
    /// Recoverable: pick a smaller arrival rate or add servers.
    #[error("Unstable system (rho = {rho:.4} >= 1)")]
    Unstable {
        /// The offending utilisation.
        rho: f64,
    },

    /// Not enough records to estimate a rate.
    #[error("Not enough data: {0}")]
    InsufficientData(String),

    /// No queue with this name.
    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),

    /// A queue with this name already exists.
    #[error("Queue '{0}' already exists")]
    DuplicateQueue(String),

    /// The operation does not apply to this kind of queue.
    #[error("Queue '{queue}' is of kind '{kind}'")]
    WrongQueueKind {
        /// The queue name.
        queue: String,
        /// Its actual kind.
        kind: QueueKind,
    },

    /// A departure was requested but nobody is waiting.
    #[error("No client is waiting on queue '{0}'")]
    NoPendingClient(String),

    /// No record with this id.
    #[error("Unknown record '{0}'")]
    UnknownRecord(String),

    /// No service with this id.
    #[error("Unknown service '{0}'")]
    UnknownService(String),

    /// No case study at this index.
    #[error("Unknown case study {0}")]
    UnknownCaseStudy(usize),

    /// gnuplot could not render a chart.
    #[error("Plotting failed: {0}")]
    Plot(String),

    /// Something went wrong while sending a command to the recorder.
    ///
    /// Unrecoverable.
    #[error("Unable to send command to the recorder: channel closed")]
    Tx,

    /// Something went wrong while waiting for the recorder to reply.
    ///
    /// Unrecoverable.
    #[error("Error while waiting for the recorder: channel closed")]
    Rx(#[from] RecvError),
}

/// Result alias used throughout the crate.
pub type LabResult<T> = std::result::Result<T, LabError>;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LabError {
    fn from(_tx_err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LabError::Tx
    }
}

impl LabError {
    pub(crate) fn json(collection: &'static str, source: serde_json::Error) -> Self {
        LabError::Json { collection, source }
    }

    /// Whether the user can fix this by changing their input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LabError::Tx | LabError::Rx(_) | LabError::Io(_))
    }
}
