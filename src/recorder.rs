//! A background task that owns a [`Lab`] and serialises timing commands from many callers.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    error::LabResult,
    lab::{Arrival, Lab, QueueStatus},
    record::{QueueDef, QueueKind, QueueRecord},
    store::RecordStore,
};

type Reply<T> = oneshot::Sender<LabResult<T>>;

enum Command {
    AddQueue {
        name: String,
        kind: QueueKind,
        tx: Reply<QueueDef>,
    },
    Arrive {
        queue: String,
        tx: Reply<Arrival>,
    },
    Depart {
        queue: String,
        tx: Reply<QueueRecord>,
    },
    Stop {
        queue: String,
        tx: Reply<usize>,
    },
    Status {
        tx: oneshot::Sender<Vec<QueueStatus>>,
    },
}

enum ShutdownMessage {
    Register(ShutdownNotifier),
    ShutDown,
}

struct ShutdownNotifier(oneshot::Sender<()>);

struct Worker<S> {
    lab: Lab<S>,

    /// Used to receive commands.
    command_rx: mpsc::Receiver<Command>,

    /// Used to send messages to the worker related to shutdown.
    shutdown_rx: mpsc::Receiver<ShutdownMessage>,

    /// Used to signal to listeners that the worker has shut down.
    shutdown_notifiers: Vec<oneshot::Sender<()>>,
}

/// A handle to the worker task.
///
/// Used for shutting down the worker and waiting for it to finish.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<ShutdownMessage>,
}

/// Aborts the worker task when dropped.
#[derive(Debug)]
struct WorkerDropGuard {
    handle: JoinHandle<()>,
}

impl<S: RecordStore + 'static> Worker<S> {
    fn spawn(lab: Lab<S>) -> (WorkerHandle, WorkerDropGuard, mpsc::Sender<Command>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let mut worker = Worker {
            lab,
            command_rx,
            shutdown_rx,
            shutdown_notifiers: Vec::new(),
        };

        let handle = tokio::spawn(async move {
            worker.run().await;
        });

        (
            WorkerHandle { shutdown_tx },
            WorkerDropGuard { handle },
            command_tx,
        )
    }

    async fn handle(&mut self, command: Command) {
        // A caller that stopped waiting does not care about the reply.
        match command {
            Command::AddQueue { name, kind, tx } => {
                let _ = tx.send(self.lab.add_queue(&name, kind).await);
            }
            Command::Arrive { queue, tx } => {
                let _ = tx.send(self.lab.arrive(&queue).await);
            }
            Command::Depart { queue, tx } => {
                let _ = tx.send(self.lab.depart(&queue).await);
            }
            Command::Stop { queue, tx } => {
                let _ = tx.send(self.lab.stop(&queue).await);
            }
            Command::Status { tx } => {
                let _ = tx.send(self.lab.status());
            }
        }
    }

    /// Start running the worker event loop.
    async fn run(&mut self) {
        loop {
            tokio::select! {
                Some(msg) = self.shutdown_rx.recv() => {
                    match msg {
                        ShutdownMessage::Register(notifier) => {
                            self.shutdown_notifiers.push(notifier.0);
                        }
                        ShutdownMessage::ShutDown => {
                            // Finish what was already sent, refuse anything new.
                            self.command_rx.close();
                            while let Some(command) = self.command_rx.recv().await {
                                self.handle(command).await;
                            }
                            break;
                        }
                    }
                }

                Some(command) = self.command_rx.recv() => {
                    self.handle(command).await;
                }

                else => break,
            }
        }

        info!(notifying = self.shutdown_notifiers.len(), "recorder is shutting down");
    }
}

impl WorkerHandle {
    /// Signal the worker to shut down after handling the commands already sent.
    pub async fn shut_down(&self) {
        // We ignore errors here - if the receiver has gone away, the worker is already shut down.
        let _ = self.shutdown_tx.send(ShutdownMessage::ShutDown).await;
    }

    /// Wait for the worker to finish.
    pub async fn wait_for_shutdown(&self) {
        // We ignore errors here - if the receiver has gone away, the worker is already shut down.
        let (notifier_tx, notifier_rx) = oneshot::channel();
        let _ = self
            .shutdown_tx
            .send(ShutdownMessage::Register(ShutdownNotifier(notifier_tx)))
            .await;
        // Wait for the notifier to be dropped.
        let _ = notifier_rx.await;
    }
}

impl Drop for WorkerDropGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Times queues from many tasks at once.
///
/// Cheap to clone. Cloned instances share the same background worker task, which owns the lab.
///
/// ## Drop
///
/// When the last instance of a `Recorder` is dropped, the worker task will be aborted (ungracefully
/// shut down).
///
/// If you want to shut down the worker gracefully, call [`WorkerHandle::shut_down()`].
#[derive(Debug, Clone)]
pub struct Recorder {
    worker: Arc<WorkerHandle>,
    worker_guard: Arc<WorkerDropGuard>,
    command_tx: mpsc::Sender<Command>,
}

impl Recorder {
    /// Move `lab` into a new worker task.
    pub fn spawn<S: RecordStore + 'static>(lab: Lab<S>) -> Self {
        let (handle, worker_guard, command_tx) = Worker::spawn(lab);

        Self {
            worker: Arc::new(handle),
            worker_guard: Arc::new(worker_guard),
            command_tx,
        }
    }

    /// Define a queue.
    pub async fn add_queue(&self, name: impl Into<String>, kind: QueueKind) -> LabResult<QueueDef> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::AddQueue {
                name: name.into(),
                kind,
                tx,
            })
            .await?;
        rx.await?
    }

    /// A client arrives.
    pub async fn arrive(&self, queue: impl Into<String>) -> LabResult<Arrival> {
        let queue = queue.into();
        debug!(queue = %queue, "arrive");
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(Command::Arrive { queue, tx }).await?;
        rx.await?
    }

    /// The oldest waiting client leaves.
    pub async fn depart(&self, queue: impl Into<String>) -> LabResult<QueueRecord> {
        let queue = queue.into();
        debug!(queue = %queue, "depart");
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(Command::Depart { queue, tx }).await?;
        rx.await?
    }

    /// Reset a chronometer.
    pub async fn stop(&self, queue: impl Into<String>) -> LabResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Stop {
                queue: queue.into(),
                tx,
            })
            .await?;
        rx.await?
    }

    /// Every chronometer, in queue order.
    pub async fn status(&self) -> LabResult<Vec<QueueStatus>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(Command::Status { tx }).await?;
        Ok(rx.await?)
    }

    /// Get a handle to the worker.
    pub fn worker_handle(&self) -> Arc<WorkerHandle> {
        Arc::clone(&self.worker)
    }
}
