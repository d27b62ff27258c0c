//! The in-process task queue and the worker pool that drains it.
//!
//! Publishing, sweeping and dispatching never call each other inline across a
//! task boundary: each step enqueues a [`Task`] and some worker picks it up.

use std::sync::Arc;

use tokio::{
  sync::{Mutex, mpsc, watch},
  task::JoinHandle,
};
use uuid::Uuid;

use tidings_core::{
  model::Channel,
  store::{EntityResolver, NotificationStore},
};

use crate::{Engine, Error, Result, transport::ChannelTransport};

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
  SweepImmediate,
  SweepSummarized,
  DispatchOne {
    queue_item_id: Uuid,
  },
  /// All ready summarized items for one recipient on one channel.
  DispatchBatch {
    recipient_id:   Uuid,
    channel:        Channel,
    queue_item_ids: Vec<Uuid>,
  },
}

impl Task {
  pub fn name(&self) -> &'static str {
    match self {
      Self::SweepImmediate => "sweep_immediate",
      Self::SweepSummarized => "sweep_summarized",
      Self::DispatchOne { .. } => "dispatch_one",
      Self::DispatchBatch { .. } => "dispatch_batch",
    }
  }
}

// ─── Queue handles ───────────────────────────────────────────────────────────

/// Sending half of the task queue. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct TaskQueue {
  tx: mpsc::UnboundedSender<Task>,
}

/// Receiving half of the task queue, shared by every worker.
#[derive(Debug, Clone)]
pub struct TaskReceiver {
  rx: Arc<Mutex<mpsc::UnboundedReceiver<Task>>>,
}

impl TaskQueue {
  pub fn new() -> (Self, TaskReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, TaskReceiver { rx: Arc::new(Mutex::new(rx)) })
  }

  pub fn enqueue(&self, task: Task) -> Result<()> {
    self.tx.send(task).map_err(|rejected| {
      tracing::warn!(task = rejected.0.name(), "task queue closed, dropping task");
      Error::QueueClosed
    })
  }
}

impl TaskReceiver {
  /// Wait for the next task. `None` once every sender is gone.
  pub async fn next(&self) -> Option<Task> { self.rx.lock().await.recv().await }

  /// Take a task if one is waiting and no worker holds the receiver.
  pub fn try_next(&self) -> Option<Task> {
    self.rx.try_lock().ok()?.try_recv().ok()
  }
}

// ─── Worker pool ─────────────────────────────────────────────────────────────

/// A fixed set of workers, each running one task at a time.
pub struct WorkerPool {
  stop:    watch::Sender<bool>,
  handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  pub fn spawn<S, T>(
    engine: Engine<S, T>,
    receiver: TaskReceiver,
    workers: usize,
  ) -> Self
  where
    S: NotificationStore + EntityResolver + 'static,
    T: ChannelTransport + 'static,
  {
    let (stop, stopped) = watch::channel(false);
    let handles = (0..workers.max(1))
      .map(|worker| {
        let engine = engine.clone();
        let receiver = receiver.clone();
        let stopped = stopped.clone();
        tokio::spawn(work(worker, engine, receiver, stopped))
      })
      .collect();

    tracing::info!(workers = workers.max(1), "worker pool started");
    Self { stop, handles }
  }

  /// Stop taking new tasks and wait for in-flight ones to finish.
  pub async fn shutdown(self) {
    let _ = self.stop.send(true);
    for handle in self.handles {
      if let Err(error) = handle.await {
        tracing::error!(%error, "worker panicked");
      }
    }
    tracing::info!("worker pool stopped");
  }
}

async fn work<S, T>(
  worker: usize,
  engine: Engine<S, T>,
  receiver: TaskReceiver,
  mut stopped: watch::Receiver<bool>,
) where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  loop {
    let task = tokio::select! {
      biased;
      _ = stopped.changed() => break,
      task = receiver.next() => task,
    };
    let Some(task) = task else { break };

    let name = task.name();
    if let Err(error) = engine.run(task).await {
      tracing::warn!(worker, task = name, %error, "task failed");
    }
  }
  tracing::debug!(worker, "worker exiting");
}
