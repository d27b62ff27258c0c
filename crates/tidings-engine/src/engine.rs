//! [`Engine`] — the shared handle that publishing, sweeping and dispatching
//! hang off.

use std::sync::Arc;

use tidings_core::store::{EntityResolver, NotificationStore};

use crate::{
  Result,
  clock::Clock,
  dispatch::InFlight,
  queue::{Task, TaskQueue},
  transport::ChannelTransport,
};

/// Store, transport, clock and task queue in one cheaply cloneable value.
///
/// The behaviour lives in `publisher`, `sweep` and `dispatch`, each an
/// `impl Engine` block of its own.
pub struct Engine<S, T> {
  pub(crate) store:     Arc<S>,
  pub(crate) transport: Arc<T>,
  pub(crate) clock:     Arc<dyn Clock>,
  pub(crate) tasks:     TaskQueue,
  pub(crate) in_flight: Arc<InFlight>,
}

impl<S, T> Clone for Engine<S, T> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      transport: Arc::clone(&self.transport),
      clock:     Arc::clone(&self.clock),
      tasks:     self.tasks.clone(),
      in_flight: Arc::clone(&self.in_flight),
    }
  }
}

impl<S, T> Engine<S, T>
where
  S: NotificationStore + EntityResolver,
  T: ChannelTransport,
{
  pub fn new(
    store: Arc<S>,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    tasks: TaskQueue,
  ) -> Self {
    Self { store, transport, clock, tasks, in_flight: Arc::default() }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn tasks(&self) -> &TaskQueue { &self.tasks }

  /// Execute one task to completion.
  pub async fn run(&self, task: Task) -> Result<()> {
    tracing::debug!(task = task.name(), "running task");
    match task {
      Task::SweepImmediate => {
        self.sweep_immediate().await?;
      }
      Task::SweepSummarized => {
        self.sweep_summarized().await?;
      }
      Task::DispatchOne { queue_item_id } => {
        self.dispatch_one(queue_item_id).await?;
      }
      Task::DispatchBatch { recipient_id, channel, queue_item_ids } => {
        self
          .dispatch_batch(recipient_id, channel, &queue_item_ids)
          .await?;
      }
    }
    Ok(())
  }
}
