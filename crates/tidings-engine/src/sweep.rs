//! Sweeps: find ready queue items and enqueue dispatch tasks for them.
//!
//! A sweep never sends anything itself.

use std::collections::BTreeMap;

use uuid::Uuid;

use tidings_core::{
  model::Channel,
  store::{EntityResolver, FrequencyClass, NotificationStore},
};

use crate::{Engine, Error, Result, queue::Task, transport::ChannelTransport};

impl<S, T> Engine<S, T>
where
  S: NotificationStore + EntityResolver,
  T: ChannelTransport,
{
  /// Enqueue one `DispatchOne` per ready item on an immediate subscription.
  /// Returns the number of tasks enqueued.
  pub async fn sweep_immediate(&self) -> Result<usize> {
    let now = self.clock.now();
    let ready = self
      .store
      .ready_queue_items(now, FrequencyClass::Immediate)
      .await
      .map_err(Error::store)?;

    for item in &ready {
      self.tasks.enqueue(Task::DispatchOne { queue_item_id: item.queue_item_id })?;
    }

    if !ready.is_empty() {
      tracing::info!(count = ready.len(), "immediate sweep enqueued dispatches");
    }
    Ok(ready.len())
  }

  /// Enqueue one `DispatchBatch` per (recipient, channel) among ready items on
  /// summarized subscriptions, across every topic. Returns the number of
  /// batches enqueued.
  pub async fn sweep_summarized(&self) -> Result<usize> {
    let now = self.clock.now();
    let ready = self
      .store
      .ready_queue_items(now, FrequencyClass::Summarized)
      .await
      .map_err(Error::store)?;

    let mut groups: BTreeMap<(Uuid, Channel), Vec<Uuid>> = BTreeMap::new();
    for item in &ready {
      groups
        .entry((item.recipient_id, item.channel))
        .or_default()
        .push(item.queue_item_id);
    }

    let batches = groups.len();
    for ((recipient_id, channel), queue_item_ids) in groups {
      self.tasks.enqueue(Task::DispatchBatch {
        recipient_id,
        channel,
        queue_item_ids,
      })?;
    }

    if batches > 0 {
      tracing::info!(items = ready.len(), batches, "summarized sweep enqueued batches");
    }
    Ok(batches)
  }
}
