//! Dispatch: send queue items through their channel and mark them
//! distributed.
//!
//! Every entry point first claims its item ids in the engine's in-flight set,
//! then re-reads the items and ignores those already distributed, so an
//! overlapping sweep or a re-run task cannot send twice. `distributed_at`
//! stays the source of truth; the in-flight set only covers the window
//! between the read and the mark inside this process. The mark is written
//! only after the transport succeeds; a crash in between means at most one
//! duplicate send on the next sweep.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use uuid::Uuid;

use tidings_core::{
  model::{Channel, QueueItem},
  store::{EntityResolver, NotificationStore},
};

use crate::{
  Engine, Error, Result,
  transport::{ChannelTransport, Delivery},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
  /// The transport accepted (or skipped) the send and `marked` items were
  /// transitioned to distributed.
  Delivered { delivery: Delivery, marked: usize },
  /// Everything was already distributed; nothing was sent.
  AlreadyDistributed,
  /// Another worker is sending these items right now; nothing was sent.
  InFlight,
  /// No such queue item, or its recipient is gone.
  Missing,
}

// ─── In-flight claims ────────────────────────────────────────────────────────

/// Queue item ids currently held by a dispatch in this process.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
  ids: Mutex<HashSet<Uuid>>,
}

impl InFlight {
  /// Claim every id in `ids` that no one else holds. The claim is released
  /// when the returned guard drops.
  pub(crate) fn claim(self: &Arc<Self>, ids: &[Uuid]) -> Claim {
    let mut held = self.lock();
    let claimed = ids.iter().copied().filter(|id| held.insert(*id)).collect();
    Claim { owner: Arc::clone(self), ids: claimed }
  }

  fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
    self.ids.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

pub(crate) struct Claim {
  owner: Arc<InFlight>,
  ids:   Vec<Uuid>,
}

impl Claim {
  fn ids(&self) -> &[Uuid] { &self.ids }

  fn is_empty(&self) -> bool { self.ids.is_empty() }
}

impl Drop for Claim {
  fn drop(&mut self) {
    let mut held = self.owner.lock();
    for id in &self.ids {
      held.remove(id);
    }
  }
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

impl<S, T> Engine<S, T>
where
  S: NotificationStore + EntityResolver,
  T: ChannelTransport,
{
  /// Send a single queue item.
  pub async fn dispatch_one(&self, queue_item_id: Uuid) -> Result<DispatchOutcome> {
    let claim = self.in_flight.claim(&[queue_item_id]);
    if claim.is_empty() {
      tracing::debug!(%queue_item_id, "queue item already being dispatched");
      return Ok(DispatchOutcome::InFlight);
    }

    let Some(item) = self
      .store
      .get_queue_item(queue_item_id)
      .await
      .map_err(Error::store)?
    else {
      tracing::warn!(%queue_item_id, "queue item not found");
      return Ok(DispatchOutcome::Missing);
    };
    if item.is_distributed() {
      tracing::debug!(%queue_item_id, "already distributed");
      return Ok(DispatchOutcome::AlreadyDistributed);
    }

    let message = self
      .store
      .get_message(item.message_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::MessageNotFound(item.message_id))?;
    let Some(recipient) = self
      .store
      .get_recipient(item.recipient_id)
      .await
      .map_err(Error::store)?
    else {
      tracing::warn!(
        %queue_item_id,
        recipient_id = %item.recipient_id,
        "recipient not found, skipping"
      );
      return Ok(DispatchOutcome::Missing);
    };

    let delivery = self
      .transport
      .send(item.channel, &recipient, &message.subject, &message.body)
      .await?;

    let marked = self
      .store
      .mark_distributed(claim.ids(), self.clock.now())
      .await
      .map_err(Error::store)?;
    if marked == 0 {
      tracing::warn!(%queue_item_id, "queue item was marked by someone else, duplicate send");
    }

    tracing::info!(
      %queue_item_id,
      channel = %item.channel,
      recipient_id = %item.recipient_id,
      ?delivery,
      "queue item dispatched"
    );
    Ok(DispatchOutcome::Delivered { delivery, marked })
  }

  /// Send every still-pending item in `queue_item_ids` as one combined
  /// notification to `recipient_id` on `channel`.
  pub async fn dispatch_batch(
    &self,
    recipient_id: Uuid,
    channel: Channel,
    queue_item_ids: &[Uuid],
  ) -> Result<DispatchOutcome> {
    let claim = self.in_flight.claim(queue_item_ids);
    if claim.is_empty() {
      tracing::debug!(%recipient_id, %channel, "batch already being dispatched");
      return Ok(DispatchOutcome::InFlight);
    }
    if claim.ids().len() < queue_item_ids.len() {
      tracing::debug!(
        %recipient_id,
        %channel,
        held = queue_item_ids.len() - claim.ids().len(),
        "some batch items are held by another dispatch"
      );
    }

    let Some(recipient) = self
      .store
      .get_recipient(recipient_id)
      .await
      .map_err(Error::store)?
    else {
      tracing::warn!(%recipient_id, %channel, "recipient not found, skipping batch");
      return Ok(DispatchOutcome::Missing);
    };

    let items = self
      .store
      .get_queue_items(claim.ids())
      .await
      .map_err(Error::store)?;
    if items.is_empty() {
      tracing::warn!(%recipient_id, %channel, "no queue items found for batch");
      return Ok(DispatchOutcome::Missing);
    }

    let pending: Vec<QueueItem> = items
      .into_iter()
      .filter(|item| {
        let belongs = item.recipient_id == recipient_id && item.channel == channel;
        if !belongs {
          tracing::warn!(
            queue_item_id = %item.queue_item_id,
            %recipient_id,
            %channel,
            "queue item does not belong to this batch, leaving it"
          );
        }
        belongs && item.is_pending()
      })
      .collect();
    if pending.is_empty() {
      tracing::debug!(%recipient_id, %channel, "batch already distributed");
      return Ok(DispatchOutcome::AlreadyDistributed);
    }

    let mut message_ids: Vec<Uuid> = Vec::with_capacity(pending.len());
    for item in &pending {
      if !message_ids.contains(&item.message_id) {
        message_ids.push(item.message_id);
      }
    }
    let messages = self
      .store
      .get_messages(&message_ids)
      .await
      .map_err(Error::store)?;
    if let Some(missing) = message_ids
      .iter()
      .find(|id| !messages.iter().any(|m| m.message_id == **id))
    {
      return Err(Error::MessageNotFound(*missing));
    }

    let delivery = self
      .transport
      .send_batch(channel, &recipient, &messages)
      .await?;

    let ids: Vec<Uuid> = pending.iter().map(|item| item.queue_item_id).collect();
    let marked = self
      .store
      .mark_distributed(&ids, self.clock.now())
      .await
      .map_err(Error::store)?;
    if marked < ids.len() {
      tracing::warn!(
        %recipient_id,
        %channel,
        duplicates = ids.len() - marked,
        "batch items were marked by someone else, duplicate send"
      );
    }

    tracing::info!(
      %recipient_id,
      %channel,
      items = ids.len(),
      messages = messages.len(),
      ?delivery,
      "batch dispatched"
    );
    Ok(DispatchOutcome::Delivered { delivery, marked })
  }
}
