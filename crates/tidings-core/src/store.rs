//! The `NotificationStore` and `EntityResolver` traits and supporting query
//! types.
//!
//! The traits are implemented by storage backends (e.g.
//! `tidings-store-sqlite`). The engine and the HTTP layer depend on these
//! abstractions, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  context::{Entity, EntityKind},
  model::{
    Channel, Message, NewMessage, NewQueueItem, NewRecipient, NewSubscription,
    NewTemplate, NewTopic, QueueItem, Recipient, Subscription,
    SubscriptionWithRecipient, Template, Topic,
  },
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Which side of the frequency partition a sweep reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyClass {
  /// Owning subscription's frequency is `immediate`.
  Immediate,
  /// Owning subscription's frequency is anything else.
  Summarized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemState {
  Pending,
  Distributed,
}

/// Parameters for [`NotificationStore::list_queue_items`].
#[derive(Debug, Clone, Default)]
pub struct QueueItemQuery {
  pub state:        Option<QueueItemState>,
  pub recipient_id: Option<Uuid>,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

// ─── NotificationStore ───────────────────────────────────────────────────────

/// Abstraction over the transactional store holding configuration rows,
/// messages and queue items.
///
/// Messages are never updated. The only mutation on a queue item is
/// [`NotificationStore::mark_distributed`], which sets `distributed_at` on rows
/// where it is still unset.
pub trait NotificationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Recipients ────────────────────────────────────────────────────────

  fn add_recipient(
    &self,
    input: NewRecipient,
  ) -> impl Future<Output = Result<Recipient, Self::Error>> + Send + '_;

  fn get_recipient(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Recipient>, Self::Error>> + Send + '_;

  // ── Topics ────────────────────────────────────────────────────────────

  /// Returns an error if the key is already taken.
  fn add_topic(
    &self,
    input: NewTopic,
  ) -> impl Future<Output = Result<Topic, Self::Error>> + Send + '_;

  fn get_topic(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Topic>, Self::Error>> + Send + '_;

  fn find_topic_by_key<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Topic>, Self::Error>> + Send + 'a;

  fn list_topics(
    &self,
  ) -> impl Future<Output = Result<Vec<Topic>, Self::Error>> + Send + '_;

  // ── Templates ─────────────────────────────────────────────────────────

  /// Returns an error if the template is active and another active template
  /// already exists for the same (topic, channel).
  fn add_template(
    &self,
    input: NewTemplate,
  ) -> impl Future<Output = Result<Template, Self::Error>> + Send + '_;

  fn active_template(
    &self,
    topic_id: Uuid,
    channel: Channel,
  ) -> impl Future<Output = Result<Option<Template>, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  /// Validates the input and rejects a second subscription for the same
  /// (topic, recipient, channel).
  fn add_subscription(
    &self,
    input: NewSubscription,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + '_;

  fn get_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  /// Active subscriptions for a topic, each joined with its recipient.
  fn active_subscriptions(
    &self,
    topic_id: Uuid,
  ) -> impl Future<Output = Result<Vec<SubscriptionWithRecipient>, Self::Error>>
  + Send
  + '_;

  // ── Fan-out ───────────────────────────────────────────────────────────

  /// Write one message and the queue items referencing it in a single
  /// transaction. Either everything is written or nothing is.
  fn record_fanout(
    &self,
    message: NewMessage,
    items: Vec<NewQueueItem>,
  ) -> impl Future<Output = Result<(Message, Vec<QueueItem>), Self::Error>>
  + Send
  + '_;

  fn get_message(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_;

  /// Messages for the given ids, in creation order. Missing ids are skipped.
  fn get_messages<'a>(
    &'a self,
    ids: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + 'a;

  // ── Queue items ───────────────────────────────────────────────────────

  fn get_queue_item(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<QueueItem>, Self::Error>> + Send + '_;

  fn get_queue_items<'a>(
    &'a self,
    ids: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<QueueItem>, Self::Error>> + Send + 'a;

  /// Pending items with `distribute_at <= now` whose owning subscription
  /// falls in `class`, ordered by `distribute_at`.
  fn ready_queue_items(
    &self,
    now: DateTime<Utc>,
    class: FrequencyClass,
  ) -> impl Future<Output = Result<Vec<QueueItem>, Self::Error>> + Send + '_;

  /// Set `distributed_at = at` on every listed item that is still pending.
  /// Returns the number of items that changed state.
  fn mark_distributed<'a>(
    &'a self,
    ids: &'a [Uuid],
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  fn list_queue_items<'a>(
    &'a self,
    query: &'a QueueItemQuery,
  ) -> impl Future<Output = Result<Vec<QueueItem>, Self::Error>> + Send + 'a;
}

// ─── EntityResolver ──────────────────────────────────────────────────────────

/// Looks up domain entities referenced from a portable context.
pub trait EntityResolver: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Returns `None` when no entity of that kind has that id.
  fn resolve(
    &self,
    kind: EntityKind,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;
}
