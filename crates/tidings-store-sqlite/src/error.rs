//! Error type for `tidings-store-sqlite`.

use thiserror::Error;
use tidings_core::model::Channel;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tidings_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("topic key {0:?} is already taken")]
  DuplicateTopicKey(String),

  #[error("topic {topic_id} already has an active {channel} template")]
  DuplicateTemplate { topic_id: Uuid, channel: Channel },

  #[error(
    "recipient {recipient_id} is already subscribed to topic {topic_id} on {channel}"
  )]
  DuplicateSubscription {
    topic_id:     Uuid,
    recipient_id: Uuid,
    channel:      Channel,
  },

  #[error("recipient not found: {0}")]
  RecipientNotFound(Uuid),

  #[error("topic not found: {0}")]
  TopicNotFound(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
