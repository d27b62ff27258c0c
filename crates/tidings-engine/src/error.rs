//! Error type for `tidings-engine`.

use thiserror::Error;
use uuid::Uuid;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] tidings_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("transport error: {0}")]
  Transport(#[from] TransportError),

  #[error("message not found: {0}")]
  MessageNotFound(Uuid),

  #[error("task queue is closed")]
  QueueClosed,
}

impl Error {
  pub(crate) fn store<E>(error: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(error))
  }

  /// Whether this is the publish-time "no such topic key" failure.
  pub fn is_topic_not_found(&self) -> bool {
    matches!(self, Self::Core(tidings_core::Error::TopicNotFound(_)))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
