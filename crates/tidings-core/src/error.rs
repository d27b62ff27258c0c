//! Error types for `tidings-core`.

use thiserror::Error;

use crate::render::TemplateRenderError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("topic not found: {0:?}")]
  TopicNotFound(String),

  #[error("unknown channel: {0:?}")]
  UnknownChannel(String),

  #[error("unknown frequency: {0:?}")]
  UnknownFrequency(String),

  #[error("invalid subscription: {0}")]
  InvalidSubscription(String),

  #[error(transparent)]
  Render(#[from] TemplateRenderError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
