//! Handlers for `/topics` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/topics` | All topics, by name |
//! | `GET`  | `/topics/:key` | 404 if not found |

use axum::{
  Json,
  extract::{Path, State},
};
use tidings_core::{
  model::Topic,
  store::{EntityResolver, NotificationStore},
};
use tidings_engine::{Engine, transport::ChannelTransport};

use crate::error::ApiError;

/// `GET /topics`
pub async fn list<S, T>(
  State(engine): State<Engine<S, T>>,
) -> Result<Json<Vec<Topic>>, ApiError>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  let topics = engine.store().list_topics().await.map_err(ApiError::store)?;
  Ok(Json(topics))
}

/// `GET /topics/:key`
pub async fn get_one<S, T>(
  State(engine): State<Engine<S, T>>,
  Path(key): Path<String>,
) -> Result<Json<Topic>, ApiError>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  let topic = engine
    .store()
    .find_topic_by_key(&key)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("topic {key:?} not found")))?;
  Ok(Json(topic))
}
