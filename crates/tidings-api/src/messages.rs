//! `GET /messages/:id`

use axum::{
  Json,
  extract::{Path, State},
};
use tidings_core::{
  model::Message,
  store::{EntityResolver, NotificationStore},
};
use tidings_engine::{Engine, transport::ChannelTransport};
use uuid::Uuid;

use crate::error::ApiError;

pub async fn get_one<S, T>(
  State(engine): State<Engine<S, T>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Message>, ApiError>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  let message = engine
    .store()
    .get_message(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("message {id} not found")))?;
  Ok(Json(message))
}
