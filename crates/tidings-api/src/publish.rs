//! `POST /publish` — the entry point other systems use to raise a topic event.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use tidings_core::{
  context::PortableContext,
  store::{EntityResolver, NotificationStore},
};
use tidings_engine::{Engine, transport::ChannelTransport};

use crate::error::ApiError;

/// JSON body accepted by `POST /publish`.
///
/// Entity references inside `context` use the portable form
/// `{"_type": "recipient", "_id": "<uuid>"}`.
#[derive(Debug, Deserialize)]
pub struct PublishBody {
  pub topic_key: String,
  #[serde(default)]
  pub context:   PortableContext,
}

/// `POST /publish` — 202 + publish report; 404 for an unknown topic key.
pub async fn handler<S, T>(
  State(engine): State<Engine<S, T>>,
  Json(body): Json<PublishBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  if body.topic_key.trim().is_empty() {
    return Err(ApiError::BadRequest("topic_key must not be empty".into()));
  }
  let report = engine.publish(&body.topic_key, body.context).await?;
  Ok((StatusCode::ACCEPTED, Json(report)))
}
