//! Manual sweep triggers. Each runs the sweep inline and reports how many
//! dispatch tasks it enqueued; the sends themselves happen on the workers.

use axum::{Json, extract::State};
use serde::Serialize;
use tidings_core::store::{EntityResolver, NotificationStore};
use tidings_engine::{Engine, transport::ChannelTransport};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SweepResponse {
  pub enqueued: usize,
}

/// `POST /sweeps/immediate`
pub async fn immediate<S, T>(
  State(engine): State<Engine<S, T>>,
) -> Result<Json<SweepResponse>, ApiError>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  let enqueued = engine.sweep_immediate().await?;
  Ok(Json(SweepResponse { enqueued }))
}

/// `POST /sweeps/summarized`
pub async fn summarized<S, T>(
  State(engine): State<Engine<S, T>>,
) -> Result<Json<SweepResponse>, ApiError>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  let enqueued = engine.sweep_summarized().await?;
  Ok(Json(SweepResponse { enqueued }))
}
