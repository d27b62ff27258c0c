//! `GET /queue-items` — inspect delivery state.
//!
//! Optional query parameters: `state=pending|distributed`, `recipient_id`,
//! `limit` (default 100, max 1000) and `offset`.

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use tidings_core::{
  model::QueueItem,
  store::{EntityResolver, NotificationStore, QueueItemQuery, QueueItemState},
};
use tidings_engine::{Engine, transport::ChannelTransport};
use uuid::Uuid;

use crate::error::ApiError;

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub state:        Option<QueueItemState>,
  pub recipient_id: Option<Uuid>,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

/// `GET /queue-items[?state=...][&recipient_id=...][&limit=...][&offset=...]`
pub async fn list<S, T>(
  State(engine): State<Engine<S, T>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<QueueItem>>, ApiError>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  if params.limit.is_some_and(|l| l == 0 || l > MAX_LIMIT) {
    return Err(ApiError::BadRequest(format!(
      "limit must be between 1 and {MAX_LIMIT}"
    )));
  }

  let query = QueueItemQuery {
    state:        params.state,
    recipient_id: params.recipient_id,
    limit:        params.limit,
    offset:       params.offset,
  };
  let items = engine
    .store()
    .list_queue_items(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(items))
}
