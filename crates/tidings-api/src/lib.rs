//! JSON HTTP API for Tidings.
//!
//! Exposes an axum [`Router`] over an [`Engine`]. Authentication is the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tidings_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod messages;
pub mod publish;
pub mod queue_items;
pub mod sweeps;
pub mod topics;

use axum::{
  Router,
  routing::{get, post},
};
use tidings_core::store::{EntityResolver, NotificationStore};
use tidings_engine::{Engine, transport::ChannelTransport};

pub use error::ApiError;

/// Build the API router for `engine`.
pub fn api_router<S, T>(engine: Engine<S, T>) -> Router<()>
where
  S: NotificationStore + EntityResolver + 'static,
  T: ChannelTransport + 'static,
{
  Router::new()
    .route("/publish", post(publish::handler::<S, T>))
    // Topics
    .route("/topics", get(topics::list::<S, T>))
    .route("/topics/{key}", get(topics::get_one::<S, T>))
    // Delivery state
    .route("/messages/{id}", get(messages::get_one::<S, T>))
    .route("/queue-items", get(queue_items::list::<S, T>))
    // Sweeps
    .route("/sweeps/immediate", post(sweeps::immediate::<S, T>))
    .route("/sweeps/summarized", post(sweeps::summarized::<S, T>))
    .with_state(engine)
}

#[cfg(test)]
mod tests;
