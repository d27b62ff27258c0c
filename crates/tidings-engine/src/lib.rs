//! The Tidings delivery engine: topic publishing, ready-item sweeps and
//! idempotent dispatch over a task queue drained by a worker pool.

pub mod clock;
pub mod dispatch;
mod engine;
pub mod error;
pub mod mail;
pub mod publisher;
pub mod queue;
mod sweep;
pub mod ticker;
pub mod transport;

pub use engine::Engine;
pub use error::{Error, Result};
