//! The periodic trigger for summarized delivery.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::{
  clock::Clock,
  queue::{Task, TaskQueue},
};

/// How long from `now` until the next multiple of `period` since the Unix
/// epoch. With a one-hour period this is the next top of the hour.
pub fn until_next_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
  let period_ms = period.as_millis().max(1) as i64;
  let into = now.timestamp_millis().rem_euclid(period_ms);
  Duration::from_millis((period_ms - into) as u64)
}

/// Enqueue [`Task::SweepSummarized`] at every period boundary until the queue
/// closes.
pub async fn run_summary_ticker(tasks: TaskQueue, clock: Arc<dyn Clock>, period: Duration) {
  let first = until_next_boundary(clock.now(), period);
  tracing::info!(
    period_secs = period.as_secs(),
    first_in_secs = first.as_secs(),
    "summary ticker started"
  );

  let mut ticker = interval_at(Instant::now() + first, period.max(Duration::from_secs(1)));
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    ticker.tick().await;
    if tasks.enqueue(Task::SweepSummarized).is_err() {
      break;
    }
    tracing::debug!("summarized sweep enqueued");
  }
  tracing::info!("summary ticker stopped");
}
