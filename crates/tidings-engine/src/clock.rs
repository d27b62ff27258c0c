//! Time sources. The engine reads the clock once per operation.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(now: DateTime<Utc>) -> Self { Self { now: Mutex::new(now) } }

  pub fn set(&self, now: DateTime<Utc>) {
    *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
  }

  pub fn advance(&self, by: TimeDelta) {
    let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
    *now += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|p| p.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn manual_clock_moves_only_when_told() {
    let start = Utc.with_ymd_and_hms(2026, 3, 10, 10, 30, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(TimeDelta::minutes(15));
    assert_eq!(clock.now(), start + TimeDelta::minutes(15));

    clock.set(start);
    assert_eq!(clock.now(), start);
  }
}
