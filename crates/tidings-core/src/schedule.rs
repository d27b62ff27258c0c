//! Delivery-time computation for new queue items.

use chrono::{
  DateTime, Days, DurationRound, NaiveDate, NaiveDateTime, TimeDelta, TimeZone,
  Utc,
};
use chrono_tz::Tz;

use crate::model::{Frequency, Recipient, Subscription};

/// Local hour used when a daily subscription has none configured.
pub const DEFAULT_DAILY_HOUR: u8 = 9;

/// When a queue item created at `now` should be distributed.
///
/// - `Immediate` → `now`.
/// - `SummarizedHourly` → the start of the current hour plus one hour, so an
///   item created exactly on `:00` waits for the following hour.
/// - `SummarizedDaily` → the next `daily_hour:00` in `timezone` strictly after
///   `now`. Unknown zones fall back to UTC; a missing hour defaults to 09.
pub fn next_distribute_at(
  frequency: Frequency,
  now: DateTime<Utc>,
  timezone: Option<&str>,
  daily_hour: Option<u8>,
) -> DateTime<Utc> {
  match frequency {
    Frequency::Immediate => now,
    Frequency::SummarizedHourly => next_hour(now),
    Frequency::SummarizedDaily => next_daily(
      now,
      parse_zone(timezone),
      daily_hour.unwrap_or(DEFAULT_DAILY_HOUR),
    ),
  }
}

/// [`next_distribute_at`] for a subscription owned by `recipient`.
pub fn for_subscription(
  subscription: &Subscription,
  recipient: &Recipient,
  now: DateTime<Utc>,
) -> DateTime<Utc> {
  next_distribute_at(
    subscription.frequency,
    now,
    recipient.timezone.as_deref(),
    subscription.daily_hour,
  )
}

fn parse_zone(timezone: Option<&str>) -> Tz {
  match timezone {
    None => Tz::UTC,
    Some(name) => name.parse().unwrap_or_else(|_| {
      tracing::warn!(timezone = %name, "unknown timezone, falling back to UTC");
      Tz::UTC
    }),
  }
}

fn next_hour(now: DateTime<Utc>) -> DateTime<Utc> {
  let hour = TimeDelta::hours(1);
  now.duration_trunc(hour).unwrap_or(now) + hour
}

fn next_daily(now: DateTime<Utc>, tz: Tz, hour: u8) -> DateTime<Utc> {
  let today = now.with_timezone(&tz).date_naive();
  let at_today = local_at(tz, today, hour);
  if now < at_today {
    return at_today;
  }
  let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
  local_at(tz, tomorrow, hour)
}

/// `date` at `hour:00` in `tz`, as UTC. Ambiguous local times take the
/// earlier instant; times skipped by a DST jump move forward to the first
/// valid hour.
fn local_at(tz: Tz, date: NaiveDate, hour: u8) -> DateTime<Utc> {
  let hour = u32::from(hour.min(23));
  let mut naive: NaiveDateTime = date.and_hms_opt(hour, 0, 0).unwrap_or_default();
  for _ in 0..3 {
    if let Some(local) = tz.from_local_datetime(&naive).earliest() {
      return local.with_timezone(&Utc);
    }
    naive += TimeDelta::hours(1);
  }
  Utc.from_utc_datetime(&naive)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
  }

  #[test]
  fn immediate_is_now() {
    let now = at(2026, 3, 10, 10, 30);
    assert_eq!(next_distribute_at(Frequency::Immediate, now, None, None), now);
  }

  #[test]
  fn hourly_rounds_up_to_next_hour() {
    let f = Frequency::SummarizedHourly;
    assert_eq!(
      next_distribute_at(f, at(2026, 3, 10, 10, 30), None, None),
      at(2026, 3, 10, 11, 0)
    );
    assert_eq!(
      next_distribute_at(f, at(2026, 3, 10, 10, 0), None, None),
      at(2026, 3, 10, 11, 0)
    );
    assert_eq!(
      next_distribute_at(f, at(2026, 3, 10, 23, 59), None, None),
      at(2026, 3, 11, 0, 0)
    );
  }

  #[test]
  fn daily_before_and_after_the_hour() {
    let f = Frequency::SummarizedDaily;
    assert_eq!(
      next_distribute_at(f, at(2026, 3, 10, 8, 0), Some("UTC"), Some(9)),
      at(2026, 3, 10, 9, 0)
    );
    assert_eq!(
      next_distribute_at(f, at(2026, 3, 10, 9, 30), Some("UTC"), Some(9)),
      at(2026, 3, 11, 9, 0)
    );
    assert_eq!(
      next_distribute_at(f, at(2026, 3, 10, 9, 0), Some("UTC"), Some(9)),
      at(2026, 3, 11, 9, 0)
    );
  }

  #[test]
  fn daily_uses_recipient_zone() {
    // 09:00 in New York on 2026-01-15 is 14:00 UTC (EST, UTC-5).
    let f = Frequency::SummarizedDaily;
    assert_eq!(
      next_distribute_at(f, at(2026, 1, 15, 12, 0), Some("America/New_York"), Some(9)),
      at(2026, 1, 15, 14, 0)
    );
    // 03:00 UTC is still the previous local day in New York.
    assert_eq!(
      next_distribute_at(f, at(2026, 1, 15, 3, 0), Some("America/New_York"), Some(9)),
      at(2026, 1, 14, 14, 0) + TimeDelta::days(1)
    );
  }

  #[test]
  fn daily_defaults_and_fallbacks() {
    let f = Frequency::SummarizedDaily;
    let now = at(2026, 3, 10, 7, 0);
    assert_eq!(next_distribute_at(f, now, None, None), at(2026, 3, 10, 9, 0));
    assert_eq!(
      next_distribute_at(f, now, Some("Mars/Olympus_Mons"), Some(8)),
      at(2026, 3, 10, 8, 0)
    );
  }

  #[test]
  fn daily_hour_inside_a_dst_gap_moves_forward() {
    // 2026-03-08 02:00 does not exist in New York; clocks jump to 03:00 EDT.
    let f = Frequency::SummarizedDaily;
    assert_eq!(
      next_distribute_at(f, at(2026, 3, 8, 5, 0), Some("America/New_York"), Some(2)),
      at(2026, 3, 8, 7, 0)
    );
  }
}
