//! Domain entities: the long-lived configuration rows (topics, templates,
//! subscriptions, recipients) and the rows produced by a publish (messages
//! and queue items).

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Channel ─────────────────────────────────────────────────────────────────

/// A delivery medium.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  Email,
  Sms,
  Chat,
}

impl Channel {
  pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Chat];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Email => "email",
      Self::Sms => "sms",
      Self::Chat => "chat",
    }
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Channel {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "email" => Ok(Self::Email),
      "sms" => Ok(Self::Sms),
      "chat" => Ok(Self::Chat),
      other => Err(Error::UnknownChannel(other.to_owned())),
    }
  }
}

// ─── Frequency ───────────────────────────────────────────────────────────────

/// How a subscription's notifications are batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
  Immediate,
  SummarizedHourly,
  SummarizedDaily,
}

impl Frequency {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Immediate => "immediate",
      Self::SummarizedHourly => "summarized_hourly",
      Self::SummarizedDaily => "summarized_daily",
    }
  }

  pub fn is_immediate(&self) -> bool { matches!(self, Self::Immediate) }
}

impl fmt::Display for Frequency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Frequency {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "immediate" => Ok(Self::Immediate),
      "summarized_hourly" => Ok(Self::SummarizedHourly),
      "summarized_daily" => Ok(Self::SummarizedDaily),
      other => Err(Error::UnknownFrequency(other.to_owned())),
    }
  }
}

// ─── Recipient ───────────────────────────────────────────────────────────────

/// Someone who can be notified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
  pub recipient_id: Uuid,
  pub email:        String,
  pub first_name:   Option<String>,
  pub last_name:    Option<String>,
  /// IANA zone name, e.g. `"Europe/Berlin"`. `None` means UTC.
  pub timezone:     Option<String>,
  pub created_at:   DateTime<Utc>,
}

impl Recipient {
  /// "First Last" with each word capitalised; empty when neither name is set.
  pub fn full_name(&self) -> String {
    let joined = format!(
      "{} {}",
      self.first_name.as_deref().unwrap_or_default(),
      self.last_name.as_deref().unwrap_or_default()
    );
    titleize(joined.trim())
  }
}

fn titleize(s: &str) -> String {
  s.split_whitespace()
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => {
          first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

#[derive(Debug, Clone)]
pub struct NewRecipient {
  pub email:      String,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub timezone:   Option<String>,
}

impl NewRecipient {
  pub fn new(email: impl Into<String>) -> Self {
    Self {
      email:      email.into(),
      first_name: None,
      last_name:  None,
      timezone:   None,
    }
  }
}

// ─── Topic ───────────────────────────────────────────────────────────────────

/// A publishable event category, addressed by its unique `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
  pub topic_id:    Uuid,
  /// Globally unique, e.g. `"user.created"`.
  pub key:         String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTopic {
  pub key:         String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
}

impl NewTopic {
  pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      key:         key.into(),
      name:        name.into(),
      description: None,
      active:      true,
    }
  }
}

// ─── Template ────────────────────────────────────────────────────────────────

/// Channel-specific rendering rule for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
  pub template_id:      Uuid,
  pub topic_id:         Uuid,
  pub channel:          Channel,
  pub subject_template: String,
  pub body_template:    String,
  pub active:           bool,
  pub created_at:       DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTemplate {
  pub topic_id:         Uuid,
  pub channel:          Channel,
  pub subject_template: String,
  pub body_template:    String,
  pub active:           bool,
}

impl NewTemplate {
  pub fn new(
    topic_id: Uuid,
    channel: Channel,
    subject_template: impl Into<String>,
    body_template: impl Into<String>,
  ) -> Self {
    Self {
      topic_id,
      channel,
      subject_template: subject_template.into(),
      body_template: body_template.into(),
      active: true,
    }
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// A recipient's interest in a topic on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id: Uuid,
  pub topic_id:        Uuid,
  pub recipient_id:    Uuid,
  pub channel:         Channel,
  pub frequency:       Frequency,
  /// Local hour of day (0–23) for `summarized_daily` delivery.
  pub daily_hour:      Option<u8>,
  pub active:          bool,
  pub created_at:      DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
  pub topic_id:     Uuid,
  pub recipient_id: Uuid,
  pub channel:      Channel,
  pub frequency:    Frequency,
  pub daily_hour:   Option<u8>,
  pub active:       bool,
}

impl NewSubscription {
  pub fn new(
    topic_id: Uuid,
    recipient_id: Uuid,
    channel: Channel,
    frequency: Frequency,
  ) -> Self {
    Self {
      topic_id,
      recipient_id,
      channel,
      frequency,
      daily_hour: None,
      active: true,
    }
  }

  /// Reject hours outside 0–23, and a daily hour on anything but a
  /// `summarized_daily` subscription (or its absence on one).
  pub fn validate(&self) -> Result<()> {
    match (self.frequency, self.daily_hour) {
      (_, Some(hour)) if hour > 23 => Err(Error::InvalidSubscription(format!(
        "daily hour {hour} is outside 0-23"
      ))),
      (Frequency::SummarizedDaily, None) => Err(Error::InvalidSubscription(
        "summarized_daily requires a daily hour".into(),
      )),
      (Frequency::SummarizedDaily, Some(_)) => Ok(()),
      (other, Some(_)) => Err(Error::InvalidSubscription(format!(
        "daily hour is only valid for summarized_daily, not {other}"
      ))),
      (_, None) => Ok(()),
    }
  }
}

/// An active subscription joined with its recipient.
#[derive(Debug, Clone)]
pub struct SubscriptionWithRecipient {
  pub subscription: Subscription,
  pub recipient:    Recipient,
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// One rendered instance of a topic event for one channel. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub message_id: Uuid,
  pub topic_id:   Uuid,
  pub subject:    String,
  pub body:       String,
  /// The portable (pre-decode) publish context, kept for audit.
  pub metadata:   serde_json::Value,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
  pub topic_id: Uuid,
  pub subject:  String,
  pub body:     String,
  pub metadata: serde_json::Value,
}

// ─── QueueItem ───────────────────────────────────────────────────────────────

/// One obligation to notify one recipient.
///
/// `distribute_at` is fixed at creation. `distributed_at` only ever moves from
/// `None` to a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
  pub queue_item_id:   Uuid,
  pub subscription_id: Uuid,
  pub message_id:      Uuid,
  pub recipient_id:    Uuid,
  pub channel:         Channel,
  pub distribute_at:   DateTime<Utc>,
  pub distributed_at:  Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
}

impl QueueItem {
  pub fn is_distributed(&self) -> bool { self.distributed_at.is_some() }

  pub fn is_pending(&self) -> bool { self.distributed_at.is_none() }
}

/// A queue item to be written alongside a new message. The message id is
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
  pub subscription_id: Uuid,
  pub recipient_id:    Uuid,
  pub channel:         Channel,
  pub distribute_at:   DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn recipient(first: Option<&str>, last: Option<&str>) -> Recipient {
    Recipient {
      recipient_id: Uuid::nil(),
      email:        "ada@example.com".into(),
      first_name:   first.map(str::to_owned),
      last_name:    last.map(str::to_owned),
      timezone:     None,
      created_at:   Utc::now(),
    }
  }

  #[test]
  fn full_name_is_titleized() {
    assert_eq!(recipient(Some("ada"), Some("LOVELACE")).full_name(), "Ada Lovelace");
    assert_eq!(recipient(None, Some("lovelace")).full_name(), "Lovelace");
    assert_eq!(recipient(None, None).full_name(), "");
  }

  #[test]
  fn channel_and_frequency_parse_wire_names() {
    assert_eq!("sms".parse::<Channel>().unwrap(), Channel::Sms);
    assert_eq!(
      "summarized_daily".parse::<Frequency>().unwrap(),
      Frequency::SummarizedDaily
    );
    assert!("pager".parse::<Channel>().is_err());
    assert!("weekly".parse::<Frequency>().is_err());
  }

  #[test]
  fn daily_hour_required_only_for_daily() {
    let topic = Uuid::new_v4();
    let who = Uuid::new_v4();

    let mut daily =
      NewSubscription::new(topic, who, Channel::Email, Frequency::SummarizedDaily);
    assert!(daily.validate().is_err());
    daily.daily_hour = Some(9);
    assert!(daily.validate().is_ok());
    daily.daily_hour = Some(24);
    assert!(daily.validate().is_err());

    let mut hourly =
      NewSubscription::new(topic, who, Channel::Email, Frequency::SummarizedHourly);
    assert!(hourly.validate().is_ok());
    hourly.daily_hour = Some(9);
    assert!(hourly.validate().is_err());
  }
}
