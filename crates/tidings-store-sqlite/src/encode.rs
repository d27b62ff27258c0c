//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 UTC strings with
//! microsecond precision, so lexical order in SQL matches time order. UUIDs are
//! stored as hyphenated lowercase strings. Channels and frequencies use their
//! wire names.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use tidings_core::model::{
  Message, QueueItem, Recipient, Subscription, Template, Topic,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Truncate to the precision the database keeps, so values handed back from
/// writes compare equal to values read later.
pub fn db_precision(dt: DateTime<Utc>) -> Result<DateTime<Utc>> {
  decode_dt(&encode_dt(dt))
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const RECIPIENT_COLUMNS: &str =
  "recipient_id, email, first_name, last_name, timezone, created_at";

pub const TOPIC_COLUMNS: &str =
  "topic_id, topic_key, name, description, active, created_at";

pub const TEMPLATE_COLUMNS: &str = "template_id, topic_id, channel, \
   subject_template, body_template, active, created_at";

pub const SUBSCRIPTION_COLUMNS: &str = "subscription_id, topic_id, \
   recipient_id, channel, frequency, daily_hour, active, created_at";

pub const MESSAGE_COLUMNS: &str =
  "message_id, topic_id, subject, body, metadata, created_at";

pub const QUEUE_ITEM_COLUMNS: &str = "queue_item_id, subscription_id, \
   message_id, recipient_id, channel, distribute_at, distributed_at, \
   created_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `recipients` row.
pub struct RawRecipient {
  pub recipient_id: String,
  pub email:        String,
  pub first_name:   Option<String>,
  pub last_name:    Option<String>,
  pub timezone:     Option<String>,
  pub created_at:   String,
}

impl RawRecipient {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      recipient_id: row.get(0)?,
      email:        row.get(1)?,
      first_name:   row.get(2)?,
      last_name:    row.get(3)?,
      timezone:     row.get(4)?,
      created_at:   row.get(5)?,
    })
  }

  pub fn into_recipient(self) -> Result<Recipient> {
    Ok(Recipient {
      recipient_id: decode_uuid(&self.recipient_id)?,
      email:        self.email,
      first_name:   self.first_name,
      last_name:    self.last_name,
      timezone:     self.timezone,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `topics` row.
pub struct RawTopic {
  pub topic_id:    String,
  pub key:         String,
  pub name:        String,
  pub description: Option<String>,
  pub active:      bool,
  pub created_at:  String,
}

impl RawTopic {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      topic_id:    row.get(0)?,
      key:         row.get(1)?,
      name:        row.get(2)?,
      description: row.get(3)?,
      active:      row.get(4)?,
      created_at:  row.get(5)?,
    })
  }

  pub fn into_topic(self) -> Result<Topic> {
    Ok(Topic {
      topic_id:    decode_uuid(&self.topic_id)?,
      key:         self.key,
      name:        self.name,
      description: self.description,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `templates` row.
pub struct RawTemplate {
  pub template_id:      String,
  pub topic_id:         String,
  pub channel:          String,
  pub subject_template: String,
  pub body_template:    String,
  pub active:           bool,
  pub created_at:       String,
}

impl RawTemplate {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      template_id:      row.get(0)?,
      topic_id:         row.get(1)?,
      channel:          row.get(2)?,
      subject_template: row.get(3)?,
      body_template:    row.get(4)?,
      active:           row.get(5)?,
      created_at:       row.get(6)?,
    })
  }

  pub fn into_template(self) -> Result<Template> {
    Ok(Template {
      template_id:      decode_uuid(&self.template_id)?,
      topic_id:         decode_uuid(&self.topic_id)?,
      channel:          self.channel.parse()?,
      subject_template: self.subject_template,
      body_template:    self.body_template,
      active:           self.active,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `subscriptions` row.
pub struct RawSubscription {
  pub subscription_id: String,
  pub topic_id:        String,
  pub recipient_id:    String,
  pub channel:         String,
  pub frequency:       String,
  pub daily_hour:      Option<u8>,
  pub active:          bool,
  pub created_at:      String,
}

impl RawSubscription {
  /// Reads the subscription columns starting at `offset`, so joined rows can
  /// reuse it.
  pub fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id: row.get(offset)?,
      topic_id:        row.get(offset + 1)?,
      recipient_id:    row.get(offset + 2)?,
      channel:         row.get(offset + 3)?,
      frequency:       row.get(offset + 4)?,
      daily_hour:      row.get(offset + 5)?,
      active:          row.get(offset + 6)?,
      created_at:      row.get(offset + 7)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id: decode_uuid(&self.subscription_id)?,
      topic_id:        decode_uuid(&self.topic_id)?,
      recipient_id:    decode_uuid(&self.recipient_id)?,
      channel:         self.channel.parse()?,
      frequency:       self.frequency.parse()?,
      daily_hour:      self.daily_hour,
      active:          self.active,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `messages` row.
pub struct RawMessage {
  pub message_id: String,
  pub topic_id:   String,
  pub subject:    String,
  pub body:       String,
  pub metadata:   String,
  pub created_at: String,
}

impl RawMessage {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id: row.get(0)?,
      topic_id:   row.get(1)?,
      subject:    row.get(2)?,
      body:       row.get(3)?,
      metadata:   row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id: decode_uuid(&self.message_id)?,
      topic_id:   decode_uuid(&self.topic_id)?,
      subject:    self.subject,
      body:       self.body,
      metadata:   serde_json::from_str(&self.metadata)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `queue_items` row.
pub struct RawQueueItem {
  pub queue_item_id:   String,
  pub subscription_id: String,
  pub message_id:      String,
  pub recipient_id:    String,
  pub channel:         String,
  pub distribute_at:   String,
  pub distributed_at:  Option<String>,
  pub created_at:      String,
}

impl RawQueueItem {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      queue_item_id:   row.get(0)?,
      subscription_id: row.get(1)?,
      message_id:      row.get(2)?,
      recipient_id:    row.get(3)?,
      channel:         row.get(4)?,
      distribute_at:   row.get(5)?,
      distributed_at:  row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  pub fn into_queue_item(self) -> Result<QueueItem> {
    Ok(QueueItem {
      queue_item_id:   decode_uuid(&self.queue_item_id)?,
      subscription_id: decode_uuid(&self.subscription_id)?,
      message_id:      decode_uuid(&self.message_id)?,
      recipient_id:    decode_uuid(&self.recipient_id)?,
      channel:         self.channel.parse()?,
      distribute_at:   decode_dt(&self.distribute_at)?,
      distributed_at:  self
        .distributed_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}
