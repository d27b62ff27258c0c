//! [`SqliteStore`] — the SQLite implementation of [`NotificationStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, params, params_from_iter};
use uuid::Uuid;

use tidings_core::{
  context::{Entity, EntityKind},
  model::{
    Channel, Message, NewMessage, NewQueueItem, NewRecipient, NewSubscription,
    NewTemplate, NewTopic, QueueItem, Recipient, Subscription,
    SubscriptionWithRecipient, Template, Topic,
  },
  store::{
    EntityResolver, FrequencyClass, NotificationStore, QueueItemQuery,
    QueueItemState,
  },
};

use crate::{
  Error, Result,
  encode::{
    MESSAGE_COLUMNS, QUEUE_ITEM_COLUMNS, RECIPIENT_COLUMNS, RawMessage,
    RawQueueItem, RawRecipient, RawSubscription, RawTemplate, RawTopic,
    SUBSCRIPTION_COLUMNS, TEMPLATE_COLUMNS, TOPIC_COLUMNS, db_precision,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

/// `?, ?, ?` with `n` placeholders.
fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A notification store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_queue_items(
    &self,
    sql: String,
    args: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<QueueItem>> {
    let raws: Vec<RawQueueItem> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawQueueItem::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQueueItem::into_queue_item).collect()
  }
}

// ─── NotificationStore impl ──────────────────────────────────────────────────

impl NotificationStore for SqliteStore {
  type Error = Error;

  // ── Recipients ────────────────────────────────────────────────────────────

  async fn add_recipient(&self, input: NewRecipient) -> Result<Recipient> {
    let recipient = Recipient {
      recipient_id: Uuid::new_v4(),
      email:        input.email,
      first_name:   input.first_name,
      last_name:    input.last_name,
      timezone:     input.timezone,
      created_at:   db_precision(Utc::now())?,
    };

    let id_str     = encode_uuid(recipient.recipient_id);
    let at_str     = encode_dt(recipient.created_at);
    let email      = recipient.email.clone();
    let first_name = recipient.first_name.clone();
    let last_name  = recipient.last_name.clone();
    let timezone   = recipient.timezone.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO recipients (recipient_id, email, first_name, last_name, timezone, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          params![id_str, email, first_name, last_name, timezone, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(recipient)
  }

  async fn get_recipient(&self, id: Uuid) -> Result<Option<Recipient>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRecipient> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE recipient_id = ?1"),
              params![id_str],
              RawRecipient::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecipient::into_recipient).transpose()
  }

  // ── Topics ────────────────────────────────────────────────────────────────

  async fn add_topic(&self, input: NewTopic) -> Result<Topic> {
    let topic = Topic {
      topic_id:    Uuid::new_v4(),
      key:         input.key,
      name:        input.name,
      description: input.description,
      active:      input.active,
      created_at:  db_precision(Utc::now())?,
    };

    let id_str      = encode_uuid(topic.topic_id);
    let at_str      = encode_dt(topic.created_at);
    let key         = topic.key.clone();
    let name        = topic.name.clone();
    let description = topic.description.clone();
    let active      = topic.active;

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let taken = conn
          .query_row(
            "SELECT 1 FROM topics WHERE topic_key = ?1",
            params![key],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO topics (topic_id, topic_key, name, description, active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          params![id_str, key, name, description, active, at_str],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateTopicKey(topic.key));
    }
    Ok(topic)
  }

  async fn get_topic(&self, id: Uuid) -> Result<Option<Topic>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawTopic> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE topic_id = ?1"),
              params![id_str],
              RawTopic::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTopic::into_topic).transpose()
  }

  async fn find_topic_by_key(&self, key: &str) -> Result<Option<Topic>> {
    let key = key.to_owned();

    let raw: Option<RawTopic> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE topic_key = ?1"),
              params![key],
              RawTopic::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTopic::into_topic).transpose()
  }

  async fn list_topics(&self) -> Result<Vec<Topic>> {
    let raws: Vec<RawTopic> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {TOPIC_COLUMNS} FROM topics ORDER BY name"))?;
        let rows = stmt
          .query_map([], RawTopic::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTopic::into_topic).collect()
  }

  // ── Templates ─────────────────────────────────────────────────────────────

  async fn add_template(&self, input: NewTemplate) -> Result<Template> {
    if self.get_topic(input.topic_id).await?.is_none() {
      return Err(Error::TopicNotFound(input.topic_id));
    }

    let template = Template {
      template_id:      Uuid::new_v4(),
      topic_id:         input.topic_id,
      channel:          input.channel,
      subject_template: input.subject_template,
      body_template:    input.body_template,
      active:           input.active,
      created_at:       db_precision(Utc::now())?,
    };

    let id_str       = encode_uuid(template.template_id);
    let topic_id_str = encode_uuid(template.topic_id);
    let channel_str  = template.channel.as_str();
    let subject      = template.subject_template.clone();
    let body         = template.body_template.clone();
    let active       = template.active;
    let at_str       = encode_dt(template.created_at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        if active {
          let clash = conn
            .query_row(
              "SELECT 1 FROM templates
               WHERE topic_id = ?1 AND channel = ?2 AND active = 1",
              params![topic_id_str, channel_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if clash {
            return Ok(false);
          }
        }
        conn.execute(
          "INSERT INTO templates (
             template_id, topic_id, channel, subject_template, body_template,
             active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          params![id_str, topic_id_str, channel_str, subject, body, active, at_str],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateTemplate {
        topic_id: template.topic_id,
        channel:  template.channel,
      });
    }
    Ok(template)
  }

  async fn active_template(
    &self,
    topic_id: Uuid,
    channel:  Channel,
  ) -> Result<Option<Template>> {
    let topic_id_str = encode_uuid(topic_id);
    let channel_str  = channel.as_str();

    let raw: Option<RawTemplate> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {TEMPLATE_COLUMNS} FROM templates
                 WHERE topic_id = ?1 AND channel = ?2 AND active = 1"
              ),
              params![topic_id_str, channel_str],
              RawTemplate::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTemplate::into_template).transpose()
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn add_subscription(&self, input: NewSubscription) -> Result<Subscription> {
    input.validate()?;
    if self.get_topic(input.topic_id).await?.is_none() {
      return Err(Error::TopicNotFound(input.topic_id));
    }
    if self.get_recipient(input.recipient_id).await?.is_none() {
      return Err(Error::RecipientNotFound(input.recipient_id));
    }

    let subscription = Subscription {
      subscription_id: Uuid::new_v4(),
      topic_id:        input.topic_id,
      recipient_id:    input.recipient_id,
      channel:         input.channel,
      frequency:       input.frequency,
      daily_hour:      input.daily_hour,
      active:          input.active,
      created_at:      db_precision(Utc::now())?,
    };

    let id_str           = encode_uuid(subscription.subscription_id);
    let topic_id_str     = encode_uuid(subscription.topic_id);
    let recipient_id_str = encode_uuid(subscription.recipient_id);
    let channel_str      = subscription.channel.as_str();
    let frequency_str    = subscription.frequency.as_str();
    let daily_hour       = subscription.daily_hour;
    let active           = subscription.active;
    let at_str           = encode_dt(subscription.created_at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let taken = conn
          .query_row(
            "SELECT 1 FROM subscriptions
             WHERE topic_id = ?1 AND recipient_id = ?2 AND channel = ?3",
            params![topic_id_str, recipient_id_str, channel_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO subscriptions (
             subscription_id, topic_id, recipient_id, channel, frequency,
             daily_hour, active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          params![
            id_str,
            topic_id_str,
            recipient_id_str,
            channel_str,
            frequency_str,
            daily_hour,
            active,
            at_str,
          ],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateSubscription {
        topic_id:     subscription.topic_id,
        recipient_id: subscription.recipient_id,
        channel:      subscription.channel,
      });
    }
    Ok(subscription)
  }

  async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = ?1"
              ),
              params![id_str],
              |row| RawSubscription::from_row_at(row, 0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn active_subscriptions(
    &self,
    topic_id: Uuid,
  ) -> Result<Vec<SubscriptionWithRecipient>> {
    let topic_id_str = encode_uuid(topic_id);

    let raws: Vec<(RawSubscription, RawRecipient)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             s.subscription_id, s.topic_id, s.recipient_id, s.channel,
             s.frequency, s.daily_hour, s.active, s.created_at,
             r.recipient_id, r.email, r.first_name, r.last_name,
             r.timezone, r.created_at
           FROM subscriptions s
           JOIN recipients r ON r.recipient_id = s.recipient_id
           WHERE s.topic_id = ?1 AND s.active = 1
           ORDER BY s.channel, s.created_at",
        )?;

        let rows = stmt
          .query_map(params![topic_id_str], |row| {
            Ok((
              RawSubscription::from_row_at(row, 0)?,
              RawRecipient {
                recipient_id: row.get(8)?,
                email:        row.get(9)?,
                first_name:   row.get(10)?,
                last_name:    row.get(11)?,
                timezone:     row.get(12)?,
                created_at:   row.get(13)?,
              },
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(s, r)| {
        Ok(SubscriptionWithRecipient {
          subscription: s.into_subscription()?,
          recipient:    r.into_recipient()?,
        })
      })
      .collect()
  }

  // ── Fan-out ───────────────────────────────────────────────────────────────

  async fn record_fanout(
    &self,
    input: NewMessage,
    items: Vec<NewQueueItem>,
  ) -> Result<(Message, Vec<QueueItem>)> {
    let now = db_precision(Utc::now())?;

    let message = Message {
      message_id: Uuid::new_v4(),
      topic_id:   input.topic_id,
      subject:    input.subject,
      body:       input.body,
      metadata:   input.metadata,
      created_at: now,
    };

    let queue_items = items
      .into_iter()
      .map(|item| {
        Ok(QueueItem {
          queue_item_id:   Uuid::new_v4(),
          subscription_id: item.subscription_id,
          message_id:      message.message_id,
          recipient_id:    item.recipient_id,
          channel:         item.channel,
          distribute_at:   db_precision(item.distribute_at)?,
          distributed_at:  None,
          created_at:      now,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let message_row = (
      encode_uuid(message.message_id),
      encode_uuid(message.topic_id),
      message.subject.clone(),
      message.body.clone(),
      message.metadata.to_string(),
      encode_dt(message.created_at),
    );
    let item_rows: Vec<[String; 7]> = queue_items
      .iter()
      .map(|q| {
        [
          encode_uuid(q.queue_item_id),
          encode_uuid(q.subscription_id),
          encode_uuid(q.message_id),
          encode_uuid(q.recipient_id),
          q.channel.as_str().to_owned(),
          encode_dt(q.distribute_at),
          encode_dt(q.created_at),
        ]
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let (id, topic_id, subject, body, metadata, created_at) = &message_row;
          tx.execute(
            "INSERT INTO messages (message_id, topic_id, subject, body, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, topic_id, subject, body, metadata, created_at],
          )?;

          let mut stmt = tx.prepare(
            "INSERT INTO queue_items (
               queue_item_id, subscription_id, message_id, recipient_id,
               channel, distribute_at, distributed_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)",
          )?;
          for row in &item_rows {
            stmt.execute(params_from_iter(row.iter()))?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok((message, queue_items))
  }

  async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"),
              params![id_str],
              RawMessage::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMessage::into_message).transpose()
  }

  async fn get_messages(&self, ids: &[Uuid]) -> Result<Vec<Message>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let id_strs: Vec<String> = ids.iter().copied().map(encode_uuid).collect();

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {MESSAGE_COLUMNS} FROM messages
           WHERE message_id IN ({})
           ORDER BY created_at, message_id",
          placeholders(id_strs.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(id_strs.iter()), RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  // ── Queue items ───────────────────────────────────────────────────────────

  async fn get_queue_item(&self, id: Uuid) -> Result<Option<QueueItem>> {
    Ok(self.get_queue_items(&[id]).await?.into_iter().next())
  }

  async fn get_queue_items(&self, ids: &[Uuid]) -> Result<Vec<QueueItem>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT {QUEUE_ITEM_COLUMNS} FROM queue_items
       WHERE queue_item_id IN ({})
       ORDER BY distribute_at, created_at",
      placeholders(ids.len())
    );
    let args = ids
      .iter()
      .map(|id| rusqlite::types::Value::Text(encode_uuid(*id)))
      .collect();
    self.query_queue_items(sql, args).await
  }

  async fn ready_queue_items(
    &self,
    now:   DateTime<Utc>,
    class: FrequencyClass,
  ) -> Result<Vec<QueueItem>> {
    let frequency_cond = match class {
      FrequencyClass::Immediate => "s.frequency = 'immediate'",
      FrequencyClass::Summarized => "s.frequency != 'immediate'",
    };
    let sql = format!(
      "SELECT {columns}
       FROM queue_items q
       JOIN subscriptions s ON s.subscription_id = q.subscription_id
       WHERE q.distributed_at IS NULL
         AND q.distribute_at <= ?1
         AND {frequency_cond}
       ORDER BY q.distribute_at, q.created_at",
      columns = qualified(QUEUE_ITEM_COLUMNS, "q"),
    );
    self
      .query_queue_items(sql, vec![rusqlite::types::Value::Text(encode_dt(now))])
      .await
  }

  async fn mark_distributed(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<usize> {
    if ids.is_empty() {
      return Ok(0);
    }
    let id_strs: Vec<String> = ids.iter().copied().map(encode_uuid).collect();
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
          let mut stmt = tx.prepare(
            "UPDATE queue_items SET distributed_at = ?1
             WHERE queue_item_id = ?2 AND distributed_at IS NULL",
          )?;
          for id in &id_strs {
            changed += stmt.execute(params![at_str, id])?;
          }
        }
        tx.commit()?;
        Ok(changed)
      })
      .await?;

    if changed < ids.len() {
      tracing::debug!(
        requested = ids.len(),
        changed,
        "some queue items were already distributed"
      );
    }
    Ok(changed)
  }

  async fn list_queue_items(&self, query: &QueueItemQuery) -> Result<Vec<QueueItem>> {
    let mut conds: Vec<&'static str> = vec![];
    let mut args: Vec<rusqlite::types::Value> = vec![];

    match query.state {
      Some(QueueItemState::Pending) => conds.push("distributed_at IS NULL"),
      Some(QueueItemState::Distributed) => conds.push("distributed_at IS NOT NULL"),
      None => {}
    }
    if let Some(recipient_id) = query.recipient_id {
      conds.push("recipient_id = ?");
      args.push(rusqlite::types::Value::Text(encode_uuid(recipient_id)));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };

    args.push(rusqlite::types::Value::Integer(query.limit.unwrap_or(100) as i64));
    args.push(rusqlite::types::Value::Integer(query.offset.unwrap_or(0) as i64));

    let sql = format!(
      "SELECT {QUEUE_ITEM_COLUMNS} FROM queue_items
       {where_clause}
       ORDER BY distribute_at DESC, created_at DESC
       LIMIT ? OFFSET ?"
    );
    self.query_queue_items(sql, args).await
  }
}

/// Prefix every column in a comma-separated list with `alias.`.
fn qualified(columns: &str, alias: &str) -> String {
  columns
    .split(',')
    .map(|c| format!("{alias}.{}", c.trim()))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── EntityResolver impl ─────────────────────────────────────────────────────

impl EntityResolver for SqliteStore {
  type Error = Error;

  async fn resolve(&self, kind: EntityKind, id: Uuid) -> Result<Option<Entity>> {
    Ok(match kind {
      EntityKind::Recipient => self.get_recipient(id).await?.map(Entity::Recipient),
      EntityKind::Topic => self.get_topic(id).await?.map(Entity::Topic),
      EntityKind::Subscription => {
        self.get_subscription(id).await?.map(Entity::Subscription)
      }
      EntityKind::Message => self.get_message(id).await?.map(Entity::Message),
    })
  }
}
