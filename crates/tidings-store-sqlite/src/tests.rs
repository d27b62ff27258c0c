//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::json;
use tidings_core::{
  context::{Entity, EntityKind},
  model::{
    Channel, Frequency, NewMessage, NewQueueItem, NewRecipient,
    NewSubscription, NewTemplate, NewTopic, QueueItem, Recipient,
    Subscription, Topic,
  },
  store::{
    EntityResolver, FrequencyClass, NotificationStore, QueueItemQuery,
    QueueItemState,
  },
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(h: u32, mi: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2026, 3, 10, h, mi, 0).unwrap()
}

async fn recipient(s: &SqliteStore, email: &str) -> Recipient {
  s.add_recipient(NewRecipient::new(email)).await.unwrap()
}

async fn topic(s: &SqliteStore, key: &str) -> Topic {
  s.add_topic(NewTopic::new(key, key)).await.unwrap()
}

async fn subscribe(
  s: &SqliteStore,
  topic: &Topic,
  recipient: &Recipient,
  channel: Channel,
  frequency: Frequency,
) -> Subscription {
  let mut input =
    NewSubscription::new(topic.topic_id, recipient.recipient_id, channel, frequency);
  if frequency == Frequency::SummarizedDaily {
    input.daily_hour = Some(9);
  }
  s.add_subscription(input).await.unwrap()
}

/// Record one message with one queue item per subscription, all due at
/// `due`.
async fn fanout(
  s: &SqliteStore,
  topic: &Topic,
  subs: &[&Subscription],
  due: DateTime<Utc>,
) -> Vec<QueueItem> {
  let message = NewMessage {
    topic_id: topic.topic_id,
    subject:  "subject".into(),
    body:     "body".into(),
    metadata: json!({}),
  };
  let items = subs
    .iter()
    .map(|sub| NewQueueItem {
      subscription_id: sub.subscription_id,
      recipient_id:    sub.recipient_id,
      channel:         sub.channel,
      distribute_at:   due,
    })
    .collect();
  s.record_fanout(message, items).await.unwrap().1
}

// ─── Recipients and topics ───────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_recipient() {
  let s = store().await;
  let mut input = NewRecipient::new("ada@example.com");
  input.first_name = Some("Ada".into());
  input.timezone = Some("Europe/London".into());

  let added = s.add_recipient(input).await.unwrap();
  let fetched = s.get_recipient(added.recipient_id).await.unwrap().unwrap();
  assert_eq!(fetched, added);
  assert!(s.get_recipient(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn topic_keys_are_unique() {
  let s = store().await;
  let t = topic(&s, "order.shipped").await;

  let found = s.find_topic_by_key("order.shipped").await.unwrap().unwrap();
  assert_eq!(found, t);
  assert!(s.find_topic_by_key("order.lost").await.unwrap().is_none());

  let err = s
    .add_topic(NewTopic::new("order.shipped", "again"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateTopicKey(k) if k == "order.shipped"));
}

#[tokio::test]
async fn list_topics_sorted_by_name() {
  let s = store().await;
  s.add_topic(NewTopic::new("b", "Bravo")).await.unwrap();
  s.add_topic(NewTopic::new("a", "Alpha")).await.unwrap();

  let names: Vec<_> =
    s.list_topics().await.unwrap().into_iter().map(|t| t.name).collect();
  assert_eq!(names, vec!["Alpha", "Bravo"]);
}

// ─── Templates ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_active_template_per_topic_and_channel() {
  let s = store().await;
  let t = topic(&s, "greet").await;

  let tpl = s
    .add_template(NewTemplate::new(t.topic_id, Channel::Email, "Hi", "Body"))
    .await
    .unwrap();

  let err = s
    .add_template(NewTemplate::new(t.topic_id, Channel::Email, "Hi", "Body"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateTemplate { channel: Channel::Email, .. }));

  // Inactive templates may coexist with the active one.
  let mut inactive = NewTemplate::new(t.topic_id, Channel::Email, "Old", "Old");
  inactive.active = false;
  s.add_template(inactive).await.unwrap();

  let active = s.active_template(t.topic_id, Channel::Email).await.unwrap();
  assert_eq!(active, Some(tpl));
  assert!(s.active_template(t.topic_id, Channel::Sms).await.unwrap().is_none());
}

#[tokio::test]
async fn template_for_missing_topic_is_rejected() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s
    .add_template(NewTemplate::new(missing, Channel::Email, "Hi", "Body"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::TopicNotFound(id) if id == missing));
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn subscriptions_are_unique_per_channel() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;

  subscribe(&s, &t, &r, Channel::Email, Frequency::Immediate).await;
  subscribe(&s, &t, &r, Channel::Sms, Frequency::Immediate).await;

  let err = s
    .add_subscription(NewSubscription::new(
      t.topic_id,
      r.recipient_id,
      Channel::Email,
      Frequency::SummarizedHourly,
    ))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateSubscription { .. }));
}

#[tokio::test]
async fn daily_subscription_requires_an_hour() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;

  let err = s
    .add_subscription(NewSubscription::new(
      t.topic_id,
      r.recipient_id,
      Channel::Email,
      Frequency::SummarizedDaily,
    ))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(tidings_core::Error::InvalidSubscription(_))
  ));
}

#[tokio::test]
async fn subscription_for_missing_recipient_is_rejected() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let missing = Uuid::new_v4();
  let err = s
    .add_subscription(NewSubscription::new(
      t.topic_id,
      missing,
      Channel::Email,
      Frequency::Immediate,
    ))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RecipientNotFound(id) if id == missing));
}

#[tokio::test]
async fn active_subscriptions_skip_inactive_and_join_recipient() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let ada = recipient(&s, "ada@example.com").await;
  let bob = recipient(&s, "bob@example.com").await;

  let kept = subscribe(&s, &t, &ada, Channel::Email, Frequency::Immediate).await;
  let mut inactive = NewSubscription::new(
    t.topic_id,
    bob.recipient_id,
    Channel::Email,
    Frequency::Immediate,
  );
  inactive.active = false;
  s.add_subscription(inactive).await.unwrap();

  let active = s.active_subscriptions(t.topic_id).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].subscription, kept);
  assert_eq!(active[0].recipient, ada);
}

// ─── Fan-out and queue ───────────────────────────────────────────────────────

#[tokio::test]
async fn record_fanout_writes_message_and_items() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;
  let sub = subscribe(&s, &t, &r, Channel::Email, Frequency::Immediate).await;

  let message = NewMessage {
    topic_id: t.topic_id,
    subject:  "Hello".into(),
    body:     "World".into(),
    metadata: json!({ "user": { "_type": "recipient", "_id": r.recipient_id } }),
  };
  let item = NewQueueItem {
    subscription_id: sub.subscription_id,
    recipient_id:    r.recipient_id,
    channel:         Channel::Email,
    distribute_at:   at(10, 0),
  };
  let (message, items) = s.record_fanout(message, vec![item]).await.unwrap();

  assert_eq!(s.get_message(message.message_id).await.unwrap(), Some(message.clone()));
  assert_eq!(items.len(), 1);
  assert_eq!(items[0].message_id, message.message_id);
  assert!(items[0].is_pending());
  assert_eq!(
    s.get_queue_item(items[0].queue_item_id).await.unwrap(),
    Some(items[0].clone())
  );
}

#[tokio::test]
async fn get_messages_returns_only_known_ids() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;
  let sub = subscribe(&s, &t, &r, Channel::Email, Frequency::Immediate).await;

  let first = fanout(&s, &t, &[&sub], at(10, 0)).await;
  let second = fanout(&s, &t, &[&sub], at(10, 0)).await;

  let ids = [first[0].message_id, second[0].message_id, Uuid::new_v4()];
  let messages = s.get_messages(&ids).await.unwrap();
  assert_eq!(messages.len(), 2);
  assert!(s.get_messages(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn ready_items_are_partitioned_by_frequency() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;
  let now_sub = subscribe(&s, &t, &r, Channel::Email, Frequency::Immediate).await;
  let hourly = subscribe(&s, &t, &r, Channel::Sms, Frequency::SummarizedHourly).await;

  let items = fanout(&s, &t, &[&now_sub, &hourly], at(10, 0)).await;
  let [immediate_item, hourly_item] = [&items[0], &items[1]];

  let immediate = s
    .ready_queue_items(at(10, 0), FrequencyClass::Immediate)
    .await
    .unwrap();
  assert_eq!(immediate, vec![immediate_item.clone()]);

  let summarized = s
    .ready_queue_items(at(10, 0), FrequencyClass::Summarized)
    .await
    .unwrap();
  assert_eq!(summarized, vec![hourly_item.clone()]);
}

#[tokio::test]
async fn ready_items_respect_distribute_at() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;
  let hourly = subscribe(&s, &t, &r, Channel::Email, Frequency::SummarizedHourly).await;

  fanout(&s, &t, &[&hourly], at(11, 0)).await;

  let early = s
    .ready_queue_items(at(10, 59), FrequencyClass::Summarized)
    .await
    .unwrap();
  assert!(early.is_empty());

  let due = s
    .ready_queue_items(at(11, 0), FrequencyClass::Summarized)
    .await
    .unwrap();
  assert_eq!(due.len(), 1);
}

#[tokio::test]
async fn mark_distributed_is_conditional() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;
  let sub = subscribe(&s, &t, &r, Channel::Email, Frequency::Immediate).await;
  let items = fanout(&s, &t, &[&sub], at(10, 0)).await;
  let id = items[0].queue_item_id;

  assert_eq!(s.mark_distributed(&[id], at(10, 1)).await.unwrap(), 1);
  assert_eq!(s.mark_distributed(&[id], at(10, 5)).await.unwrap(), 0);

  let item = s.get_queue_item(id).await.unwrap().unwrap();
  assert_eq!(item.distributed_at, Some(at(10, 1)));

  let ready = s
    .ready_queue_items(at(12, 0), FrequencyClass::Immediate)
    .await
    .unwrap();
  assert!(ready.is_empty());
}

#[tokio::test]
async fn list_queue_items_filters_by_state_and_recipient() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let ada = recipient(&s, "ada@example.com").await;
  let bob = recipient(&s, "bob@example.com").await;
  let ada_sub = subscribe(&s, &t, &ada, Channel::Email, Frequency::Immediate).await;
  let bob_sub = subscribe(&s, &t, &bob, Channel::Email, Frequency::Immediate).await;

  let items = fanout(&s, &t, &[&ada_sub, &bob_sub], at(10, 0)).await;
  let ada_item = items.iter().find(|q| q.recipient_id == ada.recipient_id).unwrap();
  s.mark_distributed(&[ada_item.queue_item_id], at(10, 1))
    .await
    .unwrap();

  let all = s.list_queue_items(&QueueItemQuery::default()).await.unwrap();
  assert_eq!(all.len(), 2);

  let pending = s
    .list_queue_items(&QueueItemQuery {
      state: Some(QueueItemState::Pending),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].recipient_id, bob.recipient_id);

  let for_ada = s
    .list_queue_items(&QueueItemQuery {
      recipient_id: Some(ada.recipient_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(for_ada.len(), 1);
  assert!(for_ada[0].is_distributed());

  let limited = s
    .list_queue_items(&QueueItemQuery {
      limit: Some(1),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn distribute_at_survives_round_trip_with_offset() {
  let s = store().await;
  let t = topic(&s, "greet").await;
  let r = recipient(&s, "ada@example.com").await;
  let sub = subscribe(&s, &t, &r, Channel::Email, Frequency::SummarizedDaily).await;

  let due = at(9, 0) + TimeDelta::days(1);
  let items = fanout(&s, &t, &[&sub], due).await;
  let fetched = s.get_queue_item(items[0].queue_item_id).await.unwrap().unwrap();
  assert_eq!(fetched.distribute_at, due);
}

// ─── Resolver ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolver_finds_entities_by_kind() {
  let s = store().await;
  let r = recipient(&s, "ada@example.com").await;
  let t = topic(&s, "greet").await;

  let found = s.resolve(EntityKind::Recipient, r.recipient_id).await.unwrap();
  assert_eq!(found, Some(Entity::Recipient(r.clone())));

  let found = s.resolve(EntityKind::Topic, t.topic_id).await.unwrap();
  assert_eq!(found, Some(Entity::Topic(t)));

  // Right id, wrong kind.
  let found = s.resolve(EntityKind::Topic, r.recipient_id).await.unwrap();
  assert!(found.is_none());
}
