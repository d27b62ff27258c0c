//! Topic publishing: one rendered message per channel, one queue item per
//! subscription.

use serde::Serialize;
use uuid::Uuid;

use tidings_core::{
  context::{self, Context, PortableContext},
  model::{Channel, NewMessage, NewQueueItem, QueueItem, SubscriptionWithRecipient},
  render::{render_body, render_subject},
  schedule,
  store::{EntityResolver, NotificationStore},
};

use crate::{Engine, Error, Result, queue::Task, transport::ChannelTransport};

/// What a publish call wrote.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
  pub topic_id:  Uuid,
  pub topic_key: String,
  pub messages:  Vec<PublishedMessage>,
  pub skipped:   Vec<SkippedChannel>,
}

impl PublishReport {
  pub fn queue_item_count(&self) -> usize {
    self.messages.iter().map(|m| m.queue_items.len()).sum()
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedMessage {
  pub message_id:  Uuid,
  pub channel:     Channel,
  pub queue_items: Vec<QueueItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedChannel {
  pub channel: Channel,
  pub reason:  SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  NoTemplate,
  RenderFailed,
}

impl<S, T> Engine<S, T>
where
  S: NotificationStore + EntityResolver,
  T: ChannelTransport,
{
  /// Fan a topic event out to every active subscriber.
  ///
  /// Only an unknown `topic_key` is an error; channels without an active
  /// template, or whose template fails to render, are skipped and reported.
  /// An immediate sweep is enqueued once the fan-out is recorded.
  pub async fn publish(
    &self,
    topic_key: &str,
    portable: PortableContext,
  ) -> Result<PublishReport> {
    let topic = self
      .store
      .find_topic_by_key(topic_key)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| tidings_core::Error::TopicNotFound(topic_key.to_owned()))?;

    let mut report = PublishReport {
      topic_id:  topic.topic_id,
      topic_key: topic.key.clone(),
      messages:  Vec::new(),
      skipped:   Vec::new(),
    };

    let context = context::decode(&portable, self.store.as_ref())
      .await
      .map_err(Error::store)?;

    let subscriptions = self
      .store
      .active_subscriptions(topic.topic_id)
      .await
      .map_err(Error::store)?;
    if subscriptions.is_empty() {
      tracing::debug!(topic = %topic.key, "no active subscriptions");
      return Ok(report);
    }

    let now = self.clock.now();
    let metadata = portable.into_value();

    for channel in Channel::ALL {
      let group: Vec<&SubscriptionWithRecipient> = subscriptions
        .iter()
        .filter(|s| s.subscription.channel == channel)
        .collect();
      if group.is_empty() {
        continue;
      }

      let Some(template) = self
        .store
        .active_template(topic.topic_id, channel)
        .await
        .map_err(Error::store)?
      else {
        tracing::debug!(topic = %topic.key, %channel, "no active template, skipping channel");
        report.skipped.push(SkippedChannel { channel, reason: SkipReason::NoTemplate });
        continue;
      };

      let (subject, body) = match render_pair(&template, &context) {
        Ok(pair) => pair,
        Err(error) => {
          tracing::warn!(
            topic = %topic.key,
            %channel,
            template_id = %template.template_id,
            %error,
            "template render failed, skipping channel"
          );
          report.skipped.push(SkippedChannel { channel, reason: SkipReason::RenderFailed });
          continue;
        }
      };

      let items = group
        .iter()
        .map(|s| NewQueueItem {
          subscription_id: s.subscription.subscription_id,
          recipient_id:    s.recipient.recipient_id,
          channel,
          distribute_at:   schedule::for_subscription(&s.subscription, &s.recipient, now),
        })
        .collect();

      let message = NewMessage {
        topic_id: topic.topic_id,
        subject,
        body,
        metadata: metadata.clone(),
      };
      let (message, queue_items) = self
        .store
        .record_fanout(message, items)
        .await
        .map_err(Error::store)?;

      tracing::info!(
        topic = %topic.key,
        %channel,
        message_id = %message.message_id,
        recipients = queue_items.len(),
        "message published"
      );
      report.messages.push(PublishedMessage {
        message_id: message.message_id,
        channel,
        queue_items,
      });
    }

    if let Err(error) = self.tasks.enqueue(Task::SweepImmediate) {
      tracing::warn!(topic = %topic.key, %error, "could not trigger immediate sweep");
    }
    Ok(report)
  }

  /// [`publish`](Self::publish) from a live context, encoding it first.
  pub async fn notify(&self, topic_key: &str, context: &Context) -> Result<PublishReport> {
    self.publish(topic_key, context::encode(context)).await
  }
}

fn render_pair(
  template: &tidings_core::model::Template,
  context: &Context,
) -> Result<(String, String), tidings_core::render::TemplateRenderError> {
  Ok((render_subject(template, context)?, render_body(template, context)?))
}
