//! Plain-text email composition for single and summary notifications.

use tidings_core::model::{Message, Recipient};

/// A fully composed email, ready for a [`Mailer`](crate::transport::Mailer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
  pub to:      String,
  pub subject: String,
  pub body:    String,
}

/// One message to one recipient.
pub fn single(recipient: &Recipient, subject: &str, body: &str) -> OutgoingMail {
  OutgoingMail {
    to:      recipient.email.clone(),
    subject: subject.to_owned(),
    body:    wrap(recipient, body),
  }
}

/// Several messages folded into one email.
pub fn summary(recipient: &Recipient, messages: &[Message]) -> OutgoingMail {
  let sections = messages
    .iter()
    .map(|m| format!("{}\n{}", m.subject, m.body))
    .collect::<Vec<_>>()
    .join("\n\n");

  OutgoingMail {
    to:      recipient.email.clone(),
    subject: summary_subject(messages.len()),
    body:    wrap(recipient, &sections),
  }
}

pub fn summary_subject(count: usize) -> String {
  let plural = if count == 1 { "" } else { "s" };
  format!("You have {count} new notification{plural}")
}

fn wrap(recipient: &Recipient, content: &str) -> String {
  format!("{}\n\n{content}\n\n{}\n", greeting(recipient), footer(recipient))
}

fn greeting(recipient: &Recipient) -> String {
  match recipient.full_name() {
    name if name.is_empty() => "Hello,".to_owned(),
    name => format!("Hello {name},"),
  }
}

fn footer(recipient: &Recipient) -> String {
  format!("This notification was sent to {}.", recipient.email)
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;
  use uuid::Uuid;

  use super::*;

  fn ada(first: Option<&str>) -> Recipient {
    Recipient {
      recipient_id: Uuid::new_v4(),
      email:        "ada@example.com".into(),
      first_name:   first.map(str::to_owned),
      last_name:    None,
      timezone:     None,
      created_at:   Utc::now(),
    }
  }

  fn message(subject: &str, body: &str) -> Message {
    Message {
      message_id: Uuid::new_v4(),
      topic_id:   Uuid::new_v4(),
      subject:    subject.into(),
      body:       body.into(),
      metadata:   json!({}),
      created_at: Utc::now(),
    }
  }

  #[test]
  fn single_mail_has_greeting_and_footer() {
    let mail = single(&ada(Some("ada")), "Welcome", "Glad you're here.");
    assert_eq!(mail.to, "ada@example.com");
    assert_eq!(mail.subject, "Welcome");
    assert_eq!(
      mail.body,
      "Hello Ada,\n\nGlad you're here.\n\nThis notification was sent to ada@example.com.\n"
    );
  }

  #[test]
  fn nameless_recipient_gets_plain_greeting() {
    let mail = single(&ada(None), "Hi", "Body");
    assert!(mail.body.starts_with("Hello,\n\n"));
  }

  #[test]
  fn summary_lists_every_message() {
    let mail = summary(&ada(Some("ada")), &[
      message("Order shipped", "Your order is on its way."),
      message("Invoice ready", "Invoice #42 is available."),
    ]);
    assert_eq!(mail.subject, "You have 2 new notifications");
    assert!(mail.body.contains(
      "Order shipped\nYour order is on its way.\n\nInvoice ready\nInvoice #42 is available."
    ));
  }

  #[test]
  fn summary_subject_pluralises() {
    assert_eq!(summary_subject(1), "You have 1 new notification");
    assert_eq!(summary_subject(3), "You have 3 new notifications");
  }
}
