//! Channel transports: the boundary where queue items turn into messages a
//! person actually receives.
//!
//! [`Courier`] is the production transport. Email goes through a [`Mailer`];
//! SMS and chat have no backend yet and are recorded as skipped, which still
//! lets the dispatcher mark their items distributed.

use std::future::Future;

use lettre::{
  AsyncSmtpTransport, AsyncTransport as _, Tokio1Executor,
  message::{Mailbox, header::ContentType},
  transport::smtp::authentication::Credentials,
};
use serde::Deserialize;
use thiserror::Error;

use tidings_core::model::{Channel, Message, Recipient};

use crate::mail::{self, OutgoingMail};

// ─── Trait ───────────────────────────────────────────────────────────────────

/// What happened to a send that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
  Sent,
  /// The channel has no backend; nothing left the process.
  Skipped,
}

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("invalid address: {0}")]
  Address(#[from] lettre::address::AddressError),

  #[error("could not build email: {0}")]
  Build(#[from] lettre::error::Error),

  #[error("smtp error: {0}")]
  Smtp(#[from] lettre::transport::smtp::Error),

  #[error("{0}")]
  Other(String),
}

pub trait ChannelTransport: Send + Sync {
  fn send<'a>(
    &'a self,
    channel: Channel,
    recipient: &'a Recipient,
    subject: &'a str,
    body: &'a str,
  ) -> impl Future<Output = Result<Delivery, TransportError>> + Send + 'a;

  /// One combined notification covering every message in `messages`.
  fn send_batch<'a>(
    &'a self,
    channel: Channel,
    recipient: &'a Recipient,
    messages: &'a [Message],
  ) -> impl Future<Output = Result<Delivery, TransportError>> + Send + 'a;
}

// ─── Mailers ─────────────────────────────────────────────────────────────────

pub trait Mailer: Send + Sync {
  fn deliver(
    &self,
    mail: OutgoingMail,
  ) -> impl Future<Output = Result<(), TransportError>> + Send + '_;
}

fn default_smtp_port() -> u16 { 587 }

/// SMTP relay settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
  pub host:     String,
  #[serde(default = "default_smtp_port")]
  pub port:     u16,
  pub username: Option<String>,
  pub password: Option<String>,
  /// Sender mailbox, e.g. `Tidings <noreply@example.com>`.
  pub from:     String,
}

/// Sends mail through an SMTP relay.
#[derive(Clone)]
pub struct SmtpMailer {
  transport: AsyncSmtpTransport<Tokio1Executor>,
  from:      Mailbox,
}

impl SmtpMailer {
  pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
    let from: Mailbox = config.from.parse()?;
    let mut builder =
      AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?.port(config.port);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
      builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(Self { transport: builder.build(), from })
  }
}

impl Mailer for SmtpMailer {
  async fn deliver(&self, mail: OutgoingMail) -> Result<(), TransportError> {
    let email = lettre::Message::builder()
      .from(self.from.clone())
      .to(mail.to.parse()?)
      .subject(mail.subject)
      .header(ContentType::TEXT_PLAIN)
      .body(mail.body)?;

    let response = self.transport.send(email).await?;
    tracing::debug!(to = %mail.to, positive = response.is_positive(), "smtp replied");
    Ok(())
  }
}

/// Logs mail instead of sending it. Used when no SMTP relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
  async fn deliver(&self, mail: OutgoingMail) -> Result<(), TransportError> {
    tracing::info!(to = %mail.to, subject = %mail.subject, "email (not sent, no smtp relay)");
    Ok(())
  }
}

/// Whichever mailer the configuration selects.
#[derive(Clone)]
pub enum ConfiguredMailer {
  Smtp(SmtpMailer),
  Log(LogMailer),
}

impl ConfiguredMailer {
  pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self, TransportError> {
    Ok(match smtp {
      Some(config) => Self::Smtp(SmtpMailer::new(config)?),
      None => Self::Log(LogMailer),
    })
  }
}

impl Mailer for ConfiguredMailer {
  async fn deliver(&self, mail: OutgoingMail) -> Result<(), TransportError> {
    match self {
      Self::Smtp(m) => m.deliver(mail).await,
      Self::Log(m) => m.deliver(mail).await,
    }
  }
}

// ─── Courier ─────────────────────────────────────────────────────────────────

/// Routes each channel to its backend.
pub struct Courier<M> {
  mailer: M,
}

impl<M: Mailer> Courier<M> {
  pub fn new(mailer: M) -> Self { Self { mailer } }

  fn skip(channel: Channel, recipient: &Recipient) -> Delivery {
    tracing::info!(
      %channel,
      recipient_id = %recipient.recipient_id,
      "channel has no transport, skipping send"
    );
    Delivery::Skipped
  }
}

impl<M: Mailer> ChannelTransport for Courier<M> {
  async fn send(
    &self,
    channel: Channel,
    recipient: &Recipient,
    subject: &str,
    body: &str,
  ) -> Result<Delivery, TransportError> {
    match channel {
      Channel::Email => {
        self.mailer.deliver(mail::single(recipient, subject, body)).await?;
        Ok(Delivery::Sent)
      }
      Channel::Sms | Channel::Chat => Ok(Self::skip(channel, recipient)),
    }
  }

  async fn send_batch(
    &self,
    channel: Channel,
    recipient: &Recipient,
    messages: &[Message],
  ) -> Result<Delivery, TransportError> {
    match channel {
      Channel::Email => {
        self.mailer.deliver(mail::summary(recipient, messages)).await?;
        Ok(Delivery::Sent)
      }
      Channel::Sms | Channel::Chat => Ok(Self::skip(channel, recipient)),
    }
  }
}
