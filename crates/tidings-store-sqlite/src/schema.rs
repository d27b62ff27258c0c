//! SQL schema for the Tidings SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS recipients (
    recipient_id TEXT PRIMARY KEY,
    email        TEXT NOT NULL UNIQUE,
    first_name   TEXT,
    last_name    TEXT,
    timezone     TEXT,             -- IANA zone name; NULL means UTC
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    topic_id    TEXT PRIMARY KEY,
    topic_key   TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS templates (
    template_id      TEXT PRIMARY KEY,
    topic_id         TEXT NOT NULL REFERENCES topics(topic_id),
    channel          TEXT NOT NULL,   -- 'email' | 'sms' | 'chat'
    subject_template TEXT NOT NULL,
    body_template    TEXT NOT NULL,
    active           INTEGER NOT NULL DEFAULT 1,
    created_at       TEXT NOT NULL
);

-- At most one active template per (topic, channel).
CREATE UNIQUE INDEX IF NOT EXISTS templates_active_idx
    ON templates(topic_id, channel) WHERE active = 1;

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id TEXT PRIMARY KEY,
    topic_id        TEXT NOT NULL REFERENCES topics(topic_id),
    recipient_id    TEXT NOT NULL REFERENCES recipients(recipient_id),
    channel         TEXT NOT NULL,
    frequency       TEXT NOT NULL,   -- 'immediate' | 'summarized_hourly' | 'summarized_daily'
    daily_hour      INTEGER CHECK (daily_hour BETWEEN 0 AND 23),
    active          INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    UNIQUE (topic_id, recipient_id, channel)
);

-- Messages are never updated.
CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT PRIMARY KEY,
    topic_id   TEXT NOT NULL REFERENCES topics(topic_id),
    subject    TEXT NOT NULL,
    body       TEXT NOT NULL,
    metadata   TEXT NOT NULL,      -- portable publish context as JSON
    created_at TEXT NOT NULL
);

-- The only UPDATE ever issued here sets distributed_at where it is NULL.
CREATE TABLE IF NOT EXISTS queue_items (
    queue_item_id   TEXT PRIMARY KEY,
    subscription_id TEXT NOT NULL REFERENCES subscriptions(subscription_id),
    message_id      TEXT NOT NULL REFERENCES messages(message_id),
    recipient_id    TEXT NOT NULL REFERENCES recipients(recipient_id),
    channel         TEXT NOT NULL,
    distribute_at   TEXT NOT NULL,
    distributed_at  TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS subscriptions_topic_idx ON subscriptions(topic_id);
CREATE INDEX IF NOT EXISTS queue_items_ready_idx   ON queue_items(distributed_at, distribute_at);
CREATE INDEX IF NOT EXISTS queue_items_recip_idx   ON queue_items(recipient_id);

PRAGMA user_version = 1;
";
